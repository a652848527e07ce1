//! SQL identifier validation.

use emporium_core::error::AppError;
use emporium_core::result::AppResult;

/// Maximum identifier length accepted by PostgreSQL.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Whether `name` is a plain lowercase identifier safe to interpolate
/// (quoted) into DDL: `[a-z_][a-z0-9_]*`, at most 63 bytes.
pub fn is_safe_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Reject identifiers that are not safe to interpolate.
pub fn ensure_safe_identifier(name: &str) -> AppResult<()> {
    if is_safe_identifier(name) {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "Refusing to use unsafe SQL identifier '{name}'"
        )))
    }
}

/// Quote a validated identifier.
pub(crate) fn quote(name: &str) -> String {
    format!("\"{name}\"")
}
