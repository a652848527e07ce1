//! Convenience result type alias for Emporium.

use crate::error::AppError;

/// A specialized `Result` type for Emporium operations.
pub type AppResult<T> = Result<T, AppError>;
