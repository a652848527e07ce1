//! Schema introspection and plugin table removal.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;

use emporium_core::error::{AppError, ErrorKind};
use emporium_core::result::AppResult;

use crate::store::identifier::{ensure_safe_identifier, quote};
use crate::store::{ForeignKey, SchemaManager};

/// Schema commands against the current PostgreSQL schema.
#[derive(Debug, Clone)]
pub struct SchemaRepository {
    pool: PgPool,
}

impl SchemaRepository {
    /// Create a new schema repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SchemaManager for SchemaRepository {
    async fn list_tables(&self) -> AppResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT table_name::TEXT FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list tables", e))
    }

    async fn foreign_keys(&self) -> AppResult<Vec<ForeignKey>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT DISTINCT tc.table_name::TEXT, ccu.table_name::TEXT \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.constraint_column_usage ccu \
               ON ccu.constraint_name = tc.constraint_name \
              AND ccu.constraint_schema = tc.constraint_schema \
             WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = current_schema()",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list foreign keys", e))?;

        Ok(rows
            .into_iter()
            .map(|(table, references)| ForeignKey { table, references })
            .collect())
    }

    async fn drop_table(&self, table: &str) -> AppResult<()> {
        ensure_safe_identifier(table)?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote(table)))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to drop table '{table}'"),
                    e,
                )
            })?;
        info!(table = %table, "Dropped table");
        Ok(())
    }

    async fn delete_rows(&self, table: &str, column: &str, value: &str) -> AppResult<u64> {
        ensure_safe_identifier(table)?;
        ensure_safe_identifier(column)?;
        let sql = format!(
            "DELETE FROM {} WHERE {}::TEXT = $1",
            quote(table),
            quote(column)
        );
        let result = sqlx::query(&sql)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to delete rows from '{table}'"),
                    e,
                )
            })?;
        Ok(result.rows_affected())
    }

    async fn truncate_table(&self, table: &str) -> AppResult<()> {
        ensure_safe_identifier(table)?;
        sqlx::query(&format!("TRUNCATE TABLE {}", quote(table)))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to truncate table '{table}'"),
                    e,
                )
            })?;
        Ok(())
    }
}
