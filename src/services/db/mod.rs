//! Database backends
//!
//! The executor only sees the `QueryBackend` trait - an opaque query-issuing
//! handle. The MySQL-protocol implementation (`mysql_async`) covers mysql
//! destinations; other dialects are accepted for SQL generation but cannot be
//! connected to in this build.

mod mysql;
mod pool_manager;

pub use mysql::MySqlBackend;
pub use pool_manager::MySqlPoolManager;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::DbConnectionConfig;
use crate::utils::{EngineError, EngineResult};

/// Opaque query-issuing handle. Queries are read-only; no transactions.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Execute a query, returning `(column_names, rows)`.
    async fn query(&self, sql: &str) -> EngineResult<(Vec<String>, Vec<Vec<String>>)>;

    /// Release the underlying connection resources.
    async fn close(&self);
}

/// Backend messages that mean "unknown table / schema object". These trigger
/// the executor's one-shot schema-prefix fallback.
pub fn is_unknown_object_message(message: &str) -> bool {
    const MARKERS: &[&str] = &[
        "doesn't exist",
        "does not exist",
        "Unknown table",
        "Unknown database",
        "Invalid object name",
        "ORA-00942",
        "no such table",
    ];
    MARKERS.iter().any(|m| message.contains(m))
}

/// Connect to a destination described by `config`.
pub struct BackendFactory {
    pool_manager: Arc<MySqlPoolManager>,
}

impl BackendFactory {
    pub fn new(pool_manager: Arc<MySqlPoolManager>) -> Self {
        Self { pool_manager }
    }

    pub async fn connect(
        &self,
        config: &DbConnectionConfig,
    ) -> EngineResult<Arc<dyn QueryBackend>> {
        match config.db_type.to_lowercase().as_str() {
            "mysql" => {
                let pool = self.pool_manager.get_pool(config).await?;
                Ok(Arc::new(MySqlBackend::from_pool(pool)))
            },
            other => Err(EngineError::InvalidRequest(format!(
                "No driver available for db_type '{}' in this build (SQL generation for it is still supported)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_object_markers() {
        assert!(is_unknown_object_message("Table 'newdq.hana_material_master' doesn't exist"));
        assert!(is_unknown_object_message("Invalid object name 'dbo.catalog'"));
        assert!(is_unknown_object_message("ORA-00942: table or view does not exist"));
        assert!(!is_unknown_object_message("Access denied for user"));
        assert!(!is_unknown_object_message("Syntax error near SELECT"));
    }
}
