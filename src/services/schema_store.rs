//! Schema Store
//!
//! Loads named schema descriptors from the `schemas/` directory and caches
//! them. Side-effect-free beyond caching.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::Schema;
use crate::utils::{EngineError, EngineResult};

static ORACLE_SERVICE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)SERVICE_NAME\s*=\s*([A-Za-z0-9_.$-]+)").expect("valid regex"));

pub struct SchemaStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<Schema>>>,
}

impl SchemaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), cache: RwLock::new(HashMap::new()) }
    }

    /// Load a schema descriptor by name (`schemas/<name>.json`).
    pub async fn load(&self, name: &str) -> EngineResult<Arc<Schema>> {
        {
            let cache = self.cache.read().await;
            if let Some(schema) = cache.get(name) {
                return Ok(Arc::clone(schema));
            }
        }

        let path = self.dir.join(format!("{}.json", name));
        if !path.exists() {
            return Err(EngineError::SchemaNotFound(name.to_string()));
        }

        let content = std::fs::read_to_string(&path)?;
        let mut schema: Schema = serde_json::from_str(&content)?;
        if schema.name.is_empty() {
            schema.name = name.to_string();
        }
        let schema = Arc::new(schema);

        let mut cache = self.cache.write().await;
        cache.insert(name.to_string(), Arc::clone(&schema));
        tracing::debug!("Loaded schema '{}' ({} tables)", name, schema.tables.len());

        Ok(schema)
    }

    pub async fn load_many(&self, names: &[String]) -> EngineResult<Vec<Arc<Schema>>> {
        let mut schemas = Vec::with_capacity(names.len());
        for name in names {
            schemas.push(self.load(name).await?);
        }
        Ok(schemas)
    }

    /// Drop a cached schema (descriptor file changed on disk).
    pub async fn invalidate(&self, name: &str) {
        self.cache.write().await.remove(name);
    }
}

/// Extract the database name from a connection URL.
///
/// Understands mysql, postgresql, sqlserver (`databaseName=` property) and
/// oracle (TNS `SERVICE_NAME=`, thin `@host:port:sid` / `@//host:port/svc`)
/// forms; anything else falls back to the substring after the last `/`
/// before `?`.
pub fn extract_database_name(url: &str) -> String {
    let lower = url.to_lowercase();

    if lower.contains("sqlserver") {
        for part in url.split(';') {
            let mut kv = part.splitn(2, '=');
            if let (Some(k), Some(v)) = (kv.next(), kv.next()) {
                let k = k.trim();
                if k.eq_ignore_ascii_case("databasename") || k.eq_ignore_ascii_case("database") {
                    return v.trim().to_string();
                }
            }
        }
    }

    if lower.contains("oracle") {
        if let Some(cap) = ORACLE_SERVICE_NAME.captures(url) {
            return cap[1].to_string();
        }
        if let Some(at) = url.rfind('@') {
            let tail = url[at + 1..].trim_start_matches("//");
            if let Some(idx) = tail.rfind('/') {
                return tail[idx + 1..].split('?').next().unwrap_or("").to_string();
            }
            if let Some(idx) = tail.rfind(':') {
                return tail[idx + 1..].to_string();
            }
        }
    }

    let no_query = url.split('?').next().unwrap_or(url);
    no_query
        .rsplit('/')
        .next()
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_mysql_and_postgres_names() {
        assert_eq!(extract_database_name("mysql://root:pw@localhost:3306/newdq?ssl=false"), "newdq");
        assert_eq!(extract_database_name("jdbc:mysql://db-host/sales"), "sales");
        assert_eq!(extract_database_name("postgresql://host:5432/warehouse"), "warehouse");
    }

    #[test]
    fn extracts_sqlserver_database_property() {
        assert_eq!(
            extract_database_name("jdbc:sqlserver://host:1433;databaseName=ReconDB;encrypt=true"),
            "ReconDB"
        );
        assert_eq!(
            extract_database_name("jdbc:sqlserver://host;database=Other"),
            "Other"
        );
    }

    #[test]
    fn extracts_oracle_forms() {
        assert_eq!(
            extract_database_name(
                "jdbc:oracle:thin:@(DESCRIPTION=(ADDRESS=(HOST=h))(CONNECT_DATA=(SERVICE_NAME=ORCLPDB1)))"
            ),
            "ORCLPDB1"
        );
        assert_eq!(extract_database_name("jdbc:oracle:thin:@//host:1521/svc1"), "svc1");
        assert_eq!(extract_database_name("jdbc:oracle:thin:@host:1521:XE"), "XE");
    }

    #[test]
    fn fallback_takes_last_path_segment() {
        assert_eq!(extract_database_name("somedriver://x/y/zdb?opt=1"), "zdb");
    }

    #[tokio::test]
    async fn load_missing_schema_is_not_found() {
        let store = SchemaStore::new(std::env::temp_dir().join("tessera_no_schemas"));
        let err = store.load("absent").await.unwrap_err();
        assert!(matches!(err, EngineError::SchemaNotFound(_)));
    }

    #[tokio::test]
    async fn load_reads_and_caches_descriptor() {
        let dir = std::env::temp_dir().join(format!("tessera_schemas_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("catalog.json"),
            r#"{"name": "catalog", "tables": [{"name": "orders", "columns": []}]}"#,
        )
        .unwrap();

        let store = SchemaStore::new(&dir);
        let schema = store.load("catalog").await.expect("load");
        assert_eq!(schema.tables.len(), 1);

        // cached: deleting the file does not break subsequent loads
        std::fs::remove_file(dir.join("catalog.json")).unwrap();
        assert!(store.load("catalog").await.is_ok());

        let _ = std::fs::remove_dir_all(dir);
    }
}
