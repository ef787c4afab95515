//! MySQL-protocol connection pool manager
//!
//! Uses DashMap for lock-free concurrent access and maintains one bounded
//! pool per destination so repeated executions against the same backend do
//! not reconnect.

use dashmap::DashMap;
use mysql_async::{OptsBuilder, Pool, PoolConstraints, PoolOpts, SslOpts};
use std::sync::Arc;

use crate::config::DbConnectionConfig;
use crate::utils::{EngineError, EngineResult};

#[derive(Clone)]
pub struct MySqlPoolManager {
    pools: Arc<DashMap<String, Pool>>,
    pool_size: usize,
}

impl MySqlPoolManager {
    pub fn new(pool_size: usize) -> Self {
        Self { pools: Arc::new(DashMap::new()), pool_size }
    }

    fn pool_key(config: &DbConnectionConfig) -> String {
        format!(
            "{}:{}/{}/{}",
            config.host,
            config.effective_port(),
            config.database,
            config.username
        )
    }

    /// Get or create a connection pool for the destination.
    ///
    /// Fast path: existing pool, lock-free read. Slow path: build a new pool.
    pub async fn get_pool(&self, config: &DbConnectionConfig) -> EngineResult<Pool> {
        let key = Self::pool_key(config);

        if let Some(pool) = self.pools.get(&key) {
            return Ok(pool.clone());
        }

        let pool = self.create_pool(config)?;
        self.pools.insert(key.clone(), pool.clone());

        tracing::info!(
            "Created MySQL connection pool for {}:{} (max {} connections)",
            config.host,
            config.effective_port(),
            self.pool_size
        );

        Ok(pool)
    }

    /// Drop the pool for one destination (credentials changed, etc).
    pub async fn remove_pool(&self, config: &DbConnectionConfig) {
        let key = Self::pool_key(config);
        if let Some((_, pool)) = self.pools.remove(&key) {
            if let Err(e) = pool.disconnect().await {
                tracing::warn!("Error disconnecting pool {}: {}", key, e);
            }
            tracing::info!("Removed MySQL connection pool for {}", key);
        }
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    fn create_pool(&self, config: &DbConnectionConfig) -> EngineResult<Pool> {
        let constraints = PoolConstraints::new(1, self.pool_size).ok_or_else(|| {
            EngineError::InvalidRequest(format!("Invalid pool size: {}", self.pool_size))
        })?;

        let database = if config.database.is_empty() {
            None
        } else {
            Some(config.database.clone())
        };

        let opts = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(config.effective_port())
            .user(Some(&config.username))
            .pass(if config.password.is_empty() { None } else { Some(&config.password) })
            .db_name(database)
            .prefer_socket(false)
            .ssl_opts(None::<SslOpts>)
            .tcp_keepalive(Some(30_000_u32))
            .tcp_nodelay(true)
            .pool_opts(PoolOpts::default().with_constraints(constraints));

        Ok(Pool::new(opts))
    }
}
