use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
    pub engine: EngineConfig,
    pub databases: DatabasesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// LLM transport configuration. When `enabled` is false every LLM path in the
/// engine falls back to its deterministic logic.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Application root for all persisted artifacts
    pub root_dir: String,
    /// Overrides the `results/` directory
    pub result_dir: Option<String>,
    /// Directory holding schema descriptors
    pub schema_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-request fan-out parallelism
    pub worker_pool_size: usize,
    /// Bounded connections per database destination
    pub db_pool_size: usize,
    /// Per-query deadline in seconds
    pub query_timeout_secs: u64,
    /// Row cap applied to returned record sets
    pub default_record_limit: usize,
}

/// Source/target database connections. When `use_env_configs` is true,
/// requests may omit connection details and these are used instead.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DatabasesConfig {
    pub use_env_configs: bool,
    pub source: Option<DbConnectionConfig>,
    pub target: Option<DbConnectionConfig>,
}

#[derive(Debug, Clone, serde::Serialize, Deserialize, utoipa::ToSchema)]
pub struct DbConnectionConfig {
    pub db_type: String,
    pub host: String,
    #[serde(default)]
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Oracle service name, unused for other dialects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

impl DbConnectionConfig {
    /// Default port for the configured db_type when none was given.
    pub fn effective_port(&self) -> u16 {
        if self.port != 0 {
            return self.port;
        }
        match self.db_type.to_lowercase().as_str() {
            "mysql" => 3306,
            "postgresql" | "postgres" => 5432,
            "sqlserver" => 1433,
            "oracle" => 1521,
            _ => 3306,
        }
    }
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "tessera")]
#[command(version, about = "Tessera - Data Reconciliation & KG Analytics Engine")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Logging level (overrides config file, e.g., "info,tessera=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Application storage root (overrides config file)
    #[arg(long, value_name = "DIR")]
    pub storage_root: Option<String>,

    /// Disable all LLM paths (deterministic fallbacks only)
    #[arg(long)]
    pub no_llm: bool,
}

impl Config {
    /// Load configuration with command line, environment variable, and file
    /// support.
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();
        Self::load_with_args(&cli_args)
    }

    pub fn load_with_args(cli_args: &CommandLineArgs) -> Result<Self, anyhow::Error> {
        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported variables:
    /// - `LLM_ENABLED`, `LLM_API_BASE`, `LLM_API_KEY`, `LLM_MODEL`,
    ///   `LLM_TEMPERATURE`, `LLM_MAX_TOKENS`
    /// - `USE_ENV_DB_CONFIGS`, `SOURCE_DB_*`, `TARGET_DB_*`
    /// - `RESULT_STORAGE_DIR`, `WORKER_POOL_SIZE`
    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("LLM_ENABLED")
            && let Ok(val) = enabled.parse()
        {
            self.llm.enabled = val;
            tracing::info!("Override llm.enabled from env: {}", self.llm.enabled);
        }

        if let Ok(base) = std::env::var("LLM_API_BASE") {
            self.llm.api_base = base;
            tracing::info!("Override llm.api_base from env");
        }

        if let Ok(key) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = Some(key);
            tracing::info!("Override llm.api_key from env");
        }

        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.model = model;
            tracing::info!("Override llm.model from env: {}", self.llm.model);
        }

        if let Ok(temp) = std::env::var("LLM_TEMPERATURE")
            && let Ok(val) = temp.parse()
        {
            self.llm.temperature = val;
        }

        if let Ok(tokens) = std::env::var("LLM_MAX_TOKENS")
            && let Ok(val) = tokens.parse()
        {
            self.llm.max_tokens = val;
        }

        if let Ok(use_env) = std::env::var("USE_ENV_DB_CONFIGS")
            && let Ok(val) = use_env.parse()
        {
            self.databases.use_env_configs = val;
            tracing::info!("Override databases.use_env_configs from env: {}", val);
        }

        if self.databases.use_env_configs {
            if let Some(cfg) = Self::db_config_from_env("SOURCE_DB") {
                self.databases.source = Some(cfg);
                tracing::info!("Loaded source DB config from SOURCE_DB_* env");
            }
            if let Some(cfg) = Self::db_config_from_env("TARGET_DB") {
                self.databases.target = Some(cfg);
                tracing::info!("Loaded target DB config from TARGET_DB_* env");
            }
        }

        if let Ok(dir) = std::env::var("RESULT_STORAGE_DIR") {
            self.storage.result_dir = Some(dir);
            tracing::info!("Override storage.result_dir from env");
        }

        if let Ok(size) = std::env::var("WORKER_POOL_SIZE")
            && let Ok(val) = size.parse::<usize>()
            && val > 0
        {
            self.engine.worker_pool_size = val;
            tracing::info!("Override engine.worker_pool_size from env: {}", val);
        }
    }

    fn db_config_from_env(prefix: &str) -> Option<DbConnectionConfig> {
        let get = |suffix: &str| std::env::var(format!("{}_{}", prefix, suffix)).ok();
        let host = get("HOST")?;
        Some(DbConnectionConfig {
            db_type: get("TYPE").unwrap_or_else(|| "mysql".to_string()),
            host,
            port: get("PORT").and_then(|p| p.parse().ok()).unwrap_or(0),
            database: get("DATABASE").unwrap_or_default(),
            username: get("USERNAME").unwrap_or_default(),
            password: get("PASSWORD").unwrap_or_default(),
            service_name: get("SERVICE_NAME"),
        })
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
            tracing::info!("Override server.host from CLI: {}", self.server.host);
        }

        if let Some(port) = args.server_port {
            self.server.port = port;
            tracing::info!("Override server.port from CLI: {}", self.server.port);
        }

        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }

        if let Some(root) = &args.storage_root {
            self.storage.root_dir = root.clone();
            tracing::info!("Override storage.root_dir from CLI: {}", self.storage.root_dir);
        }

        if args.no_llm {
            self.llm.enabled = false;
            tracing::info!("LLM disabled from CLI");
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.engine.worker_pool_size == 0 {
            anyhow::bail!("engine.worker_pool_size must be > 0");
        }

        if self.engine.db_pool_size == 0 {
            anyhow::bail!("engine.db_pool_size must be > 0");
        }

        if self.llm.enabled && self.llm.api_key.is_none() {
            tracing::warn!("LLM enabled without LLM_API_KEY; LLM calls will fail and fall back");
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!("llm.temperature must be within [0, 2]");
        }

        Ok(())
    }

    /// Effective results directory (`RESULT_STORAGE_DIR` override or
    /// `<root>/results`).
    pub fn results_dir(&self) -> String {
        self.storage
            .result_dir
            .clone()
            .unwrap_or_else(|| format!("{}/results", self.storage.root_dir))
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,tessera=debug".to_string(), file: Some("logs/tessera.log".to_string()) }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 4096,
            timeout_seconds: 60,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { root_dir: ".".to_string(), result_dir: None, schema_dir: "schemas".to_string() }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 4,
            db_pool_size: 8,
            query_timeout_secs: 120,
            default_record_limit: 1000,
        }
    }
}
