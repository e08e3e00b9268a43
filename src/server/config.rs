use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub database_url: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Endpoint of the external scheduler that triggers task execution.
    pub scheduler_url: String,

    /// Base of the callback URLs handed to the scheduler.
    pub callback_base_url: String,

    pub package_service_url: String,

    pub user_info_url: String,

    #[serde(default)]
    pub error_catalog_path: Option<String>,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_db_connections")]
    pub max_db_connections: u32,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug, Clone)]
pub struct PartialServerConfig {
    database_url: Option<String>,
    listen_addr: Option<String>,
    scheduler_url: Option<String>,
    callback_base_url: Option<String>,
    package_service_url: Option<String>,
    user_info_url: Option<String>,
    error_catalog_path: Option<String>,
    log_dir: Option<String>,
    max_db_connections: Option<u32>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_max_db_connections() -> u32 {
    10
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config = match config_path {
            Some(path_str) => Self::read_file(Path::new(path_str))?,
            None => PartialServerConfig::default(),
        };

        // 2. Load from environment variables
        let env_config: PartialServerConfig = envy::from_env::<PartialServerConfig>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;

        // 3. Merge: environment overrides file
        Self::merge(file_config, env_config)
    }

    fn read_file(path: &Path) -> Result<PartialServerConfig, String> {
        if !path.exists() {
            return Ok(PartialServerConfig::default());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))
    }

    pub fn merge(file: PartialServerConfig, env: PartialServerConfig) -> Result<Self, String> {
        Ok(ServerConfig {
            database_url: env.database_url.or(file.database_url)
                .ok_or("DATABASE_URL is required")?,
            listen_addr: env.listen_addr.or(file.listen_addr)
                .unwrap_or_else(default_listen_addr),
            scheduler_url: env.scheduler_url.or(file.scheduler_url)
                .ok_or("SCHEDULER_URL is required")?,
            callback_base_url: env.callback_base_url.or(file.callback_base_url)
                .ok_or("CALLBACK_BASE_URL is required")?,
            package_service_url: env.package_service_url.or(file.package_service_url)
                .ok_or("PACKAGE_SERVICE_URL is required")?,
            user_info_url: env.user_info_url.or(file.user_info_url)
                .ok_or("USER_INFO_URL is required")?,
            error_catalog_path: env.error_catalog_path.or(file.error_catalog_path),
            log_dir: env.log_dir.or(file.log_dir)
                .unwrap_or_else(default_log_dir),
            max_db_connections: env.max_db_connections.or(file.max_db_connections)
                .unwrap_or_else(default_max_db_connections),
        })
    }
}
