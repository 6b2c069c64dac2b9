use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use common::config::{DlqConfig, ModelConfig, MqAppConfig, StorageConfig};

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: Vec::new(),
            max_age: 3600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    /// Postgres URL. Without one the server keeps jobs and blob handles in memory.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// HS256 secret shared with the identity provider.
    pub jwt_secret: String,
}

/// Limits on the generation API.
#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Default: 1000.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    /// Default: 20.
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
    /// Default: 100.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
    /// Seconds between live feed refreshes when nothing was pushed. Default: 15.
    #[serde(default = "default_live_refresh_secs")]
    pub live_refresh_secs: u64,
    #[serde(default)]
    pub model: ModelConfig,
}

fn default_max_prompt_chars() -> usize {
    1000
}
fn default_page_size() -> u64 {
    20
}
fn default_max_page_size() -> u64 {
    100
}
fn default_live_refresh_secs() -> u64 {
    15
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_prompt_chars: default_max_prompt_chars(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            live_refresh_secs: default_live_refresh_secs(),
            model: ModelConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub mq: MqAppConfig,
    #[serde(default)]
    pub dlq: DlqConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("SKETCHGEN_CONFIG").unwrap_or_else(|_| "config/config".to_string());

        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .add_source(File::with_name(&config_path).required(false))
            // e.g. SKETCHGEN__AUTH__JWT_SECRET
            .add_source(Environment::with_prefix("SKETCHGEN").separator("__"))
            .build()?;

        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.generation
            .model
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        self.dlq
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        self.storage
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        if self.mq.enabled && self.database.url.is_none() {
            return Err(ConfigError::Message(
                "mq.enabled requires database.url: the worker process must share the job store"
                    .into(),
            ));
        }
        if self.generation.default_page_size == 0
            || self.generation.default_page_size > self.generation.max_page_size
        {
            return Err(ConfigError::Message(
                "generation.default_page_size must be within 1..=max_page_size".into(),
            ));
        }
        Ok(())
    }
}
