use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

#[derive(Debug, Deserialize, Clone)]
pub struct SimilarityConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub candidate_count: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub web_port: u16,
    pub log_level: String,
    pub store: String,
    pub database_url: String,
    pub popular_limit: usize,
    pub download_timeout_secs: u64,
    pub similarity: SimilarityConfig,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("MEME_SEARCH").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn uses_sqlite(&self) -> bool {
        self.store.eq_ignore_ascii_case("sqlite")
    }
}
