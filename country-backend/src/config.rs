use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_ENV: &str = "COUNTRY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Days a rotated log file is kept before the cleanup task removes it
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u64,

    /// SQLite connection string, e.g. "sqlite://data/countries.db"
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Country catalog endpoint
    #[serde(default = "default_countries_url")]
    pub countries_url: String,

    /// Exchange rate endpoint; `{currency}` is replaced by the reference currency
    #[serde(default = "default_rates_url")]
    pub rates_url: String,

    #[serde(default = "default_reference_currency")]
    pub reference_currency: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Where the summary image is written after each refresh
    #[serde(default = "default_image_cache_dir")]
    pub image_cache_dir: String,

    /// Fixed seed for the GDP multiplier; unset means a fresh OS seed per run
    #[serde(default)]
    pub gdp_seed: Option<u64>,

    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_font_family")]
    pub font_family: String,

    /// Extra directory of font files to register
    #[serde(default)]
    pub font_dir: Option<String>,

    #[serde(default = "default_load_system_fonts")]
    pub load_system_fonts: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_retention_days() -> u64 {
    3
}

fn default_database_url() -> String {
    "sqlite://data/countries.db".to_string()
}

fn default_countries_url() -> String {
    "https://restcountries.com/v2/all?fields=name,capital,region,population,flag,currencies".to_string()
}

fn default_rates_url() -> String {
    "https://open.er-api.com/v6/latest/{currency}".to_string()
}

fn default_reference_currency() -> String {
    "USD".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_image_cache_dir() -> String {
    "data/image_cache".to_string()
}

fn default_font_family() -> String {
    "sans-serif".to_string()
}

fn default_load_system_fonts() -> bool {
    true
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font_family: default_font_family(),
            font_dir: None,
            load_system_fonts: default_load_system_fonts(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            log_retention_days: default_log_retention_days(),
            database_url: default_database_url(),
            countries_url: default_countries_url(),
            rates_url: default_rates_url(),
            reference_currency: default_reference_currency(),
            request_timeout_secs: default_request_timeout_secs(),
            image_cache_dir: default_image_cache_dir(),
            gdp_seed: None,
            render: RenderConfig::default(),
        }
    }
}

impl BackendConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: BackendConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

        Ok(config)
    }

    /// Load from `$COUNTRY_CONFIG` or `config.toml`, falling back to defaults
    /// when the file does not exist.
    ///
    /// Returns whether a file was actually read, since logging is not
    /// initialised yet when this runs.
    pub fn load() -> anyhow::Result<(Self, bool)> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        if Path::new(&path).exists() {
            Ok((Self::from_file(&path)?, true))
        } else {
            Ok((Self::default(), false))
        }
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: BackendConfig = toml::from_str("").unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_retention_days, 3);
        assert_eq!(config.reference_currency, "USD");
        assert_eq!(config.render.font_family, "sans-serif");
        assert!(config.render.load_system_fonts);
        assert!(config.gdp_seed.is_none());
        assert_eq!(config.server_address(), "0.0.0.0:3000");
    }

    #[test]
    fn test_partial_config() {
        let config: BackendConfig = toml::from_str(
            r#"
port = 8080
gdp_seed = 7
log_retention_days = 14

[render]
font_dir = "fonts"
"#,
        )
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.gdp_seed, Some(7));
        assert_eq!(config.log_retention_days, 14);
        assert_eq!(config.render.font_dir.as_deref(), Some("fonts"));
        assert_eq!(config.render.font_family, "sans-serif");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "host = \"127.0.0.1\"\nreference_currency = \"EUR\"\n").unwrap();

        let config = BackendConfig::from_file(&path).unwrap();
        assert_eq!(config.server_address(), "127.0.0.1:3000");
        assert_eq!(config.reference_currency, "EUR");

        assert!(BackendConfig::from_file(dir.path().join("missing.toml")).is_err());
    }
}
