use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Explicit settings file; overrides the `config/settings.toml` lookup
pub const CONFIG_FILE_ENV: &str = "APP_CONFIG_FILE";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub remote: RemoteConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub service_name: String,
    /// Directory with the built front end; served for non-API paths when set
    pub static_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            environment: "development".to_string(),
            service_name: "todo-api-server".to_string(),
            static_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RemoteBackend {
    Http,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    pub backend: RemoteBackend,
    pub base_url: String,
    pub app_id: String,
    pub developer_token: String,
    pub timeout_seconds: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            backend: RemoteBackend::Http,
            base_url: String::new(),
            app_id: String::new(),
            developer_token: String::new(),
            timeout_seconds: 30,
        }
    }
}

impl RemoteConfig {
    /// Names of the fields the HTTP backend cannot work without
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.base_url.trim().is_empty() {
            missing.push("base_url");
        }
        if self.app_id.trim().is_empty() {
            missing.push("app_id");
        }
        if self.developer_token.trim().is_empty() {
            missing.push("developer_token");
        }
        missing
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub header_name: String,
    pub ttl_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            header_name: "x-session-id".to_string(),
            ttl_seconds: 30 * 24 * 60 * 60, // 30 days
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    /// Log redacted JSON bodies of non-GET requests
    pub log_bodies: bool,
    /// Key names containing any of these (case-insensitive) are redacted
    pub redact_fields: Vec<String>,
    /// Exact key names that are never redacted
    pub allow_fields: Vec<String>,
    /// Daily rolling log files are written here when set
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,todo_api_server=debug,tower_http=info".to_string(),
            json: true,
            log_bodies: false,
            redact_fields: ["password", "token", "authorization", "cookie", "session"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allow_fields: Vec::new(),
            directory: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Exact origins or `scheme://*.domain` patterns; empty means permissive
    pub allowed_origins: Vec<String>,
}

impl Settings {
    /// Defaults, then the settings file (if any), then `APP__*` environment variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) if !path.trim().is_empty() => Some(PathBuf::from(path)),
            _ => default_config_file(),
        };
        Self::load_from(file.as_deref())
    }

    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("logging.redact_fields")
                    .with_list_parse_key("logging.allow_fields")
                    .with_list_parse_key("cors.allowed_origins")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| match file {
                Some(path) => format!("Failed to read settings from {}", path.display()),
                None => "Failed to read settings".to_string(),
            })?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}

/// `config/settings.toml` under the working directory, else under the crate directory
fn default_config_file() -> Option<PathBuf> {
    [
        PathBuf::from("config/settings.toml"),
        Path::new(env!("CARGO_MANIFEST_DIR")).join("config/settings.toml"),
    ]
    .into_iter()
    .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.session.header_name, "x-session-id");
        assert_eq!(settings.session.ttl_seconds, 2_592_000);
        assert_eq!(settings.remote.backend, RemoteBackend::Http);
        assert!(settings.logging.redact_fields.contains(&"password".to_string()));
        assert!(!settings.server.is_production());
    }

    #[test]
    fn test_missing_remote_fields() {
        let mut remote = RemoteConfig::default();
        assert_eq!(remote.missing_fields(), vec!["base_url", "app_id", "developer_token"]);

        remote.base_url = "https://api.example.com/v1".to_string();
        remote.app_id = "todo".to_string();
        remote.developer_token = "dev".to_string();
        assert!(remote.missing_fields().is_empty());
    }

    #[test]
    fn test_defaults_round_trip_through_config() {
        let config = Config::builder()
            .add_source(Config::try_from(&Settings::default()).unwrap())
            .build()
            .unwrap();
        let settings: Settings = config.try_deserialize().unwrap();
        assert_eq!(settings.server.service_name, "todo-api-server");
        assert!(settings.server.static_dir.is_none());
        assert!(settings.logging.allow_fields.is_empty());
        assert!(settings.cors.allowed_origins.is_empty());
    }

    #[test]
    fn test_load_without_file_keeps_defaults() {
        let settings = Settings::load_from(None).unwrap();
        assert_eq!(settings.session.header_name, "x-session-id");
        assert!(!settings.logging.redact_fields.is_empty());
    }

    #[test]
    fn test_partial_file_is_filled_from_defaults() {
        let path = std::env::temp_dir().join(format!("todo-settings-{}.toml", std::process::id()));
        std::fs::write(&path, "[server]\nport = 4100\n\n[remote]\nbackend = \"memory\"\n").unwrap();

        let settings = Settings::load_from(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.server.port, 4100);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.remote.backend, RemoteBackend::Memory);
        assert_eq!(settings.remote.timeout_seconds, 30);
    }

    #[test]
    fn test_sample_file_is_located_and_loads() {
        let path = default_config_file().unwrap();
        let settings = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(settings.remote.backend, RemoteBackend::Memory);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Settings::load_from(Some(Path::new("/nonexistent/settings.toml"))).is_err());
    }
}
