//! Loads a `Config`: optional TOML file via `$CONFIG_PATH`, then `.env`
//! (via `dotenvy`, best-effort), then a fixed set of highest-precedence
//! environment overrides (§6: "Environment overrides (highest-precedence
//! per key): auth secret, gateway URL, log level/format, ...").

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::models::{Config, LogFormat, LogLevel};

/// Accepted truthy values (case-insensitive): `1`, `true`, `yes`, `on`.
/// Accepted falsy values: `0`, `false`, `no`, `off`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_bool_var(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|raw| parse_bool(&raw))
}

impl Config {
    /// Loads a file at `path` (TOML) layered under defaults, then applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Convenience entry point used by the server binary: resolves the
    /// file path from `$CONFIG_PATH` if set, else loads pure defaults
    /// plus environment overrides.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("CONFIG_PATH").ok().map(PathBuf::from);
        Self::load(path.as_deref())
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("COLLECTOR_AUTH_SECRET") {
            self.service.auth_secret = Some(secret);
        }
        if let Ok(base_url) = std::env::var("GATEWAY_BASE_URL") {
            self.gateway.base_url = base_url;
        }
        if let Ok(token) = std::env::var("GATEWAY_BEARER_TOKEN") {
            self.gateway.bearer_token = Some(token);
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            if let Some(parsed) = parse_log_level(&level) {
                self.logging.level = parsed;
            }
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            if let Some(parsed) = parse_log_format(&format) {
                self.logging.format = parsed;
            }
        }
        if let Some(port) = std::env::var("SERVER_PORT").ok().and_then(|raw| raw.parse().ok()) {
            self.service.port = port;
        }
    }
}

fn parse_log_level(raw: &str) -> Option<LogLevel> {
    match raw.to_ascii_lowercase().as_str() {
        "trace" => Some(LogLevel::Trace),
        "debug" => Some(LogLevel::Debug),
        "info" => Some(LogLevel::Info),
        "notice" => Some(LogLevel::Notice),
        "warning" | "warn" => Some(LogLevel::Warning),
        "error" => Some(LogLevel::Error),
        _ => None,
    }
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "text" => Some(LogFormat::Text),
        "logfmt" => Some(LogFormat::Logfmt),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_forms() {
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("OFF"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn loads_defaults_when_no_file_given() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.service.port, 8088);
    }

    #[test]
    fn file_values_are_overridden_by_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gateway]\nbase_url = \"http://from-file\"\n").unwrap();

        std::env::set_var("GATEWAY_BASE_URL", "http://from-env");
        let config = Config::load(Some(&path)).unwrap();
        std::env::remove_var("GATEWAY_BASE_URL");

        assert_eq!(config.gateway.base_url, "http://from-env");
    }
}
