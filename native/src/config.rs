// Proxy configuration: optional steam_echo.json next to the DLL, then STEAMECHO_* overrides.

use crate::backing::default_backing_library;
use crate::ipc::PIPE_NAME;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "steam_echo.json";

pub const ENV_PIPE_NAME: &str = "STEAMECHO_PIPE_NAME";
pub const ENV_BACKING_LIBRARY: &str = "STEAMECHO_BACKING_LIBRARY";
pub const ENV_LOG_FILE: &str = "STEAMECHO_LOG_FILE";
pub const ENV_LOG_LEVEL: &str = "STEAMECHO_LOG_LEVEL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Pipe the proxy notifies, without the `\\.\pipe\` prefix.
    pub pipe_name: String,
    /// File name of the renamed genuine library; `None` picks it by bitness.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backing_library: Option<String>,
    /// Diagnostics log. File logging is off when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    pub log_level: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            pipe_name: PIPE_NAME.to_string(),
            backing_library: None,
            log_file: None,
            log_level: "info".to_string(),
        }
    }
}

impl ProxyConfig {
    /// Read `steam_echo.json` from `dir` if present, then apply environment
    /// overrides. An unreadable file falls back to defaults; overrides apply
    /// either way and the file error is returned alongside for reporting.
    pub fn load_or_default(dir: Option<&Path>) -> (Self, Option<ConfigError>) {
        Self::load_with(dir, |key| std::env::var(key).ok())
    }

    fn load_with<F>(dir: Option<&Path>, lookup: F) -> (Self, Option<ConfigError>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let (mut config, error) = match dir.map(|d| d.join(CONFIG_FILE_NAME)) {
            Some(path) if path.is_file() => match Self::from_file(&path) {
                Ok(config) => (config, None),
                Err(e) => (Self::default(), Some(e)),
            },
            _ => (Self::default(), None),
        };

        config.apply_overrides(lookup);
        (config, error)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from `lookup`; empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(pipe_name) = value(ENV_PIPE_NAME) {
            self.pipe_name = pipe_name;
        }
        if let Some(backing) = value(ENV_BACKING_LIBRARY) {
            self.backing_library = Some(backing);
        }
        if let Some(log_file) = value(ENV_LOG_FILE) {
            self.log_file = Some(PathBuf::from(log_file));
        }
        if let Some(level) = value(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
    }

    pub fn backing_library_name(&self) -> &str {
        self.backing_library
            .as_deref()
            .unwrap_or(default_backing_library())
    }

    /// Log file path, with relative paths resolved against `dir`.
    pub fn log_file_in(&self, dir: Option<&Path>) -> Option<PathBuf> {
        let log_file = self.log_file.as_ref()?;
        match dir {
            Some(dir) if log_file.is_relative() => Some(dir.join(log_file)),
            _ => Some(log_file.clone()),
        }
    }

    /// Unknown level names fall back to `Info`.
    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.pipe_name, "SteamEchoPipe");
        assert_eq!(config.backing_library_name(), default_backing_library());
        assert!(config.log_file_in(None).is_none());
        assert_eq!(config.level_filter(), LevelFilter::Info);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{ "log_file": "steam_echo.log", "log_level": "debug" }"#,
        )
        .unwrap();

        let config = ProxyConfig::from_file(&dir.path().join(CONFIG_FILE_NAME)).unwrap();

        assert_eq!(config.pipe_name, "SteamEchoPipe");
        assert_eq!(config.level_filter(), LevelFilter::Debug);
        assert_eq!(
            config.log_file_in(Some(dir.path())),
            Some(dir.path().join("steam_echo.log"))
        );
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{ pipe_name: ").unwrap();

        assert!(matches!(
            ProxyConfig::from_file(&path),
            Err(ConfigError::Json { .. })
        ));
    }

    #[test]
    fn overrides_survive_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "{ broken").unwrap();

        let (config, error) = ProxyConfig::load_with(
            Some(dir.path()),
            lookup_from(&[(ENV_BACKING_LIBRARY, "steam_api64_o.dll")]),
        );

        assert!(matches!(error, Some(ConfigError::Json { .. })));
        assert_eq!(config.backing_library_name(), "steam_api64_o.dll");
        assert_eq!(config.pipe_name, "SteamEchoPipe");
    }

    #[test]
    fn file_values_then_overrides() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{ "pipe_name": "FromFile", "log_level": "warn" }"#,
        )
        .unwrap();

        let (config, error) =
            ProxyConfig::load_with(Some(dir.path()), lookup_from(&[(ENV_LOG_LEVEL, "debug")]));

        assert!(error.is_none());
        assert_eq!(config.pipe_name, "FromFile");
        assert_eq!(config.level_filter(), LevelFilter::Debug);
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = ProxyConfig {
            pipe_name: "FromFile".to_string(),
            ..ProxyConfig::default()
        };

        config.apply_overrides(lookup_from(&[
            (ENV_PIPE_NAME, "FromEnv"),
            (ENV_BACKING_LIBRARY, "steam_api64_o.dll"),
            (ENV_LOG_LEVEL, "trace"),
        ]));

        assert_eq!(config.pipe_name, "FromEnv");
        assert_eq!(config.backing_library_name(), "steam_api64_o.dll");
        assert_eq!(config.level_filter(), LevelFilter::Trace);
    }

    #[test]
    fn blank_overrides_are_ignored() {
        let mut config = ProxyConfig::default();
        config.apply_overrides(lookup_from(&[(ENV_PIPE_NAME, "  "), (ENV_LOG_FILE, "")]));

        assert_eq!(config, ProxyConfig::default());
    }

    #[test]
    fn absolute_log_file_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let absolute = dir.path().join("logs").join("proxy.log");
        let config = ProxyConfig {
            log_file: Some(absolute.clone()),
            ..ProxyConfig::default()
        };

        assert_eq!(config.log_file_in(Some(Path::new("elsewhere"))), Some(absolute));
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        let config = ProxyConfig {
            log_level: "chatty".to_string(),
            ..ProxyConfig::default()
        };
        assert_eq!(config.level_filter(), LevelFilter::Info);
    }
}
