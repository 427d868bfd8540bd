use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const MAX_CPU_SAMPLE_WINDOW_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_cpu_sample_window_ms")]
    pub cpu_sample_window_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: default_url(),
            cpu_sample_window_ms: default_cpu_sample_window_ms(),
            user_agent: default_user_agent(),
        }
    }
}

/// Values given on the command line; each one wins over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub cpu_sample_window: Option<Duration>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults, then the optional file, then command-line overrides.
    pub fn resolve(path: Option<&Path>, overrides: Overrides) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(p) => Self::load_from_file(p)?,
            None => Self::default(),
        };
        if let Some(url) = overrides.url {
            cfg.url = url;
        }
        if let Some(window) = overrides.cpu_sample_window {
            cfg.cpu_sample_window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        }
        if let Some(user_agent) = overrides.user_agent {
            cfg.user_agent = user_agent;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "url must not be empty (use '-' for stdout)".to_string(),
            ));
        }
        if self.cpu_sample_window_ms > MAX_CPU_SAMPLE_WINDOW_MS {
            return Err(ConfigError::Validation(format!(
                "cpu_sample_window_ms must be <= {MAX_CPU_SAMPLE_WINDOW_MS}"
            )));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Validation(
                "user_agent must not be empty".to_string(),
            ));
        }
        if HeaderValue::from_str(&self.user_agent).is_err() {
            return Err(ConfigError::Validation(
                "user_agent must be a valid HTTP header value".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cpu_sample_window(&self) -> Duration {
        Duration::from_millis(self.cpu_sample_window_ms)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn default_url() -> String {
    "-".to_string()
}

const fn default_cpu_sample_window_ms() -> u64 {
    5_000
}

fn default_user_agent() -> String {
    concat!("system-data-exporter/", env!("CARGO_PKG_VERSION")).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_yaml(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(text.as_bytes()).expect("write yaml");
        file
    }

    #[test]
    fn defaults_print_to_stdout_after_five_seconds() {
        let cfg = Config::resolve(None, Overrides::default()).unwrap();
        assert_eq!(cfg.url, "-");
        assert_eq!(cfg.cpu_sample_window(), Duration::from_secs(5));
        assert!(cfg.user_agent.starts_with("system-data-exporter/"));
    }

    #[test]
    fn example_yaml_parses_to_defaults() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn file_values_are_overridden_by_flags() {
        let file = write_yaml("url: http://collector.local/ingest\ncpu_sample_window_ms: 1000\n");

        let from_file = Config::resolve(Some(file.path()), Overrides::default()).unwrap();
        assert_eq!(from_file.url, "http://collector.local/ingest");
        assert_eq!(from_file.cpu_sample_window_ms, 1000);

        let overridden = Config::resolve(
            Some(file.path()),
            Overrides {
                url: Some("-".to_string()),
                cpu_sample_window: Some(Duration::from_millis(250)),
                user_agent: None,
            },
        )
        .unwrap();
        assert_eq!(overridden.url, "-");
        assert_eq!(overridden.cpu_sample_window_ms, 250);
    }

    #[test]
    fn window_above_limit_is_rejected() {
        let err = Config::resolve(
            None,
            Overrides {
                cpu_sample_window: Some(Duration::from_secs(61)),
                ..Overrides::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn empty_url_is_rejected() {
        let mut cfg = Config::default();
        cfg.url = "  ".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn user_agent_with_control_chars_is_rejected() {
        let err = Config::resolve(
            None,
            Overrides {
                user_agent: Some("agent\nwith-newline".to_string()),
                ..Overrides::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn unknown_keys_fail_to_parse() {
        let file = write_yaml("url: '-'\ninterval_secs: 5\n");
        let err = Config::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = Config::load_from_file("/definitely/missing/config.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
