//! Configuration loader and validator for the event notice service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub server: Server,
    pub database: Database,
    pub auth: AuthConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    pub bind_addr: String,
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Database {
    pub url: String,
}

/// Capability allow-lists, each a comma-separated list. The raw strings are
/// parsed exactly once at startup into [`crate::auth::AuthPolicy`]; empty
/// lists mean nobody holds the capability (fail-closed), never "allow all".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthConfig {
    #[serde(default)]
    pub admin_user_ids: String,
    #[serde(default)]
    pub admin_emails: String,
    #[serde(default)]
    pub notice_editor_user_ids: String,
    #[serde(default)]
    pub notice_editor_emails: String,
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.server.bind_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("server.bind_addr must be non-empty"));
    }
    if cfg.database.url.trim().is_empty() {
        return Err(ConfigError::Invalid("database.url must be non-empty"));
    }
    Ok(())
}

/// Example YAML shipped with the service.
pub fn example() -> &'static str {
    r#"server:
  bind_addr: "127.0.0.1:8080"

database:
  url: "sqlite://./data/swf-notice.db"

auth:
  # Comma-separated allow-lists. Ids are LINE user ids; emails are matched
  # case-insensitively. Empty lists deny everyone.
  admin_user_ids: "U0000000000000000000000000000000"
  admin_emails: "owner@example.com"
  notice_editor_user_ids: ""
  notice_editor_emails: ""
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.server.bind_addr, "127.0.0.1:8080");
    }

    #[test]
    fn invalid_bind_addr() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.server.bind_addr = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("bind_addr")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_database_url() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.database.url = "  ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("database.url")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn missing_allow_lists_default_to_empty() {
        let yaml = r#"
server:
  bind_addr: "127.0.0.1:8080"
database:
  url: "sqlite::memory:"
auth: {}
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        validate(&cfg).unwrap();
        assert!(cfg.auth.admin_user_ids.is_empty());
        assert!(cfg.auth.notice_editor_emails.is_empty());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.auth.admin_emails, "owner@example.com");
    }
}
