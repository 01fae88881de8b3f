//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    let config: ServerConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogFormat;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
document_root = "/srv/www"

[listener]
bind_address = "127.0.0.1:9000"

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.listener.max_connections, 10_000);
        assert_eq!(config.document_root.as_deref(), Some("/srv/www"));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.compression.enabled);
        assert_eq!(config.timeouts.request_secs, 30);
    }

    #[test]
    fn reports_parse_and_validation_errors() {
        assert!(matches!(parse_config("listener = 3"), Err(ConfigError::Parse(_))));

        let err = parse_config("[timeouts]\nproxy_secs = 0\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: timeout 'proxy_secs' must be greater than zero"
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/missing/treeserve.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
