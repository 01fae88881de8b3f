//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, connection limits > 0)
//! - Check addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ServerConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("max_connections must be greater than zero")]
    ZeroConnections,

    #[error("timeout '{0}' must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("compression buffer_size must be greater than zero")]
    ZeroCompressionBuffer,

    #[error("invalid default proxy '{url}': {reason}")]
    DefaultProxy { url: String, reason: String },

    #[error("unknown log level '{0}'")]
    LogLevel(String),
}

/// Check `config` for semantic errors.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroConnections);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_secs"));
    }
    if config.timeouts.proxy_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("proxy_secs"));
    }
    if config.compression.enabled && config.compression.buffer_size == 0 {
        errors.push(ValidationError::ZeroCompressionBuffer);
    }
    if let Some(proxy) = &config.default_proxy {
        let reason = match Url::parse(proxy) {
            Ok(url) if url.scheme() == "http" => None,
            Ok(url) => Some(format!("unsupported scheme '{}'", url.scheme())),
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = reason {
            errors.push(ValidationError::DefaultProxy {
                url: proxy.clone(),
                reason,
            });
        }
    }
    if !LOG_LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::LogLevel(config.logging.level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ServerConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.listener.max_connections = 0;
        config.timeouts.request_secs = 0;
        config.compression.buffer_size = 0;
        config.default_proxy = Some("ftp://files.example".into());
        config.logging.level = "chatty".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 6);
        assert!(errors.contains(&ValidationError::ZeroTimeout("request_secs")));
        assert!(errors.contains(&ValidationError::LogLevel("chatty".into())));
    }

    #[test]
    fn disabled_compression_ignores_buffer() {
        let mut config = ServerConfig::default();
        config.compression.enabled = false;
        config.compression.buffer_size = 0;
        assert!(validate_config(&config).is_ok());
    }
}
