//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files and
//! fill missing fields from their defaults.

use serde::{Deserialize, Serialize};

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Directory served for GET/HEAD requests no route matches.
    pub document_root: Option<String>,

    /// Base URL unmatched GET/HEAD requests are forwarded to.
    /// Takes precedence over `document_root`.
    pub default_proxy: Option<String>,

    pub timeouts: TimeoutConfig,

    pub compression: CompressionConfig,

    pub logging: LoggingConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time until a response head must be produced, in seconds.
    pub request_secs: u64,

    /// Time an upstream may take to answer a proxied request, in seconds.
    pub proxy_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            proxy_secs: 30,
        }
    }
}

/// Response compression.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,

    /// Bytes buffered before deciding whether to compress.
    pub buffer_size: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: crate::http::compress::MIN_COMPRESS_SIZE,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` overrides it.
    pub level: String,

    pub format: LogFormat,

    /// Emit one `access` event per request.
    pub access_log: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            access_log: true,
        }
    }
}
