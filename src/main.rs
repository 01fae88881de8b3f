//! treeserve
//!
//! Serves a document root and/or forwards to a default upstream, with a
//! health endpoint routed through the same tree as application handlers.
//!
//! ```text
//!     Client ──▶ net::Listener ──▶ tower-http layers ──▶ Dispatcher
//!                                                          │
//!                               ┌──────────────────────────┤
//!                               ▼                          ▼
//!                        CompiledRouter              fallback
//!                     (middleware ∘ handler)    (StaticFiles / DefaultProxy)
//!                               │                          │
//!                               └──────────▶ render ◀──────┘
//!                                              │
//!                                  ResponseSink (compress, access log)
//! ```

use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::json;

use treeserve::config::{load_config, validate_config, ConfigError, ServerConfig};
use treeserve::lifecycle::{wait_for_signal, Shutdown};
use treeserve::net::Listener;
use treeserve::observability::init_logging;
use treeserve::{reply_fn, Reply, Server};

const DEFAULT_CONFIG_FILE: &str = "treeserve.toml";

#[derive(Parser)]
#[command(name = "treeserve")]
#[command(about = "Tree-routed HTTP application server", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, overriding the configuration
    #[arg(short, long)]
    bind: Option<String>,

    /// Document root, overriding the configuration
    #[arg(short, long)]
    root: Option<String>,

    /// Default upstream URL, overriding the configuration
    #[arg(short, long)]
    proxy: Option<String>,
}

fn configure(cli: &Cli) -> Result<ServerConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            load_config(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => ServerConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }
    if let Some(root) = &cli.root {
        config.document_root = Some(root.clone());
    }
    if let Some(proxy) = &cli.proxy {
        config.default_proxy = Some(proxy.clone());
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = configure(&cli)?;
    init_logging(&config.logging);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        document_root = ?config.document_root,
        default_proxy = ?config.default_proxy,
        "Configuration loaded"
    );

    let listener = Listener::bind(&config.listener).await?;
    let tracker = listener.tracker();

    let mut server = Server::new(config)?;
    server.get(
        "/_health",
        reply_fn(|_req| async {
            Ok(Reply::json(&json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
            })))
        }),
    )?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    shutdown.trigger_on(wait_for_signal());

    server.run(listener, receiver).await?;

    tracing::info!(open_connections = tracker.active_count(), "Shutdown complete");
    Ok(())
}
