//! Tree-routed HTTP application server.
//!
//! Handlers are registered on a path tree, wrapped by middleware in tree
//! order and return typed [`Reply`] values that are rendered with
//! conditional request support, byte ranges, opportunistic compression,
//! incremental JSON streaming and reverse proxying.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod routing;

pub use config::ServerConfig;
pub use http::{reply_fn, Handler, HttpError, ObjectStream, Reply, Request, RequestExt, Server};
pub use lifecycle::Shutdown;
pub use routing::{Middleware, Router};
