//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, tracing, timeout)
//!     → dispatch.rs (route lookup, RequestContext, handler task)
//!     → handler chain (middleware around a Handler)
//!     → render.rs (Reply → status, headers, body)
//!     → sink.rs (BodyWriter streams the response back)
//! ```
//!
//! Decorating sinks sit between a handler and the connection:
//! compression in compress.rs and byte counting for the access log.

pub mod compress;
pub mod conditional;
pub mod content;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod files;
pub mod handler;
pub mod render;
pub mod reply;
pub mod request;
pub mod server;
pub mod sink;
pub mod stream;

pub use context::{RequestContext, X_REQUEST_ID};
pub use dispatch::Dispatcher;
pub use error::HttpError;
pub use handler::{reply_fn, BoxHandler, Handler};
pub use reply::{Reply, SeekableSource, Validated};
pub use request::{read_json, Request, RequestExt, RequestHead};
pub use server::{Server, ServerError};
pub use sink::ResponseSink;
pub use stream::{ObjectStream, StreamBody, StreamError};
