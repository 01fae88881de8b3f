//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, request spans)
//!     → access.rs (one `access` event per request)
//!
//! Consumers:
//!     → stdout, pretty or JSON
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through the request span into every event

pub mod access;
pub mod logging;

pub use access::access_log;
pub use logging::init_logging;
