//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (at startup):
//!     prefix()/handle()/use_middleware()
//!     → router.rs (mutable segment trie)
//!     → validate() (reject ambiguous signatures)
//!     → compile(inherited) (fold middleware around every handler)
//!     → CompiledRouter (immutable, shared via Arc)
//!
//! Per request:
//!     request path
//!     → path.rs (clean + percent-decode segments)
//!     → compiled.rs lookup (static > param > rest-of-path)
//!     → (handler, Params) or no match
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Ancestor middleware is always outermost
//! - No regex: one hash lookup per static segment
//! - "No match" is a value, never an error

pub mod compiled;
pub mod middleware;
pub mod path;
pub mod route;
pub mod router;

pub use compiled::CompiledRouter;
pub use middleware::Middleware;
pub use path::split_path;
pub use route::{Params, Route, REST_PARAM};
pub use router::{RouteError, Router};
