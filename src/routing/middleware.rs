//! Handler-wrapping middleware.
//!
//! A middleware takes the handler below it and returns a handler that runs
//! around it. Chains are plain slices: the first element is the outermost
//! wrapper.

use std::sync::Arc;

use crate::http::handler::BoxHandler;

/// A function from handler to handler.
pub type Middleware = Arc<dyn Fn(BoxHandler) -> BoxHandler + Send + Sync>;

/// Box a closure as a [`Middleware`].
pub fn middleware<F>(wrap: F) -> Middleware
where
    F: Fn(BoxHandler) -> BoxHandler + Send + Sync + 'static,
{
    Arc::new(wrap)
}

/// Wrap `handler` in `chain`, first element outermost.
pub fn apply(chain: &[Middleware], handler: BoxHandler) -> BoxHandler {
    chain.iter().rev().fold(handler, |inner, wrap| wrap(inner))
}
