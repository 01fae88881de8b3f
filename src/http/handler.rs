//! Handler contract.
//!
//! A [`Handler`] writes a response into a [`ResponseSink`]. Middleware wraps
//! handlers, decorators wrap sinks. Most application code does not implement
//! the trait directly and uses [`reply_fn`], which turns an async function
//! returning a typed [`Reply`] into a handler.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::http::error::HttpError;
use crate::http::render::render;
use crate::http::reply::Reply;
use crate::http::request::{Request, RequestHead};
use crate::http::sink::ResponseSink;

/// Something that can answer a request.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn serve(&self, req: Request, w: &mut dyn ResponseSink);
}

/// Shared, type-erased handler as stored in the route tree.
pub type BoxHandler = Arc<dyn Handler>;

/// Handler built from an async function returning a [`Reply`].
pub struct ReplyFn<F> {
    f: F,
}

/// Wrap `f` as a [`BoxHandler`]; its result is rendered by the response
/// materializer. An `Err` renders exactly like [`Reply::Error`].
pub fn reply_fn<F, Fut>(f: F) -> BoxHandler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply, HttpError>> + Send + 'static,
{
    Arc::new(ReplyFn { f })
}

#[async_trait]
impl<F, Fut> Handler for ReplyFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply, HttpError>> + Send + 'static,
{
    async fn serve(&self, req: Request, w: &mut dyn ResponseSink) {
        let head = RequestHead::new(&req);
        let reply = (self.f)(req).await.unwrap_or_else(Reply::Error);
        render(&head, reply, w).await;
    }
}

/// Renders a fixed error; used for unmatched requests.
pub(crate) struct ErrorHandler(pub(crate) fn() -> HttpError);

#[async_trait]
impl Handler for ErrorHandler {
    async fn serve(&self, req: Request, w: &mut dyn ResponseSink) {
        let head = RequestHead::new(&req);
        render(&head, Reply::Error((self.0)()), w).await;
    }
}
