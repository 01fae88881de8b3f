//! Request dispatch.
//!
//! # Responsibilities
//! - Normalize the path and look it up in the compiled route tree
//! - Attach the [`RequestContext`] and the shared upstream client
//! - Run the handler chain in its own task and return the response as soon
//!   as its head is committed
//!
//! # Design Decisions
//! - HEAD requests fall back to the GET route of the same path
//! - Unmatched GET/HEAD requests go to the fallback handler, every other
//!   unmatched request gets a 404
//! - A handler that ends without committing a head yields a 500

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Method, Response};
use axum::response::IntoResponse;
use futures_util::future::BoxFuture;
use hyper::upgrade::OnUpgrade;
use tower::Service;
use tracing::Instrument;
use uuid::Uuid;

use crate::http::context::{RequestContext, X_REQUEST_ID};
use crate::http::error::HttpError;
use crate::http::handler::BoxHandler;
use crate::http::request::Request;
use crate::http::sink::{BodyWriter, ResponseSink};
use crate::net::ClientAddr;
use crate::proxy::ProxyClient;
use crate::routing::{split_path, CompiledRouter, Params};

struct Inner {
    router: CompiledRouter,
    fallback: BoxHandler,
    not_found: BoxHandler,
    proxy: ProxyClient,
}

/// Tower service routing requests through a compiled route tree.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub(crate) fn new(
        router: CompiledRouter,
        fallback: BoxHandler,
        not_found: BoxHandler,
        proxy: ProxyClient,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                router,
                fallback,
                not_found,
                proxy,
            }),
        }
    }

    pub fn router(&self) -> &CompiledRouter {
        &self.inner.router
    }

    /// Pick the handler for `method` and `path`.
    fn resolve(&self, method: &Method, path: &str) -> (BoxHandler, Params) {
        let segments = split_path(path);
        let router = &self.inner.router;
        if let Some(found) = router.lookup(method, &segments) {
            return found;
        }
        if *method == Method::HEAD {
            if let Some(found) = router.lookup(&Method::GET, &segments) {
                return found;
            }
        }
        if *method == Method::GET || *method == Method::HEAD {
            (self.inner.fallback.clone(), Params::new())
        } else {
            (self.inner.not_found.clone(), Params::new())
        }
    }

    /// Serve one request.
    pub async fn dispatch(&self, mut req: Request) -> Response<Body> {
        let (handler, params) = self.resolve(req.method(), req.uri().path());

        let request_id = req
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(ToString::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let remote = req
            .extensions()
            .get::<ConnectInfo<ClientAddr>>()
            .map(|ConnectInfo(client)| client.addr());

        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %req.method(),
            path = %req.uri().path(),
        );

        let extensions = req.extensions_mut();
        extensions.insert(RequestContext::new(request_id, params, remote));
        extensions.insert(self.inner.proxy.clone());
        let upgrade = extensions.remove::<OnUpgrade>();

        let (mut writer, head) = BodyWriter::new(upgrade);
        tokio::spawn(
            async move {
                handler.serve(req, &mut writer).await;
                if let Err(error) = writer.close().await {
                    tracing::debug!(%error, "Failed to close response");
                }
            }
            .instrument(span),
        );

        match head.await {
            Ok(response) => response,
            Err(_) => HttpError::internal()
                .with_message("Handler ended without a response")
                .into_response(),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("router", &self.inner.router)
            .finish()
    }
}

impl Service<Request> for Dispatcher {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { Ok(this.dispatch(req).await) })
    }
}
