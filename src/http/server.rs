//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Own the root route tree and the server-wide middleware list
//! - Install access logging and compression according to configuration
//! - Choose the fallback: document root, default proxy or 404
//! - Validate and compile the routes, then serve them over a bounded listener
//!
//! # Design Decisions
//! - Server middleware wraps routed handlers and the fallback alike
//! - Routes are validated before the first connection is accepted
//! - Graceful shutdown stops accepting and lets in-flight requests finish

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use axum::serve::Listener as _;
use thiserror::Error;
use tokio::sync::broadcast;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::config::ServerConfig;
use crate::http::compress::compression;
use crate::http::dispatch::Dispatcher;
use crate::http::error::HttpError;
use crate::http::files::StaticFiles;
use crate::http::handler::{BoxHandler, ErrorHandler};
use crate::net::{ClientAddr, Listener};
use crate::observability::access::access_log;
use crate::proxy::{DefaultProxy, ProxyClient};
use crate::routing::middleware::apply;
use crate::routing::{Middleware, Route, RouteError, Router};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("route configuration error: {0}")]
    Route(#[from] RouteError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid default proxy URL: {0}")]
    InvalidProxy(#[from] url::ParseError),
}

fn not_found() -> BoxHandler {
    Arc::new(ErrorHandler(HttpError::not_found))
}

/// An HTTP server under construction.
pub struct Server {
    config: ServerConfig,
    router: Router,
    middlewares: Vec<Middleware>,
    fallback: BoxHandler,
    proxy: ProxyClient,
}

impl Server {
    /// Create a server with the built-in middleware and fallback for `config`.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let proxy = ProxyClient::new(Duration::from_secs(config.timeouts.proxy_secs));
        let mut server = Self {
            config,
            router: Router::new(),
            middlewares: Vec::new(),
            fallback: not_found(),
            proxy,
        };

        if server.config.logging.access_log {
            server.use_middleware(access_log());
        }
        if server.config.compression.enabled {
            server.use_middleware(compression(server.config.compression.buffer_size));
        }
        if let Some(root) = server.config.document_root.clone() {
            server.set_fallback(Arc::new(StaticFiles::new(root)));
        }
        if let Some(base) = server.config.default_proxy.clone() {
            server.set_default_proxy(&base)?;
        }
        Ok(server)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Add middleware around every route and the fallback.
    pub fn use_middleware(&mut self, middleware: Middleware) {
        self.router.use_middleware(middleware.clone());
        self.middlewares.push(middleware);
    }

    /// The route node for `path`, created on demand.
    pub fn prefix(&mut self, path: &str) -> &mut Router {
        self.router.prefix(path)
    }

    pub fn handle(
        &mut self,
        method: Method,
        path: &str,
        handler: BoxHandler,
    ) -> Result<(), RouteError> {
        self.router.handle(method, path, handler)
    }

    pub fn get(&mut self, path: &str, handler: BoxHandler) -> Result<(), RouteError> {
        self.router.get(path, handler)
    }

    pub fn post(&mut self, path: &str, handler: BoxHandler) -> Result<(), RouteError> {
        self.router.post(path, handler)
    }

    pub fn put(&mut self, path: &str, handler: BoxHandler) -> Result<(), RouteError> {
        self.router.put(path, handler)
    }

    pub fn patch(&mut self, path: &str, handler: BoxHandler) -> Result<(), RouteError> {
        self.router.patch(path, handler)
    }

    pub fn delete(&mut self, path: &str, handler: BoxHandler) -> Result<(), RouteError> {
        self.router.delete(path, handler)
    }

    pub fn options(&mut self, path: &str, handler: BoxHandler) -> Result<(), RouteError> {
        self.router.options(path, handler)
    }

    pub fn routes(&self) -> Vec<Route> {
        self.router.routes()
    }

    /// Handler for GET/HEAD requests no route matches.
    pub fn set_fallback(&mut self, handler: BoxHandler) {
        self.fallback = handler;
    }

    /// Forward unmatched GET/HEAD requests below `base`.
    pub fn set_default_proxy(&mut self, base: &str) -> Result<(), ServerError> {
        let base = Url::parse(base)?;
        self.set_fallback(DefaultProxy::handler(base));
        Ok(())
    }

    /// Validate and compile the routes into a request dispatcher.
    pub fn into_dispatcher(self) -> Result<Dispatcher, ServerError> {
        self.router.validate()?;
        let compiled = self.router.compile(&[]);
        let fallback = apply(&self.middlewares, self.fallback);
        let not_found = apply(&self.middlewares, not_found());
        Ok(Dispatcher::new(compiled, fallback, not_found, self.proxy))
    }

    /// Serve on `listener` until `shutdown` fires.
    ///
    /// After the listener stops, waits up to the request timeout for the
    /// remaining connections to close.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let request_timeout = Duration::from_secs(self.config.timeouts.request_secs);
        let route_count = self.router.routes().len();
        let dispatcher = self.into_dispatcher()?;
        let addr = listener.local_addr()?;
        let tracker = listener.tracker();

        tracing::info!(address = %addr, routes = route_count, "HTTP server starting");

        let app = app(dispatcher, request_timeout)
            .into_make_service_with_connect_info::<ClientAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                // A closed channel also means the coordinator is gone.
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        if tokio::time::timeout(request_timeout, tracker.wait_idle()).await.is_err() {
            tracing::warn!(
                open_connections = tracker.active_count(),
                "Connections still open after drain timeout"
            );
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Wrap `dispatcher` in the request id, tracing and timeout layers.
#[allow(deprecated)]
pub fn app(dispatcher: Dispatcher, request_timeout: Duration) -> axum::Router {
    axum::Router::new()
        .fallback_service(dispatcher)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::http::handler::reply_fn;
    use crate::http::handler::testing::{text, Trace};
    use crate::http::reply::Reply;
    use axum::body::Body;
    use axum::http::header::CONTENT_ENCODING;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::sync::Mutex;
    use tower::ServiceExt;

    fn quiet_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.logging.access_log = false;
        config
    }

    async fn get(
        app: axum::Router,
        uri: &str,
        headers: &[(&str, &str)],
    ) -> axum::http::Response<Body> {
        let mut builder = axum::http::Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn server_middleware_wraps_routes_and_fallback() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut server = Server::new(quiet_config()).unwrap();
        server.use_middleware(Trace::middleware("server", log.clone()));
        server.get("/hello", text("hi")).unwrap();
        server.set_fallback(text("fallback"));
        let app = app(server.into_dispatcher().unwrap(), Duration::from_secs(5));

        let response = get(app.clone(), "/hello", &[]).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hi");
        let response = get(app, "/missing", &[]).await;
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"fallback");

        assert_eq!(
            *log.lock().unwrap(),
            vec!["server-before", "server-after", "server-before", "server-after"]
        );
    }

    #[tokio::test]
    async fn ambiguous_routes_fail_to_compile() {
        let mut server = Server::new(quiet_config()).unwrap();
        server.get("/foo/:a", text("a")).unwrap();
        server.get("/foo/:b", text("b")).unwrap();
        assert!(matches!(server.into_dispatcher(), Err(ServerError::Route(_))));
    }

    #[tokio::test]
    async fn request_id_is_generated_and_propagated() {
        let mut server = Server::new(quiet_config()).unwrap();
        server.get("/id", text("ok")).unwrap();
        let app = app(server.into_dispatcher().unwrap(), Duration::from_secs(5));

        let response = get(app.clone(), "/id", &[("x-request-id", "abc-123")]).await;
        assert_eq!(response.headers()["x-request-id"], "abc-123");

        let response = get(app, "/id", &[]).await;
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn large_json_is_compressed_by_default() {
        let mut server = Server::new(quiet_config()).unwrap();
        server
            .get(
                "/big",
                reply_fn(|_req| async { Ok(Reply::json(&json!({ "data": "x".repeat(4096) }))) }),
            )
            .unwrap();
        let app = app(server.into_dispatcher().unwrap(), Duration::from_secs(5));

        let response = get(app, "/big", &[("accept-encoding", "gzip")]).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_ENCODING], "gzip");
    }

    #[test]
    fn bad_default_proxy_is_rejected() {
        let mut config = quiet_config();
        config.default_proxy = Some("not a url".into());
        assert!(matches!(Server::new(config), Err(ServerError::InvalidProxy(_))));
    }
}
