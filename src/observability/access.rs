//! Access log middleware.
//!
//! Emits one event per request on the `access` target once the handler
//! chain has finished, with the status and the number of body bytes the
//! handler wrote.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::http::header::{REFERER, USER_AGENT};
use axum::http::{HeaderMap, HeaderName, StatusCode};

use crate::http::handler::{BoxHandler, Handler};
use crate::http::request::{Request, RequestExt};
use crate::http::sink::{RecordingSink, ResponseSink};
use crate::routing::middleware::{middleware, Middleware};

struct AccessLog {
    inner: BoxHandler,
}

#[async_trait]
impl Handler for AccessLog {
    async fn serve(&self, req: Request, w: &mut dyn ResponseSink) {
        let started = Instant::now();
        let method = req.method().clone();
        let uri = req.uri().clone();
        let remote = req
            .context()
            .and_then(|ctx| ctx.remote_addr())
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "-".to_string());
        let request_id = req.request_id().unwrap_or("-").to_string();
        let referer = header_or_dash(req.headers(), REFERER);
        let user_agent = header_or_dash(req.headers(), USER_AGENT);

        let mut recorder = RecordingSink::new(w);
        self.inner.serve(req, &mut recorder).await;
        let status = recorder.status().unwrap_or(StatusCode::OK);

        tracing::info!(
            target: "access",
            remote = %remote,
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = status.as_u16(),
            bytes = recorder.bytes_written(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            referer = %referer,
            user_agent = %user_agent,
            "request"
        );
    }
}

fn header_or_dash(headers: &HeaderMap, name: HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string()
}

/// Middleware logging every request it wraps.
pub fn access_log() -> Middleware {
    middleware(|inner| Arc::new(AccessLog { inner }) as BoxHandler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handler::testing::{run, serve, text};
    use crate::routing::middleware::apply;
    use axum::http::Method;

    #[tokio::test]
    async fn passes_the_response_through() {
        let handler = apply(&[access_log()], text("logged"));
        let sink = run(handler, &Method::GET, "/page").await;
        assert_eq!(sink.status(), Some(StatusCode::OK));
        assert_eq!(sink.body_str(), "logged");
    }

    #[tokio::test]
    async fn runs_on_a_spawned_task() {
        let handler = apply(&[access_log()], text("spawned"));
        let sink = tokio::spawn(async move {
            let req = axum::http::Request::builder()
                .uri("/spawned")
                .header(REFERER, "http://example.test/")
                .header(USER_AGENT, "agent/1.0")
                .body(axum::body::Body::empty())
                .unwrap();
            serve(handler, req).await
        })
        .await
        .unwrap();
        assert_eq!(sink.body_str(), "spawned");
    }

    #[test]
    fn missing_headers_log_as_dash() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, "agent/1.0".parse().unwrap());
        assert_eq!(header_or_dash(&headers, USER_AGENT), "agent/1.0");
        assert_eq!(header_or_dash(&headers, REFERER), "-");
    }
}
