//! Reverse proxying.
//!
//! # Responsibilities
//! - Forward a request to another origin over a pooled client
//! - Rewrite forwarding headers on the way out
//! - Stream the upstream response back through the response sink
//!
//! # Design Decisions
//! - Only plain `http` upstreams are supported
//! - Upstream failures map to 502, timeouts to 504

pub mod client;
pub mod headers;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, Response};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use url::Url;

use crate::http::error::HttpError;
use crate::http::handler::{BoxHandler, Handler};
use crate::http::render::render;
use crate::http::reply::Reply;
use crate::http::request::{Request, RequestHead};
use crate::http::sink::ResponseSink;

pub use client::{ProxyClient, DEFAULT_PROXY_TIMEOUT};
pub use headers::{parse_forwarded, strip_hop_by_hop, ForwardedElement};

/// Copy an upstream response into `w`, minus hop-by-hop headers.
pub async fn copy_response(
    response: Response<Incoming>,
    w: &mut dyn ResponseSink,
) -> Result<(), HttpError> {
    let (parts, mut body) = response.into_parts();

    let mut headers: HeaderMap = parts.headers;
    strip_hop_by_hop(&mut headers);
    let out = w.headers_mut();
    for (name, value) in headers.iter() {
        out.append(name.clone(), value.clone());
    }
    w.write_head(parts.status);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| {
            HttpError::bad_gateway()
                .with_message("Downstream server error")
                .with_source(e)
        })?;
        if let Ok(data) = frame.into_data() {
            w.write(&data).await?;
        }
    }
    Ok(())
}

/// Fallback handler forwarding every request below a base URL.
#[derive(Debug, Clone)]
pub struct DefaultProxy {
    base: Url,
}

impl DefaultProxy {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    pub fn handler(base: Url) -> BoxHandler {
        Arc::new(Self::new(base))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve the request target against the base URL.
    pub fn target(&self, req: &Request) -> Result<Url, HttpError> {
        let path = req.uri().path_and_query().map(|p| p.as_str()).unwrap_or("/");
        self.base.join(path).map_err(|e| {
            HttpError::bad_request()
                .with_message("Invalid proxy URL")
                .with_source(e)
        })
    }
}

#[async_trait]
impl Handler for DefaultProxy {
    async fn serve(&self, req: Request, w: &mut dyn ResponseSink) {
        let head = RequestHead::new(&req);
        let reply = match self.target(&req) {
            Ok(target) => Reply::Proxy { request: req, target },
            Err(err) => Reply::Error(err),
        };
        render(&head, reply, w).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn target_replaces_base_path() {
        let proxy = DefaultProxy::new(Url::parse("http://backend:9000/ignored/").unwrap());
        let req = axum::http::Request::builder()
            .uri("/api/items?page=2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            proxy.target(&req).unwrap().as_str(),
            "http://backend:9000/api/items?page=2"
        );
    }
}
