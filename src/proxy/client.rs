//! Upstream HTTP client.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Response, Uri, Version};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::http::error::HttpError;
use crate::http::request::Request;
use crate::proxy::headers::prepare_upstream_headers;

/// Time allowed for an upstream to answer with a response head.
pub const DEFAULT_PROXY_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared, pooled client used to forward requests.
#[derive(Clone)]
pub struct ProxyClient {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl ProxyClient {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `request` to `target` on behalf of the client at `remote`.
    ///
    /// The body is streamed through untouched. Only the response head is
    /// bounded by the timeout.
    pub async fn forward(
        &self,
        request: Request,
        target: &Url,
        remote: Option<SocketAddr>,
    ) -> Result<Response<Incoming>, HttpError> {
        if target.scheme() != "http" {
            return Err(HttpError::bad_gateway()
                .with_message(format!("Unsupported upstream scheme '{}'", target.scheme())));
        }
        let uri: Uri = target.as_str().parse().map_err(|e| {
            HttpError::bad_request()
                .with_message("Invalid proxy URL")
                .with_source(e)
        })?;

        let (mut parts, body) = request.into_parts();
        prepare_upstream_headers(&mut parts.headers, remote);

        let mut upstream = axum::http::Request::new(body);
        *upstream.method_mut() = parts.method;
        *upstream.uri_mut() = uri;
        *upstream.version_mut() = Version::HTTP_11;
        *upstream.headers_mut() = parts.headers;

        tracing::debug!(
            method = %upstream.method(),
            target = %target,
            "Forwarding request"
        );

        match tokio::time::timeout(self.timeout, self.client.request(upstream)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(HttpError::bad_gateway()
                .with_message("Downstream server error")
                .with_source(e)),
            Err(_) => Err(HttpError::gateway_timeout().with_message("Downstream server timed out")),
        }
    }
}

impl Default for ProxyClient {
    fn default() -> Self {
        Self::new(DEFAULT_PROXY_TIMEOUT)
    }
}

impl fmt::Debug for ProxyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyClient")
            .field("timeout", &self.timeout)
            .finish()
    }
}
