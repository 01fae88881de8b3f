//! Request types and helpers.
//!
//! # Responsibilities
//! - The [`Request`] type every handler receives
//! - [`RequestHead`]: the request metadata the response materializer needs
//!   once the handler has taken ownership of the body
//! - Typed access to route parameters and the request id
//! - Body/query decoding with uniform `400` errors
//! - Reconstruction of the client-facing URL behind proxies

use axum::body::Body;
use axum::http::header::HOST;
use axum::http::{HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;
use url::Url;

use crate::http::context::RequestContext;
use crate::http::error::HttpError;
use crate::proxy::headers::{parse_forwarded, X_FORWARDED_HOST, X_FORWARDED_PROTO};
use crate::proxy::ProxyClient;

/// Request type passed to handlers.
pub type Request = axum::http::Request<Body>;

/// Largest body accepted by [`read_json`].
pub const MAX_JSON_BODY: usize = 16 * 1024 * 1024;

/// Request metadata captured before a handler consumes the request.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub context: RequestContext,
    pub(crate) proxy: Option<ProxyClient>,
}

impl RequestHead {
    pub fn new(req: &Request) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            headers: req.headers().clone(),
            context: req.extensions().get::<RequestContext>().cloned().unwrap_or_default(),
            proxy: req.extensions().get::<ProxyClient>().cloned(),
        }
    }

    pub fn is_get_or_head(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }
}

/// Accessors for values the dispatcher attached to a request.
pub trait RequestExt {
    fn context(&self) -> Option<&RequestContext>;

    /// Captured route parameter `name`.
    fn param(&self, name: &str) -> Option<&str> {
        self.context().and_then(|ctx| ctx.param(name))
    }

    fn request_id(&self) -> Option<&str> {
        self.context().map(RequestContext::request_id)
    }
}

impl RequestExt for Request {
    fn context(&self) -> Option<&RequestContext> {
        self.extensions().get::<RequestContext>()
    }
}

/// Decode the request body as JSON.
pub async fn read_json<T: DeserializeOwned>(req: Request) -> Result<T, HttpError> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_JSON_BODY)
        .await
        .map_err(|e| {
            HttpError::bad_request()
                .with_message("Unable to read request body")
                .with_source(e)
        })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        HttpError::bad_request()
            .with_message("Malformed JSON input")
            .with_source(e)
    })
}

/// Decode the query string into `T`.
pub fn query<T: DeserializeOwned>(uri: &Uri) -> Result<T, HttpError> {
    serde_urlencoded::from_str(uri.query().unwrap_or("")).map_err(|e| {
        HttpError::bad_request()
            .with_message(format!("Invalid query string: {}", e))
            .with_source(e)
    })
}

/// The URL the client used, honoring `Forwarded` and `X-Forwarded-*`.
pub fn external_url(headers: &HeaderMap, uri: &Uri) -> Option<Url> {
    let forwarded = headers
        .get(axum::http::header::FORWARDED)
        .and_then(|v| v.to_str().ok())
        .map(parse_forwarded)
        .unwrap_or_default();
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
    };

    let proto = forwarded
        .proto
        .or_else(|| header(X_FORWARDED_PROTO))
        .unwrap_or_else(|| "http".to_string());
    let host = forwarded
        .host
        .or_else(|| header(X_FORWARDED_HOST))
        .or_else(|| header(HOST.as_str()))
        .or_else(|| uri.authority().map(ToString::to_string))?;
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

    Url::parse(&format!("{}://{}{}", proto, host, path)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::Params;
    use axum::http::StatusCode;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        name: String,
        count: u32,
    }

    fn request(uri: &str, body: &'static str) -> Request {
        axum::http::Request::builder()
            .uri(uri)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn read_json_decodes_body() {
        let item: Item = read_json(request("/", r#"{"name":"a","count":3}"#)).await.unwrap();
        assert_eq!(item, Item { name: "a".into(), count: 3 });
    }

    #[tokio::test]
    async fn read_json_rejects_malformed_input() {
        let err = read_json::<Item>(request("/", "{nope")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), Some("Malformed JSON input"));
    }

    #[test]
    fn query_decodes_fields() {
        let item: Item = query(&"/x?name=b&count=7".parse().unwrap()).unwrap();
        assert_eq!(item, Item { name: "b".into(), count: 7 });

        let err = query::<Item>(&"/x?name=b&count=many".parse().unwrap()).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn param_reads_context() {
        let mut req = request("/users/7", "");
        assert_eq!(req.param("id"), None);

        let params: Params = [("id", "7")].into_iter().collect();
        req.extensions_mut().insert(RequestContext::new("req-1", params, None));
        assert_eq!(req.param("id"), Some("7"));
        assert_eq!(req.request_id(), Some("req-1"));
    }

    #[test]
    fn external_url_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, "internal:8080".parse().unwrap());
        let uri: Uri = "/app?x=1".parse().unwrap();
        assert_eq!(
            external_url(&headers, &uri).unwrap().as_str(),
            "http://internal:8080/app?x=1"
        );

        headers.insert(X_FORWARDED_HOST, "edge.example".parse().unwrap());
        headers.insert(X_FORWARDED_PROTO, "https".parse().unwrap());
        assert_eq!(
            external_url(&headers, &uri).unwrap().as_str(),
            "https://edge.example/app?x=1"
        );

        headers.insert(
            axum::http::header::FORWARDED,
            "for=\"10.0.0.1\";host=public.example;proto=https, for=10.0.0.2".parse().unwrap(),
        );
        assert_eq!(
            external_url(&headers, &uri).unwrap().as_str(),
            "https://public.example/app?x=1"
        );
    }
}
