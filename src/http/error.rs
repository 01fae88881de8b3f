//! HTTP status errors.
//!
//! # Responsibilities
//! - Carry a status, message, cause chain and optional `Location`
//! - Serialize into the uniform JSON error body
//! - Keep server-side detail out of 5xx bodies and in the log instead
//!
//! # Design Decisions
//! - One struct for every status; named constructors instead of one type per code
//! - Success-class statuses serialize with `"status":"OK"` so handlers can
//!   return bare status replies through the same path

use std::error::Error as StdError;
use std::io;

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::http::sink::ResponseSink;

type BoxError = Box<dyn StdError + Send + Sync>;

/// An error with an HTTP status.
#[derive(Debug, Error)]
#[error("{}{}", status_line(.status), detail(.message))]
pub struct HttpError {
    status: StatusCode,
    message: Option<String>,
    #[source]
    source: Option<BoxError>,
    location: Option<String>,
    data: Map<String, Value>,
}

impl HttpError {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            message: None,
            source: None,
            location: None,
            data: Map::new(),
        }
    }

    /// A redirect to `location` with the given 3xx status.
    pub fn redirect(status: StatusCode, location: impl Into<String>) -> Self {
        let mut err = Self::new(status);
        err.location = Some(location.into());
        err
    }

    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED).with_message("Login Required")
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED)
    }

    pub fn conflict() -> Self {
        Self::new(StatusCode::CONFLICT)
    }

    pub fn precondition_failed() -> Self {
        Self::new(StatusCode::PRECONDITION_FAILED)
    }

    pub fn not_modified() -> Self {
        Self::new(StatusCode::NOT_MODIFIED)
    }

    pub fn range_not_satisfiable() -> Self {
        Self::new(StatusCode::RANGE_NOT_SATISFIABLE)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn bad_gateway() -> Self {
        Self::new(StatusCode::BAD_GATEWAY)
    }

    pub fn service_unavailable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE)
    }

    pub fn gateway_timeout() -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach an extra top-level field to the error body.
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    fn location_header(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(self.location.as_deref()?).ok()
    }

    /// Reason phrase of the status.
    pub fn name(&self) -> &'static str {
        reason(&self.status)
    }

    /// Messages of the cause chain, outermost first.
    pub fn causes(&self) -> Vec<String> {
        let mut causes = Vec::new();
        let mut next = self.source();
        while let Some(err) = next {
            causes.push(err.to_string());
            next = err.source();
        }
        causes
    }

    /// The JSON body sent to the client.
    pub fn body(&self) -> Value {
        let mut body = Map::new();
        let outcome = if self.status.as_u16() >= 400 { "error" } else { "OK" };
        body.insert("status".into(), Value::from(outcome));
        body.insert("code".into(), Value::from(self.status.as_u16()));
        body.insert("name".into(), Value::from(self.name()));

        if self.status.is_server_error() {
            body.insert("error".into(), Value::from(self.name()));
            return Value::Object(body);
        }

        if let Some(message) = &self.message {
            body.insert("error".into(), Value::from(message.as_str()));
        }
        let causes = self.causes();
        if !causes.is_empty() {
            body.insert("stack".into(), Value::from(causes));
        }
        for (key, value) in &self.data {
            body.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(body)
    }

    fn log(&self) {
        if self.status.is_server_error() {
            tracing::error!(
                status = self.status.as_u16(),
                error = %self,
                causes = ?self.causes(),
                "Request failed"
            );
        } else {
            tracing::debug!(status = self.status.as_u16(), error = %self, "Request rejected");
        }
    }

    fn has_body(&self) -> bool {
        !(self.status.is_informational()
            || self.status == StatusCode::NO_CONTENT
            || self.status == StatusCode::NOT_MODIFIED)
    }

    /// Render this error into `w`.
    pub async fn write_to(&self, w: &mut dyn ResponseSink) -> io::Result<()> {
        self.log();
        if let Some(location) = self.location_header() {
            w.headers_mut().insert(LOCATION, location);
        }
        if !self.has_body() {
            w.write_head(self.status);
            return Ok(());
        }

        let body = serde_json::to_vec(&self.body())?;
        w.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        w.write_head(self.status);
        w.write(&body).await
    }
}

fn reason(status: &StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown Status")
}

fn status_line(status: &StatusCode) -> String {
    format!("{} {}", status.as_u16(), reason(status))
}

fn detail(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|message| format!(": {}", message))
        .unwrap_or_default()
}

impl From<io::Error> for HttpError {
    fn from(err: io::Error) -> Self {
        let base = match err.kind() {
            io::ErrorKind::NotFound => HttpError::not_found(),
            io::ErrorKind::PermissionDenied => HttpError::forbidden(),
            _ => HttpError::internal(),
        };
        base.with_source(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response<Body> {
        self.log();
        let mut response = if self.has_body() {
            let body = serde_json::to_vec(&self.body()).unwrap_or_default();
            let mut response = Response::new(Body::from(body));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        } else {
            Response::new(Body::empty())
        };
        *response.status_mut() = self.status;
        if let Some(location) = self.location_header() {
            response.headers_mut().insert(LOCATION, location);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::sink::BufferSink;
    use serde_json::json;

    #[test]
    fn client_error_body_carries_message_and_stack() {
        let cause = io::Error::new(io::ErrorKind::InvalidData, "bad digit");
        let err = HttpError::bad_request()
            .with_message("Invalid count")
            .with_source(cause)
            .with_data("field", json!("count"));

        assert_eq!(
            err.body(),
            json!({
                "status": "error",
                "code": 400,
                "name": "Bad Request",
                "error": "Invalid count",
                "stack": ["bad digit"],
                "field": "count",
            })
        );
    }

    #[test]
    fn server_error_body_hides_detail() {
        let err = HttpError::internal()
            .with_message("database password rejected")
            .with_source(io::Error::new(io::ErrorKind::Other, "secret"))
            .with_data("query", json!("select"));

        assert_eq!(
            err.body(),
            json!({
                "status": "error",
                "code": 500,
                "name": "Internal Server Error",
                "error": "Internal Server Error",
            })
        );
        assert_eq!(err.causes(), vec!["secret"]);
    }

    #[test]
    fn success_status_is_ok() {
        let body = HttpError::new(StatusCode::CREATED).body();
        assert_eq!(body["status"], "OK");
        assert_eq!(body["code"], 201);
    }

    #[test]
    fn unauthorized_asks_for_login() {
        let err = HttpError::unauthorized();
        assert_eq!(err.to_string(), "401 Unauthorized: Login Required");
    }

    #[test]
    fn display_and_source_follow_the_cause() {
        let err = HttpError::new(StatusCode::IM_A_TEAPOT);
        assert_eq!(err.to_string(), "418 I'm a teapot");
        assert!(err.source().is_none());

        let err = HttpError::from(io::Error::new(io::ErrorKind::PermissionDenied, "locked"));
        assert_eq!(err.to_string(), "403 Forbidden");
        assert_eq!(err.source().map(|cause| cause.to_string()).as_deref(), Some("locked"));
    }

    #[test]
    fn io_errors_map_to_statuses() {
        let err: HttpError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err: HttpError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn redirect_sets_location_without_json_for_not_modified() {
        let mut sink = BufferSink::new();
        HttpError::redirect(StatusCode::MOVED_PERMANENTLY, "/new")
            .write_to(&mut sink)
            .await
            .unwrap();
        assert_eq!(sink.status(), Some(StatusCode::MOVED_PERMANENTLY));
        assert_eq!(sink.headers()[LOCATION], "/new");

        let mut sink = BufferSink::new();
        HttpError::not_modified().write_to(&mut sink).await.unwrap();
        assert_eq!(sink.status(), Some(StatusCode::NOT_MODIFIED));
        assert!(sink.body().is_empty());
    }
}
