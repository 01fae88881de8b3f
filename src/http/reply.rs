//! Typed handler results.

use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use axum::http::StatusCode;
use bytes::Bytes;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncSeek};
use url::Url;

use crate::http::conditional::Validators;
use crate::http::error::HttpError;
use crate::http::request::Request;
use crate::http::stream::{ObjectStream, StreamBody};

/// Seekable byte source served with range support.
pub trait SeekableSource: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> SeekableSource for T {}

/// Cache validators exposed by a JSON resource.
///
/// Both methods default to `None`; a resource only implements what it knows.
pub trait Validated {
    fn etag(&self) -> Option<String> {
        None
    }

    fn last_modified(&self) -> Option<SystemTime> {
        None
    }
}

/// Everything a handler can answer with.
pub enum Reply {
    /// Forward the request to `target`.
    Proxy { request: Request, target: Url },
    /// `302 Found` to the given location.
    Redirect(String),
    /// A file or directory below some root, already resolved.
    File(PathBuf),
    Bytes {
        data: Bytes,
        content_type: Option<String>,
    },
    Reader {
        source: Box<dyn SeekableSource>,
        content_type: Option<String>,
    },
    Error(HttpError),
    Stream(StreamBody),
    /// Serialized JSON plus the validators of the resource it came from.
    Json { body: Bytes, validators: Validators },
    /// `204 No Content`.
    Empty,
}

impl Reply {
    /// Serialize `value` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        Self::json_with(value, Validators::default())
    }

    /// Serialize `value`, answering conditional requests from its validators.
    pub fn resource<T: Serialize + Validated>(value: &T) -> Self {
        let validators = Validators::new(value.etag(), value.last_modified());
        Self::json_with(value, validators)
    }

    fn json_with<T: Serialize + ?Sized>(value: &T, validators: Validators) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Reply::Json {
                body: Bytes::from(body),
                validators,
            },
            Err(e) => Reply::Error(
                HttpError::internal()
                    .with_message("Error serializing data to JSON")
                    .with_source(e),
            ),
        }
    }

    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Reply::Bytes {
            data: data.into(),
            content_type: None,
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Reply::File(path.into())
    }

    pub fn reader(source: impl SeekableSource + 'static) -> Self {
        Reply::Reader {
            source: Box::new(source),
            content_type: None,
        }
    }

    pub fn stream(stream: ObjectStream) -> Self {
        Reply::Stream(stream.into_body())
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Reply::Redirect(location.into())
    }

    pub fn proxy(request: Request, target: Url) -> Self {
        Reply::Proxy { request, target }
    }

    /// A bare status answered with the standard status body.
    pub fn status(status: StatusCode) -> Self {
        Reply::Error(HttpError::new(status))
    }

    /// Override the content type of a `Bytes` or `Reader` reply.
    pub fn with_content_type(self, value: impl Into<String>) -> Self {
        match self {
            Reply::Bytes { data, .. } => Reply::Bytes {
                data,
                content_type: Some(value.into()),
            },
            Reply::Reader { source, .. } => Reply::Reader {
                source,
                content_type: Some(value.into()),
            },
            other => other,
        }
    }
}

impl From<HttpError> for Reply {
    fn from(err: HttpError) -> Self {
        Reply::Error(err)
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Proxy { target, .. } => f
                .debug_struct("Proxy")
                .field("target", &target.as_str())
                .finish(),
            Reply::Redirect(location) => f.debug_tuple("Redirect").field(location).finish(),
            Reply::File(path) => f.debug_tuple("File").field(path).finish(),
            Reply::Bytes { data, content_type } => f
                .debug_struct("Bytes")
                .field("len", &data.len())
                .field("content_type", content_type)
                .finish(),
            Reply::Reader { content_type, .. } => f
                .debug_struct("Reader")
                .field("content_type", content_type)
                .finish(),
            Reply::Error(err) => f.debug_tuple("Error").field(err).finish(),
            Reply::Stream(body) => f.debug_tuple("Stream").field(body).finish(),
            Reply::Json { body, validators } => f
                .debug_struct("Json")
                .field("len", &body.len())
                .field("validators", validators)
                .finish(),
            Reply::Empty => f.write_str("Empty"),
        }
    }
}
