//! Serving seekable content with validators and byte ranges.

use std::io::{self, SeekFrom};
use std::time::SystemTime;

use axum::http::header::{
    ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, LAST_MODIFIED, RANGE,
};
use axum::http::{HeaderValue, Method, StatusCode};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::http::conditional::{evaluate, ConditionalOutcome, Validators};
use crate::http::error::HttpError;
use crate::http::files::guess_content_type;
use crate::http::reply::SeekableSource;
use crate::http::request::RequestHead;
use crate::http::sink::ResponseSink;

const COPY_BUFFER_SIZE: usize = 32 * 1024;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Parsed `Range` header against a representation of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ByteRange {
    /// Serve the full representation.
    Full,
    /// Inclusive byte offsets.
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

impl ByteRange {
    /// Only a single `bytes=` range is honored; anything else serves the whole body.
    pub(crate) fn parse(value: &str, size: u64) -> Self {
        let Some(range) = value.trim().strip_prefix("bytes=") else {
            return ByteRange::Full;
        };
        if range.contains(',') {
            return ByteRange::Full;
        }
        let Some((first, last)) = range.split_once('-') else {
            return ByteRange::Full;
        };
        let (first, last) = (first.trim(), last.trim());

        if first.is_empty() {
            let Ok(suffix) = last.parse::<u64>() else {
                return ByteRange::Full;
            };
            if suffix == 0 || size == 0 {
                return ByteRange::Unsatisfiable;
            }
            return ByteRange::Partial {
                start: size.saturating_sub(suffix),
                end: size - 1,
            };
        }

        let Ok(start) = first.parse::<u64>() else {
            return ByteRange::Full;
        };
        if start >= size {
            return ByteRange::Unsatisfiable;
        }
        let end = if last.is_empty() {
            size - 1
        } else {
            match last.parse::<u64>() {
                Ok(end) if end >= start => end.min(size - 1),
                _ => return ByteRange::Full,
            }
        };
        ByteRange::Partial { start, end }
    }
}

/// Strong ETag over the whole source and its length. Leaves the source rewound.
pub(crate) async fn digest(source: &mut dyn SeekableSource) -> io::Result<(String, u64)> {
    source.seek(SeekFrom::Start(0)).await?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut size = 0u64;
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    source.seek(SeekFrom::Start(0)).await?;
    Ok((format!("\"{:x}\"", hasher.finalize()), size))
}

fn header_value(value: &str) -> Result<HeaderValue, HttpError> {
    HeaderValue::from_str(value).map_err(|e| HttpError::internal().with_source(e))
}

/// Serve `source` as the representation named `name`.
///
/// Sets `ETag`, `Last-Modified` (when known), `Accept-Ranges` and
/// `Content-Type`, answers conditional requests and a single byte range.
/// `Content-Length` is only sent for partial content.
pub(crate) async fn serve_content(
    head: &RequestHead,
    name: &str,
    source: &mut dyn SeekableSource,
    content_type: Option<&str>,
    last_modified: Option<SystemTime>,
    w: &mut dyn ResponseSink,
) -> Result<(), HttpError> {
    let (etag, size) = digest(source).await?;
    let last_modified = last_modified.filter(|t| *t > SystemTime::UNIX_EPOCH);

    w.headers_mut().insert(ETAG, header_value(&etag)?);
    if let Some(modified) = last_modified {
        w.headers_mut()
            .insert(LAST_MODIFIED, header_value(&httpdate::fmt_http_date(modified))?);
    }

    let validators = Validators::new(Some(etag), last_modified);
    let honor_range = match evaluate(&head.method, &head.headers, &validators) {
        ConditionalOutcome::NotModified => {
            w.headers_mut().remove(CONTENT_TYPE);
            w.write_head(StatusCode::NOT_MODIFIED);
            return Ok(());
        }
        ConditionalOutcome::PreconditionFailed => return Err(HttpError::precondition_failed()),
        ConditionalOutcome::Conflict => false,
        ConditionalOutcome::Pass | ConditionalOutcome::NotApplicable => head.is_get_or_head(),
    };

    if !w.headers().contains_key(CONTENT_TYPE) {
        let guessed = content_type
            .and_then(|t| HeaderValue::from_str(t).ok())
            .unwrap_or_else(|| {
                HeaderValue::from_static(guess_content_type(name).unwrap_or(DEFAULT_CONTENT_TYPE))
            });
        w.headers_mut().insert(CONTENT_TYPE, guessed);
    }
    w.headers_mut()
        .insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let range = head
        .headers
        .get(RANGE)
        .filter(|_| honor_range)
        .and_then(|v| v.to_str().ok())
        .map(|v| ByteRange::parse(v, size))
        .unwrap_or(ByteRange::Full);
    let send_body = head.method != Method::HEAD;

    match range {
        ByteRange::Unsatisfiable => {
            w.headers_mut()
                .insert(CONTENT_RANGE, header_value(&format!("bytes */{}", size))?);
            Err(HttpError::range_not_satisfiable())
        }
        ByteRange::Partial { start, end } => {
            let length = end - start + 1;
            let headers = w.headers_mut();
            let content_range = format!("bytes {}-{}/{}", start, end, size);
            headers.insert(CONTENT_RANGE, header_value(&content_range)?);
            headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
            w.write_head(StatusCode::PARTIAL_CONTENT);
            if send_body {
                source.seek(SeekFrom::Start(start)).await?;
                copy_body(source, w, length).await?;
            }
            Ok(())
        }
        ByteRange::Full => {
            w.write_head(StatusCode::OK);
            if send_body {
                copy_body(source, w, size).await?;
            }
            Ok(())
        }
    }
}

async fn copy_body(
    source: &mut dyn SeekableSource,
    w: &mut dyn ResponseSink,
    mut remaining: u64,
) -> io::Result<()> {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = source.read(&mut buf[..want]).await?;
        if n == 0 {
            break;
        }
        w.write(&buf[..n]).await?;
        remaining -= n as u64;
    }
    Ok(())
}
