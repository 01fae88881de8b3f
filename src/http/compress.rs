//! Opportunistic response compression.
//!
//! # Responsibilities
//! - Negotiate gzip/deflate from `Accept-Encoding`
//! - Buffer the first bytes of a response until the compress decision can
//!   be made from the final headers
//! - Stream compressed output through the wrapped sink, including on flush
//!
//! # Design Decisions
//! - Ranged and upgraded requests are never compressed
//! - Only textual content types are eligible
//! - A handler that sets `Content-Length` or `Content-Encoding` opts out
//! - Connection takeover passes straight through to the wrapped sink

use std::io::{self, Write};
use std::mem;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::header::{
    ACCEPT_ENCODING, CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, RANGE, VARY,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;
use hyper::upgrade::OnUpgrade;

use crate::http::handler::{BoxHandler, Handler};
use crate::http::request::Request;
use crate::http::sink::ResponseSink;
use crate::routing::middleware::{middleware, Middleware};

/// Bytes buffered before the compress decision is forced.
pub const MIN_COMPRESS_SIZE: usize = 2048;

const COMPRESSIBLE_TYPES: [&str; 4] = [
    "application/javascript",
    "application/json",
    "application/manifest+json",
    "image/svg+xml",
];

/// A supported content coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Gzip,
    Deflate,
}

impl Encoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Gzip => "gzip",
            Encoding::Deflate => "deflate",
        }
    }
}

/// Pick the coding for a response to a request with `headers`.
pub fn negotiate(headers: &HeaderMap) -> Option<Encoding> {
    if headers.contains_key(RANGE) {
        return None;
    }
    let upgrading = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    if upgrading {
        return None;
    }

    let mut gzip = false;
    let mut deflate = false;
    for value in headers.get_all(ACCEPT_ENCODING).iter().filter_map(|v| v.to_str().ok()) {
        for item in value.split(',') {
            let mut parts = item.split(';');
            let coding = parts.next().unwrap_or("").trim().to_ascii_lowercase();
            let quality = parts
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            if quality <= 0.0 {
                continue;
            }
            match coding.as_str() {
                "gzip" | "x-gzip" => gzip = true,
                "deflate" => deflate = true,
                _ => {}
            }
        }
    }

    if gzip {
        Some(Encoding::Gzip)
    } else if deflate {
        Some(Encoding::Deflate)
    } else {
        None
    }
}

/// Whether a response with this `Content-Type` is worth compressing.
pub fn is_compressible(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("text/") || COMPRESSIBLE_TYPES.contains(&mime.as_str())
}

enum Encoder {
    Gzip(GzEncoder<Vec<u8>>),
    Deflate(DeflateEncoder<Vec<u8>>),
}

impl Encoder {
    fn new(encoding: Encoding) -> Self {
        let level = Compression::default();
        match encoding {
            Encoding::Gzip => Encoder::Gzip(GzEncoder::new(Vec::new(), level)),
            Encoding::Deflate => Encoder::Deflate(DeflateEncoder::new(Vec::new(), level)),
        }
    }

    /// Compress `data` and return whatever output is ready.
    fn write(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Encoder::Gzip(e) => {
                e.write_all(data)?;
                Ok(mem::take(e.get_mut()))
            }
            Encoder::Deflate(e) => {
                e.write_all(data)?;
                Ok(mem::take(e.get_mut()))
            }
        }
    }

    /// Sync-flush so everything written so far can be decoded.
    fn flush(&mut self) -> io::Result<Vec<u8>> {
        match self {
            Encoder::Gzip(e) => {
                e.flush()?;
                Ok(mem::take(e.get_mut()))
            }
            Encoder::Deflate(e) => {
                e.flush()?;
                Ok(mem::take(e.get_mut()))
            }
        }
    }

    fn finish(self) -> io::Result<Vec<u8>> {
        match self {
            Encoder::Gzip(e) => e.finish(),
            Encoder::Deflate(e) => e.finish(),
        }
    }
}

/// Sink decorator that compresses eligible responses.
pub struct CompressWriter<'a> {
    inner: &'a mut dyn ResponseSink,
    encoding: Option<Encoding>,
    encoder: Option<Encoder>,
    status: Option<StatusCode>,
    pending: Vec<u8>,
    threshold: usize,
    committed: bool,
    finished: bool,
}

impl<'a> CompressWriter<'a> {
    pub fn new(
        inner: &'a mut dyn ResponseSink,
        encoding: Option<Encoding>,
        threshold: usize,
    ) -> Self {
        Self {
            inner,
            encoding,
            encoder: None,
            status: None,
            pending: Vec::new(),
            threshold,
            committed: false,
            finished: false,
        }
    }

    /// Whether the response as currently described would be compressed.
    fn can_compress(&self) -> bool {
        let headers = self.inner.headers();
        let status = self.status.unwrap_or(StatusCode::OK);
        let bodiless = status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED;
        self.encoding.is_some()
            && !bodiless
            && !headers.contains_key(CONTENT_ENCODING)
            && !headers.contains_key(CONTENT_LENGTH)
            && headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(is_compressible)
    }

    /// Decide, adjust headers, and commit the head to the inner sink.
    fn commit(&mut self) {
        if self.committed {
            return;
        }
        self.committed = true;

        if let Some(encoding) = self.encoding.filter(|_| self.can_compress()) {
            let headers = self.inner.headers_mut();
            headers.remove(CONTENT_LENGTH);
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static(encoding.as_str()));
            headers.append(VARY, HeaderValue::from_static("Accept-Encoding"));
            self.encoder = Some(Encoder::new(encoding));
        }
        self.inner.write_head(self.status.unwrap_or(StatusCode::OK));
    }

    async fn forward(&mut self, data: &[u8]) -> io::Result<()> {
        match self.encoder.as_mut() {
            Some(encoder) => {
                let out = encoder.write(data)?;
                if out.is_empty() {
                    return Ok(());
                }
                self.inner.write(&out).await
            }
            None => self.inner.write(data).await,
        }
    }

    async fn drain_pending(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = mem::take(&mut self.pending);
        self.forward(&pending).await
    }
}

#[async_trait]
impl ResponseSink for CompressWriter<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn status(&self) -> Option<StatusCode> {
        self.status.or_else(|| self.inner.status())
    }

    fn write_head(&mut self, status: StatusCode) {
        if self.committed || self.status.is_some() {
            return;
        }
        self.status = Some(status);
        if status != StatusCode::OK || !self.can_compress() {
            self.commit();
        }
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if self.finished {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "response already closed"));
        }
        if !self.committed {
            if self.pending.len() + data.len() <= self.threshold {
                self.pending.extend_from_slice(data);
                return Ok(());
            }
            self.commit();
        }
        self.drain_pending().await?;
        self.forward(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.commit();
        self.drain_pending().await?;
        if let Some(encoder) = self.encoder.as_mut() {
            let out = encoder.flush()?;
            if !out.is_empty() {
                self.inner.write(&out).await?;
            }
        }
        self.inner.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.commit();
        self.drain_pending().await?;
        self.finished = true;
        if let Some(encoder) = self.encoder.take() {
            let out = encoder.finish()?;
            if !out.is_empty() {
                self.inner.write(&out).await?;
            }
        }
        self.inner.close().await
    }

    fn hijack(&mut self) -> Option<OnUpgrade> {
        self.inner.hijack()
    }
}

struct Compress {
    inner: BoxHandler,
    threshold: usize,
}

#[async_trait]
impl Handler for Compress {
    async fn serve(&self, req: Request, w: &mut dyn ResponseSink) {
        let encoding = negotiate(req.headers());
        let mut writer = CompressWriter::new(w, encoding, self.threshold);
        self.inner.serve(req, &mut writer).await;
        if let Err(error) = writer.close().await {
            tracing::debug!(%error, "Failed to finish compressed response");
        }
    }
}

/// Middleware compressing eligible responses, buffering up to `threshold` bytes.
pub fn compression(threshold: usize) -> Middleware {
    middleware(move |inner| Arc::new(Compress { inner, threshold }) as BoxHandler)
}
