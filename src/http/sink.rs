//! Byte-level response sinks.
//!
//! # Responsibilities
//! - Define [`ResponseSink`], the surface handlers and decorators write through
//! - [`BodyWriter`]: root sink feeding a streaming hyper response
//! - [`BufferSink`]: in-memory sink for tests and in-process rendering
//! - [`RecordingSink`]: pass-through that counts status and bytes
//!
//! # Design Decisions
//! - The response head is committed once; later header edits are not sent
//! - Writing before `write_head` implies `200 OK`
//! - Body chunks travel over a bounded channel so slow clients apply backpressure

use std::io;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Response, StatusCode};
use bytes::Bytes;
use hyper::upgrade::OnUpgrade;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

/// Number of body chunks buffered between a handler and the connection.
const BODY_CHANNEL_CAPACITY: usize = 8;

/// Destination for one HTTP response.
#[async_trait]
pub trait ResponseSink: Send {
    /// Headers that will be sent with the response head.
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Status committed (or pending) for this response, if any.
    fn status(&self) -> Option<StatusCode>;

    /// Set the response status. Only the first call has an effect.
    fn write_head(&mut self, status: StatusCode);

    /// Write body bytes, committing `200 OK` if no status was set.
    async fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Push buffered bytes towards the client.
    async fn flush(&mut self) -> io::Result<()>;

    /// Finish the response. Calling it more than once is harmless.
    async fn close(&mut self) -> io::Result<()>;

    /// Take over the underlying connection after a `101 Switching Protocols`.
    fn hijack(&mut self) -> Option<OnUpgrade> {
        None
    }
}

/// Root sink that turns writes into a streaming [`Response<Body>`].
///
/// The response is delivered through the receiver returned by
/// [`BodyWriter::new`] as soon as the status is committed; body bytes follow
/// through a bounded channel until the writer is closed or dropped.
pub struct BodyWriter {
    headers: HeaderMap,
    status: Option<StatusCode>,
    head_tx: Option<oneshot::Sender<Response<Body>>>,
    body_tx: Option<mpsc::Sender<io::Result<Bytes>>>,
    body_rx: Option<mpsc::Receiver<io::Result<Bytes>>>,
    upgrade: Option<OnUpgrade>,
}

impl BodyWriter {
    pub fn new(upgrade: Option<OnUpgrade>) -> (Self, oneshot::Receiver<Response<Body>>) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        let writer = Self {
            headers: HeaderMap::new(),
            status: None,
            head_tx: Some(head_tx),
            body_tx: Some(body_tx),
            body_rx: Some(body_rx),
            upgrade,
        };
        (writer, head_rx)
    }

    fn commit(&mut self) {
        if self.status.is_none() {
            self.write_head(StatusCode::OK);
        }
    }
}

#[async_trait]
impl ResponseSink for BodyWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }

    fn write_head(&mut self, status: StatusCode) {
        if self.status.is_some() {
            return;
        }
        self.status = Some(status);

        let body = match self.body_rx.take() {
            Some(rx) => Body::from_stream(ReceiverStream::new(rx)),
            None => Body::empty(),
        };
        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = self.headers.clone();

        if let Some(tx) = self.head_tx.take() {
            // The receiver is gone when the client disconnected first.
            let _ = tx.send(response);
        }
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.commit();
        if data.is_empty() {
            return Ok(());
        }
        let tx = self
            .body_tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "response already closed"))?;
        tx.send(Ok(Bytes::copy_from_slice(data)))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"))
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.commit();
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.commit();
        self.body_tx = None;
        Ok(())
    }

    fn hijack(&mut self) -> Option<OnUpgrade> {
        self.upgrade.take()
    }
}

/// Sink that keeps the whole response in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    headers: HeaderMap,
    status: Option<StatusCode>,
    body: Vec<u8>,
    flushes: usize,
    closed: bool,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8, lossily.
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl ResponseSink for BufferSink {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }

    fn write_head(&mut self, status: StatusCode) {
        self.status.get_or_insert(status);
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "response already closed"));
        }
        self.status.get_or_insert(StatusCode::OK);
        self.body.extend_from_slice(data);
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.status.get_or_insert(StatusCode::OK);
        self.flushes += 1;
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.status.get_or_insert(StatusCode::OK);
        self.closed = true;
        Ok(())
    }
}

/// Pass-through sink that records what went to the client.
pub struct RecordingSink<'a> {
    inner: &'a mut dyn ResponseSink,
    bytes_written: u64,
}

impl<'a> RecordingSink<'a> {
    pub fn new(inner: &'a mut dyn ResponseSink) -> Self {
        Self {
            inner,
            bytes_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

#[async_trait]
impl ResponseSink for RecordingSink<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn status(&self) -> Option<StatusCode> {
        self.inner.status()
    }

    fn write_head(&mut self, status: StatusCode) {
        self.inner.write_head(status);
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write(data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.inner.close().await
    }

    fn hijack(&mut self) -> Option<OnUpgrade> {
        self.inner.hijack()
    }
}
