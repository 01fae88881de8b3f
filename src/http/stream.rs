//! Incrementally streamed JSON objects.
//!
//! An [`ObjectStream`] produces a single JSON object of the shape
//! `{<header keys>, "<key>": [item, ...], <footer keys>}` while items are
//! still being generated. Producers hold cloneable [`ObjectStream`] handles;
//! the response writer consumes a [`StreamBody`].
//!
//! Items are handed over one at a time: `send` waits until the writer has
//! taken the previous item, so a slow client slows the producer down.

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

use crate::http::sink::ResponseSink;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("object stream already closed")]
    Closed,

    #[error("header already sent")]
    HeaderSent,

    #[error("object stream is already being written")]
    AlreadyStreaming,

    #[error("object stream reader disconnected")]
    Disconnected,

    #[error("failed to encode stream item: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write stream: {0}")]
    Write(#[from] io::Error),
}

type Entries = Vec<(String, Value)>;

struct StreamState {
    /// `None` once the writer has emitted the header.
    header: Option<Entries>,
    footer: Entries,
    closed: bool,
}

struct Shared {
    key: String,
    state: Mutex<StreamState>,
    closed: Notify,
    receiver: Mutex<Option<mpsc::Receiver<Value>>>,
}

impl Shared {
    fn state(&self) -> std::sync::MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn take_receiver(&self) -> Option<mpsc::Receiver<Value>> {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

fn upsert(entries: &mut Entries, key: String, value: Value) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
}

/// Producer handle of a streamed JSON object.
#[derive(Clone)]
pub struct ObjectStream {
    shared: Arc<Shared>,
    sender: mpsc::Sender<Value>,
}

impl ObjectStream {
    /// A stream whose items are written under `key`.
    pub fn new(key: impl Into<String>) -> Self {
        let (sender, receiver) = mpsc::channel(1);
        let shared = Shared {
            key: key.into(),
            state: Mutex::new(StreamState {
                header: Some(Vec::new()),
                footer: Vec::new(),
                closed: false,
            }),
            closed: Notify::new(),
            receiver: Mutex::new(Some(receiver)),
        };
        Self {
            shared: Arc::new(shared),
            sender,
        }
    }

    /// Queue `item`, waiting for the writer to take the previous one.
    pub async fn send<T: Serialize + ?Sized>(&self, item: &T) -> Result<(), StreamError> {
        if self.shared.is_closed() {
            return Err(StreamError::Closed);
        }
        let value = serde_json::to_value(item)?;
        self.sender
            .send(value)
            .await
            .map_err(|_| StreamError::Disconnected)
    }

    /// Set a key written before the item array.
    pub fn set_header(&self, key: impl Into<String>, value: Value) -> Result<(), StreamError> {
        let mut state = self.shared.state();
        let header = state.header.as_mut().ok_or(StreamError::HeaderSent)?;
        upsert(header, key.into(), value);
        Ok(())
    }

    /// Set a key written after the item array.
    pub fn set_footer(&self, key: impl Into<String>, value: Value) -> Result<(), StreamError> {
        let mut state = self.shared.state();
        if state.closed {
            return Err(StreamError::Closed);
        }
        upsert(&mut state.footer, key.into(), value);
        Ok(())
    }

    /// End the item array.
    pub fn close(&self) -> Result<(), StreamError> {
        {
            let mut state = self.shared.state();
            if state.closed {
                return Err(StreamError::Closed);
            }
            state.closed = true;
        }
        self.shared.closed.notify_one();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// The consumer side, dropping this handle's sender.
    pub fn into_body(self) -> StreamBody {
        StreamBody {
            shared: self.shared,
        }
    }
}

impl fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStream")
            .field("key", &self.shared.key)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Consumer side of an [`ObjectStream`].
pub struct StreamBody {
    shared: Arc<Shared>,
}

impl StreamBody {
    /// Write the whole object into `w`, flushing after every item.
    ///
    /// Returns once the stream is closed or every producer handle is gone.
    /// On return the channel is dropped, so later sends fail with
    /// [`StreamError::Disconnected`].
    pub async fn write_to(&self, w: &mut dyn ResponseSink) -> Result<(), StreamError> {
        let mut rx = self
            .shared
            .take_receiver()
            .ok_or(StreamError::AlreadyStreaming)?;
        let header = self.shared.state().header.take().unwrap_or_default();

        let mut head = Vec::from(&b"{"[..]);
        for (key, value) in &header {
            serde_json::to_writer(&mut head, key)?;
            head.push(b':');
            serde_json::to_writer(&mut head, value)?;
            head.push(b',');
        }
        serde_json::to_writer(&mut head, &self.shared.key)?;
        head.extend_from_slice(b":[");
        w.write(&head).await?;

        let mut first = true;
        loop {
            if self.shared.is_closed() {
                break;
            }
            tokio::select! {
                biased;
                item = rx.recv() => match item {
                    Some(value) => write_item(w, &value, &mut first).await?,
                    None => break,
                },
                _ = self.shared.closed.notified() => break,
            }
        }
        while let Ok(value) = rx.try_recv() {
            write_item(w, &value, &mut first).await?;
        }
        drop(rx);

        let footer = std::mem::take(&mut self.shared.state().footer);
        let mut tail = Vec::from(&b"]"[..]);
        for (key, value) in &footer {
            tail.push(b',');
            serde_json::to_writer(&mut tail, key)?;
            tail.push(b':');
            serde_json::to_writer(&mut tail, value)?;
        }
        tail.push(b'}');
        w.write(&tail).await?;
        w.flush().await?;
        Ok(())
    }
}

async fn write_item(
    w: &mut dyn ResponseSink,
    value: &Value,
    first: &mut bool,
) -> Result<(), StreamError> {
    let mut buf = Vec::new();
    if !*first {
        buf.push(b',');
    }
    *first = false;
    serde_json::to_writer(&mut buf, value)?;
    w.write(&buf).await?;
    w.flush().await?;
    Ok(())
}

impl Drop for StreamBody {
    fn drop(&mut self) {
        drop(self.shared.take_receiver());
    }
}

impl fmt::Debug for StreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBody")
            .field("key", &self.shared.key)
            .finish()
    }
}
