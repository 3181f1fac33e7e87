//! Content-Length framed transport over a duplex byte stream.
//!
//! Every frame is a block of `Key: value` header lines, a blank line, then
//! exactly `Content-Length` body bytes. The first frame the engine sends is
//! its handshake: its headers are reported as [`TransportEvent::Connected`]
//! and its body is ignored. Every later frame carries a JSON message.
//!
//! Header bytes are decoded one byte per character. Bodies are handed to
//! `serde_json` as raw bytes, so multi-byte UTF-8 content arrives intact.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::WireError;

/// Line an engine prints instead of a handshake when another debugger owns it.
pub const SESSION_ALREADY_ACTIVE: &str = "Remote debugging session already active";

/// Header fields of one frame, keyed by name.
pub type Headers = HashMap<String, String>;

/// Notifications produced by the read loop, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The handshake frame arrived. Fired at most once.
    Connected(Headers),
    /// A JSON message arrived.
    Message(serde_json::Value),
    /// The connection is gone. Fired exactly once; nothing follows it.
    Closed(String),
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Lock a std mutex, ignoring poisoning.
///
/// None of the guarded values can be left half-updated by a panic.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    closed: AtomicBool,
    writer_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    reader: Mutex<Option<BoxedReader>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    events_tx: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    close_reason: Mutex<Option<String>>,
}

impl Inner {
    /// Tear the connection down and report `reason`, once.
    fn mark_closed(&self, reason: String) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("connection closed: {}", reason);
        lock(&self.writer_tx).take();
        lock(&self.reader).take();
        if let Some(task) = lock(&self.reader_task).take() {
            task.abort();
        }
        *lock(&self.close_reason) = Some(reason.clone());
        if let Some(tx) = lock(&self.events_tx).take() {
            let _ = tx.send(TransportEvent::Closed(reason));
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A framed connection to the engine's debug socket.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

impl Transport {
    /// Wrap a duplex stream. Spawns the writer task; reading starts with
    /// [`Transport::start_reading`].
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (writer_tx, writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let inner = Arc::new(Inner {
            closed: AtomicBool::new(false),
            writer_tx: Mutex::new(Some(writer_tx)),
            reader: Mutex::new(Some(Box::new(read_half))),
            reader_task: Mutex::new(None),
            events_tx: Mutex::new(None),
            close_reason: Mutex::new(None),
        });
        tokio::spawn(write_loop(write_half, writer_rx, Arc::downgrade(&inner)));
        Self { inner }
    }

    /// Open a TCP connection to `host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Io`] when the connection is refused.
    pub async fn connect(host: &str, port: u16) -> Result<Self, WireError> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        tracing::debug!("connected to {}:{}", host, port);
        Ok(Self::new(stream))
    }

    /// Start the background read loop, delivering events to `events`.
    ///
    /// If the connection is already closed, the [`TransportEvent::Closed`]
    /// notification is delivered immediately instead.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Protocol`] if reading was already started.
    pub fn start_reading(&self, events: mpsc::UnboundedSender<TransportEvent>) -> Result<(), WireError> {
        if self.inner.is_closed() {
            let reason = lock(&self.inner.close_reason).clone().unwrap_or_default();
            let _ = events.send(TransportEvent::Closed(reason));
            return Ok(());
        }
        let reader = lock(&self.inner.reader)
            .take()
            .ok_or_else(|| WireError::Protocol("read loop already started".into()))?;
        *lock(&self.inner.events_tx) = Some(events.clone());
        let task = tokio::spawn(read_loop(reader, events, Arc::downgrade(&self.inner)));
        *lock(&self.inner.reader_task) = Some(task);
        Ok(())
    }

    /// Serialize `message` and queue it for writing.
    ///
    /// Frames from concurrent callers are never interleaved.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Closed`] after the connection has closed.
    pub fn send(&self, message: &serde_json::Value) -> Result<(), WireError> {
        if self.inner.is_closed() {
            return Err(WireError::Closed);
        }
        let body = serde_json::to_vec(message)?;
        tracing::trace!(direction = "out", "{}", String::from_utf8_lossy(&body));
        let guard = lock(&self.inner.writer_tx);
        let tx = guard.as_ref().ok_or(WireError::Closed)?;
        tx.send(encode_frame(&body)).map_err(|_| WireError::Closed)
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        self.inner.mark_closed("closed by debugger".to_string());
    }

    /// Whether the connection has closed, for any reason.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Why the connection closed, once it has.
    pub fn close_reason(&self) -> Option<String> {
        lock(&self.inner.close_reason).clone()
    }
}

/// Frame a body with its `Content-Length` header.
pub fn encode_frame(body: &[u8]) -> Vec<u8> {
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut buf = Vec::with_capacity(header.len() + body.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(body);
    buf
}

/// Parse the `Content-Length` value out of a frame's headers.
pub fn parse_content_length(headers: &Headers) -> Result<usize, WireError> {
    let value = headers
        .get("Content-Length")
        .ok_or_else(|| WireError::Protocol("missing Content-Length header".into()))?;
    value
        .trim()
        .parse::<usize>()
        .map_err(|e| WireError::Protocol(format!("invalid Content-Length value '{value}': {e}")))
}

/// Decode one raw header line, dropping its line terminator.
fn decode_header_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    line.iter().map(|&b| char::from(b)).collect()
}

pub(crate) async fn read_headers<R>(reader: &mut R, connected: bool) -> Result<Headers, String>
where
    R: AsyncBufRead + Unpin,
{
    let mut headers = Headers::new();
    let mut raw = Vec::new();
    loop {
        raw.clear();
        let n = reader
            .read_until(b'\n', &mut raw)
            .await
            .map_err(|e| WireError::from(e).to_string())?;
        if n == 0 {
            return Err("connection closed by remote".to_string());
        }
        let line = decode_header_line(&raw);
        if line.is_empty() {
            return Ok(headers);
        }
        if !connected && line == SESSION_ALREADY_ACTIVE {
            return Err(line);
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| WireError::Protocol(format!("invalid header: {line}")).to_string())?;
        if headers.contains_key(key) {
            return Err(WireError::Protocol(format!("invalid header: duplicate {key}")).to_string());
        }
        headers.insert(key.to_string(), value.trim().to_string());
    }
}

pub(crate) async fn read_body<R>(reader: &mut R, headers: &Headers) -> Result<Vec<u8>, String>
where
    R: AsyncRead + Unpin,
{
    let len = parse_content_length(headers).map_err(|e| e.to_string())?;
    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| WireError::from(e).to_string())?;
    Ok(body)
}

async fn read_loop(reader: BoxedReader, events: mpsc::UnboundedSender<TransportEvent>, inner: Weak<Inner>) {
    let mut reader = BufReader::new(reader);
    let mut connected = false;
    let reason = loop {
        let headers = match read_headers(&mut reader, connected).await {
            Ok(h) => h,
            Err(reason) => break reason,
        };
        let body = match read_body(&mut reader, &headers).await {
            Ok(b) => b,
            Err(reason) => break reason,
        };
        if inner.upgrade().map_or(true, |i| i.is_closed()) {
            return;
        }
        if !connected {
            connected = true;
            tracing::debug!(?headers, "handshake received");
            let _ = events.send(TransportEvent::Connected(headers));
            continue;
        }
        if body.is_empty() {
            tracing::debug!("empty frame skipped");
            continue;
        }
        match serde_json::from_slice::<serde_json::Value>(&body) {
            Ok(value) => {
                tracing::trace!(direction = "in", "{}", value);
                if events.send(TransportEvent::Message(value)).is_err() {
                    break "event receiver dropped".to_string();
                }
            }
            Err(e) => break WireError::from(e).to_string(),
        }
    };
    match inner.upgrade() {
        Some(inner) => inner.mark_closed(reason),
        None => {
            let _ = events.send(TransportEvent::Closed(reason));
        }
    }
}

async fn write_loop<W>(mut writer: W, mut frames: mpsc::UnboundedReceiver<Vec<u8>>, inner: Weak<Inner>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        let result = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = result {
            if let Some(inner) = inner.upgrade() {
                inner.mark_closed(WireError::from(e).to_string());
            }
            break;
        }
    }
    let _ = writer.shutdown().await;
}
