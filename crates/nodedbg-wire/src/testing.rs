//! Scripted fake engine for exercising the debugger side of the protocol.
//!
//! Speaks the engine half of the wire protocol over any duplex stream:
//! sends the handshake, reads framed requests, and writes responses and
//! events built with [`response`], [`failure`] and [`event`].

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

use crate::error::WireError;
use crate::protocol::Request;
use crate::transport::{encode_frame, read_body, read_headers, Transport};

/// Handshake frame as sent by a v8-era engine.
pub const HANDSHAKE: &str =
    "Type: connect\r\nV8-Version: 3.14.5.9\r\nProtocol-Version: 1\r\nEmbedding-Host: node v0.10.26\r\nContent-Length: 0\r\n\r\n";

/// The engine end of a connection.
pub struct FakeEngine<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    next_seq: i64,
}

impl<S> FakeEngine<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap the engine side of a stream.
    pub fn new(stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            next_seq: 1,
        }
    }

    /// Send the handshake frame.
    pub async fn handshake(&mut self) -> Result<(), WireError> {
        self.writer.write_all(HANDSHAKE.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Write raw bytes, unframed.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Frame and send one message, stamping it with the engine's own `seq`.
    pub async fn send(&mut self, mut message: serde_json::Value) -> Result<(), WireError> {
        if let Some(obj) = message.as_object_mut() {
            obj.insert("seq".into(), self.next_seq.into());
        }
        self.next_seq += 1;
        let body = serde_json::to_vec(&message)?;
        self.send_raw(&encode_frame(&body)).await
    }

    /// Read the next request the debugger sent.
    pub async fn recv(&mut self) -> Result<Request, WireError> {
        let headers = read_headers(&mut self.reader, true)
            .await
            .map_err(WireError::Protocol)?;
        let body = read_body(&mut self.reader, &headers)
            .await
            .map_err(WireError::Protocol)?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Answer every request with the messages `handler` returns, until the
    /// debugger disconnects. Resolves to every request received.
    pub fn serve<F>(mut self, mut handler: F) -> JoinHandle<Vec<Request>>
    where
        F: FnMut(&Request) -> Vec<serde_json::Value> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Ok(request) = self.recv().await {
                for message in handler(&request) {
                    if self.send(message).await.is_err() {
                        return seen;
                    }
                }
                seen.push(request);
            }
            seen
        })
    }
}

/// A transport wired to a fake engine over an in-memory pipe.
pub fn duplex_pair() -> (Transport, FakeEngine<DuplexStream>) {
    let (client, server) = tokio::io::duplex(256 * 1024);
    (Transport::new(client), FakeEngine::new(server))
}

/// A successful response to `request`.
pub fn response(request: &Request, body: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "type": "response",
        "request_seq": request.seq,
        "command": request.command,
        "success": true,
        "running": false,
        "body": body,
    })
}

/// A successful response carrying inline refs.
pub fn response_with_refs(
    request: &Request,
    body: serde_json::Value,
    refs: Vec<serde_json::Value>,
) -> serde_json::Value {
    let mut msg = response(request, body);
    msg["refs"] = serde_json::Value::Array(refs);
    msg
}

/// A failed response to `request`.
pub fn failure(request: &Request, message: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "response",
        "request_seq": request.seq,
        "command": request.command,
        "success": false,
        "message": message,
    })
}

/// An engine event.
pub fn event(name: &str, body: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "type": "event",
        "event": name,
        "body": body,
    })
}
