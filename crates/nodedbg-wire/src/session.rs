//! Protocol session: request/response correlation and event dispatch.
//!
//! A [`Session`] numbers outbound requests, matches responses back to
//! their callers by `request_seq`, and forwards events in wire order as
//! [`SessionEvent`]s. It also owns the handle cache that backs
//! [`Session::lookup_ref`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Duration};

use crate::dispatcher::{PendingRequests, ResponseCallback};
use crate::error::WireError;
use crate::protocol::{command, InboundMessage, LookupArguments, Request, Response};
use crate::refs::RefCache;
use crate::transport::{lock, Headers, Transport, TransportEvent};

/// Timeout for full-length string lookups (milliseconds).
pub const FULL_STRING_TIMEOUT_MS: u64 = 1000;

/// What the session reports to its owner, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The engine handshake arrived.
    Connected(Headers),
    /// An engine event. The ref cache has already moved to a new generation.
    Event {
        /// Event name.
        name: String,
        /// Event body.
        body: serde_json::Value,
    },
    /// A response nobody was waiting for.
    UnmatchedResponse(Response),
    /// The connection closed. Every pending request has been cancelled.
    Closed {
        /// Why the connection closed.
        reason: String,
    },
}

struct SessionInner {
    transport: Transport,
    next_seq: AtomicI64,
    pending: Mutex<PendingRequests>,
    refs: Mutex<RefCache>,
}

impl SessionInner {
    fn handle_message(&self, value: serde_json::Value, events: &mpsc::UnboundedSender<SessionEvent>) {
        let message = match serde_json::from_value::<InboundMessage>(value) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("ignoring unrecognized message: {}", e);
                return;
            }
        };
        match message {
            InboundMessage::Response(response) => {
                if let Some(refs) = &response.refs {
                    lock(&self.refs).index(refs);
                }
                let callback = lock(&self.pending).take(response.request_seq);
                match callback {
                    Some(cb) => cb(Some(response)),
                    None => {
                        tracing::warn!("received response for unknown request seq: {}", response.request_seq);
                        let _ = events.send(SessionEvent::UnmatchedResponse(response));
                    }
                }
            }
            InboundMessage::Event(event) => {
                {
                    let mut refs = lock(&self.refs);
                    refs.advance();
                    if let Some(inline) = &event.refs {
                        refs.index(inline);
                    }
                }
                tracing::debug!("event: {}", event.event);
                let _ = events.send(SessionEvent::Event {
                    name: event.event,
                    body: event.body,
                });
            }
        }
    }

    fn cancel_all(&self) {
        let callbacks = lock(&self.pending).drain();
        if !callbacks.is_empty() {
            tracing::debug!("cancelling {} pending requests", callbacks.len());
        }
        for cb in callbacks {
            cb(None);
        }
    }
}

/// A protocol session over one [`Transport`].
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Wrap `transport`, start its read loop and the dispatch task.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Protocol`] if the transport is already being read.
    pub fn start(transport: Transport) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), WireError> {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(SessionInner {
            transport,
            next_seq: AtomicI64::new(1),
            pending: Mutex::new(PendingRequests::new()),
            refs: Mutex::new(RefCache::new()),
        });
        inner.transport.start_reading(transport_tx)?;
        tokio::spawn(dispatch_loop(transport_rx, events_tx, Arc::downgrade(&inner)));
        Ok((Self { inner }, events_rx))
    }

    /// Send `command` without waiting. Returns its sequence number.
    ///
    /// `callback`, if given, runs on the dispatch task with the response, or
    /// with `None` if the connection closes first or the send fails. It
    /// must not block.
    pub fn request_async(
        &self,
        command: &str,
        arguments: Option<serde_json::Value>,
        callback: Option<ResponseCallback>,
    ) -> i64 {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        if let Some(cb) = callback {
            lock(&self.inner.pending).register(seq, cb);
        }
        let request = Request::new(seq, command, arguments);
        let sent = serde_json::to_value(&request)
            .map_err(WireError::from)
            .and_then(|value| self.inner.transport.send(&value));
        if let Err(e) = sent {
            tracing::debug!("{} (seq {}) not sent: {}", command, seq, e);
            let callback = lock(&self.inner.pending).take(seq);
            if let Some(cb) = callback {
                cb(None);
            }
        }
        seq
    }

    /// Send `command` and wait up to `wait` for its response.
    ///
    /// `None` means no answer: the wait elapsed or the connection closed.
    pub async fn request_sync(
        &self,
        command: &str,
        arguments: Option<serde_json::Value>,
        wait: Duration,
    ) -> Option<Response> {
        if self.is_closed() {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        let callback: ResponseCallback = Box::new(move |response| {
            let _ = tx.send(response);
        });
        let seq = self.request_async(command, arguments, Some(callback));
        match timeout(wait, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => None,
            Err(_) => {
                tracing::debug!("{} (seq {}) timed out after {:?}", command, seq, wait);
                lock(&self.inner.pending).forget(seq);
                None
            }
        }
    }

    /// Resolve a handle in the current generation.
    pub async fn lookup_ref(&self, handle: i64, wait: Duration) -> Option<serde_json::Value> {
        self.lookup_ref_at(handle, self.generation(), wait).await
    }

    /// Resolve a handle on behalf of something created under `generation`.
    ///
    /// The cache is only consulted, and only filled, while `generation` is
    /// still current; otherwise this always asks the engine.
    pub async fn lookup_ref_at(&self, handle: i64, generation: u64, wait: Duration) -> Option<serde_json::Value> {
        if let Some(hit) = lock(&self.inner.refs).get(handle, generation) {
            return Some(hit);
        }
        let args = LookupArguments {
            handles: vec![handle],
            max_string_length: None,
        };
        let descriptor = self.lookup(handle, &args, wait).await?;
        lock(&self.inner.refs).insert(handle, descriptor.clone(), generation);
        Some(descriptor)
    }

    /// Resolve a handle with the engine's string truncation disabled.
    pub async fn lookup_full_string(&self, handle: i64) -> Option<serde_json::Value> {
        let args = LookupArguments {
            handles: vec![handle],
            max_string_length: Some(-1),
        };
        self.lookup(handle, &args, Duration::from_millis(FULL_STRING_TIMEOUT_MS))
            .await
    }

    async fn lookup(&self, handle: i64, args: &LookupArguments, wait: Duration) -> Option<serde_json::Value> {
        let response = self
            .request_sync(command::LOOKUP, to_arguments(args), wait)
            .await?;
        match response.body.get(handle.to_string()) {
            Some(descriptor) if !descriptor.is_null() => Some(descriptor.clone()),
            _ => {
                tracing::debug!("lookup of handle {} returned nothing", handle);
                None
            }
        }
    }

    /// The current ref cache generation. Advances on every event.
    pub fn generation(&self) -> u64 {
        lock(&self.inner.refs).generation()
    }

    /// Number of requests still awaiting a response.
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    /// Close the underlying transport. Pending requests are cancelled once
    /// the close is dispatched.
    pub fn close(&self) {
        self.inner.transport.close();
    }

    /// Whether the connection has closed.
    pub fn is_closed(&self) -> bool {
        self.inner.transport.is_closed()
    }
}

/// Serialize request arguments, logging instead of failing.
///
/// Argument structs in this crate always serialize.
pub fn to_arguments<T: Serialize>(args: &T) -> Option<serde_json::Value> {
    match serde_json::to_value(args) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!("failed to serialize request arguments: {}", e);
            None
        }
    }
}

async fn dispatch_loop(
    mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    events: mpsc::UnboundedSender<SessionEvent>,
    inner: Weak<SessionInner>,
) {
    while let Some(event) = transport_rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match event {
            TransportEvent::Connected(headers) => {
                let _ = events.send(SessionEvent::Connected(headers));
            }
            TransportEvent::Message(value) => inner.handle_message(value, &events),
            TransportEvent::Closed(reason) => {
                inner.cancel_all();
                let _ = events.send(SessionEvent::Closed { reason });
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ContinueArguments;
    use crate::testing::{duplex_pair, event, response, response_with_refs, FakeEngine};
    use serde_json::json;
    use tokio::io::DuplexStream;

    const WAIT: Duration = Duration::from_secs(5);

    async fn started() -> (Session, mpsc::UnboundedReceiver<SessionEvent>, FakeEngine<DuplexStream>) {
        let (transport, mut engine) = duplex_pair();
        let (session, mut events) = Session::start(transport).unwrap();
        engine.handshake().await.unwrap();
        match timeout(WAIT, events.recv()).await.unwrap().unwrap() {
            SessionEvent::Connected(headers) => assert_eq!(headers["Type"], "connect"),
            other => panic!("expected Connected, got {other:?}"),
        }
        (session, events, engine)
    }

    async fn next(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
        timeout(WAIT, events.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn sequence_numbers_start_at_one_and_increase() {
        let (session, _events, mut engine) = started().await;
        let seqs: Vec<i64> = (0..3)
            .map(|_| session.request_async(command::CONTINUE, None, None))
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        for expected in 1..=3 {
            let req = engine.recv().await.unwrap();
            assert_eq!(req.seq, expected);
            assert_eq!(req.message_type, "request");
            assert_eq!(req.command, "continue");
        }
    }

    #[tokio::test]
    async fn fire_and_forget_registers_nothing() {
        let (session, _events, _engine) = started().await;
        session.request_async(command::CONTINUE, to_arguments(&ContinueArguments::default()), None);
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn responses_matched_by_seq_not_order() {
        let (session, _events, mut engine) = started().await;
        let first = {
            let s = session.clone();
            tokio::spawn(async move { s.request_sync("evaluate", Some(json!({"expression": "a"})), WAIT).await })
        };
        let req_a = engine.recv().await.unwrap();
        let second = {
            let s = session.clone();
            tokio::spawn(async move { s.request_sync("evaluate", Some(json!({"expression": "b"})), WAIT).await })
        };
        let req_b = engine.recv().await.unwrap();

        engine.send(response(&req_b, json!({"text": "B"}))).await.unwrap();
        engine.send(response(&req_a, json!({"text": "A"}))).await.unwrap();

        assert_eq!(first.await.unwrap().unwrap().body["text"], "A");
        assert_eq!(second.await.unwrap().unwrap().body["text"], "B");
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn zero_timeout_returns_none_and_forgets() {
        let (session, _events, _engine) = started().await;
        let result = timeout(Duration::from_secs(1), session.request_sync("backtrace", None, Duration::ZERO))
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_waits_out_its_timeout() {
        let (session, _events, mut engine) = started().await;
        let start = tokio::time::Instant::now();
        let result = session
            .request_sync("backtrace", None, Duration::from_secs(10))
            .await;
        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert_eq!(session.pending_count(), 0);
        assert_eq!(engine.recv().await.unwrap().command, "backtrace");
    }

    #[tokio::test]
    async fn late_response_after_timeout_is_unmatched() {
        let (session, mut events, mut engine) = started().await;
        assert!(session
            .request_sync("backtrace", None, Duration::from_millis(10))
            .await
            .is_none());
        let req = engine.recv().await.unwrap();
        engine.send(response(&req, json!({}))).await.unwrap();
        match next(&mut events).await {
            SessionEvent::UnmatchedResponse(r) => assert_eq!(r.request_seq, req.seq),
            other => panic!("expected UnmatchedResponse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_unblocks_every_waiter() {
        let (session, mut events, _engine) = started().await;
        let mut waiters = Vec::new();
        for _ in 0..5 {
            let s = session.clone();
            waiters.push(tokio::spawn(async move {
                s.request_sync("evaluate", None, Duration::from_secs(60)).await
            }));
        }
        while session.pending_count() < 5 {
            tokio::task::yield_now().await;
        }
        session.close();
        for waiter in waiters {
            let result = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
            assert!(result.is_none());
        }
        assert!(matches!(next(&mut events).await, SessionEvent::Closed { .. }));
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn remote_close_unblocks_waiters() {
        let (session, mut events, engine) = started().await;
        let s = session.clone();
        let waiter = tokio::spawn(async move { s.request_sync("evaluate", None, Duration::from_secs(60)).await });
        while session.pending_count() < 1 {
            tokio::task::yield_now().await;
        }
        drop(engine);
        assert!(timeout(WAIT, waiter).await.unwrap().unwrap().is_none());
        assert!(matches!(next(&mut events).await, SessionEvent::Closed { .. }));
    }

    #[tokio::test]
    async fn requests_after_close_get_none() {
        let (session, _events, _engine) = started().await;
        session.close();
        assert!(session.request_sync("evaluate", None, WAIT).await.is_none());

        let (tx, rx) = oneshot::channel();
        session.request_async(
            "evaluate",
            None,
            Some(Box::new(move |resp| {
                let _ = tx.send(resp.is_none());
            })),
        );
        assert!(rx.await.unwrap());
    }

    #[tokio::test]
    async fn events_delivered_in_order_and_advance_generation() {
        let (session, mut events, mut engine) = started().await;
        let before = session.generation();
        engine.send(event("afterCompile", json!({"script": {"id": 1}}))).await.unwrap();
        engine.send(event("break", json!({"sourceLine": 3}))).await.unwrap();
        match next(&mut events).await {
            SessionEvent::Event { name, body } => {
                assert_eq!(name, "afterCompile");
                assert_eq!(body["script"]["id"], 1);
            }
            other => panic!("expected Event, got {other:?}"),
        }
        match next(&mut events).await {
            SessionEvent::Event { name, .. } => assert_eq!(name, "break"),
            other => panic!("expected Event, got {other:?}"),
        }
        assert_eq!(session.generation(), before + 2);
    }

    #[tokio::test]
    async fn event_refs_are_served_from_cache() {
        let (session, mut events, mut engine) = started().await;
        let mut msg = event("break", json!({}));
        msg["refs"] = json!([{"handle": 11, "type": "string", "value": "hi"}]);
        engine.send(msg).await.unwrap();
        next(&mut events).await;
        // A zero timeout can only succeed from the cache.
        let hit = session.lookup_ref(11, Duration::ZERO).await.unwrap();
        assert_eq!(hit["value"], "hi");
    }

    #[tokio::test]
    async fn new_event_clears_previous_refs() {
        let (session, mut events, mut engine) = started().await;
        let mut msg = event("break", json!({}));
        msg["refs"] = json!([{"handle": 11, "type": "number", "value": 1}]);
        engine.send(msg).await.unwrap();
        next(&mut events).await;
        engine.send(event("break", json!({}))).await.unwrap();
        next(&mut events).await;
        assert!(session.lookup_ref(11, Duration::ZERO).await.is_none());
    }

    #[tokio::test]
    async fn lookup_miss_asks_engine_and_caches() {
        let (session, _events, mut engine) = started().await;
        let s = session.clone();
        let lookup = tokio::spawn(async move { s.lookup_ref(21, WAIT).await });
        let req = engine.recv().await.unwrap();
        assert_eq!(req.command, "lookup");
        assert_eq!(req.arguments.as_ref().unwrap()["handles"], json!([21]));
        engine
            .send(response(&req, json!({"21": {"handle": 21, "type": "object", "className": "Foo"}})))
            .await
            .unwrap();
        assert_eq!(lookup.await.unwrap().unwrap()["className"], "Foo");
        assert!(session.lookup_ref(21, Duration::ZERO).await.is_some());
    }

    #[tokio::test]
    async fn stale_generation_bypasses_cache() {
        let (session, mut events, mut engine) = started().await;
        let stale = session.generation();
        let mut msg = event("break", json!({}));
        msg["refs"] = json!([{"handle": 5, "type": "number", "value": 2}]);
        engine.send(msg).await.unwrap();
        next(&mut events).await;

        // Same handle number, but created before the event: must not hit.
        assert!(session.lookup_ref_at(5, stale, Duration::ZERO).await.is_none());

        let s = session.clone();
        let lookup = tokio::spawn(async move { s.lookup_ref_at(5, stale, WAIT).await });
        let req = engine.recv().await.unwrap();
        engine
            .send(response(&req, json!({"5": {"handle": 5, "type": "number", "value": 99}})))
            .await
            .unwrap();
        assert_eq!(lookup.await.unwrap().unwrap()["value"], 99);
        // The current generation still holds the event's descriptor.
        assert_eq!(session.lookup_ref(5, Duration::ZERO).await.unwrap()["value"], 2);
    }

    #[tokio::test]
    async fn response_refs_are_indexed() {
        let (session, _events, mut engine) = started().await;
        let s = session.clone();
        let bt = tokio::spawn(async move { s.request_sync("backtrace", None, WAIT).await });
        let req = engine.recv().await.unwrap();
        engine
            .send(response_with_refs(
                &req,
                json!({"totalFrames": 0}),
                vec![json!({"handle": 30, "type": "boolean", "value": true})],
            ))
            .await
            .unwrap();
        bt.await.unwrap().unwrap();
        assert_eq!(session.lookup_ref(30, Duration::ZERO).await.unwrap()["value"], true);
    }

    #[tokio::test]
    async fn lookup_full_string_requests_unbounded_length() {
        let (session, _events, mut engine) = started().await;
        let s = session.clone();
        let lookup = tokio::spawn(async move { s.lookup_full_string(8).await });
        let req = engine.recv().await.unwrap();
        let args = req.arguments.clone().unwrap();
        assert_eq!(args["maxStringLength"], -1);
        assert_eq!(args["handles"], json!([8]));
        engine
            .send(response(&req, json!({"8": {"handle": 8, "type": "string", "value": "full"}})))
            .await
            .unwrap();
        assert_eq!(lookup.await.unwrap().unwrap()["value"], "full");
    }

    #[tokio::test]
    async fn lookup_with_missing_entry_is_none() {
        let (session, _events, mut engine) = started().await;
        let s = session.clone();
        let lookup = tokio::spawn(async move { s.lookup_ref(4, WAIT).await });
        let req = engine.recv().await.unwrap();
        engine.send(response(&req, json!({}))).await.unwrap();
        assert!(lookup.await.unwrap().is_none());
    }
}
