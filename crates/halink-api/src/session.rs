// ── Websocket session ──
//
// One authenticated channel to the Home Assistant websocket API. A session
// owns a reader task and a writer task per physical connection; both are
// cancelled through a per-connection `CancellationToken`. Every mutation of
// the shared tables is tagged with a connection generation so that a reader
// belonging to a torn-down connection can never touch the current one.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::Error;
use crate::event::SessionEvent;
use crate::protocol::{self, Inbound};
use crate::transport::{self, TransportConfig};

type Handshake = oneshot::Sender<Result<(), Error>>;

/// Local view of the physical channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Closed,
    Opening,
    Open,
}

struct Shared {
    channel: Channel,
    /// Bumped on every teardown; readers and probes compare against it.
    generation: u64,
    authenticated: bool,
    next_id: u64,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    cancel: Option<CancellationToken>,
    pending: HashMap<u64, oneshot::Sender<Result<Value, Error>>>,
    probes: HashMap<u64, oneshot::Sender<()>>,
    events_tx: Option<mpsc::UnboundedSender<SessionEvent>>,
    events_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl Shared {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Drop the physical channel and everything waiting on it.
    fn reset(&mut self) {
        self.generation += 1;
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.outbound = None;
        self.channel = Channel::Closed;
        self.authenticated = false;
        self.pending.clear();
        self.probes.clear();
        self.next_id = 1;
    }
}

struct SessionInner {
    id: Uuid,
    base_url: Url,
    endpoint: Url,
    token: SecretString,
    transport: TransportConfig,
    shared: Mutex<Shared>,
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a frame on the writer of `generation`, if it is still current.
    fn transmit(&self, generation: u64, text: String) -> bool {
        let shared = self.lock();
        if shared.generation != generation {
            return false;
        }
        shared
            .outbound
            .as_ref()
            .is_some_and(|tx| tx.send(Message::text(text)).is_ok())
    }

    fn handle_text(&self, generation: u64, text: &str, handshake: &mut Option<Handshake>) {
        let message = match protocol::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(session = %self.id, error = %e, "dropping unparsable frame");
                return;
            }
        };

        match protocol::dispatch(message) {
            Inbound::AuthRequired => {
                debug!(session = %self.id, "server requested auth");
                self.transmit(generation, protocol::auth_frame(&self.token));
            }
            Inbound::Authenticated => {
                {
                    let mut shared = self.lock();
                    if shared.generation == generation {
                        shared.authenticated = true;
                    }
                }
                settle(handshake, Ok(()));
            }
            Inbound::AuthRejected(message) => {
                warn!(session = %self.id, %message, "server rejected access token");
                settle(handshake, Err(Error::Authentication { message }));
            }
            Inbound::Result { id, outcome } => {
                let waiter = {
                    let mut shared = self.lock();
                    if shared.generation == generation {
                        shared.pending.remove(&id)
                    } else {
                        None
                    }
                };
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(outcome);
                    }
                    None => debug!(session = %self.id, id, "result for unknown command"),
                }
            }
            Inbound::Pong(id) => {
                let waiter = {
                    let mut shared = self.lock();
                    if shared.generation == generation {
                        shared.probes.remove(&id)
                    } else {
                        None
                    }
                };
                if let Some(tx) = waiter {
                    let _ = tx.send(());
                }
            }
            Inbound::Event(event) => {
                let sink = {
                    let shared = self.lock();
                    if shared.generation == generation {
                        shared.events_tx.clone()
                    } else {
                        None
                    }
                };
                if let Some(tx) = sink {
                    let _ = tx.send(event);
                }
            }
            Inbound::Ignored => {}
        }
    }

    /// The reader of `generation` saw the channel go away.
    fn channel_lost(&self, generation: u64, reason: String) {
        let (was_authenticated, sink) = {
            let mut shared = self.lock();
            if shared.generation != generation {
                return;
            }
            let was_authenticated = shared.authenticated;
            let sink = shared.events_tx.clone();
            shared.reset();
            (was_authenticated, sink)
        };

        info!(session = %self.id, %reason, "websocket closed");
        if was_authenticated {
            if let Some(tx) = sink {
                let _ = tx.send(SessionEvent::Closed { reason });
            }
        }
    }

    fn close_generation(&self, generation: u64) {
        let mut shared = self.lock();
        if shared.generation == generation {
            shared.reset();
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let shared = self.shared.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(cancel) = shared.cancel.take() {
            cancel.cancel();
        }
    }
}

/// A single authenticated websocket session.
///
/// Cheaply cloneable. Commands are correlated by a monotonically increasing
/// id that restarts at 1 whenever the channel is torn down.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session for the instance at `base_url` (`http(s)://host:port`).
    ///
    /// Nothing is opened until [`connect`](Self::connect).
    pub fn new(base_url: Url, token: SecretString, transport: TransportConfig) -> Result<Self, Error> {
        let endpoint = transport::websocket_url(&base_url)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                base_url,
                endpoint,
                token,
                transport,
                shared: Mutex::new(Shared {
                    channel: Channel::Closed,
                    generation: 0,
                    authenticated: false,
                    next_id: 1,
                    outbound: None,
                    cancel: None,
                    pending: HashMap::new(),
                    probes: HashMap::new(),
                    events_tx: Some(events_tx),
                    events_rx: Some(events_rx),
                }),
            }),
        })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    pub fn token(&self) -> &SecretString {
        &self.inner.token
    }

    /// Take the push-event receiver. Returns `None` after the first call.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.inner.lock().events_rx.take()
    }

    /// Whether the local channel reports open. A zombie socket still
    /// reports open; use [`ping`](Self::ping) to find out.
    pub fn is_connected(&self) -> bool {
        self.inner.lock().channel == Channel::Open
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.lock().authenticated
    }

    pub fn pending_commands(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn pending_probes(&self) -> usize {
        self.inner.lock().probes.len()
    }

    /// Open the channel and authenticate.
    ///
    /// Any previous channel is torn down first. Fails with
    /// [`Error::Authentication`] on `auth_invalid`; every other failure
    /// (bad endpoint, TCP/TLS error, early close, timeout) is retryable.
    pub async fn connect(&self) -> Result<(), Error> {
        let generation = {
            let mut shared = self.inner.lock();
            shared.reset();
            shared.channel = Channel::Opening;
            shared.generation
        };

        let timeout = self.inner.transport.handshake_timeout;
        info!(session = %self.inner.id, endpoint = %self.inner.endpoint, "connecting");

        let outcome = match tokio::time::timeout(timeout, self.open(generation)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Timeout {
                operation: "handshake",
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };

        match outcome {
            Ok(()) => {
                info!(session = %self.inner.id, "authenticated");
                Ok(())
            }
            Err(e) => {
                self.inner.close_generation(generation);
                Err(e)
            }
        }
    }

    async fn open(&self, generation: u64) -> Result<(), Error> {
        let connector = self.inner.transport.websocket_connector()?;
        let (ws, _response) = tokio_tungstenite::connect_async_tls_with_config(
            self.inner.endpoint.as_str(),
            None,
            false,
            connector,
        )
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        let cancel = CancellationToken::new();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (auth_tx, auth_rx) = oneshot::channel();

        {
            let mut shared = self.inner.lock();
            if shared.generation != generation {
                return Err(Error::SessionClosed);
            }
            shared.channel = Channel::Open;
            shared.outbound = Some(out_tx);
            shared.cancel = Some(cancel.clone());
        }

        let (sink, stream) = ws.split();
        tokio::spawn(write_loop(sink, out_rx, cancel.clone()));
        tokio::spawn(read_loop(
            stream,
            Arc::downgrade(&self.inner),
            generation,
            auth_tx,
            cancel,
        ));

        auth_rx.await.map_err(|_| Error::SessionClosed)?
    }

    /// Tear the session down. Idempotent.
    ///
    /// The event sink is detached before the channel closes, so nothing is
    /// delivered after this returns. Pending commands observe
    /// [`Error::SessionClosed`].
    pub fn disconnect(&self) {
        let mut shared = self.inner.lock();
        shared.events_tx = None;
        let was_open = shared.channel != Channel::Closed;
        shared.reset();
        drop(shared);

        if was_open {
            debug!(session = %self.inner.id, "disconnected");
        }
    }

    /// Send a command and wait for its `result` frame.
    ///
    /// Rejects with [`Error::NotConnected`] without transmitting anything if
    /// the channel is not open.
    pub async fn send_command(&self, payload: Value) -> Result<Value, Error> {
        let (_, rx) = self.enqueue(payload)?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    /// Record a pending command and queue its frame; returns the id used.
    pub(crate) fn enqueue(
        &self,
        payload: Value,
    ) -> Result<(u64, oneshot::Receiver<Result<Value, Error>>), Error> {
        let mut shared = self.inner.lock();
        if shared.channel != Channel::Open {
            return Err(Error::NotConnected);
        }
        let Some(outbound) = shared.outbound.clone() else {
            return Err(Error::NotConnected);
        };

        let id = shared.next_id();
        let frame = protocol::command_frame(id, payload)?;
        let (tx, rx) = oneshot::channel();
        shared.pending.insert(id, tx);

        if outbound.send(Message::text(frame)).is_err() {
            shared.pending.remove(&id);
            return Err(Error::NotConnected);
        }
        Ok((id, rx))
    }

    /// Liveness probe. `true` only if a matching `pong` arrives in time.
    ///
    /// Never errors: a closed channel, a failed send and a timeout all
    /// report `false`. The probe entry is gone when this returns.
    pub async fn ping(&self, timeout: Duration) -> bool {
        let (id, generation, rx) = {
            let mut shared = self.inner.lock();
            if shared.channel != Channel::Open {
                return false;
            }
            let Some(outbound) = shared.outbound.clone() else {
                return false;
            };
            let id = shared.next_id();
            let (tx, rx) = oneshot::channel();
            shared.probes.insert(id, tx);
            if outbound.send(Message::text(protocol::ping_frame(id))).is_err() {
                shared.probes.remove(&id);
                return false;
            }
            (id, shared.generation, rx)
        };

        let answered = matches!(tokio::time::timeout(timeout, rx).await, Ok(Ok(())));

        let mut shared = self.inner.lock();
        if shared.generation == generation {
            shared.probes.remove(&id);
        }
        drop(shared);

        if !answered {
            debug!(session = %self.inner.id, id, "ping went unanswered");
        }
        answered
    }
}

fn settle(handshake: &mut Option<Handshake>, outcome: Result<(), Error>) {
    if let Some(tx) = handshake.take() {
        let _ = tx.send(outcome);
    }
}

async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
) where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = outbound.recv() => {
                let Some(message) = message else { break };
                if let Err(e) = sink.send(message).await {
                    debug!(error = %e, "websocket write failed");
                    break;
                }
            }
        }
    }
    let _ = sink.close().await;
}

async fn read_loop<S>(
    mut stream: S,
    inner: Weak<SessionInner>,
    generation: u64,
    auth_tx: Handshake,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let mut handshake = Some(auth_tx);

    let (code, reason) = loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                let Some(inner) = inner.upgrade() else { return };
                inner.handle_text(generation, text.as_str(), &mut handshake);
            }
            Some(Ok(Message::Close(frame))) => {
                break frame.map_or_else(
                    || (1005, String::from("no close frame")),
                    |f| (u16::from(f.code), f.reason.as_str().to_owned()),
                );
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break (1006, e.to_string()),
            None => break (1006, String::from("stream ended")),
        }
    };

    settle(
        &mut handshake,
        Err(Error::WebSocketClosed {
            code,
            reason: reason.clone(),
        }),
    );
    if let Some(inner) = inner.upgrade() {
        inner.channel_lost(generation, reason);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            Url::parse("http://127.0.0.1:1").unwrap(),
            SecretString::from("token".to_string()),
            TransportConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn command_on_closed_channel_is_rejected() {
        let session = session();
        let err = session
            .send_command(serde_json::json!({ "type": "get_states" }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert_eq!(session.pending_commands(), 0);
    }

    #[tokio::test]
    async fn ping_on_closed_channel_is_false() {
        let session = session();
        assert!(!session.ping(Duration::from_millis(50)).await);
        assert_eq!(session.pending_probes(), 0);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let session = session();
        session.disconnect();
        session.disconnect();
        assert!(!session.is_connected());
    }

    #[test]
    fn events_are_taken_once() {
        let session = session();
        assert!(session.take_events().is_some());
        assert!(session.take_events().is_none());
    }
}
