// In-process Home Assistant websocket stand-in for tests.
//
// Speaks just enough of the protocol to drive a `Session` through its
// handshake, command correlation, liveness probes, push events and remote
// closes. Every frame a client sends is recorded for assertions.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// How the server answers an `auth` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthBehavior {
    Accept,
    /// Reply `auth_invalid` with this message, then close.
    Reject(String),
    /// Never answer.
    Silent,
}

#[derive(Debug, Clone)]
enum Reply {
    Success(Value),
    Failure { code: String, message: String },
}

#[derive(Debug, Clone)]
enum Directive {
    Push { subscription: u64, event: Value },
    Close,
}

struct Behavior {
    auth: AuthBehavior,
    answer_pings: bool,
    reply_delay: Duration,
    replies: HashMap<String, Reply>,
}

struct MockState {
    behavior: Mutex<Behavior>,
    received: Mutex<Vec<Value>>,
    connections: AtomicUsize,
    directives: broadcast::Sender<Directive>,
}

impl MockState {
    fn behavior(&self) -> MutexGuard<'_, Behavior> {
        self.behavior.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn received(&self) -> MutexGuard<'_, Vec<Value>> {
        self.received.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A websocket server on `127.0.0.1` with an ephemeral port.
///
/// Stops accepting and closes every connection when dropped.
pub struct MockServer {
    url: Url,
    state: Arc<MockState>,
    cancel: CancellationToken,
}

impl MockServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        let url = Url::parse(&format!("http://{addr}")).map_err(std::io::Error::other)?;
        let (directives, _) = broadcast::channel(64);

        let state = Arc::new(MockState {
            behavior: Mutex::new(Behavior {
                auth: AuthBehavior::Accept,
                answer_pings: true,
                reply_delay: Duration::ZERO,
                replies: HashMap::new(),
            }),
            received: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
            directives,
        });
        let cancel = CancellationToken::new();

        tokio::spawn(accept_loop(listener, Arc::clone(&state), cancel.clone()));

        Ok(Self {
            url,
            state,
            cancel,
        })
    }

    /// Base URL (`http://127.0.0.1:<port>`) to hand to a `Session`.
    pub fn url(&self) -> Url {
        self.url.clone()
    }

    pub fn set_auth(&self, auth: AuthBehavior) {
        self.state.behavior().auth = auth;
    }

    /// Stop answering pings, simulating a zombie socket.
    pub fn answer_pings(&self, answer: bool) {
        self.state.behavior().answer_pings = answer;
    }

    /// Delay every command reply (not auth or pong) by `delay`.
    pub fn delay_replies(&self, delay: Duration) {
        self.state.behavior().reply_delay = delay;
    }

    /// Reply to commands of `command_type` with a successful `result`.
    ///
    /// Commands without a configured reply succeed with `null`.
    pub fn respond_with(&self, command_type: &str, result: Value) {
        self.state
            .behavior()
            .replies
            .insert(command_type.to_owned(), Reply::Success(result));
    }

    /// Reply to commands of `command_type` with `success: false`.
    pub fn fail_with(&self, command_type: &str, code: &str, message: &str) {
        self.state.behavior().replies.insert(
            command_type.to_owned(),
            Reply::Failure {
                code: code.to_owned(),
                message: message.to_owned(),
            },
        );
    }

    /// Send an `event` frame to every authenticated connection.
    pub fn push_event(&self, subscription: u64, event: Value) {
        let _ = self
            .state
            .directives
            .send(Directive::Push { subscription, event });
    }

    /// Close every open connection from the server side.
    pub fn close_all(&self) {
        let _ = self.state.directives.send(Directive::Close);
    }

    /// Every frame received from clients, in arrival order.
    pub fn received(&self) -> Vec<Value> {
        self.state.received().clone()
    }

    /// Received frames whose `type` equals `frame_type`.
    pub fn received_of_type(&self, frame_type: &str) -> Vec<Value> {
        self.state
            .received()
            .iter()
            .filter(|frame| frame.get("type").and_then(Value::as_str) == Some(frame_type))
            .cloned()
            .collect()
    }

    /// Number of websocket connections accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<MockState>, cancel: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, _)) => {
                tokio::spawn(serve(stream, Arc::clone(&state), cancel.child_token()));
            }
            Err(e) => debug!(error = %e, "mock accept failed"),
        }
    }
}

async fn serve(stream: TcpStream, state: Arc<MockState>, cancel: CancellationToken) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    state.connections.fetch_add(1, Ordering::SeqCst);

    let (mut sink, mut source) = ws.split();
    let mut directives = state.directives.subscribe();
    let hello = json!({ "type": "auth_required", "ha_version": "mock" });
    if sink.send(Message::text(hello.to_string())).await.is_err() {
        return;
    }

    let mut authenticated = false;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = sink.close().await;
                return;
            }
            directive = directives.recv() => match directive {
                Ok(Directive::Push { subscription, event }) if authenticated => {
                    let frame = json!({ "id": subscription, "type": "event", "event": event });
                    if sink.send(Message::text(frame.to_string())).await.is_err() {
                        return;
                    }
                }
                Ok(Directive::Close) => {
                    let frame = CloseFrame {
                        code: CloseCode::Away,
                        reason: "server going away".into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    return;
                }
                Ok(Directive::Push { .. }) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            },
            frame = source.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) | None => return,
                };
                let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
                    continue;
                };
                state.received().push(value.clone());

                let (replies, close) = respond(&state, &value, &mut authenticated).await;
                for reply in replies {
                    if sink.send(Message::text(reply.to_string())).await.is_err() {
                        return;
                    }
                }
                if close {
                    let _ = sink.close().await;
                    return;
                }
            }
        }
    }
}

async fn respond(state: &MockState, frame: &Value, authenticated: &mut bool) -> (Vec<Value>, bool) {
    let frame_type = frame.get("type").and_then(Value::as_str).unwrap_or_default();
    let id = frame.get("id").and_then(Value::as_u64);

    if frame_type == "auth" {
        let auth = state.behavior().auth.clone();
        return match auth {
            AuthBehavior::Accept => {
                *authenticated = true;
                (vec![json!({ "type": "auth_ok", "ha_version": "mock" })], false)
            }
            AuthBehavior::Reject(message) => (
                vec![json!({ "type": "auth_invalid", "message": message })],
                true,
            ),
            AuthBehavior::Silent => (Vec::new(), false),
        };
    }

    let Some(id) = id.filter(|_| *authenticated) else {
        return (Vec::new(), false);
    };

    if frame_type == "ping" {
        let answer = state.behavior().answer_pings;
        let replies = if answer {
            vec![json!({ "id": id, "type": "pong" })]
        } else {
            Vec::new()
        };
        return (replies, false);
    }

    let (reply, delay) = {
        let behavior = state.behavior();
        (behavior.replies.get(frame_type).cloned(), behavior.reply_delay)
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let result = match reply {
        Some(Reply::Success(result)) => {
            json!({ "id": id, "type": "result", "success": true, "result": result })
        }
        Some(Reply::Failure { code, message }) => json!({
            "id": id,
            "type": "result",
            "success": false,
            "error": { "code": code, "message": message },
        }),
        None => json!({ "id": id, "type": "result", "success": true, "result": null }),
    };
    (vec![result], false)
}
