// ── Wire protocol ──
//
// JSON frames exchanged over the Home Assistant websocket, and the single
// dispatch step that turns a server frame into a tagged `Inbound` value the
// session reader acts on.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::Error;
use crate::event::{self, SessionEvent};

// ── Server → client ──────────────────────────────────────────────────

/// Every frame the server may send, tagged by its `type` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthRequired {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthOk {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    Result {
        id: u64,
        success: bool,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<CommandError>,
    },
    Pong {
        id: u64,
    },
    Event {
        /// Id of the subscription command this event belongs to.
        #[serde(default)]
        id: u64,
        event: Value,
    },
    #[serde(other)]
    Unknown,
}

/// Error body of a `result` frame with `success: false`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// What the session must do in response to one server frame.
#[derive(Debug)]
pub enum Inbound {
    /// Reply with the access token.
    AuthRequired,
    /// Settle the handshake successfully.
    Authenticated,
    /// Settle the handshake with an auth failure.
    AuthRejected(String),
    /// Complete the pending command with this correlation id.
    Result { id: u64, outcome: Result<Value, Error> },
    /// Complete the pending probe with this correlation id.
    Pong(u64),
    /// Deliver to the event sink.
    Event(SessionEvent),
    Ignored,
}

/// Parse one text frame.
pub fn parse(text: &str) -> Result<ServerMessage, Error> {
    serde_json::from_str(text).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: text.to_owned(),
    })
}

/// Classify a server frame. Pure: no I/O, no session state.
pub fn dispatch(message: ServerMessage) -> Inbound {
    match message {
        ServerMessage::AuthRequired { .. } => Inbound::AuthRequired,
        ServerMessage::AuthOk { .. } => Inbound::Authenticated,
        ServerMessage::AuthInvalid { message } => {
            Inbound::AuthRejected(message.unwrap_or_else(|| "invalid access token".into()))
        }
        ServerMessage::Result {
            id,
            success,
            result,
            error,
        } => {
            let outcome = if success {
                Ok(result.unwrap_or(Value::Null))
            } else {
                let error = error.unwrap_or_default();
                Err(Error::Command {
                    code: error.code,
                    message: error.message,
                })
            };
            Inbound::Result { id, outcome }
        }
        ServerMessage::Pong { id } => Inbound::Pong(id),
        ServerMessage::Event { id, event } => Inbound::Event(event::classify(id, event)),
        ServerMessage::Unknown => Inbound::Ignored,
    }
}

// ── Client → server ──────────────────────────────────────────────────

/// `{type: "auth", access_token}`
pub fn auth_frame(token: &SecretString) -> String {
    json!({ "type": "auth", "access_token": token.expose_secret() }).to_string()
}

/// `{id, type: "ping"}`
pub fn ping_frame(id: u64) -> String {
    json!({ "id": id, "type": "ping" }).to_string()
}

/// Attach a correlation id to a command payload.
///
/// The payload must be a JSON object carrying at least `type`.
pub fn command_frame(id: u64, payload: Value) -> Result<String, Error> {
    let Value::Object(mut body) = payload else {
        return Err(Error::Protocol("command payload must be a JSON object".into()));
    };
    if !body.get("type").is_some_and(Value::is_string) {
        return Err(Error::Protocol("command payload is missing a string `type`".into()));
    }
    body.insert("id".into(), Value::from(id));
    Ok(Value::Object(body).to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dispatch_str(text: &str) -> Inbound {
        dispatch(parse(text).unwrap())
    }

    #[test]
    fn handshake_frames() {
        assert!(matches!(
            dispatch_str(r#"{"type":"auth_required","ha_version":"2025.1.0"}"#),
            Inbound::AuthRequired
        ));
        assert!(matches!(dispatch_str(r#"{"type":"auth_ok"}"#), Inbound::Authenticated));

        match dispatch_str(r#"{"type":"auth_invalid","message":"invalid token"}"#) {
            Inbound::AuthRejected(message) => assert_eq!(message, "invalid token"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn successful_result() {
        match dispatch_str(r#"{"id":3,"type":"result","success":true,"result":[1,2]}"#) {
            Inbound::Result { id, outcome } => {
                assert_eq!(id, 3);
                assert_eq!(outcome.unwrap(), json!([1, 2]));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn result_without_payload_is_null() {
        match dispatch_str(r#"{"id":4,"type":"result","success":true}"#) {
            Inbound::Result { outcome, .. } => assert_eq!(outcome.unwrap(), Value::Null),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn failed_result_carries_code() {
        let text = r#"{"id":5,"type":"result","success":false,"error":{"code":"not_found","message":"Service not found"}}"#;
        match dispatch_str(text) {
            Inbound::Result { id, outcome } => {
                assert_eq!(id, 5);
                match outcome {
                    Err(Error::Command { code, message }) => {
                        assert_eq!(code, "not_found");
                        assert_eq!(message, "Service not found");
                    }
                    other => panic!("unexpected {other:?}"),
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pong_and_unknown() {
        assert!(matches!(dispatch_str(r#"{"id":7,"type":"pong"}"#), Inbound::Pong(7)));
        assert!(matches!(
            dispatch_str(r#"{"type":"something_new","foo":1}"#),
            Inbound::Ignored
        ));
    }

    #[test]
    fn malformed_frame_is_a_deserialization_error() {
        assert!(matches!(
            parse("not json"),
            Err(Error::Deserialization { .. })
        ));
    }

    #[test]
    fn command_frame_adds_id() {
        let frame = command_frame(12, json!({ "type": "get_states" })).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({ "id": 12, "type": "get_states" }));
    }

    #[test]
    fn command_frame_rejects_non_objects() {
        assert!(command_frame(1, json!(["get_states"])).is_err());
        assert!(command_frame(1, json!({ "domain": "light" })).is_err());
    }

    #[test]
    fn auth_frame_carries_token() {
        let token = SecretString::from("abc".to_string());
        let value: Value = serde_json::from_str(&auth_frame(&token)).unwrap();
        assert_eq!(value, json!({ "type": "auth", "access_token": "abc" }));
    }
}
