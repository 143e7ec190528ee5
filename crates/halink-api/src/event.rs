// ── Push events ──
//
// The server delivers state changes in two shapes: a plain `state_changed`
// event (`event.data`) and a `subscribe_trigger` event
// (`event.variables.trigger`). Both are normalized to one `StateChange`.

use serde_json::Value;

use crate::models::EntityState;

/// A typed push event handed to the session's event sink.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A state change in either wire shape, normalized.
    StateChanged(StateChange),

    /// Any other event; routed by the id of the subscription that produced it.
    Other { subscription: u64, event: Value },

    /// The channel closed after the handshake had succeeded.
    Closed { reason: String },
}

/// A normalized entity state transition.
///
/// Fields stay optional here: well-formedness is checked by the consumer
/// that applies the change, which logs and drops anything unusable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateChange {
    pub entity_id: Option<String>,
    pub new_state: Option<EntityState>,
    pub old_state: Option<EntityState>,
}

impl StateChange {
    /// The affected entity id: the explicit one, else the one inside `new_state`.
    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or_else(|| {
                self.new_state
                    .as_ref()
                    .map(|s| s.entity_id.as_str())
                    .filter(|id| !id.is_empty())
            })
    }
}

/// Turn the `event` object of an `event` frame into a [`SessionEvent`].
pub fn classify(subscription: u64, event: Value) -> SessionEvent {
    match normalize(&event) {
        Some(change) => SessionEvent::StateChanged(change),
        None => SessionEvent::Other {
            subscription,
            event,
        },
    }
}

/// Normalize a state-change event body. Returns `None` when the event is
/// not a state change in either known shape.
pub fn normalize(event: &Value) -> Option<StateChange> {
    if let Some(trigger) = event.pointer("/variables/trigger").filter(|t| t.is_object()) {
        return Some(from_trigger(trigger));
    }

    let data = event.get("data").filter(|d| d.is_object())?;
    let looks_like_state_change = data.get("new_state").is_some()
        || data.get("old_state").is_some()
        || event.get("event_type").and_then(Value::as_str) == Some("state_changed");
    if !looks_like_state_change {
        return None;
    }

    Some(StateChange {
        entity_id: data.get("entity_id").and_then(Value::as_str).map(String::from),
        new_state: parse_state(data.get("new_state")),
        old_state: parse_state(data.get("old_state")),
    })
}

fn from_trigger(trigger: &Value) -> StateChange {
    let mut new_state = parse_state(trigger.get("to_state"));
    let old_state = parse_state(trigger.get("from_state"));

    let entity_id = trigger
        .get("entity_id")
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| {
            new_state
                .as_ref()
                .map(|s| s.entity_id.clone())
                .filter(|id| !id.is_empty())
        });

    // Sparse trigger payloads may omit the id inside `to_state`.
    if let (Some(id), Some(state)) = (&entity_id, new_state.as_mut()) {
        if state.entity_id.is_empty() {
            state.entity_id.clone_from(id);
        }
    }

    StateChange {
        entity_id,
        new_state,
        old_state,
    }
}

fn parse_state(value: Option<&Value>) -> Option<EntityState> {
    let value = value.filter(|v| v.is_object())?;
    match serde_json::from_value(value.clone()) {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring unparsable state object");
            None
        }
    }
}
