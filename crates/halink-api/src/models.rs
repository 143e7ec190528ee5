// Wire models for Home Assistant registry and state payloads.
//
// Every struct is lenient: optional fields default, and unknown fields are
// either ignored (registries) or captured in `extra` (states, schedules) so
// nothing the server sends about an entity is silently dropped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A live state object as returned by `get_states` and carried by
/// `state_changed` events.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityState {
    #[serde(default)]
    pub entity_id: String,

    #[serde(default)]
    pub state: String,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    /// `last_changed`, `last_updated`, `context`, and anything else.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EntityState {
    /// The `friendly_name` attribute, if it is a string.
    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.get("friendly_name").and_then(Value::as_str)
    }
}

/// Entry of `config/floor_registry/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorEntry {
    pub floor_id: String,
    pub name: String,
    /// Ordering rank; floors without one sort as level 0.
    #[serde(default)]
    pub level: Option<i64>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Entry of `config/area_registry/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaEntry {
    pub area_id: String,
    pub name: String,
    #[serde(default)]
    pub floor_id: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Entry of `config/entity_registry/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRegistryEntry {
    pub entity_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Entry of `config/device_registry/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRegistryEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Entry of `config/label_registry/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEntry {
    pub label_id: String,
    pub name: String,
}

/// A scheduler-component schedule as returned by `scheduler/schedules`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub schedule_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Weekdays, timeslots, repeat type, tags, etc.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn entity_state_keeps_unknown_fields() {
        let raw = serde_json::json!({
            "entity_id": "light.kitchen",
            "state": "on",
            "attributes": { "friendly_name": "Kitchen", "brightness": 180 },
            "last_changed": "2026-02-10T12:00:00+00:00",
            "context": { "id": "01H" }
        });

        let state: EntityState = serde_json::from_value(raw).unwrap();
        assert_eq!(state.entity_id, "light.kitchen");
        assert_eq!(state.friendly_name(), Some("Kitchen"));
        assert_eq!(state.extra["last_changed"], "2026-02-10T12:00:00+00:00");
        assert_eq!(state.extra["context"]["id"], "01H");
    }

    #[test]
    fn sparse_state_defaults() {
        let state: EntityState = serde_json::from_value(serde_json::json!({ "state": "off" })).unwrap();
        assert!(state.entity_id.is_empty());
        assert!(state.attributes.is_empty());
        assert_eq!(state.state, "off");
    }

    #[test]
    fn registry_entry_without_labels() {
        let entry: EntityRegistryEntry = serde_json::from_value(serde_json::json!({
            "entity_id": "switch.fan",
            "area_id": "office",
            "platform": "zha"
        }))
        .unwrap();
        assert!(entry.labels.is_empty());
        assert_eq!(entry.area_id.as_deref(), Some("office"));
        assert!(entry.name.is_none());
    }

    #[test]
    fn schedule_defaults_to_enabled() {
        let schedule: Schedule = serde_json::from_value(serde_json::json!({
            "schedule_id": "a1b2c3",
            "weekdays": ["daily"]
        }))
        .unwrap();
        assert!(schedule.enabled);
        assert_eq!(schedule.extra["weekdays"][0], "daily");
    }
}
