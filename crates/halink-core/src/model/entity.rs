// ── Entity domain type ──

use chrono::{DateTime, Utc};
use halink_api::models::EntityState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A mirrored entity: live state joined with its registry context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: String,
    pub state: String,
    pub attributes: Map<String, Value>,
    /// Area from the entity registry, fixed at cold start.
    pub area_id: Option<String>,
    /// Registry name, else `friendly_name`, else the raw id.
    pub name: String,
    /// Label display names: entity labels then device labels, de-duplicated.
    pub labels: Vec<String>,
    pub last_changed: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Other state fields (`context`, timestamps, ...) as received.
    pub extra: Map<String, Value>,
}

impl Entity {
    pub(crate) fn from_state(
        state: EntityState,
        area_id: Option<String>,
        name: String,
        labels: Vec<String>,
    ) -> Self {
        Self {
            last_changed: timestamp(&state.extra, "last_changed"),
            last_updated: timestamp(&state.extra, "last_updated"),
            entity_id: state.entity_id,
            state: state.state,
            attributes: state.attributes,
            area_id,
            name,
            labels,
            extra: state.extra,
        }
    }

    /// This entity with state, attributes and other state fields taken from
    /// `incoming`. Identity, area, name and labels are kept.
    pub(crate) fn merged(&self, incoming: &EntityState) -> Self {
        Self {
            entity_id: self.entity_id.clone(),
            state: incoming.state.clone(),
            attributes: incoming.attributes.clone(),
            area_id: self.area_id.clone(),
            name: self.name.clone(),
            labels: self.labels.clone(),
            last_changed: timestamp(&incoming.extra, "last_changed").or(self.last_changed),
            last_updated: timestamp(&incoming.extra, "last_updated").or(self.last_updated),
            extra: {
                let mut extra = self.extra.clone();
                extra.extend(incoming.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
                extra
            },
        }
    }

    /// Prefix of the id before the first `.` (`light` for `light.kitchen`).
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map_or(self.entity_id.as_str(), |(domain, _)| domain)
    }

    pub fn is_on(&self) -> bool {
        self.state == "on"
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self.state.as_str(), "unavailable" | "unknown")
    }

    /// The state parsed as a number (`input_number`, sensors).
    pub fn numeric_state(&self) -> Option<f64> {
        self.state.parse().ok()
    }

    pub fn unit_of_measurement(&self) -> Option<&str> {
        self.attributes
            .get("unit_of_measurement")
            .and_then(Value::as_str)
    }
}

fn timestamp(fields: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    let raw = fields.get(key)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn state(value: serde_json::Value) -> EntityState {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn domain_is_prefix_before_first_dot() {
        let entity = Entity::from_state(
            state(json!({ "entity_id": "input_number.living.target", "state": "21" })),
            None,
            "Target".into(),
            Vec::new(),
        );
        assert_eq!(entity.domain(), "input_number");
        assert_eq!(entity.numeric_state(), Some(21.0));
    }

    #[test]
    fn merge_keeps_registry_context() {
        let entity = Entity::from_state(
            state(json!({
                "entity_id": "light.kitchen",
                "state": "off",
                "attributes": { "brightness": 10 },
                "last_changed": "2026-02-10T12:00:00+00:00"
            })),
            Some("kitchen".into()),
            "Kitchen".into(),
            vec!["Evening".into()],
        );

        let merged = entity.merged(&state(json!({
            "entity_id": "light.kitchen",
            "state": "on",
            "attributes": { "color_mode": "xy" },
            "last_changed": "2026-02-10T13:30:00+01:00"
        })));

        assert!(merged.is_on());
        assert_eq!(merged.area_id.as_deref(), Some("kitchen"));
        assert_eq!(merged.name, "Kitchen");
        assert_eq!(merged.labels, vec!["Evening".to_string()]);
        // Attributes are replaced, not merged.
        assert!(merged.attributes.get("brightness").is_none());
        assert_eq!(
            merged.last_changed.unwrap().to_rfc3339(),
            "2026-02-10T12:30:00+00:00"
        );
    }
}
