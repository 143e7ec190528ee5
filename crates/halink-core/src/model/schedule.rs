// ── Scheduler component entries ──

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub schedule_id: String,
    pub name: Option<String>,
    pub enabled: bool,
    /// Weekdays, timeslots, repeat type and anything else the component sends.
    pub extra: Map<String, Value>,
}

impl Schedule {
    /// `name`, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.schedule_id)
    }
}

impl From<halink_api::models::Schedule> for Schedule {
    fn from(raw: halink_api::models::Schedule) -> Self {
        Self {
            schedule_id: raw.schedule_id,
            name: raw.name.filter(|n| !n.is_empty()),
            enabled: raw.enabled,
            extra: raw.extra,
        }
    }
}
