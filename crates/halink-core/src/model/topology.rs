// ── Floors and areas ──

use halink_api::models::{AreaEntry, FloorEntry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Floor {
    pub floor_id: String,
    pub name: String,
    /// Ordering rank; floors without one rank as 0.
    pub level: i64,
    pub icon: Option<String>,
}

impl From<FloorEntry> for Floor {
    fn from(entry: FloorEntry) -> Self {
        Self {
            floor_id: entry.floor_id,
            name: entry.name,
            level: entry.level.unwrap_or(0),
            icon: entry.icon,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub area_id: String,
    pub name: String,
    pub floor_id: Option<String>,
    pub icon: Option<String>,
}

impl From<AreaEntry> for Area {
    fn from(entry: AreaEntry) -> Self {
        Self {
            area_id: entry.area_id,
            name: entry.name,
            floor_id: entry.floor_id,
            icon: entry.icon,
        }
    }
}
