// ── Cold start and delta application ──
//
// A cold start replaces the whole mirror from a joined registry + state
// snapshot. A delta (hot reconnect, push event) only patches entities that
// already exist; nothing is added or removed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use halink_api::models::{
    AreaEntry, DeviceRegistryEntry, EntityRegistryEntry, EntityState, FloorEntry, LabelEntry,
};
use indexmap::IndexSet;

use super::DataStore;
use crate::model::{Area, Entity, Floor};

/// Everything fetched during a cold start.
#[derive(Debug, Default)]
pub(crate) struct ColdStartSnapshot {
    pub floors: Vec<FloorEntry>,
    pub areas: Vec<AreaEntry>,
    pub entity_registry: Vec<EntityRegistryEntry>,
    pub states: Vec<EntityState>,
    pub devices: Vec<DeviceRegistryEntry>,
    pub labels: Vec<LabelEntry>,
}

impl DataStore {
    /// Replace the mirror with a fresh cold-start snapshot and select the
    /// lowest floor.
    pub(crate) fn apply_cold_start(&self, snap: ColdStartSnapshot) {
        let mut floors: Vec<Floor> = snap.floors.into_iter().map(Floor::from).collect();
        floors.sort_by_key(|f| f.level);
        let areas: Vec<Area> = snap.areas.into_iter().map(Area::from).collect();

        let registry: HashMap<&str, &EntityRegistryEntry> = snap
            .entity_registry
            .iter()
            .map(|e| (e.entity_id.as_str(), e))
            .collect();
        let devices: HashMap<&str, &DeviceRegistryEntry> =
            snap.devices.iter().map(|d| (d.id.as_str(), d)).collect();
        let label_names: HashMap<&str, &str> = snap
            .labels
            .iter()
            .map(|l| (l.label_id.as_str(), l.name.as_str()))
            .collect();

        let entities = snap.states.into_iter().filter(|s| !s.entity_id.is_empty()).map(|state| {
            let entry = registry.get(state.entity_id.as_str()).copied();

            let mut label_ids: IndexSet<&str> = IndexSet::new();
            if let Some(entry) = entry {
                label_ids.extend(entry.labels.iter().map(String::as_str));
                if let Some(device) = entry.device_id.as_deref().and_then(|id| devices.get(id)) {
                    label_ids.extend(device.labels.iter().map(String::as_str));
                }
            }
            let labels = label_ids
                .into_iter()
                .map(|id| label_names.get(id).copied().unwrap_or(id).to_owned())
                .collect();

            let name = entry
                .and_then(|e| e.name.clone())
                .filter(|n| !n.is_empty())
                .or_else(|| state.friendly_name().map(str::to_owned))
                .unwrap_or_else(|| state.entity_id.clone());
            let area_id = entry.and_then(|e| e.area_id.clone());

            (
                state.entity_id.clone(),
                Entity::from_state(state, area_id, name, labels),
            )
        });

        self.entities.replace_all(entities);
        self.areas.send_replace(Arc::new(areas));
        let first_floor = floors.first().map(|f| f.floor_id.clone());
        self.floors.send_replace(Arc::new(floors));

        match first_floor {
            Some(floor_id) => self.select_floor(&floor_id),
            None => {
                self.active_floor.send_replace(None);
                self.active_area.send_replace(None);
            }
        }
        self.last_full_refresh.send_replace(Some(Utc::now()));
    }

    /// Merge a full state listing into existing entities. Unknown ids are
    /// ignored. Returns how many entities changed.
    pub(crate) fn apply_delta(&self, states: &[EntityState]) -> usize {
        let incoming: HashMap<&str, &EntityState> =
            states.iter().map(|s| (s.entity_id.as_str(), s)).collect();

        self.entities
            .patch_many(incoming.keys().copied(), |key, current| {
                incoming.get(key).map(|state| current.merged(state))
            })
    }

    /// Merge one pushed state into the entity `entity_id`. Returns `false`
    /// if the entity is unknown or nothing changed.
    pub(crate) fn apply_entity_state(&self, entity_id: &str, state: &EntityState) -> bool {
        self.last_event.send_replace(Some(Utc::now()));
        self.entities
            .patch_many([entity_id], |_, current| Some(current.merged(state)))
            > 0
    }
}
