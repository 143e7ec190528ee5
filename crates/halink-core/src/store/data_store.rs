// ── Central reactive data store ──
//
// The local mirror of the Home Assistant instance: entities, floors, areas,
// schedules and the active floor/area selection. Mutations are broadcast to
// subscribers via `watch` channels.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::collection::EntityCollection;
use crate::model::{Area, Entity, Floor, Schedule};
use crate::stream::EntityChanges;

/// Central reactive store for the mirrored instance.
///
/// Only the sync engine writes entity data; everything else reads
/// snapshots or subscribes.
pub struct DataStore {
    pub(crate) entities: EntityCollection<Entity>,
    pub(crate) floors: watch::Sender<Arc<Vec<Floor>>>,
    pub(crate) areas: watch::Sender<Arc<Vec<Area>>>,
    pub(crate) schedules: watch::Sender<Arc<Vec<Schedule>>>,
    pub(crate) active_floor: watch::Sender<Option<String>>,
    pub(crate) active_area: watch::Sender<Option<String>>,
    pub(crate) last_full_refresh: watch::Sender<Option<DateTime<Utc>>>,
    pub(crate) last_event: watch::Sender<Option<DateTime<Utc>>>,
}

impl DataStore {
    pub fn new() -> Self {
        let (floors, _) = watch::channel(Arc::new(Vec::new()));
        let (areas, _) = watch::channel(Arc::new(Vec::new()));
        let (schedules, _) = watch::channel(Arc::new(Vec::new()));
        let (active_floor, _) = watch::channel(None);
        let (active_area, _) = watch::channel(None);
        let (last_full_refresh, _) = watch::channel(None);
        let (last_event, _) = watch::channel(None);

        Self {
            entities: EntityCollection::new(),
            floors,
            areas,
            schedules,
            active_floor,
            active_area,
            last_full_refresh,
            last_event,
        }
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    /// All entities, ordered by id.
    pub fn entities_snapshot(&self) -> Arc<Vec<Arc<Entity>>> {
        self.entities.snapshot()
    }

    pub fn entity(&self, entity_id: &str) -> Option<Arc<Entity>> {
        self.entities.get(entity_id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// `true` until the first cold start has populated the mirror.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Bumped on every effective entity change.
    pub fn entities_version(&self) -> u64 {
        self.entities.version()
    }

    /// Floors ordered by ascending level.
    pub fn floors_snapshot(&self) -> Arc<Vec<Floor>> {
        self.floors.borrow().clone()
    }

    pub fn areas_snapshot(&self) -> Arc<Vec<Area>> {
        self.areas.borrow().clone()
    }

    pub fn schedules_snapshot(&self) -> Arc<Vec<Schedule>> {
        self.schedules.borrow().clone()
    }

    pub fn active_floor(&self) -> Option<String> {
        self.active_floor.borrow().clone()
    }

    pub fn active_area(&self) -> Option<String> {
        self.active_area.borrow().clone()
    }

    pub fn last_full_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_full_refresh.borrow()
    }

    /// When the last push event was merged.
    pub fn last_event(&self) -> Option<DateTime<Utc>> {
        *self.last_event.borrow()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// State transitions of `only` (every entity when empty) from now on.
    pub fn entity_changes(&self, only: &[String]) -> EntityChanges {
        EntityChanges::new(self.entities.subscribe(), only)
    }

    pub fn subscribe_floors(&self) -> watch::Receiver<Arc<Vec<Floor>>> {
        self.floors.subscribe()
    }

    pub fn subscribe_areas(&self) -> watch::Receiver<Arc<Vec<Area>>> {
        self.areas.subscribe()
    }

    pub fn subscribe_schedules(&self) -> watch::Receiver<Arc<Vec<Schedule>>> {
        self.schedules.subscribe()
    }

    pub fn subscribe_active_area(&self) -> watch::Receiver<Option<String>> {
        self.active_area.subscribe()
    }

    // ── Topology queries ─────────────────────────────────────────────

    /// Areas on `floor_id`, ordered by name.
    pub fn areas_on_floor(&self, floor_id: &str) -> Vec<Area> {
        let mut areas: Vec<Area> = self
            .areas
            .borrow()
            .iter()
            .filter(|a| a.floor_id.as_deref() == Some(floor_id))
            .cloned()
            .collect();
        areas.sort_by(|a, b| by_display_name(&a.name, &b.name));
        areas
    }

    pub fn entities_in_area(&self, area_id: &str) -> Vec<Arc<Entity>> {
        self.entities
            .snapshot()
            .iter()
            .filter(|e| e.area_id.as_deref() == Some(area_id))
            .cloned()
            .collect()
    }

    /// Ids of entities that belong to an area and whose domain is in
    /// `domains`; the set covered by the dashboard push subscription.
    pub fn dashboard_entity_ids(&self, domains: &[String]) -> Vec<String> {
        self.entities
            .snapshot()
            .iter()
            .filter(|e| e.area_id.is_some() && domains.iter().any(|d| d == e.domain()))
            .map(|e| e.entity_id.clone())
            .collect()
    }

    // ── Selection ────────────────────────────────────────────────────

    /// Make `floor_id` active and select the alphabetically-first area on
    /// it, or clear the area selection if the floor has none.
    pub fn select_floor(&self, floor_id: &str) {
        self.active_floor.send_replace(Some(floor_id.to_owned()));
        match self.areas_on_floor(floor_id).into_iter().next() {
            Some(area) => self.select_area(&area.area_id),
            None => {
                self.active_area.send_replace(None);
            }
        }
    }

    pub fn select_area(&self, area_id: &str) {
        self.active_area.send_replace(Some(area_id.to_owned()));
    }

    pub(crate) fn set_schedules(&self, schedules: Vec<Schedule>) {
        self.schedules.send_replace(Arc::new(schedules));
    }
}

/// Case-insensitive name order, raw order breaking ties.
fn by_display_name(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(id: &str, name: &str, floor: Option<&str>) -> Area {
        Area {
            area_id: id.into(),
            name: name.into(),
            floor_id: floor.map(Into::into),
            icon: None,
        }
    }

    #[test]
    fn select_floor_picks_alphabetically_first_area() {
        let store = DataStore::new();
        store.areas.send_replace(Arc::new(vec![
            area("office", "Office", Some("first")),
            area("bedroom", "Bedroom", Some("first")),
            area("kitchen", "Kitchen", Some("ground")),
        ]));

        store.select_floor("first");
        assert_eq!(store.active_floor().as_deref(), Some("first"));
        assert_eq!(store.active_area().as_deref(), Some("bedroom"));
    }

    #[test]
    fn areas_on_floor_ignore_case_when_ordering() {
        let store = DataStore::new();
        store.areas.send_replace(Arc::new(vec![
            area("zebra", "Zebra room", Some("ground")),
            area("kitchen", "kitchen", Some("ground")),
            area("hall", "Hall", Some("ground")),
            area("hall2", "hall", Some("ground")),
        ]));

        let names: Vec<String> = store
            .areas_on_floor("ground")
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, ["Hall", "hall", "kitchen", "Zebra room"]);

        store.select_floor("ground");
        assert_eq!(store.active_area().as_deref(), Some("hall"));
    }

    #[test]
    fn select_floor_without_areas_clears_area() {
        let store = DataStore::new();
        store.areas.send_replace(Arc::new(vec![area("kitchen", "Kitchen", Some("ground"))]));
        store.select_area("kitchen");

        store.select_floor("attic");
        assert_eq!(store.active_floor().as_deref(), Some("attic"));
        assert_eq!(store.active_area(), None);
    }

    #[test]
    fn select_area_sets_active_area() {
        let store = DataStore::new();
        store.select_area("garage");
        assert_eq!(store.active_area().as_deref(), Some("garage"));
    }
}
