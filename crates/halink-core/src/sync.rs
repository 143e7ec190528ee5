// ── Synchronization engine ──
//
// Populates the DataStore after every successful connect (cold start or
// hot reconnect), merges pushed state changes, and owns the dashboard and
// scheduler subscriptions of the current session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use halink_api::{Session, StateChange, Subscription};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::Schedule;
use crate::state::ConnectionState;
use crate::store::{ColdStartSnapshot, DataStore};

/// Which population path `load_initial_data` took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    /// The mirror was empty and was built from scratch.
    ColdStart { entities: usize },
    /// The mirror was patched from a fresh state listing.
    HotReconnect { changed: usize },
}

pub struct SyncEngine {
    store: Arc<DataStore>,
    state: watch::Receiver<ConnectionState>,
    dashboard_domains: Vec<String>,
    entity_subscription: Mutex<Option<Subscription>>,
    scheduler_subscription: Mutex<Option<Subscription>>,
}

fn slot(mutex: &Mutex<Option<Subscription>>) -> MutexGuard<'_, Option<Subscription>> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncEngine {
    pub fn new(
        store: Arc<DataStore>,
        state: watch::Receiver<ConnectionState>,
        dashboard_domains: Vec<String>,
    ) -> Self {
        Self {
            store,
            state,
            dashboard_domains,
            entity_subscription: Mutex::new(None),
            scheduler_subscription: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.store
    }

    /// Populate the mirror from `session`: a full cold start when it is
    /// empty, otherwise a state-only delta. Subscriptions and the schedule
    /// list are (re)established either way; their failures are logged,
    /// not returned.
    pub async fn load_initial_data(&self, session: &Session) -> Result<LoadKind, CoreError> {
        if self.store.is_empty() {
            self.cold_start(session).await
        } else {
            self.hot_reconnect(session).await
        }
    }

    async fn cold_start(&self, session: &Session) -> Result<LoadKind, CoreError> {
        let (floors, areas, entity_registry, states, devices, labels) = futures_util::try_join!(
            session.get_floors(),
            session.get_areas(),
            session.get_entity_registry(),
            session.get_states(),
            session.get_device_registry(),
            session.get_label_registry(),
        )?;

        info!(
            session = %session.id(),
            floors = floors.len(),
            areas = areas.len(),
            states = states.len(),
            "cold start"
        );

        self.store.apply_cold_start(ColdStartSnapshot {
            floors,
            areas,
            entity_registry,
            states,
            devices,
            labels,
        });

        tokio::join!(
            self.setup_global_subscription(session),
            self.reload_schedules(session),
            self.setup_scheduler_subscription(session),
        );

        Ok(LoadKind::ColdStart {
            entities: self.store.entity_count(),
        })
    }

    async fn hot_reconnect(&self, session: &Session) -> Result<LoadKind, CoreError> {
        let (delta, (), (), ()) = tokio::join!(
            session.get_states(),
            self.reload_schedules(session),
            self.setup_global_subscription(session),
            self.setup_scheduler_subscription(session),
        );

        let changed = self.store.apply_delta(&delta?);
        info!(session = %session.id(), changed, "hot reconnect delta applied");
        Ok(LoadKind::HotReconnect { changed })
    }

    /// Merge one pushed state change. Events without an entity id or a new
    /// state are logged and dropped; so are events for unknown entities.
    pub fn update_entity_state(&self, change: &StateChange) -> bool {
        let Some(entity_id) = change.entity_id() else {
            warn!(?change, "dropping state change without entity id");
            return false;
        };
        let Some(new_state) = change.new_state.as_ref() else {
            warn!(entity_id, "dropping state change without new state");
            return false;
        };

        let applied = self.store.apply_entity_state(entity_id, new_state);
        if !applied && self.store.entity(entity_id).is_none() {
            debug!(entity_id, "state change for unknown entity");
        }
        applied
    }

    /// Subscribe to every dashboard entity (in an area, domain allow-listed).
    pub async fn setup_global_subscription(&self, session: &Session) {
        let ids = self.store.dashboard_entity_ids(&self.dashboard_domains);
        self.update_subscription(session, &ids).await;
    }

    /// Replace the dashboard subscription with one covering exactly `ids`.
    ///
    /// No-op unless connected. The previous subscription is always torn
    /// down first; an empty `ids` leaves none active.
    pub async fn update_subscription(&self, session: &Session, ids: &[String]) {
        if !self.state.borrow().is_connected() {
            debug!("not connected, skipping entity subscription");
            return;
        }

        let previous = slot(&self.entity_subscription).take();
        if let Some(previous) = previous {
            previous.teardown();
        }
        if ids.is_empty() {
            return;
        }

        match session.subscribe_entities(ids).await {
            Ok(subscription) => {
                debug!(subscription = subscription.id(), entities = ids.len(), "entity subscription active");
                let stale = slot(&self.entity_subscription).replace(subscription);
                if let Some(stale) = stale {
                    stale.teardown();
                }
            }
            Err(e) => warn!(error = %e, "failed to subscribe to entities"),
        }
    }

    /// Replace the `scheduler_updated` subscription.
    pub async fn setup_scheduler_subscription(&self, session: &Session) {
        if !self.state.borrow().is_connected() {
            return;
        }

        let previous = slot(&self.scheduler_subscription).take();
        if let Some(previous) = previous {
            previous.teardown();
        }

        match session.subscribe_scheduler().await {
            Ok(subscription) => {
                let stale = slot(&self.scheduler_subscription).replace(subscription);
                if let Some(stale) = stale {
                    stale.teardown();
                }
            }
            Err(e) => warn!(error = %e, "failed to subscribe to scheduler updates"),
        }
    }

    /// Whether `subscription` is the active scheduler subscription.
    pub fn is_scheduler_subscription(&self, subscription: u64) -> bool {
        slot(&self.scheduler_subscription)
            .as_ref()
            .is_some_and(|s| s.id() == subscription)
    }

    /// Fetch the schedule list into the store.
    pub async fn load_schedules(&self, session: &Session) -> Result<usize, CoreError> {
        let schedules: Vec<Schedule> = session
            .get_schedules()
            .await?
            .into_iter()
            .map(Schedule::from)
            .collect();
        let count = schedules.len();
        self.store.set_schedules(schedules);
        Ok(count)
    }

    /// [`load_schedules`](Self::load_schedules), keeping the previous list
    /// on failure.
    pub async fn reload_schedules(&self, session: &Session) {
        match self.load_schedules(session).await {
            Ok(count) => debug!(count, "schedules loaded"),
            Err(e) => warn!(error = %e, "failed to load schedules"),
        }
    }

    /// Forget both subscriptions without unsubscribing; used when the
    /// session that owns them is going away.
    pub fn clear_subscriptions(&self) {
        slot(&self.entity_subscription).take();
        slot(&self.scheduler_subscription).take();
    }

    pub fn entity_subscription_id(&self) -> Option<u64> {
        slot(&self.entity_subscription).as_ref().map(Subscription::id)
    }
}
