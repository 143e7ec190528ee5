// ── Controller abstraction ──
//
// Owns the single live session to a Home Assistant instance: first
// connect, the serialized reconnect loop, zombie detection, the event
// bridge into the sync engine, and command routing.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use arc_swap::ArcSwapOption;
use halink_api::{SchedulerClient, Session, SessionEvent};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{ConnectionConfig, Credentials};
use crate::credentials::{CredentialStore, TOKEN_KEY, URL_KEY};
use crate::error::CoreError;
use crate::model::{Area, Entity, Floor, Schedule};
use crate::state::{ConnectionState, Transition};
use crate::store::DataStore;
use crate::stream::EntityChanges;
use crate::sync::{LoadKind, SyncEngine};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Controller ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. At most one session is
/// current at a time; work started for a superseded session is discarded
/// when it completes.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ConnectionConfig,
    credential_store: Arc<dyn CredentialStore>,
    /// Credentials of the running connection; cleared by `cancel_reconnect`.
    credentials: Mutex<Option<Credentials>>,
    session: ArcSwapOption<Session>,
    connection_state: watch::Sender<ConnectionState>,
    store: Arc<DataStore>,
    sync: SyncEngine,
    /// Held while a reconnect loop (or a direct recovery attempt) runs.
    reconnect_lock: AtomicBool,
    attempt: AtomicU32,
    /// Bumped by every `cancel_reconnect`; recovery started before a
    /// cancel must not continue after it.
    cancel_epoch: AtomicU64,
    /// Wakes the reconnect loop out of its backoff sleep.
    sleep_cancel: Mutex<CancellationToken>,
    /// Stops the event bridge of the current session.
    bridge_cancel: Mutex<Option<CancellationToken>>,
}

impl Controller {
    /// Create a controller. Does NOT connect; call
    /// [`init_connection`](Self::init_connection) or
    /// [`reconnect`](Self::reconnect).
    pub fn new(config: ConnectionConfig, credential_store: Arc<dyn CredentialStore>) -> Self {
        let store = Arc::new(DataStore::new());
        let (connection_state, state_rx) = watch::channel(ConnectionState::Disconnected);
        let sync = SyncEngine::new(
            Arc::clone(&store),
            state_rx,
            config.dashboard_domains.clone(),
        );

        Self {
            inner: Arc::new(ControllerInner {
                config,
                credential_store,
                credentials: Mutex::new(None),
                session: ArcSwapOption::empty(),
                connection_state,
                store,
                sync,
                reconnect_lock: AtomicBool::new(false),
                attempt: AtomicU32::new(0),
                cancel_epoch: AtomicU64::new(0),
                sleep_cancel: Mutex::new(CancellationToken::new()),
                bridge_cancel: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    pub fn sync(&self) -> &SyncEngine {
        &self.inner.sync
    }

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.connection_state.borrow()
    }

    /// Id of the current session, if any.
    pub fn session_id(&self) -> Option<Uuid> {
        self.inner.session.load().as_ref().map(|s| s.id())
    }

    /// Whether a reconnect loop currently holds the lock.
    pub fn is_reconnecting(&self) -> bool {
        self.inner.reconnect_lock.load(Ordering::Acquire)
    }

    /// Attempt number of the running (or last) reconnect loop.
    pub fn reconnect_attempt(&self) -> u32 {
        self.inner.attempt.load(Ordering::Relaxed)
    }

    /// In-memory credentials, falling back to the credential store.
    pub fn credentials(&self) -> Option<Credentials> {
        if let Some(creds) = lock(&self.inner.credentials).clone() {
            return Some(creds);
        }

        let url = self.inner.credential_store.get(URL_KEY)?;
        let token = self.inner.credential_store.get(TOKEN_KEY)?;
        match Url::parse(&url) {
            Ok(url) => Some(Credentials {
                url,
                token: SecretString::from(token),
            }),
            Err(e) => {
                warn!(%url, error = %e, "ignoring stored credentials with invalid URL");
                None
            }
        }
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Validate, remember and persist `url` + `token`, then connect.
    ///
    /// Any previous session is torn down first. On an auth rejection the
    /// state becomes `AuthFailed`; the stored token is left in place.
    pub async fn init_connection(&self, url: &str, token: &str) -> Result<(), CoreError> {
        let url = url.trim();
        let token = token.trim();
        if url.is_empty() || token.is_empty() {
            return Err(CoreError::Validation {
                message: "URL and access token are required".into(),
            });
        }
        let parsed = Url::parse(url).map_err(|e| CoreError::Validation {
            message: format!("invalid URL {url}: {e}"),
        })?;
        if !matches!(parsed.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(CoreError::Validation {
                message: format!("unsupported URL scheme: {}", parsed.scheme()),
            });
        }

        let creds = Credentials {
            url: parsed,
            token: SecretString::from(token.to_owned()),
        };
        *lock(&self.inner.credentials) = Some(creds.clone());
        self.persist(&creds);

        self.connect_with(&creds).await
    }

    /// Reconnect with backoff until connected, cancelled, rejected, or out
    /// of attempts. A second call while a loop is running is a no-op.
    pub async fn reconnect(&self) {
        let Some(creds) = self.credentials() else {
            debug!("no credentials, not reconnecting");
            return;
        };
        if !self.try_acquire() {
            debug!("reconnect already in progress");
            return;
        }
        let epoch = self.cancel_epoch();
        *lock(&self.inner.credentials) = Some(creds.clone());

        let wake = CancellationToken::new();
        *lock(&self.inner.sleep_cancel) = wake.clone();
        let policy = self.inner.config.reconnect.clone();

        let mut attempt = 1;
        while !self.cancelled_since(epoch) && attempt <= policy.max_attempts {
            self.inner.attempt.store(attempt, Ordering::Relaxed);
            self.transition(Transition::ReconnectAttempt(attempt));

            let outcome = self.connect_with(&creds).await;
            if self.cancelled_since(epoch) {
                debug!("reconnect cancelled");
                return;
            }
            match outcome {
                Ok(()) => {
                    info!(attempt, "reconnected");
                    self.release();
                    self.inner.attempt.store(0, Ordering::Relaxed);
                    return;
                }
                Err(e) if e.is_auth_failure() => {
                    warn!(error = %e, "access token rejected, clearing stored token");
                    self.forget_token();
                    self.transition(Transition::AuthRejected);
                    self.release();
                    return;
                }
                Err(e) => {
                    let delay = policy.delay(attempt);
                    warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "reconnect attempt failed"
                    );
                    // A failed initial load passes through `connected`.
                    self.transition(Transition::ReconnectAttempt(attempt));
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = wake.cancelled() => debug!("reconnect backoff interrupted"),
                    }
                    attempt += 1;
                }
            }
        }

        if self.cancelled_since(epoch) {
            debug!("reconnect cancelled");
        } else if self.inner.reconnect_lock.swap(false, Ordering::AcqRel) {
            warn!(attempts = policy.max_attempts, "giving up on reconnect");
            self.transition(Transition::RetriesExhausted);
        }
    }

    /// Stop a running reconnect loop and tear everything down.
    ///
    /// In-memory credentials are forgotten; persisted ones are kept.
    pub fn cancel_reconnect(&self) {
        self.inner.cancel_epoch.fetch_add(1, Ordering::AcqRel);
        self.release();
        lock(&self.inner.sleep_cancel).cancel();
        self.transition(Transition::Cancelled);
        self.teardown();
        *lock(&self.inner.credentials) = None;
        info!("reconnect cancelled");
    }

    /// Ping the current session. A failed probe tears the session down and
    /// returns `false`; a probe that outlives its session counts as alive.
    pub async fn verify_connection(&self) -> bool {
        if !self.state().is_connected() {
            return false;
        }
        let Some(session) = self.inner.session.load_full() else {
            return false;
        };

        let alive = session.ping(self.inner.config.ping_timeout).await;
        if !self.is_current(&session) {
            return true;
        }
        if alive {
            return true;
        }

        warn!(session = %session.id(), "liveness probe failed, dropping session");
        self.teardown();
        if !self.is_reconnecting() {
            self.transition(Transition::ChannelLost);
        }
        false
    }

    /// Recover the connection if it is missing or dead. Call on resume,
    /// focus, network change or a periodic tick.
    pub async fn check_and_reconnect(&self) {
        let epoch = self.cancel_epoch();
        let state = self.state();

        if state.is_connected() {
            if self.verify_connection().await {
                return;
            }
            if self.is_reconnecting() || self.cancelled_since(epoch) {
                return;
            }
            self.inner.attempt.store(0, Ordering::Relaxed);
            self.reconnect().await;
            return;
        }

        if state == ConnectionState::AuthFailed {
            debug!("token was rejected, waiting for new credentials");
            return;
        }
        if state == ConnectionState::Connecting || self.is_reconnecting() {
            return;
        }
        let Some(creds) = self.credentials() else {
            return;
        };
        if !self.try_acquire() {
            return;
        }

        let direct = self.connect_with(&creds).await;
        if self.cancelled_since(epoch) {
            // The lock was already released by the cancel and may belong
            // to a newer loop by now.
            debug!("recovery cancelled during direct connect");
            return;
        }
        self.release();
        match direct {
            Ok(()) => info!("connection restored"),
            Err(e) if e.is_auth_failure() => {
                warn!(error = %e, "access token rejected, clearing stored token");
                self.forget_token();
                self.transition(Transition::AuthRejected);
            }
            Err(e) => {
                debug!(error = %e, "direct reconnect failed, starting backoff loop");
                self.reconnect().await;
            }
        }
    }

    /// Tear down the current session immediately.
    pub fn force_disconnect(&self) {
        self.teardown();
        self.transition(Transition::Cancelled);
        info!("disconnected");
    }

    // ── Services ─────────────────────────────────────────────────

    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: Option<Value>,
        target: Option<Value>,
    ) -> Result<Value, CoreError> {
        let session = self.current_session()?;
        debug!(domain, service, "calling service");
        Ok(session.call_service(domain, service, data, target).await?)
    }

    /// `turn_on` / `turn_off` for `entity_id`. The domain defaults to the
    /// entity id prefix.
    pub async fn toggle_entity(
        &self,
        entity_id: &str,
        on: bool,
        domain: Option<&str>,
    ) -> Result<Value, CoreError> {
        let domain = match domain {
            Some(domain) => domain,
            None => entity_domain(entity_id)?,
        };
        let service = if on { "turn_on" } else { "turn_off" };
        self.call_service(domain, service, None, Some(json!({ "entity_id": entity_id })))
            .await
    }

    /// `input_number.set_value`; `value` must parse as a number.
    pub async fn set_number(&self, entity_id: &str, value: &str) -> Result<Value, CoreError> {
        let number: f64 = value
            .trim()
            .parse()
            .ok()
            .filter(|n: &f64| n.is_finite())
            .ok_or_else(|| CoreError::Validation {
                message: format!("not a number: {value:?}"),
            })?;
        self.call_service(
            "input_number",
            "set_value",
            Some(json!({ "value": number })),
            Some(json!({ "entity_id": entity_id })),
        )
        .await
    }

    /// Narrow (or widen) the push subscription to exactly `entity_ids`.
    pub async fn update_subscription(&self, entity_ids: &[String]) -> Result<(), CoreError> {
        let session = self.current_session()?;
        self.inner.sync.update_subscription(&session, entity_ids).await;
        Ok(())
    }

    // ── Schedules ────────────────────────────────────────────────

    pub async fn load_schedules(&self) -> Result<usize, CoreError> {
        let session = self.current_session()?;
        self.inner.sync.load_schedules(&session).await
    }

    pub async fn add_schedule(&self, schedule: &Value) -> Result<Value, CoreError> {
        Ok(self.scheduler()?.add(schedule).await?)
    }

    pub async fn edit_schedule(&self, schedule_id: &str, schedule: &Value) -> Result<Value, CoreError> {
        Ok(self.scheduler()?.edit(schedule_id, schedule).await?)
    }

    pub async fn delete_schedule(&self, schedule_id: &str) -> Result<Value, CoreError> {
        Ok(self.scheduler()?.remove(schedule_id).await?)
    }

    // ── Store shortcuts ──────────────────────────────────────────

    pub fn entities_snapshot(&self) -> Arc<Vec<Arc<Entity>>> {
        self.inner.store.entities_snapshot()
    }

    pub fn entity(&self, entity_id: &str) -> Option<Arc<Entity>> {
        self.inner.store.entity(entity_id)
    }

    pub fn floors_snapshot(&self) -> Arc<Vec<Floor>> {
        self.inner.store.floors_snapshot()
    }

    pub fn areas_snapshot(&self) -> Arc<Vec<Area>> {
        self.inner.store.areas_snapshot()
    }

    pub fn schedules_snapshot(&self) -> Arc<Vec<Schedule>> {
        self.inner.store.schedules_snapshot()
    }

    pub fn entity_changes(&self, only: &[String]) -> EntityChanges {
        self.inner.store.entity_changes(only)
    }

    pub fn select_floor(&self, floor_id: &str) {
        self.inner.store.select_floor(floor_id);
    }

    pub fn select_area(&self, area_id: &str) {
        self.inner.store.select_area(area_id);
    }

    // ── Internals ────────────────────────────────────────────────

    /// One full connect: open + auth, populate the mirror, start the event
    /// bridge. Always replaces the current session.
    async fn connect_with(&self, creds: &Credentials) -> Result<(), CoreError> {
        self.teardown();
        self.transition(Transition::ConnectStarted);

        let session = match Session::new(
            creds.url.clone(),
            creds.token.clone(),
            self.inner.config.transport(),
        ) {
            Ok(session) => session,
            Err(e) => {
                self.transition(Transition::ChannelLost);
                return Err(e.into());
            }
        };
        self.inner.session.store(Some(Arc::new(session.clone())));
        debug!(session = %session.id(), endpoint = %session.endpoint(), "connecting");

        if let Err(e) = session.connect().await {
            let current = self.is_current(&session);
            if current {
                self.inner.session.store(None);
            }
            session.disconnect();
            if e.is_auth_failure() {
                self.transition(Transition::AuthRejected);
            } else if current {
                self.transition(Transition::ChannelLost);
            }
            return Err(e.into());
        }

        if !self.is_current(&session) {
            debug!(session = %session.id(), "session superseded during handshake");
            session.disconnect();
            return Err(CoreError::Disconnected);
        }

        self.transition(Transition::Authenticated);
        let events = session.take_events();

        match self.inner.sync.load_initial_data(&session).await {
            Ok(LoadKind::ColdStart { entities }) => {
                info!(session = %session.id(), entities, "connected");
            }
            Ok(LoadKind::HotReconnect { changed }) => {
                info!(session = %session.id(), changed, "reconnected with delta");
            }
            Err(e) => {
                warn!(session = %session.id(), error = %e, "initial data load failed");
                if self.is_current(&session) {
                    self.teardown();
                    self.transition(Transition::ChannelLost);
                } else {
                    session.disconnect();
                }
                return Err(e);
            }
        }

        if !self.is_current(&session) {
            session.disconnect();
            return Err(CoreError::Disconnected);
        }
        if let Some(events) = events {
            self.spawn_bridge(session, events);
        }
        Ok(())
    }

    /// Forward session events into the sync engine until the session ends.
    fn spawn_bridge(&self, session: Session, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        let cancel = CancellationToken::new();
        if let Some(previous) = lock(&self.inner.bridge_cancel).replace(cancel.clone()) {
            previous.cancel();
        }
        let weak: Weak<ControllerInner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let controller = Controller { inner };
                if !controller.is_current(&session) {
                    debug!(session = %session.id(), "dropping event from superseded session");
                    break;
                }

                match event {
                    SessionEvent::StateChanged(change) => {
                        controller.inner.sync.update_entity_state(&change);
                    }
                    SessionEvent::Other { subscription, .. } => {
                        if controller.inner.sync.is_scheduler_subscription(subscription) {
                            let session = session.clone();
                            tokio::spawn(async move {
                                controller.inner.sync.reload_schedules(&session).await;
                            });
                        }
                    }
                    SessionEvent::Closed { reason } => {
                        warn!(session = %session.id(), %reason, "connection closed");
                        controller.teardown();
                        controller.transition(Transition::ChannelLost);
                        break;
                    }
                }
            }
            debug!(session = %session.id(), "event bridge stopped");
        });
    }

    fn current_session(&self) -> Result<Arc<Session>, CoreError> {
        match self.inner.session.load_full() {
            Some(session) if self.state().is_connected() => Ok(session),
            _ => Err(CoreError::Disconnected),
        }
    }

    fn is_current(&self, session: &Session) -> bool {
        self.inner
            .session
            .load()
            .as_ref()
            .is_some_and(|current| current.id() == session.id())
    }

    /// Drop the current session, its subscriptions and its event bridge.
    fn teardown(&self) {
        if let Some(cancel) = lock(&self.inner.bridge_cancel).take() {
            cancel.cancel();
        }
        self.inner.sync.clear_subscriptions();
        if let Some(session) = self.inner.session.swap(None) {
            debug!(session = %session.id(), "tearing down session");
            session.disconnect();
        }
    }

    fn transition(&self, transition: Transition) -> bool {
        self.inner.connection_state.send_if_modified(|state| match state.on(transition) {
            Some(next) if next != *state => {
                debug!(from = ?*state, to = ?next, "connection state");
                *state = next;
                true
            }
            Some(_) => false,
            None => {
                debug!(state = ?*state, ?transition, "ignoring stale transition");
                false
            }
        })
    }

    fn cancel_epoch(&self) -> u64 {
        self.inner.cancel_epoch.load(Ordering::Acquire)
    }

    fn cancelled_since(&self, epoch: u64) -> bool {
        self.cancel_epoch() != epoch
    }

    fn try_acquire(&self) -> bool {
        self.inner
            .reconnect_lock
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        self.inner.reconnect_lock.store(false, Ordering::Release);
    }

    fn persist(&self, creds: &Credentials) {
        let store = &self.inner.credential_store;
        if let Err(e) = store.set(URL_KEY, creds.url.as_str()) {
            warn!(error = %e, "failed to persist instance URL");
        }
        if let Err(e) = store.set(TOKEN_KEY, creds.token.expose_secret()) {
            warn!(error = %e, "failed to persist access token");
        }
    }

    fn forget_token(&self) {
        if let Err(e) = self.inner.credential_store.remove(TOKEN_KEY) {
            warn!(error = %e, "failed to remove stored access token");
        }
    }

    fn scheduler(&self) -> Result<SchedulerClient, CoreError> {
        let creds = self.credentials().ok_or_else(|| CoreError::MissingCredentials {
            message: "no instance URL and token configured".into(),
        })?;
        Ok(SchedulerClient::new(
            creds.url,
            creds.token,
            &self.inner.config.transport(),
        )?)
    }
}

fn entity_domain(entity_id: &str) -> Result<&str, CoreError> {
    match entity_id.split_once('.') {
        Some((domain, object)) if !domain.is_empty() && !object.is_empty() => Ok(domain),
        _ => Err(CoreError::Validation {
            message: format!("not an entity id: {entity_id:?}"),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;

    fn controller() -> (Controller, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        let controller = Controller::new(ConnectionConfig::default(), store.clone());
        (controller, store)
    }

    #[test]
    fn entity_domain_requires_dot() {
        assert_eq!(entity_domain("light.kitchen").unwrap(), "light");
        assert!(entity_domain("kitchen").is_err());
        assert!(entity_domain(".kitchen").is_err());
    }

    #[test]
    fn credentials_fall_back_to_store() {
        let (controller, store) = controller();
        assert!(controller.credentials().is_none());

        store.set(URL_KEY, "http://ha.local:8123").unwrap();
        assert!(controller.credentials().is_none());

        store.set(TOKEN_KEY, "secret").unwrap();
        let creds = controller.credentials().unwrap();
        assert_eq!(creds.url.as_str(), "http://ha.local:8123/");
        assert_eq!(creds.token.expose_secret(), "secret");
    }

    #[test]
    fn invalid_stored_url_is_ignored() {
        let (controller, store) = controller();
        store.set(URL_KEY, "not a url").unwrap();
        store.set(TOKEN_KEY, "secret").unwrap();
        assert!(controller.credentials().is_none());
    }

    #[tokio::test]
    async fn init_connection_rejects_blank_input() {
        let (controller, store) = controller();
        let err = controller.init_connection("  ", "token").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
        assert_eq!(store.get(TOKEN_KEY), None);
        assert_eq!(controller.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn init_connection_rejects_unknown_scheme() {
        let (controller, _) = controller();
        let err = controller
            .init_connection("ftp://ha.local", "token")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn reconnect_without_credentials_is_noop() {
        let (controller, _) = controller();
        controller.reconnect().await;
        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert!(!controller.is_reconnecting());
    }

    #[tokio::test]
    async fn verify_is_false_when_not_connected() {
        let (controller, _) = controller();
        assert!(!controller.verify_connection().await);
    }

    #[tokio::test]
    async fn services_need_a_connection() {
        let (controller, _) = controller();
        let err = controller
            .toggle_entity("light.kitchen", true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Disconnected));
    }

    #[tokio::test]
    async fn set_number_validates_before_sending() {
        let (controller, _) = controller();
        let err = controller
            .set_number("input_number.target", "warm")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn schedules_need_credentials() {
        let (controller, _) = controller();
        let err = controller.delete_schedule("abc").await.unwrap_err();
        assert!(matches!(err, CoreError::MissingCredentials { .. }));
    }
}
