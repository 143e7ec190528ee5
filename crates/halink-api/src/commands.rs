// Typed command helpers on `Session`.
//
// Inherent methods live here rather than in session.rs to keep the channel
// mechanics separate from the command catalogue.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::Error;
use crate::models::{
    AreaEntry, DeviceRegistryEntry, EntityRegistryEntry, EntityState, FloorEntry, LabelEntry,
    Schedule,
};
use crate::session::Session;

impl Session {
    async fn fetch<T: DeserializeOwned>(&self, command: &str) -> Result<T, Error> {
        let value = self.send_command(json!({ "type": command })).await?;
        T::deserialize(&value).map_err(|e| Error::Deserialization {
            message: format!("{command}: {e}"),
            body: value.to_string(),
        })
    }

    pub async fn get_states(&self) -> Result<Vec<EntityState>, Error> {
        self.fetch("get_states").await
    }

    pub async fn get_floors(&self) -> Result<Vec<FloorEntry>, Error> {
        self.fetch("config/floor_registry/list").await
    }

    pub async fn get_areas(&self) -> Result<Vec<AreaEntry>, Error> {
        self.fetch("config/area_registry/list").await
    }

    pub async fn get_entity_registry(&self) -> Result<Vec<EntityRegistryEntry>, Error> {
        self.fetch("config/entity_registry/list").await
    }

    pub async fn get_device_registry(&self) -> Result<Vec<DeviceRegistryEntry>, Error> {
        self.fetch("config/device_registry/list").await
    }

    pub async fn get_label_registry(&self) -> Result<Vec<LabelEntry>, Error> {
        self.fetch("config/label_registry/list").await
    }

    /// Schedules of the scheduler custom component.
    ///
    /// A non-list reply is treated as "no schedules".
    pub async fn get_schedules(&self) -> Result<Vec<Schedule>, Error> {
        let value = self.send_command(json!({ "type": "scheduler/schedules" })).await?;
        if !value.is_array() {
            return Ok(Vec::new());
        }
        Vec::<Schedule>::deserialize(&value).map_err(|e| Error::Deserialization {
            message: format!("scheduler/schedules: {e}"),
            body: value.to_string(),
        })
    }

    /// `call_service`; `service_data` and `target` are omitted when `None`.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        service_data: Option<Value>,
        target: Option<Value>,
    ) -> Result<Value, Error> {
        let mut body = Map::new();
        body.insert("type".into(), "call_service".into());
        body.insert("domain".into(), domain.into());
        body.insert("service".into(), service.into());
        if let Some(data) = service_data {
            body.insert("service_data".into(), data);
        }
        if let Some(target) = target {
            body.insert("target".into(), target);
        }
        self.send_command(Value::Object(body)).await
    }

    /// Subscribe to state changes of exactly these entities through a
    /// `subscribe_trigger` with a `state` platform trigger.
    pub async fn subscribe_entities(&self, entity_ids: &[String]) -> Result<Subscription, Error> {
        self.subscribe(json!({
            "type": "subscribe_trigger",
            "trigger": {
                "platform": "state",
                "entity_id": entity_ids,
            },
        }))
        .await
    }

    /// Subscribe to `scheduler_updated` events.
    pub async fn subscribe_scheduler(&self) -> Result<Subscription, Error> {
        self.subscribe(json!({ "type": "scheduler_updated" })).await
    }

    async fn subscribe(&self, payload: Value) -> Result<Subscription, Error> {
        let (id, rx) = self.enqueue(payload)?;
        rx.await.map_err(|_| Error::SessionClosed)??;
        debug!(session = %self.id(), subscription = id, "subscribed");
        Ok(Subscription {
            id,
            session: self.clone(),
        })
    }

    /// `unsubscribe_events` for a subscription id.
    pub async fn unsubscribe(&self, subscription: u64) -> Result<(), Error> {
        self.send_command(json!({
            "type": "unsubscribe_events",
            "subscription": subscription,
        }))
        .await
        .map(|_| ())
    }
}

/// A live server-side subscription.
///
/// Events produced by it arrive on the session's event channel tagged with
/// [`id`](Self::id). Call [`teardown`](Self::teardown) to end it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    session: Session,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether this subscription lives on `session`.
    pub fn belongs_to(&self, session: &Session) -> bool {
        self.session.id() == session.id()
    }

    /// Fire `unsubscribe_events` without waiting for the reply.
    ///
    /// Best-effort: failures (including a channel that is already gone) are
    /// logged at debug and otherwise ignored.
    pub fn teardown(self) {
        let Self { id, session } = self;
        if !session.is_connected() {
            debug!(session = %session.id(), subscription = id, "channel gone, nothing to unsubscribe");
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(subscription = id, "no runtime, skipping unsubscribe");
            return;
        };
        handle.spawn(async move {
            if let Err(e) = session.unsubscribe(id).await {
                debug!(session = %session.id(), subscription = id, error = %e, "unsubscribe failed");
            }
        });
    }
}
