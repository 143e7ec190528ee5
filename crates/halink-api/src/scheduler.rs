// HTTP client for the scheduler custom component.
//
// Schedule listing and change notification go over the websocket; the
// component only exposes create/edit/delete as REST endpoints under
// `/api/scheduler/`, authenticated with the same long-lived access token.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Raw HTTP client for `/api/scheduler/{add,edit,remove}`.
#[derive(Debug, Clone)]
pub struct SchedulerClient {
    http: reqwest::Client,
    base_url: Url,
    token: SecretString,
}

impl SchedulerClient {
    pub fn new(base_url: Url, token: SecretString, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            base_url,
            token,
        })
    }

    /// Create a schedule. `schedule` is the component's add payload
    /// (`weekdays`, `timeslots`, `repeat_type`, `name`, ...).
    pub async fn add(&self, schedule: &Value) -> Result<Value, Error> {
        self.post("add", schedule).await
    }

    /// Replace a schedule's definition.
    pub async fn edit(&self, schedule_id: &str, schedule: &Value) -> Result<Value, Error> {
        let mut body = match schedule {
            Value::Object(map) => map.clone(),
            _ => {
                return Err(Error::Protocol("schedule payload must be a JSON object".into()));
            }
        };
        body.insert("schedule_id".into(), schedule_id.into());
        self.post("edit", &Value::Object(body)).await
    }

    pub async fn remove(&self, schedule_id: &str) -> Result<Value, Error> {
        self.post("remove", &json!({ "schedule_id": schedule_id })).await
    }

    fn endpoint(&self, action: &str) -> Url {
        let mut url = self.base_url.clone();
        let path = format!(
            "{}/api/scheduler/{action}",
            self.base_url.path().trim_end_matches('/')
        );
        url.set_path(&path);
        url.set_query(None);
        url
    }

    async fn post(&self, action: &str, body: &Value) -> Result<Value, Error> {
        let url = self.endpoint(action);
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .bearer_auth(self.token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "access token rejected by scheduler endpoint".into(),
            });
        }

        let text = resp.text().await.map_err(Error::Transport)?;
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                message: text.chars().take(200).collect(),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: text,
        })
    }
}
