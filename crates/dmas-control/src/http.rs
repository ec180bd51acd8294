//! HTTP transport for the control service backend
//!
//! Talks to the Flask-style control service: `GET`/`POST` endpoints whose
//! bodies are JSON documents (not always served with a JSON content type).

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use dmas_types::{
    Ack, AgentInstance, AgentType, ConfigEntry, ConfigScope, ControlError, ControlResult,
    SimulationRequest,
};

use crate::api::{decode_ack, decode_instances, RemoteAgentApi};

/// Transport configuration
#[derive(Debug, Clone)]
pub struct HttpApiConfig {
    /// Control service root, e.g. `http://localhost:5010`
    pub base_url: String,
    /// Per-request timeout; `None` leaves requests unbounded
    pub timeout: Option<Duration>,
}

impl Default for HttpApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5010".to_string(),
            timeout: None,
        }
    }
}

/// [`RemoteAgentApi`] over HTTP
///
/// Cloning shares the underlying connection pool.
#[derive(Clone)]
pub struct HttpAgentApi {
    base_url: String,
    base: Url,
    client: Client,
}

impl HttpAgentApi {
    pub fn new(config: HttpApiConfig) -> ControlResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ControlError::unreachable(format!("failed to build HTTP client: {}", e)))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .map_err(|e| ControlError::unreachable(format!("invalid base URL {:?}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(ControlError::unreachable(format!("invalid base URL {:?}", base_url)));
        }

        Ok(Self { base_url, base, client })
    }

    /// Connect to a specific endpoint with default settings
    pub fn connect(base_url: &str) -> ControlResult<Self> {
        Self::new(HttpApiConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Endpoint URL; each segment is percent-encoded on its own
    fn url(&self, segments: &[&str]) -> ControlResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ControlError::unreachable(format!("invalid base URL {:?}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> ControlResult<T> {
        let url = self.url(segments)?;
        let text = self.get_text(segments).await?;
        decode_json(url.as_str(), &text)
    }

    async fn get_text(&self, segments: &[&str]) -> ControlResult<String> {
        let url = self.url(segments)?;
        debug!(method = "GET", url = %url, "Backend request");
        let resp = self.client.get(url).send().await.map_err(transport_error)?;
        read_body(resp).await
    }

    async fn post_text<B: Serialize + ?Sized>(&self, segments: &[&str], body: &B) -> ControlResult<String> {
        let url = self.url(segments)?;
        debug!(method = "POST", url = %url, "Backend request");
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        read_body(resp).await
    }
}

fn transport_error(err: reqwest::Error) -> ControlError {
    warn!(error = %err, "Backend unreachable");
    ControlError::Transport {
        status: err.status().map(|s| s.as_u16()),
        message: err.to_string(),
    }
}

async fn read_body(resp: Response) -> ControlResult<String> {
    let status = resp.status();
    let url = resp.url().to_string();
    let text = resp.text().await.map_err(transport_error)?;

    if !status.is_success() {
        warn!(url = %url, status = status.as_u16(), "Backend returned an error status");
        let message = if text.is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            text
        };
        return Err(ControlError::status(status.as_u16(), message));
    }
    Ok(text)
}

fn decode_json<T: DeserializeOwned>(url: &str, text: &str) -> ControlResult<T> {
    serde_json::from_str(text).map_err(|e| ControlError::Decode(format!("{}: {}", url, e)))
}

/// Lifecycle endpoints answer with a bare `OK` body, JSON or not
fn ack_from_text(text: String) -> Ack {
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => decode_ack(value),
        Err(_) => Ack {
            message: text.trim().to_string(),
        },
    }
}

#[async_trait]
impl RemoteAgentApi for HttpAgentApi {
    async fn fetch_config(&self, scope: ConfigScope) -> ControlResult<ConfigEntry> {
        // Non-string values keep their JSON text form
        let raw: serde_json::Map<String, Value> =
            self.get(&["get_config", scope.path_segment()]).await?;
        Ok(raw
            .into_iter()
            .map(|(k, v)| match v {
                Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect())
    }

    async fn push_config(&self, scope: ConfigScope, entry: &ConfigEntry) -> ControlResult<Ack> {
        let body = self
            .post_text(&["set_config", scope.path_segment()], entry)
            .await?;
        Ok(ack_from_text(body))
    }

    async fn fetch_count(&self, agent_type: AgentType) -> ControlResult<u64> {
        self.get(&["get_running_agents", agent_type.as_str()]).await
    }

    async fn fetch_instances(&self, agent_type: AgentType) -> ControlResult<Vec<AgentInstance>> {
        let raw: serde_json::Map<String, Value> =
            self.get(&["get_info", agent_type.as_str()]).await?;
        Ok(decode_instances(agent_type, raw))
    }

    async fn start_type(&self, agent_type: AgentType) -> ControlResult<Ack> {
        let body = self.get_text(&["start_agents", agent_type.as_str()]).await?;
        Ok(ack_from_text(body))
    }

    async fn terminate_type(&self, agent_type: AgentType) -> ControlResult<Ack> {
        let body = self.get_text(&["terminate_agents", agent_type.as_str()]).await?;
        Ok(ack_from_text(body))
    }

    async fn terminate_instance(&self, key: &str) -> ControlResult<Ack> {
        match self.get_text(&["terminate_agent", key]).await {
            Ok(body) => Ok(ack_from_text(body)),
            Err(ControlError::Transport { status: Some(code), .. })
                if code == StatusCode::NOT_FOUND.as_u16() =>
            {
                Err(ControlError::NotFound { key: key.to_string() })
            }
            Err(e) => Err(e),
        }
    }

    async fn start_simulation(&self, request: &SimulationRequest) -> ControlResult<Ack> {
        let body = self.post_text(&["start_simulation"], request).await?;
        Ok(ack_from_text(body))
    }

    fn grid_url(&self) -> Option<String> {
        self.url(&["Grid"]).ok().map(String::from)
    }
}
