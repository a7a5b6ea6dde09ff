/// HTTP implementation of the remote store
///
/// Talks to the automation server's public REST API under `/api/v1` and
/// authenticates every request with the static `X-N8N-API-KEY` header.

use crate::config::RemoteConfig;
use crate::remote::{RemoteError, RemoteStore};
use crate::workflow::{ExecutionResult, Workflow, WorkflowSummary};
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

const API_KEY_HEADER: &str = "X-N8N-API-KEY";
const API_PREFIX: &str = "/api/v1";

/// reqwest-backed remote store
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
    api_key: String,
}

/// Envelope of the list endpoint: `{ "data": [...], "nextCursor": ... }`
#[derive(Debug, Deserialize)]
struct ListEnvelope {
    data: Vec<WorkflowSummary>,
}

impl HttpRemoteStore {
    /// Create a client for `base_url` (scheme and host, no `/api/v1`)
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(config.base_url.clone(), config.api_key.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(API_KEY_HEADER, self.api_key.as_str())
            .header(header::ACCEPT, "application/json")
    }

    /// Send a request and decode a 2xx JSON body, mapping everything else
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let response = Self::check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn check_status(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
        tracing::warn!("📡 Remote responded with {}: {}", status, body);
        Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch(&self, workflow_id: &str) -> Result<Workflow, RemoteError> {
        tracing::debug!("🌍 GET workflow {}", workflow_id);
        let request = self.client.get(self.url(&format!("/workflows/{}", workflow_id)));
        self.send(request).await
    }

    async fn replace(&self, workflow_id: &str, workflow: &Workflow) -> Result<Workflow, RemoteError> {
        tracing::debug!("🌍 PUT workflow {} ({} nodes)", workflow_id, workflow.nodes.len());
        let request = self
            .client
            .put(self.url(&format!("/workflows/{}", workflow_id)))
            .json(&workflow.replace_body());
        self.send(request).await
    }

    async fn activate(&self, workflow_id: &str) -> Result<Workflow, RemoteError> {
        tracing::debug!("🌍 POST activate {}", workflow_id);
        let request = self
            .client
            .post(self.url(&format!("/workflows/{}/activate", workflow_id)));
        self.send(request).await
    }

    async fn deactivate(&self, workflow_id: &str) -> Result<Workflow, RemoteError> {
        tracing::debug!("🌍 POST deactivate {}", workflow_id);
        let request = self
            .client
            .post(self.url(&format!("/workflows/{}/deactivate", workflow_id)));
        self.send(request).await
    }

    async fn execute(&self, workflow_id: &str, input: &Value) -> Result<ExecutionResult, RemoteError> {
        tracing::debug!("🌍 POST execute {}", workflow_id);
        let request = self
            .client
            .post(self.url(&format!("/workflows/{}/execute", workflow_id)))
            .json(input);
        self.send(request).await
    }

    async fn list(&self) -> Result<Vec<WorkflowSummary>, RemoteError> {
        tracing::debug!("🌍 GET workflows");
        let request = self.client.get(self.url("/workflows"));
        let envelope: ListEnvelope = self.send(request).await?;
        Ok(envelope.data)
    }
}
