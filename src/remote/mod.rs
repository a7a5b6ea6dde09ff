/// Remote Store Adapter
///
/// Narrow interface to the external automation server. Each method is exactly
/// one API round trip; there are no retries here, callers decide what to do
/// with a failure.

pub mod client;

pub use client::HttpRemoteStore;

use crate::workflow::{ExecutionResult, Workflow, WorkflowSummary};
use async_trait::async_trait;
use serde_json::Value;

/// Errors talking to the remote automation server
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The server answered with a non-2xx status
    #[error("remote returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced a response (DNS, connect, TLS, timeout)
    #[error("remote request failed: {0}")]
    Transport(String),

    /// The server answered 2xx but the body was not what we expected
    #[error("unexpected remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// HTTP status of the failure, if the server produced one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Operations the sync engine and CLI need from the remote server
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch a workflow by id
    async fn fetch(&self, workflow_id: &str) -> Result<Workflow, RemoteError>;

    /// Replace a workflow, returning the server's stored copy
    async fn replace(&self, workflow_id: &str, workflow: &Workflow) -> Result<Workflow, RemoteError>;

    async fn activate(&self, workflow_id: &str) -> Result<Workflow, RemoteError>;

    async fn deactivate(&self, workflow_id: &str) -> Result<Workflow, RemoteError>;

    /// Run a workflow with the given input data
    async fn execute(&self, workflow_id: &str, input: &Value) -> Result<ExecutionResult, RemoteError>;

    /// List every workflow visible to the API key
    async fn list(&self) -> Result<Vec<WorkflowSummary>, RemoteError>;
}
