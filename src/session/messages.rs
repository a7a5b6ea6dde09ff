/// Relay protocol between the server and live sessions
///
/// JSON text frames, tagged by `type`.

use crate::sync::intent::Origin;
use crate::workflow::Workflow;
use serde::{Deserialize, Serialize};

/// Messages sent from a session to the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving `changed` events for a workflow
    Subscribe { workflow_id: String },
    Unsubscribe { workflow_id: String },
    /// Propose a full replacement of a workflow
    ChangeIntent {
        workflow_id: String,
        workflow: Workflow,
        /// Also replace the remote copy; otherwise only local + sessions
        #[serde(default)]
        auto_sync: bool,
    },
    /// Push the local snapshot to the remote now
    SyncRequest { workflow_id: String },
    /// Keepalive
    Ping { timestamp: i64 },
}

impl ClientMessage {
    /// Workflow the message is about, if any
    pub fn workflow_id(&self) -> Option<&str> {
        match self {
            ClientMessage::Subscribe { workflow_id }
            | ClientMessage::Unsubscribe { workflow_id }
            | ClientMessage::ChangeIntent { workflow_id, .. }
            | ClientMessage::SyncRequest { workflow_id } => Some(workflow_id),
            ClientMessage::Ping { .. } => None,
        }
    }
}

/// Messages sent from the server to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected { session_id: String },
    Subscribed { workflow_id: String },
    Unsubscribed { workflow_id: String },
    /// A workflow the session subscribed to was replaced
    Changed {
        workflow_id: String,
        workflow: Workflow,
        origin: Origin,
    },
    /// Outcome of a remote write requested by this session
    SyncResult {
        workflow_id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Error { message: String },
    Pong { timestamp: i64 },
}

impl ServerMessage {
    pub fn sync_ok(workflow_id: impl Into<String>) -> Self {
        ServerMessage::SyncResult {
            workflow_id: workflow_id.into(),
            ok: true,
            error: None,
        }
    }

    pub fn sync_failed(workflow_id: impl Into<String>, error: impl ToString) -> Self {
        ServerMessage::SyncResult {
            workflow_id: workflow_id.into(),
            ok: false,
            error: Some(error.to_string()),
        }
    }
}
