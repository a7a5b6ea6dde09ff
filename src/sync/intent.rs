/// Change intents and their origins
///
/// An intent is a proposed full replacement of one workflow, tagged with the
/// copy it came from. Intents live only for one propagation.

use crate::workflow::Workflow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a connected session
pub type SessionId = String;

/// Where a change came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    /// The remote automation server (poll, pull, operator publish)
    Remote,
    /// A local snapshot file edited on disk
    LocalFile,
    /// A live session
    Session { session_id: SessionId },
}

impl Origin {
    pub fn session(session_id: impl Into<SessionId>) -> Self {
        Origin::Session {
            session_id: session_id.into(),
        }
    }

    /// Whether propagating from this origin writes the local snapshot
    pub fn writes_local(&self) -> bool {
        !matches!(self, Origin::LocalFile)
    }

    /// The session to leave out of the broadcast, if any
    pub fn excluded_session(&self) -> Option<&str> {
        match self {
            Origin::Session { session_id } => Some(session_id),
            _ => None,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Remote => write!(f, "remote"),
            Origin::LocalFile => write!(f, "local-file"),
            Origin::Session { session_id } => write!(f, "session:{}", session_id),
        }
    }
}

/// A proposed change to one workflow
#[derive(Debug, Clone)]
pub struct ChangeIntent {
    pub workflow_id: String,
    pub origin: Origin,
    /// Full replacement content; there is no field-level merge
    pub payload: Workflow,
    pub timestamp: DateTime<Utc>,
    /// Replace the remote copy as part of this propagation
    ///
    /// Always true for local-file intents, never consulted for remote ones.
    /// Sessions choose: false leaves the remote stale until an explicit sync.
    pub auto_sync: bool,
}

impl ChangeIntent {
    pub fn from_remote(workflow_id: impl Into<String>, payload: Workflow) -> Self {
        Self::new(workflow_id.into(), Origin::Remote, payload, false)
    }

    pub fn from_local_file(workflow_id: impl Into<String>, payload: Workflow) -> Self {
        Self::new(workflow_id.into(), Origin::LocalFile, payload, true)
    }

    pub fn from_session(
        workflow_id: impl Into<String>,
        session_id: impl Into<SessionId>,
        payload: Workflow,
        auto_sync: bool,
    ) -> Self {
        Self::new(workflow_id.into(), Origin::session(session_id), payload, auto_sync)
    }

    fn new(workflow_id: String, origin: Origin, payload: Workflow, auto_sync: bool) -> Self {
        Self {
            workflow_id,
            origin,
            payload,
            timestamp: Utc::now(),
            auto_sync,
        }
    }

    /// Whether this propagation replaces the remote copy
    pub fn writes_remote(&self) -> bool {
        match self.origin {
            Origin::Remote => false,
            Origin::LocalFile => true,
            Origin::Session { .. } => self.auto_sync,
        }
    }
}
