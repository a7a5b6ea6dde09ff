/// Session broadcast hub
///
/// Registry of live sessions and the workflows each one subscribed to. Every
/// session owns an unbounded ordered queue; the transport drains it. Because
/// the sync engine broadcasts from inside its per-workflow queue, successive
/// changes of one workflow reach a session in submission order.

use crate::session::messages::ServerMessage;
use crate::sync::intent::{Origin, SessionId};
use crate::workflow::Workflow;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Information about a connected session
#[derive(Debug)]
struct SessionEntry {
    sender: mpsc::UnboundedSender<ServerMessage>,
    subscriptions: HashSet<String>,
    connected_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Registry {
    sessions: HashMap<SessionId, SessionEntry>,
    /// workflow id -> subscribed session ids
    subscribers: HashMap<String, HashSet<SessionId>>,
}

/// Snapshot of one session for diagnostics
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub subscriptions: Vec<String>,
    pub connected_at: DateTime<Utc>,
}

/// A freshly connected session: its id and the queue of messages for it
#[derive(Debug)]
pub struct SessionHandle {
    pub id: SessionId,
    pub receiver: mpsc::UnboundedReceiver<ServerMessage>,
}

/// Explicit session registry, owned by the application state
#[derive(Debug, Default)]
pub struct SessionHub {
    registry: RwLock<Registry>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session
    pub async fn connect(&self) -> SessionHandle {
        let id = Uuid::new_v4().to_string();
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut registry = self.registry.write().await;
        registry.sessions.insert(
            id.clone(),
            SessionEntry {
                sender,
                subscriptions: HashSet::new(),
                connected_at: Utc::now(),
            },
        );
        tracing::info!("🔌 Session {} connected ({} live)", id, registry.sessions.len());

        SessionHandle { id, receiver }
    }

    /// Drop a session and all of its subscriptions
    pub async fn disconnect(&self, session_id: &str) {
        let mut registry = self.registry.write().await;
        let Some(entry) = registry.sessions.remove(session_id) else {
            return;
        };
        for workflow_id in entry.subscriptions {
            remove_subscriber(&mut registry.subscribers, &workflow_id, session_id);
        }
        tracing::info!("🔌 Session {} disconnected ({} live)", session_id, registry.sessions.len());
    }

    /// Subscribe a session to a workflow; false if the session is unknown
    pub async fn subscribe(&self, session_id: &str, workflow_id: &str) -> bool {
        let mut registry = self.registry.write().await;
        let Some(entry) = registry.sessions.get_mut(session_id) else {
            return false;
        };
        entry.subscriptions.insert(workflow_id.to_string());
        registry
            .subscribers
            .entry(workflow_id.to_string())
            .or_default()
            .insert(session_id.to_string());
        tracing::info!("📌 Session {} joined workflow {}", session_id, workflow_id);
        true
    }

    pub async fn unsubscribe(&self, session_id: &str, workflow_id: &str) -> bool {
        let mut registry = self.registry.write().await;
        let Some(entry) = registry.sessions.get_mut(session_id) else {
            return false;
        };
        let removed = entry.subscriptions.remove(workflow_id);
        remove_subscriber(&mut registry.subscribers, workflow_id, session_id);
        removed
    }

    /// Deliver a `changed` event to every subscriber of `workflow_id`
    /// except `exclude`
    ///
    /// Returns the ids that were handed the event. Sessions whose transport
    /// already went away are skipped silently.
    pub async fn broadcast(
        &self,
        workflow_id: &str,
        payload: &Workflow,
        origin: &Origin,
        exclude: Option<&str>,
    ) -> Vec<SessionId> {
        let registry = self.registry.read().await;
        let Some(subscribers) = registry.subscribers.get(workflow_id) else {
            return Vec::new();
        };

        let message = ServerMessage::Changed {
            workflow_id: workflow_id.to_string(),
            workflow: payload.clone(),
            origin: origin.clone(),
        };

        let mut delivered = Vec::new();
        for session_id in subscribers {
            if exclude == Some(session_id.as_str()) {
                continue;
            }
            let Some(entry) = registry.sessions.get(session_id) else {
                continue;
            };
            if entry.sender.send(message.clone()).is_ok() {
                delivered.push(session_id.clone());
            } else {
                tracing::debug!("📭 Session {} went away before delivery", session_id);
            }
        }

        tracing::debug!(
            "📣 Broadcast workflow {} to {} session(s) (origin: {})",
            workflow_id,
            delivered.len(),
            origin
        );
        delivered
    }

    /// Send a message to one session; false if it is gone
    pub async fn notify(&self, session_id: &str, message: ServerMessage) -> bool {
        let registry = self.registry.read().await;
        registry
            .sessions
            .get(session_id)
            .map(|entry| entry.sender.send(message).is_ok())
            .unwrap_or(false)
    }

    /// Sessions currently subscribed to a workflow
    pub async fn subscribers(&self, workflow_id: &str) -> Vec<SessionId> {
        let registry = self.registry.read().await;
        let mut ids: Vec<SessionId> = registry
            .subscribers
            .get(workflow_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Every workflow id with at least one subscriber
    pub async fn watched_workflows(&self) -> Vec<String> {
        let registry = self.registry.read().await;
        let mut ids: Vec<String> = registry.subscribers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn sessions(&self) -> Vec<SessionInfo> {
        let registry = self.registry.read().await;
        registry
            .sessions
            .iter()
            .map(|(id, entry)| {
                let mut subscriptions: Vec<String> = entry.subscriptions.iter().cloned().collect();
                subscriptions.sort();
                SessionInfo {
                    id: id.clone(),
                    subscriptions,
                    connected_at: entry.connected_at,
                }
            })
            .collect()
    }

    pub async fn session_count(&self) -> usize {
        self.registry.read().await.sessions.len()
    }
}

fn remove_subscriber(subscribers: &mut HashMap<String, HashSet<SessionId>>, workflow_id: &str, session_id: &str) {
    if let Some(set) = subscribers.get_mut(workflow_id) {
        set.remove(session_id);
        if set.is_empty() {
            subscribers.remove(workflow_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow(name: &str) -> Workflow {
        serde_json::from_value(json!({ "name": name, "nodes": [], "connections": {} })).unwrap()
    }

    fn changed_name(message: ServerMessage) -> String {
        match message {
            ServerMessage::Changed { workflow, .. } => workflow.name,
            other => panic!("expected changed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn broadcast_skips_the_excluded_session() {
        let hub = SessionHub::new();
        let mut a = hub.connect().await;
        let mut b = hub.connect().await;
        assert!(hub.subscribe(&a.id, "42").await);
        assert!(hub.subscribe(&b.id, "42").await);

        let origin = Origin::session(a.id.clone());
        let delivered = hub.broadcast("42", &workflow("v1"), &origin, Some(a.id.as_str())).await;
        assert_eq!(delivered, vec![b.id.clone()]);

        assert_eq!(changed_name(b.receiver.recv().await.unwrap()), "v1");
        assert!(a.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn preserves_order_per_session() {
        let hub = SessionHub::new();
        let mut a = hub.connect().await;
        hub.subscribe(&a.id, "42").await;

        for name in ["v1", "v2", "v3"] {
            hub.broadcast("42", &workflow(name), &Origin::Remote, None).await;
        }

        let names: Vec<String> = (0..3)
            .map(|_| changed_name(a.receiver.try_recv().unwrap()))
            .collect();
        assert_eq!(names, vec!["v1", "v2", "v3"]);
    }

    #[tokio::test]
    async fn only_subscribers_of_the_workflow_receive() {
        let hub = SessionHub::new();
        let mut a = hub.connect().await;
        let mut b = hub.connect().await;
        hub.subscribe(&a.id, "1").await;
        hub.subscribe(&b.id, "2").await;

        hub.broadcast("1", &workflow("one"), &Origin::LocalFile, None).await;
        assert_eq!(changed_name(a.receiver.try_recv().unwrap()), "one");
        assert!(b.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_drops_subscriptions() {
        let hub = SessionHub::new();
        let a = hub.connect().await;
        hub.subscribe(&a.id, "42").await;
        assert_eq!(hub.subscribers("42").await, vec![a.id.clone()]);
        assert_eq!(hub.watched_workflows().await, vec!["42".to_string()]);

        hub.disconnect(&a.id).await;
        assert!(hub.subscribers("42").await.is_empty());
        assert!(hub.watched_workflows().await.is_empty());
        assert_eq!(hub.session_count().await, 0);
        assert!(!hub.subscribe(&a.id, "42").await);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let hub = SessionHub::new();
        let mut a = hub.connect().await;
        hub.subscribe(&a.id, "42").await;
        assert!(hub.unsubscribe(&a.id, "42").await);
        assert!(!hub.unsubscribe(&a.id, "42").await);

        let delivered = hub.broadcast("42", &workflow("v1"), &Origin::Remote, None).await;
        assert!(delivered.is_empty());
        assert!(a.receiver.try_recv().is_err());
        assert_eq!(hub.sessions().await[0].subscriptions, Vec::<String>::new());
    }

    #[tokio::test]
    async fn dropped_receivers_are_not_counted() {
        let hub = SessionHub::new();
        let a = hub.connect().await;
        hub.subscribe(&a.id, "42").await;
        drop(a.receiver);

        let delivered = hub.broadcast("42", &workflow("v1"), &Origin::Remote, None).await;
        assert!(delivered.is_empty());
        assert!(!hub.notify(&a.id, ServerMessage::Pong { timestamp: 1 }).await);
    }
}
