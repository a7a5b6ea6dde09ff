//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use flowsync::remote::{RemoteError, RemoteStore};
use flowsync::session::SessionHub;
use flowsync::sync::{ChangeOriginTracker, SyncEngine, WatchBridge};
use flowsync::workflow::{ExecutionResult, SnapshotStore, Workflow, WorkflowSummary};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// In-memory stand-in for the automation server
#[derive(Default)]
pub struct MockRemote {
    workflows: Mutex<HashMap<String, Workflow>>,
    replaced: Mutex<Vec<(String, Workflow)>>,
    fetches: Mutex<Vec<String>>,
    fail_replace: Mutex<Option<u16>>,
    replace_delay: Mutex<HashMap<String, Duration>>,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, id: &str, workflow: Workflow) {
        self.workflows.lock().unwrap().insert(id.to_string(), workflow);
    }

    pub fn remove(&self, id: &str) {
        self.workflows.lock().unwrap().remove(id);
    }

    pub fn stored(&self, id: &str) -> Option<Workflow> {
        self.workflows.lock().unwrap().get(id).cloned()
    }

    /// Every replace call in the order it reached the server
    pub fn replaced(&self) -> Vec<(String, Workflow)> {
        self.replaced.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn fail_replace_with(&self, status: u16) {
        *self.fail_replace.lock().unwrap() = Some(status);
    }

    pub fn delay_replace(&self, id: &str, delay: Duration) {
        self.replace_delay.lock().unwrap().insert(id.to_string(), delay);
    }
}

fn not_found(id: &str) -> RemoteError {
    RemoteError::Status {
        status: 404,
        body: format!("{{\"message\":\"Workflow {} not found\"}}", id),
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn fetch(&self, workflow_id: &str) -> Result<Workflow, RemoteError> {
        self.fetches.lock().unwrap().push(workflow_id.to_string());
        self.stored(workflow_id).ok_or_else(|| not_found(workflow_id))
    }

    async fn replace(&self, workflow_id: &str, workflow: &Workflow) -> Result<Workflow, RemoteError> {
        let delay = self.replace_delay.lock().unwrap().get(workflow_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.replaced
            .lock()
            .unwrap()
            .push((workflow_id.to_string(), workflow.clone()));

        let failure = *self.fail_replace.lock().unwrap();
        if let Some(status) = failure {
            return Err(RemoteError::Status {
                status,
                body: "{\"message\":\"Internal Server Error\"}".to_string(),
            });
        }

        let mut stored = workflow.clone();
        stored.id = Some(workflow_id.to_string());
        stored
            .extra
            .insert("updatedAt".to_string(), json!(chrono::Utc::now().to_rfc3339()));
        self.insert(workflow_id, stored.clone());
        Ok(stored)
    }

    async fn activate(&self, workflow_id: &str) -> Result<Workflow, RemoteError> {
        let mut workflows = self.workflows.lock().unwrap();
        let workflow = workflows.get_mut(workflow_id).ok_or_else(|| not_found(workflow_id))?;
        workflow.extra.insert("active".to_string(), json!(true));
        Ok(workflow.clone())
    }

    async fn deactivate(&self, workflow_id: &str) -> Result<Workflow, RemoteError> {
        let mut workflows = self.workflows.lock().unwrap();
        let workflow = workflows.get_mut(workflow_id).ok_or_else(|| not_found(workflow_id))?;
        workflow.extra.insert("active".to_string(), json!(false));
        Ok(workflow.clone())
    }

    async fn execute(&self, workflow_id: &str, input: &Value) -> Result<ExecutionResult, RemoteError> {
        if self.stored(workflow_id).is_none() {
            return Err(not_found(workflow_id));
        }
        Ok(json!({ "workflowId": workflow_id, "input": input, "finished": true }))
    }

    async fn list(&self) -> Result<Vec<WorkflowSummary>, RemoteError> {
        let workflows = self.workflows.lock().unwrap();
        let mut summaries: Vec<WorkflowSummary> = workflows
            .iter()
            .map(|(id, workflow)| WorkflowSummary {
                id: id.clone(),
                name: workflow.name.clone(),
                active: workflow.is_active().unwrap_or(false),
                updated_at: None,
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }
}

/// Engine wired to a mock remote and a temporary snapshot directory
pub struct Harness {
    pub dir: TempDir,
    pub remote: Arc<MockRemote>,
    pub hub: Arc<SessionHub>,
    pub engine: Arc<SyncEngine>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_grace(Duration::from_secs(30))
    }

    pub fn with_grace(grace: Duration) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let remote = MockRemote::new();
        let hub = Arc::new(SessionHub::new());
        let tracker = Arc::new(ChangeOriginTracker::new(grace));
        let engine = Arc::new(SyncEngine::new(
            remote.clone(),
            SnapshotStore::new(dir.path()),
            tracker,
            Arc::clone(&hub),
        ));
        Self {
            dir,
            remote,
            hub,
            engine,
        }
    }

    pub fn bridge(&self) -> Arc<WatchBridge> {
        Arc::new(WatchBridge::new(Arc::clone(&self.engine), Duration::from_millis(50)))
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        self.engine.snapshots()
    }

    pub async fn local(&self, id: &str) -> Workflow {
        self.snapshots().read(id).await.unwrap()
    }
}

pub fn manual_trigger() -> Value {
    json!({
        "id": "a1",
        "name": "A",
        "type": "n8n-nodes-base.manualTrigger",
        "position": [250, 300],
        "parameters": {},
        "typeVersion": 1
    })
}

pub fn http_request() -> Value {
    json!({
        "id": "b1",
        "name": "B",
        "type": "n8n-nodes-base.httpRequest",
        "position": [450, 300],
        "parameters": { "url": "https://example.com", "method": "GET" },
        "typeVersion": 4
    })
}

/// Workflow "42" with only the manual trigger
pub fn trigger_only() -> Workflow {
    serde_json::from_value(json!({
        "id": "42",
        "name": "Scenario",
        "active": false,
        "nodes": [manual_trigger()],
        "connections": {},
        "settings": { "executionOrder": "v1" }
    }))
    .unwrap()
}

/// Workflow "42" with the trigger wired into an HTTP request
pub fn trigger_and_request() -> Workflow {
    serde_json::from_value(json!({
        "id": "42",
        "name": "Scenario",
        "nodes": [manual_trigger(), http_request()],
        "connections": {
            "A": { "main": [[{ "node": "B", "type": "main", "index": 0 }]] }
        },
        "settings": { "executionOrder": "v1" }
    }))
    .unwrap()
}

pub fn named(name: &str) -> Workflow {
    serde_json::from_value(json!({ "name": name, "nodes": [manual_trigger()], "connections": {} })).unwrap()
}
