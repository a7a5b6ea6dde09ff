/// Last-synced workflow registry using ArcSwap
///
/// Remembers, per workflow id, the content the sync engine most recently
/// propagated. Readers (the remote poller, HTTP handlers) never block the
/// engine: every update swaps the whole map pointer.

use crate::workflow::types::Workflow;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

/// Lock-free map of workflow id -> last propagated content
#[derive(Debug)]
pub struct SyncedRegistry {
    entries: ArcSwap<HashMap<String, SyncedWorkflow>>,
}

/// A workflow as it was last propagated
#[derive(Debug, Clone)]
pub struct SyncedWorkflow {
    /// Remote copy last seen or written
    pub workflow: Workflow,
    /// `Workflow::content()` of that payload, precomputed for drift checks
    pub content: Value,
    /// When it was recorded
    pub synced_at: DateTime<Utc>,
}

impl Default for SyncedRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncedRegistry {
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::new(Arc::new(HashMap::new())),
        }
    }

    /// Record the payload of a finished propagation
    pub fn record(&self, workflow_id: &str, workflow: &Workflow) {
        let entry = SyncedWorkflow {
            content: workflow.content(),
            workflow: workflow.clone(),
            synced_at: Utc::now(),
        };
        // Writers are already serialized per id by the engine; rcu covers
        // concurrent writers for different ids.
        self.entries.rcu(|current| {
            let mut next = (**current).clone();
            next.insert(workflow_id.to_string(), entry.clone());
            next
        });
    }

    /// Last propagated state for a workflow (lock-free read)
    pub fn get(&self, workflow_id: &str) -> Option<SyncedWorkflow> {
        self.entries.load().get(workflow_id).cloned()
    }

    /// Whether `workflow` differs in content from what was last propagated
    ///
    /// Unknown ids count as drifted.
    pub fn has_drifted(&self, workflow_id: &str, workflow: &Workflow) -> bool {
        match self.entries.load().get(workflow_id) {
            Some(entry) => entry.content != workflow.content(),
            None => true,
        }
    }

    /// Every workflow id that has been propagated at least once
    pub fn workflow_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.load().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn forget(&self, workflow_id: &str) {
        self.entries.rcu(|current| {
            let mut next = (**current).clone();
            next.remove(workflow_id);
            next
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow(name: &str) -> Workflow {
        serde_json::from_value(json!({ "name": name, "nodes": [], "connections": {} })).unwrap()
    }

    #[test]
    fn tracks_drift_per_workflow() {
        let registry = SyncedRegistry::new();
        assert!(registry.has_drifted("1", &workflow("a")));

        registry.record("1", &workflow("a"));
        assert!(!registry.has_drifted("1", &workflow("a")));
        assert!(registry.has_drifted("1", &workflow("b")));
        assert!(registry.has_drifted("2", &workflow("a")));

        registry.record("2", &workflow("b"));
        assert_eq!(registry.workflow_ids(), vec!["1".to_string(), "2".to_string()]);

        registry.forget("1");
        assert!(registry.get("1").is_none());
        assert_eq!(registry.get("2").unwrap().workflow.name, "b");
    }
}
