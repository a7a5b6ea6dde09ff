/// Synchronization engine
///
/// Single coordinator for every write to a workflow. Intents for one workflow
/// id run strictly one after another through a fair async mutex (FIFO in
/// acquisition order); intents for different ids never wait on each other.
///
/// One propagation, for origin O and payload P:
/// 1. tag the workflow with O in the origin tracker
/// 2. write P to the local snapshot unless O is the local file, then arm the
///    echo window (a failed write aborts here, nothing is broadcast)
/// 3. hand P to every subscribed session except O itself
/// 4. replace the remote copy unless O is the remote (sessions may opt out);
///    a failure is reported as `RemoteWriteFailed` and nothing is rolled back
///
/// The model is last-writer-wins: a later payload replaces the whole workflow.

use crate::remote::RemoteStore;
use crate::session::SessionHub;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::intent::{ChangeIntent, Origin, SessionId};
use crate::sync::origin::ChangeOriginTracker;
use crate::workflow::{ExecutionResult, SnapshotStore, SyncedRegistry, SyncedWorkflow, Workflow, WorkflowSummary};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};

type Queues = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

/// What one propagation actually did
#[derive(Debug, Clone, Serialize)]
pub struct PropagationReport {
    pub workflow_id: String,
    pub origin: Origin,
    pub local_written: bool,
    pub remote_written: bool,
    /// Sessions that were handed the `changed` event
    pub notified: Vec<SessionId>,
}

pub struct SyncEngine {
    remote: Arc<dyn RemoteStore>,
    snapshots: SnapshotStore,
    tracker: Arc<ChangeOriginTracker>,
    hub: Arc<SessionHub>,
    /// Content last known to be on the remote, per workflow
    synced: Arc<SyncedRegistry>,
    /// Per-workflow serialization queues, created on first use and dropped
    /// once nobody holds or waits for them
    queues: Queues,
}

/// One workflow's turn in the engine; releases the queue entry when idle
struct Turn<'a> {
    queues: &'a Queues,
    workflow_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        if queues
            .get(&self.workflow_id)
            .is_some_and(|queue| Arc::strong_count(queue) == 1)
        {
            queues.remove(&self.workflow_id);
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("snapshots", &self.snapshots)
            .field("tracker", &self.tracker)
            .field("active_queues", &self.active_queues())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        snapshots: SnapshotStore,
        tracker: Arc<ChangeOriginTracker>,
        hub: Arc<SessionHub>,
    ) -> Self {
        Self {
            remote,
            snapshots,
            tracker,
            hub,
            synced: Arc::new(SyncedRegistry::new()),
            queues: StdMutex::new(HashMap::new()),
        }
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn tracker(&self) -> &Arc<ChangeOriginTracker> {
        &self.tracker
    }

    pub fn hub(&self) -> &Arc<SessionHub> {
        &self.hub
    }

    pub fn synced(&self) -> &Arc<SyncedRegistry> {
        &self.synced
    }

    /// Number of workflows with a propagation running or queued
    pub fn active_queues(&self) -> usize {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Wait for this workflow's turn
    ///
    /// The map lock is released before waiting on the per-id lock, so a busy
    /// workflow never holds up others. Waiters are served in arrival order.
    async fn acquire(&self, workflow_id: &str) -> Turn<'_> {
        let queue = {
            let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(queues.entry(workflow_id.to_string()).or_default())
        };
        let mut turn = Turn {
            queues: &self.queues,
            workflow_id: workflow_id.to_string(),
            guard: None,
        };
        turn.guard = Some(queue.lock_owned().await);
        turn
    }

    /// Apply a change intent to every store except its origin
    pub async fn propagate(&self, intent: ChangeIntent) -> SyncResult<PropagationReport> {
        let _turn = self.acquire(&intent.workflow_id).await;
        self.apply(intent).await
    }

    /// Body of a propagation; caller holds the workflow's turn
    async fn apply(&self, intent: ChangeIntent) -> SyncResult<PropagationReport> {
        let ChangeIntent {
            workflow_id,
            origin,
            payload,
            timestamp,
            ..
        } = &intent;
        let writes_remote = intent.writes_remote();

        tracing::info!(
            "🔄 Propagating workflow {} from {} ({} nodes, submitted {})",
            workflow_id,
            origin,
            payload.nodes.len(),
            timestamp.to_rfc3339()
        );
        let dangling = payload.dangling_connections();
        if !dangling.is_empty() {
            tracing::warn!("⚠️ Workflow {} connects unknown nodes: {:?}", workflow_id, dangling);
        }

        // Step 1: open the echo-suppression window
        self.tracker.mark_pending(workflow_id, origin.clone());

        // Step 2: local snapshot
        let local_written = if origin.writes_local() {
            if let Err(source) = self.snapshots.write(workflow_id, payload).await {
                self.tracker.clear_if(workflow_id, origin);
                tracing::error!("❌ Local write failed for workflow {}: {}", workflow_id, source);
                return Err(SyncError::LocalWriteFailed {
                    workflow_id: workflow_id.clone(),
                    source,
                });
            }
            self.tracker.arm(workflow_id);
            true
        } else {
            false
        };

        // Step 3: sessions
        let notified = self
            .hub
            .broadcast(workflow_id, payload, origin, origin.excluded_session())
            .await;

        if matches!(origin, Origin::Remote) {
            self.synced.record(workflow_id, payload);
        }

        // Step 4: remote
        let remote_result = if writes_remote {
            Some(self.remote.replace(workflow_id, payload).await)
        } else {
            None
        };

        // Nothing was written locally, so no echo can follow; a tag left by
        // an earlier write is not ours to clear
        if !local_written {
            self.tracker.clear_if(workflow_id, origin);
        }

        let remote_written = match remote_result {
            Some(Ok(stored)) => {
                self.synced.record(workflow_id, &stored);
                true
            }
            Some(Err(source)) => {
                tracing::error!(
                    "❌ Remote write failed for workflow {} after local update: {}",
                    workflow_id,
                    source
                );
                return Err(SyncError::RemoteWriteFailed {
                    workflow_id: workflow_id.clone(),
                    source,
                });
            }
            None => false,
        };

        tracing::info!(
            "✅ Workflow {} propagated from {} (local: {}, remote: {}, sessions: {})",
            workflow_id,
            origin,
            local_written,
            remote_written,
            notified.len()
        );

        Ok(PropagationReport {
            workflow_id: workflow_id.clone(),
            origin: origin.clone(),
            local_written,
            remote_written,
            notified,
        })
    }

    /// Download the remote copy and propagate it to local and sessions
    pub async fn pull(&self, workflow_id: &str) -> SyncResult<PropagationReport> {
        let _turn = self.acquire(workflow_id).await;
        let workflow = self.remote.fetch(workflow_id).await?;
        self.apply(ChangeIntent::from_remote(workflow_id, workflow)).await
    }

    /// Pull only if the remote changed since it was last seen
    ///
    /// Used by the poller. Returns `None` when the remote content is the one
    /// already known, which keeps staged (not yet synced) session edits from
    /// being overwritten by an unchanged remote.
    pub async fn refresh(&self, workflow_id: &str) -> SyncResult<Option<PropagationReport>> {
        let _turn = self.acquire(workflow_id).await;
        let workflow = self.remote.fetch(workflow_id).await?;
        if !self.synced.has_drifted(workflow_id, &workflow) {
            tracing::debug!("⏭️ Remote workflow {} unchanged", workflow_id);
            return Ok(None);
        }
        tracing::info!("📥 Remote workflow {} changed upstream", workflow_id);
        self.apply(ChangeIntent::from_remote(workflow_id, workflow))
            .await
            .map(Some)
    }

    /// Explicit sync: replace the remote copy with the local snapshot
    pub async fn push(&self, workflow_id: &str) -> SyncResult<Workflow> {
        let _turn = self.acquire(workflow_id).await;
        let workflow = self
            .snapshots
            .read(workflow_id)
            .await
            .map_err(|source| SyncError::from_snapshot_read(workflow_id, source))?;
        self.replace_remote(workflow_id, &workflow).await
    }

    /// Replace the remote copy with a workflow loaded from elsewhere
    ///
    /// Like `push`, only the remote is written. The local snapshot and
    /// sessions are left as they are.
    pub async fn upload(&self, workflow_id: &str, workflow: &Workflow) -> SyncResult<Workflow> {
        let _turn = self.acquire(workflow_id).await;
        self.replace_remote(workflow_id, workflow).await
    }

    /// Remote replace for explicit syncs; caller holds the workflow's turn
    async fn replace_remote(&self, workflow_id: &str, workflow: &Workflow) -> SyncResult<Workflow> {
        let stored = self
            .remote
            .replace(workflow_id, workflow)
            .await
            .map_err(|source| SyncError::RemoteWriteFailed {
                workflow_id: workflow_id.to_string(),
                source,
            })?;
        self.synced.record(workflow_id, &stored);
        tracing::info!("📤 Workflow {} pushed to remote", workflow_id);
        Ok(stored)
    }

    /// Operator write: remote first, then local and sessions
    ///
    /// If the remote rejects the workflow nothing else is touched. On success
    /// the server's stored copy is what reaches the file and the sessions.
    pub async fn publish(&self, workflow_id: &str, workflow: Workflow) -> SyncResult<Workflow> {
        let _turn = self.acquire(workflow_id).await;
        let stored = self.remote.replace(workflow_id, &workflow).await?;
        self.apply(ChangeIntent::from_remote(workflow_id, stored.clone()))
            .await?;
        Ok(stored)
    }

    /// Remote content last seen or written for this workflow
    pub fn last_synced(&self, workflow_id: &str) -> Option<SyncedWorkflow> {
        self.synced.get(workflow_id)
    }

    /// Read-only fetch of the remote copy; no propagation
    pub async fn fetch(&self, workflow_id: &str) -> SyncResult<Workflow> {
        Ok(self.remote.fetch(workflow_id).await?)
    }

    pub async fn list(&self) -> SyncResult<Vec<WorkflowSummary>> {
        Ok(self.remote.list().await?)
    }

    pub async fn activate(&self, workflow_id: &str) -> SyncResult<Workflow> {
        Ok(self.remote.activate(workflow_id).await?)
    }

    pub async fn deactivate(&self, workflow_id: &str) -> SyncResult<Workflow> {
        Ok(self.remote.deactivate(workflow_id).await?)
    }

    pub async fn execute(&self, workflow_id: &str, input: &Value) -> SyncResult<ExecutionResult> {
        Ok(self.remote.execute(workflow_id, input).await?)
    }

    /// Workflow ids the poller should keep an eye on
    pub async fn tracked_workflows(&self) -> Vec<String> {
        let mut ids = self.synced.workflow_ids();
        for id in self.hub.watched_workflows().await {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids.sort();
        ids
    }
}
