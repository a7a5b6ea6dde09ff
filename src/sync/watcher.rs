/// Filesystem watch bridge
///
/// Observes the snapshot directory and turns edits of `workflow_<id>.json`
/// into local-file intents. A single write usually produces a burst of
/// events, so events per path are coalesced over a short debounce window
/// before the file is looked at. Events for the engine's own writes are
/// recognised through the origin tracker and dropped.

use crate::sync::engine::{PropagationReport, SyncEngine};
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::intent::ChangeIntent;
use crate::workflow::SnapshotStore;
use anyhow::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// What happened to one (debounced) filesystem change
#[derive(Debug)]
pub enum WatchOutcome {
    /// Not a workflow snapshot, or the file is gone
    Ignored,
    /// Echo of the engine's own write
    Suppressed,
    Propagated(PropagationReport),
}

/// Bridge from snapshot file changes to engine intents
pub struct WatchBridge {
    engine: Arc<SyncEngine>,
    debounce: Duration,
    /// Workflow ids with a propagation in flight from this bridge
    in_flight: Mutex<HashSet<String>>,
}

/// Keeps the OS watcher and the event loop alive; dropping it stops both
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl WatchBridge {
    pub fn new(engine: Arc<SyncEngine>, debounce: Duration) -> Self {
        Self {
            engine,
            debounce,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Start watching the engine's snapshot directory
    pub fn spawn(self: Arc<Self>) -> Result<WatchHandle> {
        let dir = self.engine.snapshots().dir().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| anyhow::anyhow!("Failed to create workflows directory '{}': {}", dir.display(), e))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            // Receiver gone means the bridge is shutting down
            let _ = tx.send(result);
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!("👀 Watching {} for workflow edits", dir.display());

        let task = tokio::spawn(self.run(rx));
        Ok(WatchHandle {
            _watcher: watcher,
            task,
        })
    }

    async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<notify::Result<Event>>) {
        // path -> time at which the burst is considered over
        let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

        loop {
            let next_due = pending.values().min().copied();
            tokio::select! {
                received = events.recv() => match received {
                    Some(Ok(event)) => {
                        if is_content_change(&event.kind) {
                            for path in event.paths {
                                if SnapshotStore::workflow_id_for(&path).is_some() {
                                    pending.insert(path, Instant::now() + self.debounce);
                                }
                            }
                        }
                    }
                    Some(Err(e)) => tracing::warn!("⚠️ Filesystem watcher error: {}", e),
                    None => break,
                },
                _ = tokio::time::sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                    let now = Instant::now();
                    let due: Vec<PathBuf> = pending
                        .iter()
                        .filter(|(_, at)| **at <= now)
                        .map(|(path, _)| path.clone())
                        .collect();
                    for path in due {
                        pending.remove(&path);
                        if let Err(path) = self.dispatch(path) {
                            // Same workflow still propagating; look again later
                            pending.insert(path, now + self.debounce);
                        }
                    }
                }
            }
        }

        tracing::info!("👀 Filesystem watcher stopped");
    }

    /// Handle a due path on its own task so a slow remote call for one
    /// workflow does not hold up the others. Hands the path back if that
    /// workflow is already being handled, keeping its edits in order.
    fn dispatch(self: &Arc<Self>, path: PathBuf) -> std::result::Result<(), PathBuf> {
        let Some(workflow_id) = SnapshotStore::workflow_id_for(&path) else {
            return Ok(());
        };
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if !in_flight.insert(workflow_id.clone()) {
                return Err(path);
            }
        }

        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            match bridge.handle_path(&path).await {
                Ok(WatchOutcome::Propagated(report)) => {
                    tracing::info!(
                        "📝 Local edit of workflow {} propagated to {} session(s)",
                        report.workflow_id,
                        report.notified.len()
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!("❌ Failed to sync local edit {}: {}", path.display(), e),
            }
            bridge
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&workflow_id);
        });
        Ok(())
    }

    /// Decide what a change of `path` means and act on it
    ///
    /// Malformed JSON fails closed with `LocalParseError`: nothing is
    /// propagated and the remote and sessions keep their state.
    pub async fn handle_path(&self, path: &Path) -> SyncResult<WatchOutcome> {
        let Some(workflow_id) = SnapshotStore::workflow_id_for(path) else {
            return Ok(WatchOutcome::Ignored);
        };

        let tracker = self.engine.tracker();
        if tracker.is_suppressed(&workflow_id) {
            tracker.acknowledge_echo(&workflow_id);
            tracing::debug!("🔇 Ignoring echo of our own write to {}", path.display());
            return Ok(WatchOutcome::Suppressed);
        }

        let workflow = match self.engine.snapshots().read_path(path).await {
            Ok(workflow) => workflow,
            Err(e) if e.is_not_found() => return Ok(WatchOutcome::Ignored),
            Err(e) => return Err(SyncError::from_snapshot_read(&workflow_id, e)),
        };

        tracing::info!("📝 Workflow file changed: {}", path.display());
        let report = self
            .engine
            .propagate(ChangeIntent::from_local_file(workflow_id, workflow))
            .await?;
        Ok(WatchOutcome::Propagated(report))
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}
