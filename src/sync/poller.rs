/// Background remote poller
///
/// The remote server does not push changes, so tracked workflows are fetched
/// on a cron schedule (tokio-cron-scheduler). A fetched copy whose content
/// differs from the one last seen becomes a remote intent.

use crate::sync::engine::SyncEngine;
use crate::sync::error::SyncError;
use anyhow::Result;
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};

pub struct RemotePoller {
    engine: Arc<SyncEngine>,
    /// Always polled, even before anything was propagated for it
    default_workflow_id: Option<String>,
    scheduler: RwLock<Option<JobScheduler>>,
}

/// Outcome of one polling round
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollSummary {
    pub checked: usize,
    pub changed: Vec<String>,
    pub failed: Vec<String>,
}

impl RemotePoller {
    pub fn new(engine: Arc<SyncEngine>, default_workflow_id: Option<String>) -> Self {
        Self {
            engine,
            default_workflow_id,
            scheduler: RwLock::new(None),
        }
    }

    /// Register the polling job and start the scheduler
    pub async fn start(self: &Arc<Self>, schedule: &str) -> Result<()> {
        tracing::info!("⏰ Starting remote poller with schedule: {}", schedule);

        let scheduler = JobScheduler::new().await?;
        let poller = Arc::clone(self);
        let job = Job::new_async(schedule, move |_uuid, _l| {
            let poller = Arc::clone(&poller);
            Box::pin(async move {
                let summary = poller.poll_once().await;
                if !summary.changed.is_empty() || !summary.failed.is_empty() {
                    tracing::info!(
                        "🔔 Poll checked {} workflow(s): changed {:?}, failed {:?}",
                        summary.checked,
                        summary.changed,
                        summary.failed
                    );
                }
            })
        })?;
        scheduler.add(job).await?;
        scheduler.start().await?;

        *self.scheduler.write().await = Some(scheduler);
        tracing::info!("✅ Remote poller started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        if let Some(mut scheduler) = self.scheduler.write().await.take() {
            scheduler.shutdown().await?;
            tracing::info!("⏹️ Remote poller stopped");
        }
        Ok(())
    }

    /// Check every tracked workflow once
    ///
    /// Workflows are fetched concurrently; each one still queues behind any
    /// propagation already running for it.
    pub async fn poll_once(&self) -> PollSummary {
        let mut ids = self.engine.tracked_workflows().await;
        if let Some(default_id) = &self.default_workflow_id {
            if !ids.contains(default_id) {
                ids.push(default_id.clone());
            }
        }

        let results = join_all(ids.iter().map(|id| self.engine.refresh(id))).await;

        let mut summary = PollSummary {
            checked: ids.len(),
            ..PollSummary::default()
        };
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(Some(_)) => summary.changed.push(id),
                Ok(None) => {}
                Err(SyncError::Remote(e)) if e.status_code() == Some(404) => {
                    tracing::warn!("🗑️ Workflow {} no longer exists on the remote; not polling it", id);
                    self.engine.synced().forget(&id);
                    summary.failed.push(id);
                }
                Err(e) => {
                    tracing::warn!("⚠️ Polling workflow {} failed: {}", id, e);
                    summary.failed.push(id);
                }
            }
        }
        summary
    }
}
