//! Cache refresh scheduler.
//!
//! Drives two independent loops: one calls
//! [`ActionsCache::refresh_repositories`] every `repo_interval`, the other
//! calls [`ActionsCache::refresh_workflows`] every `workflow_interval`. Each
//! loop owns its own [`CancellationToken`]; cancelling one leaves the other
//! running.
//!
//! A refresh runs inside the loop body, so a slow cycle (for example one
//! suspended on a rate limit) delays the next tick instead of overlapping
//! it, and cancellation is only observed between cycles.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::cache::ActionsCache;

/// Handles to the two running cache jobs.
pub struct CacheJobs {
    pub stop_repo: CancellationToken,
    pub stop_workflow: CancellationToken,
    pub repo_task: JoinHandle<()>,
    pub workflow_task: JoinHandle<()>,
}

impl CacheJobs {
    /// Cancel both loops and wait for in-flight cycles to finish.
    pub async fn shutdown(self) {
        self.stop_repo.cancel();
        self.stop_workflow.cancel();
        let _ = self.repo_task.await;
        let _ = self.workflow_task.await;
    }
}

/// Start both cache jobs. The first tick of each fires one full interval
/// after the call, since [`ActionsCache::pre_seed`] has just run.
pub fn start(
    cache: Arc<ActionsCache>,
    repo_interval: Duration,
    workflow_interval: Duration,
) -> CacheJobs {
    let stop_repo = CancellationToken::new();
    let stop_workflow = CancellationToken::new();

    let repo_cache = cache.clone();
    let repo_task = tokio::spawn(run_periodic(
        "repo cache",
        repo_interval,
        stop_repo.clone(),
        move || {
            let cache = repo_cache.clone();
            async move {
                cache.refresh_repositories().await;
            }
        },
    ));

    let workflow_task = tokio::spawn(run_periodic(
        "workflow cache",
        workflow_interval,
        stop_workflow.clone(),
        move || {
            let cache = cache.clone();
            async move {
                cache.refresh_workflows().await;
            }
        },
    ));

    CacheJobs {
        stop_repo,
        stop_workflow,
        repo_task,
        workflow_task,
    }
}

/// Run `job` every `period` until `stop` is cancelled.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    stop: CancellationToken,
    mut job: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!("Starting {} job (interval: {}s)", name, period.as_secs());

    loop {
        tokio::select! {
            biased;

            _ = stop.cancelled() => {
                tracing::info!("Stop signal received. Stopping {} job.", name);
                break;
            }

            _ = interval.tick() => {
                job().await;
            }
        }
    }

    tracing::info!("{} job stopped cleanly", name);
}
