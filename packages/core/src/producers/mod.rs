//! Metric producers.
//!
//! Read-only consumers of the caches: they decide from the repository and
//! workflow caches which repositories to expand into run, job and runner
//! queries, and publish the results as Prometheus gauges. Each producer runs
//! on its own task with its own cancellation token.

pub mod runners;
pub mod runs;
pub mod stats;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::ActionsCache;
use crate::metrics::AppMetrics;
use crate::scheduler::run_periodic;

pub struct ProducerJob {
    pub name: &'static str,
    pub stop: CancellationToken,
    pub task: JoinHandle<()>,
}

pub struct ProducerJobs {
    pub jobs: Vec<ProducerJob>,
}

impl ProducerJobs {
    pub async fn shutdown(self) {
        for job in &self.jobs {
            job.stop.cancel();
        }
        for job in self.jobs {
            if let Err(err) = job.task.await {
                tracing::error!(producer = job.name, "Producer task failed: {}", err);
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Producer {
    WorkflowRuns,
    RepoRunners,
    OrgRunners,
    CacheStats,
}

impl Producer {
    fn name(self) -> &'static str {
        match self {
            Producer::WorkflowRuns => "workflow runs",
            Producer::RepoRunners => "repository runners",
            Producer::OrgRunners => "organization runners",
            Producer::CacheStats => "cache stats",
        }
    }

    async fn collect(self, cache: &ActionsCache, metrics: &AppMetrics) {
        match self {
            Producer::WorkflowRuns => runs::collect_workflow_runs(cache, metrics).await,
            Producer::RepoRunners => runners::collect_repo_runners(cache, metrics).await,
            Producer::OrgRunners => runners::collect_org_runners(cache, metrics).await,
            Producer::CacheStats => stats::record_cache_stats(cache, metrics).await,
        }
    }
}

/// Start every producer. Each collects once immediately, then every `interval`.
pub fn start(cache: Arc<ActionsCache>, metrics: Arc<AppMetrics>, interval: Duration) -> ProducerJobs {
    let producers = [
        Producer::WorkflowRuns,
        Producer::RepoRunners,
        Producer::OrgRunners,
        Producer::CacheStats,
    ];

    let jobs = producers
        .into_iter()
        .map(|producer| {
            let stop = CancellationToken::new();
            let (cache, metrics, token) = (cache.clone(), metrics.clone(), stop.clone());
            let task = tokio::spawn(async move {
                producer.collect(&cache, &metrics).await;
                run_periodic(producer.name(), interval, token, || {
                    let (cache, metrics) = (cache.clone(), metrics.clone());
                    async move { producer.collect(&cache, &metrics).await }
                })
                .await;
            });
            ProducerJob { name: producer.name(), stop, task }
        })
        .collect();

    ProducerJobs { jobs }
}
