//! Workflow run and job gauges.

use chrono::Duration;

use crate::cache::ActionsCache;
use crate::fetcher::call_with_rate_limit;
use crate::metrics::AppMetrics;
use crate::services::types::{WorkflowJob, WorkflowRun};

/// Runs older than this are not expanded into job queries.
pub const RUN_WINDOW_HOURS: i64 = 24;

/// Everything a label value can be drawn from.
pub struct RunContext<'a> {
    pub repo: &'a str,
    pub workflow: &'a str,
    pub run: &'a WorkflowRun,
    pub job: &'a WorkflowJob,
}

pub fn field_value(field: &str, ctx: &RunContext<'_>) -> String {
    match field {
        "repo" => ctx.repo.to_string(),
        "id" => ctx.run.id.to_string(),
        "head_branch" => ctx.run.head_branch.clone().unwrap_or_default(),
        "run_number" => ctx.run.run_number.to_string(),
        "workflow" => ctx.workflow.to_string(),
        "event" => ctx.run.event.clone(),
        "status" => ctx.run.status.clone().unwrap_or_default(),
        "runner_name" => ctx.job.runner_name.clone().unwrap_or_default(),
        "job_name" => ctx.job.name.clone(),
        "job_status" => ctx.job.status.clone(),
        _ => String::new(),
    }
}

/// Gauge value for a run: the conclusion once finished, the status before.
pub fn run_status_value(run: &WorkflowRun) -> f64 {
    let state = run.conclusion.as_deref().or(run.status.as_deref());
    match state {
        Some("success") => 1.0,
        Some("skipped") => 2.0,
        Some("in_progress") => 3.0,
        Some("queued") => 4.0,
        _ => 0.0,
    }
}

pub async fn collect_workflow_runs(cache: &ActionsCache, metrics: &AppMetrics) {
    let client = cache.client();
    let clock = cache.clock().as_ref();

    for repo in cache.workflows().repositories().await {
        let runs = match call_with_rate_limit(clock, &repo, || client.list_workflow_runs(&repo, 1)).await {
            Ok(page) => page.items,
            Err(err) => {
                tracing::error!(repo = %repo, "Error listing workflow runs: {}", err);
                continue;
            }
        };

        let cutoff = clock.now() - Duration::hours(RUN_WINDOW_HOURS);
        for run in runs.iter().filter(|run| run.created_at > cutoff) {
            let jobs = match call_with_rate_limit(clock, &repo, || {
                client.list_workflow_jobs(&repo, run.id)
            })
            .await
            {
                Ok(jobs) => jobs,
                Err(err) => {
                    tracing::warn!(repo = %repo, run_id = run.id, "Error listing workflow jobs: {}", err);
                    continue;
                }
            };
            if jobs.is_empty() {
                continue;
            }

            let usage = match call_with_rate_limit(clock, &repo, || client.get_run_usage(&repo, run.id)).await {
                Ok(usage) => Some(usage),
                Err(err) => {
                    tracing::warn!(repo = %repo, run_id = run.id, "Error getting run usage: {}", err);
                    None
                }
            };

            let workflow = cache
                .workflows()
                .workflow(&repo, run.workflow_id)
                .await
                .map(|w| w.name)
                .or_else(|| run.name.clone())
                .unwrap_or_default();

            for job in &jobs {
                let ctx = RunContext { repo: &repo, workflow: &workflow, run, job };
                let values: Vec<String> = metrics
                    .export_fields
                    .iter()
                    .map(|field| field_value(field, &ctx))
                    .collect();
                let labels: Vec<&str> = values.iter().map(String::as_str).collect();

                metrics
                    .workflow_run_status
                    .with_label_values(&labels)
                    .set(run_status_value(run));
                if let Some(started) = job.started_at {
                    metrics
                        .workflow_run_started
                        .with_label_values(&labels)
                        .set(started.timestamp() as f64);
                }
                if let Some(completed) = job.completed_at {
                    metrics
                        .workflow_run_completed
                        .with_label_values(&labels)
                        .set(completed.timestamp() as f64);
                }
                if let Some(usage) = &usage {
                    metrics
                        .workflow_run_duration_ms
                        .with_label_values(&labels)
                        .set(usage.run_duration_ms as f64);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};

    use crate::cache::RecheckPolicy;
    use crate::clock::ManualClock;
    use crate::config::{Scope, DEFAULT_EXPORT_FIELDS};
    use crate::services::mock_github::{workflow, Call, MockGithubClient};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap()
    }

    fn run(id: i64, conclusion: Option<&str>, hours_ago: i64) -> WorkflowRun {
        WorkflowRun {
            id,
            name: Some("ci.yml".into()),
            head_branch: Some("main".into()),
            run_number: id * 10,
            event: "push".into(),
            status: Some("completed".into()),
            conclusion: conclusion.map(String::from),
            workflow_id: 1,
            created_at: now() - Duration::hours(hours_ago),
        }
    }

    fn job(id: i64, name: &str) -> WorkflowJob {
        WorkflowJob {
            id,
            name: name.into(),
            status: "completed".into(),
            conclusion: Some("success".into()),
            runner_name: Some("builder-1".into()),
            started_at: Some(now() - Duration::minutes(10)),
            completed_at: Some(now() - Duration::minutes(2)),
        }
    }

    fn metrics() -> AppMetrics {
        let fields: Vec<String> = DEFAULT_EXPORT_FIELDS.split(',').map(String::from).collect();
        AppMetrics::new(&fields).unwrap()
    }

    #[test]
    fn status_value_maps_conclusions_and_statuses() {
        assert_eq!(run_status_value(&run(1, Some("success"), 1)), 1.0);
        assert_eq!(run_status_value(&run(1, Some("skipped"), 1)), 2.0);
        assert_eq!(run_status_value(&run(1, Some("failure"), 1)), 0.0);

        let mut in_progress = run(1, None, 1);
        in_progress.status = Some("in_progress".into());
        assert_eq!(run_status_value(&in_progress), 3.0);
        in_progress.status = Some("queued".into());
        assert_eq!(run_status_value(&in_progress), 4.0);
    }

    #[test]
    fn field_values_follow_context() {
        let r = run(5, Some("success"), 1);
        let j = job(9, "build");
        let ctx = RunContext { repo: "acme/api", workflow: "CI", run: &r, job: &j };

        assert_eq!(field_value("repo", &ctx), "acme/api");
        assert_eq!(field_value("id", &ctx), "5");
        assert_eq!(field_value("run_number", &ctx), "50");
        assert_eq!(field_value("workflow", &ctx), "CI");
        assert_eq!(field_value("runner_name", &ctx), "builder-1");
        assert_eq!(field_value("job_name", &ctx), "build");
        assert_eq!(field_value("unknown", &ctx), "");
    }

    #[tokio::test]
    async fn recent_runs_are_expanded_into_job_gauges() {
        let client = Arc::new(
            MockGithubClient::new()
                .with_org_repos("acme", &["api"])
                .with_workflows("acme/api", vec![workflow(1, "CI")])
                .with_runs("acme/api", vec![run(100, Some("success"), 2), run(101, Some("success"), 30)])
                .with_jobs("acme/api", 100, vec![job(1, "build"), job(2, "test")])
                .with_usage("acme/api", 100, 480_000),
        );
        let cache = ActionsCache::new(
            client.clone(),
            Arc::new(ManualClock::new(now())),
            Scope::Organizations(vec!["acme".into()]),
            RecheckPolicy::default(),
        );
        cache.pre_seed().await;
        let metrics = metrics();

        collect_workflow_runs(&cache, &metrics).await;

        assert_eq!(
            client.count_calls(|c| matches!(c, Call::ListWorkflowJobs { .. })),
            1,
            "the 30h old run must not be expanded"
        );
        let build = metrics.workflow_run_status.with_label_values(&[
            "acme/api", "main", "1000", "CI", "push", "completed", "builder-1", "build", "completed",
        ]);
        assert_eq!(build.get(), 1.0);
        let duration = metrics.workflow_run_duration_ms.with_label_values(&[
            "acme/api", "main", "1000", "CI", "push", "completed", "builder-1", "test", "completed",
        ]);
        assert_eq!(duration.get(), 480_000.0);
    }

    #[tokio::test]
    async fn repositories_outside_the_workflow_cache_are_not_queried() {
        let client = Arc::new(
            MockGithubClient::new()
                .with_org_repos("acme", &["api", "docs"])
                .with_workflows("acme/api", vec![workflow(1, "CI")]),
        );
        let cache = ActionsCache::new(
            client.clone(),
            Arc::new(ManualClock::new(now())),
            Scope::Organizations(vec!["acme".into()]),
            RecheckPolicy::default(),
        );
        cache.pre_seed().await;

        collect_workflow_runs(&cache, &metrics()).await;

        let runs_for_docs = client.count_calls(
            |c| matches!(c, Call::ListWorkflowRuns { repo, .. } if repo == "acme/docs"),
        );
        assert_eq!(runs_for_docs, 0);
    }
}
