//! Prometheus metrics registry for the exporter.
//!
//! [`AppMetrics`] owns every registered metric and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and hand it to the
//! producers and the HTTP layer.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`).

use prometheus::{Gauge, GaugeVec, Opts, Registry};

pub const RUNNER_LABELS: &[&str] = &["repo", "os", "name", "id", "labels", "busy"];
pub const ORG_RUNNER_LABELS: &[&str] = &["organization", "os", "name", "id", "labels", "busy"];

pub struct AppMetrics {
    /// Run status by conclusion: success 1, skipped 2, in_progress 3, queued 4, else 0.
    pub workflow_run_status: GaugeVec,
    pub workflow_run_duration_ms: GaugeVec,
    /// Job start time, unix seconds.
    pub workflow_run_started: GaugeVec,
    /// Job completion time, unix seconds.
    pub workflow_run_completed: GaugeVec,
    /// 1 when the repository runner is online.
    pub runner_status: GaugeVec,
    /// 1 when the organization runner is online.
    pub runner_organization_status: GaugeVec,
    pub cached_repositories: Gauge,
    pub cached_workflows: Gauge,
    pub rate_limit_remaining: Gauge,
    pub rate_limit_limit: Gauge,
    /// Label names of the workflow run gauges, in order.
    pub export_fields: Vec<String>,
    pub registry: Registry,
}

impl AppMetrics {
    /// Create and register all metrics. `export_fields` become the label
    /// names of the four workflow run gauges.
    pub fn new(export_fields: &[String]) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let fields: Vec<&str> = export_fields.iter().map(String::as_str).collect();

        let workflow_run_status = GaugeVec::new(
            Opts::new("github_workflow_run_status", "Workflow run status"),
            &fields,
        )?;
        let workflow_run_duration_ms = GaugeVec::new(
            Opts::new(
                "github_workflow_run_duration_ms",
                "Workflow run duration (in milliseconds)",
            ),
            &fields,
        )?;
        let workflow_run_started = GaugeVec::new(
            Opts::new("github_workflow_run_status_started", "Workflow run status started"),
            &fields,
        )?;
        let workflow_run_completed = GaugeVec::new(
            Opts::new(
                "github_workflow_run_status_completed",
                "Workflow run status completed",
            ),
            &fields,
        )?;
        let runner_status = GaugeVec::new(
            Opts::new("github_runner_status", "runner status"),
            RUNNER_LABELS,
        )?;
        let runner_organization_status = GaugeVec::new(
            Opts::new("github_runner_organization_status", "runner status"),
            ORG_RUNNER_LABELS,
        )?;

        let cached_repositories = Gauge::with_opts(Opts::new(
            "github_exporter_cached_repositories",
            "Repositories currently held in the repository cache",
        ))?;
        let cached_workflows = Gauge::with_opts(Opts::new(
            "github_exporter_cached_workflows",
            "Workflow definitions currently held in the workflow cache",
        ))?;
        let rate_limit_remaining = Gauge::with_opts(Opts::new(
            "github_exporter_rate_limit_remaining",
            "Remaining GitHub API requests in the current window",
        ))?;
        let rate_limit_limit = Gauge::with_opts(Opts::new(
            "github_exporter_rate_limit_limit",
            "GitHub API request quota per window",
        ))?;

        registry.register(Box::new(workflow_run_status.clone()))?;
        registry.register(Box::new(workflow_run_duration_ms.clone()))?;
        registry.register(Box::new(workflow_run_started.clone()))?;
        registry.register(Box::new(workflow_run_completed.clone()))?;
        registry.register(Box::new(runner_status.clone()))?;
        registry.register(Box::new(runner_organization_status.clone()))?;
        registry.register(Box::new(cached_repositories.clone()))?;
        registry.register(Box::new(cached_workflows.clone()))?;
        registry.register(Box::new(rate_limit_remaining.clone()))?;
        registry.register(Box::new(rate_limit_limit.clone()))?;

        Ok(Self {
            workflow_run_status,
            workflow_run_duration_ms,
            workflow_run_started,
            workflow_run_completed,
            runner_status,
            runner_organization_status,
            cached_repositories,
            cached_workflows,
            rate_limit_remaining,
            rate_limit_limit,
            export_fields: export_fields.to_vec(),
            registry,
        })
    }

    /// Render all metrics as Prometheus text format (for the `/metrics` endpoint).
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}
