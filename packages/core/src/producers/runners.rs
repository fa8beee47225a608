//! Self-hosted runner gauges.
//!
//! Each sweep gathers the full runner list first, then resets the gauge and
//! publishes it in one step so removed runners drop out of the export. An
//! owner whose listing failed keeps the series of the previous sweep.

use std::collections::{HashMap, HashSet};

use prometheus::core::Collector;
use prometheus::GaugeVec;

use crate::cache::ActionsCache;
use crate::fetcher::{call_with_rate_limit, fetch_all_pages};
use crate::metrics::{AppMetrics, ORG_RUNNER_LABELS, RUNNER_LABELS};
use crate::services::types::Runner;

fn online_value(runner: &Runner) -> f64 {
    if runner.is_online() {
        1.0
    } else {
        0.0
    }
}

/// Exported series whose owner (first label) is in `owners`, as label values
/// in `label_names` order with the current value.
fn series_for(
    gauge: &GaugeVec,
    label_names: &[&str],
    owners: &HashSet<String>,
) -> Vec<(Vec<String>, f64)> {
    let Some(owner_label) = label_names.first() else {
        return Vec::new();
    };

    gauge
        .collect()
        .iter()
        .flat_map(|family| family.get_metric())
        .filter_map(|metric| {
            let by_name: HashMap<&str, &str> = metric
                .get_label()
                .iter()
                .map(|pair| (pair.get_name(), pair.get_value()))
                .collect();
            let owner = by_name.get(owner_label)?;
            if !owners.contains(*owner) {
                return None;
            }
            let values: Vec<String> = label_names
                .iter()
                .map(|name| by_name.get(name).map(|v| v.to_string()).unwrap_or_default())
                .collect();
            Some((values, metric.get_gauge().get_value()))
        })
        .collect()
}

fn publish(
    gauge: &GaugeVec,
    label_names: &[&str],
    runners: &[(String, Runner)],
    failed: &HashSet<String>,
) {
    let kept = series_for(gauge, label_names, failed);
    gauge.reset();

    for (values, value) in &kept {
        let values: Vec<&str> = values.iter().map(String::as_str).collect();
        gauge.with_label_values(&values).set(*value);
    }
    for (owner, runner) in runners {
        let id = runner.id.to_string();
        let labels = runner.label_list();
        let busy = runner.busy.to_string();
        gauge
            .with_label_values(&[
                owner.as_str(),
                runner.os.as_str(),
                runner.name.as_str(),
                id.as_str(),
                labels.as_str(),
                busy.as_str(),
            ])
            .set(online_value(runner));
    }
}

/// Runners attached to repositories that have workflows.
pub async fn collect_repo_runners(cache: &ActionsCache, metrics: &AppMetrics) {
    let client = cache.client();
    let clock = cache.clock().as_ref();
    let mut collected = Vec::new();
    let mut failed = HashSet::new();

    for repo in cache.workflows().repositories().await {
        match call_with_rate_limit(clock, &repo, || client.list_repo_runners(&repo)).await {
            Ok(runners) => collected.extend(runners.into_iter().map(|r| (repo.clone(), r))),
            Err(err) => {
                tracing::error!(repo = %repo, "ListRunners error: {}", err);
                failed.insert(repo);
            }
        }
    }

    publish(&metrics.runner_status, RUNNER_LABELS, &collected, &failed);
}

/// Runners registered at organization level, for every configured organization.
pub async fn collect_org_runners(cache: &ActionsCache, metrics: &AppMetrics) {
    let orgs = cache.scope().organizations();
    if orgs.is_empty() {
        return;
    }

    let client = cache.client();
    let clock = cache.clock().as_ref();
    let mut collected = Vec::new();
    let mut failed = HashSet::new();

    for org in orgs {
        let fetched = fetch_all_pages(clock, org, |page| client.list_org_runners(org, page)).await;
        match fetched.into_result() {
            Ok(runners) => collected.extend(runners.into_iter().map(|r| (org.clone(), r))),
            Err(err) => {
                tracing::error!(org = %org, "ListOrganizationRunners error: {}", err);
                failed.insert(org.clone());
            }
        }
    }

    publish(&metrics.runner_organization_status, ORG_RUNNER_LABELS, &collected, &failed);
}
