//! Cache size and API quota gauges.

use crate::cache::ActionsCache;
use crate::metrics::AppMetrics;

pub async fn record_cache_stats(cache: &ActionsCache, metrics: &AppMetrics) {
    metrics.cached_repositories.set(cache.repos().len().await as f64);
    metrics.cached_workflows.set(cache.workflows().workflow_count().await as f64);

    match cache.client().rate_limit_status().await {
        Ok(status) => {
            metrics.rate_limit_remaining.set(status.remaining as f64);
            metrics.rate_limit_limit.set(status.limit as f64);
        }
        Err(err) => tracing::debug!("Could not read rate limit status: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;

    use crate::cache::RecheckPolicy;
    use crate::clock::ManualClock;
    use crate::config::Scope;
    use crate::services::mock_github::{workflow, MockGithubClient};

    #[tokio::test]
    async fn gauges_track_cache_contents_and_quota() {
        let client = Arc::new(
            MockGithubClient::new()
                .with_org_repos("acme", &["api", "docs"])
                .with_workflows("acme/api", vec![workflow(1, "CI"), workflow(2, "Release")]),
        );
        client.set_rate_limit(4321, 5000);
        let cache = ActionsCache::new(
            client,
            Arc::new(ManualClock::new(Utc::now())),
            Scope::Organizations(vec!["acme".into()]),
            RecheckPolicy::default(),
        );
        cache.pre_seed().await;
        let metrics = AppMetrics::new(&["repo".to_string()]).unwrap();

        record_cache_stats(&cache, &metrics).await;

        assert_eq!(metrics.cached_repositories.get(), 2.0);
        assert_eq!(metrics.cached_workflows.get(), 2.0);
        assert_eq!(metrics.rate_limit_remaining.get(), 4321.0);
        assert_eq!(metrics.rate_limit_limit.get(), 5000.0);
    }
}
