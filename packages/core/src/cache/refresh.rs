//! Refresh engine for the repository and workflow caches.
//!
//! [`ActionsCache`] owns the API client, the clock and both caches.
//! `refresh_repositories` rebuilds the repository cache from upstream
//! listings; `refresh_workflows` rescans workflow definitions only for
//! repositories that run workflows and are due, so the number of
//! workflow-definition calls per sweep tracks active repositories rather
//! than the size of the scope.
//!
//! Each refresh kind is serialised by its own mutex. The two kinds may run
//! concurrently with each other and with readers.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::cache::repos::{RepoCache, RepoCacheEntry};
use crate::cache::workflows::WorkflowCache;
use crate::clock::Clock;
use crate::config::{Config, RecheckOnError, Scope};
use crate::fetcher::{call_with_rate_limit, fetch_all_pages};
use crate::services::error::GithubError;
use crate::services::github::GithubApi;
use crate::services::types::{is_owned_by, Repository};

/// `now + window`, saturating at the latest representable instant.
fn recheck_at(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Tiered recheck windows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecheckPolicy {
    pub active: Duration,
    pub inactive: Duration,
    pub on_error: RecheckOnError,
}

impl RecheckPolicy {
    pub fn from_config(config: &Config) -> Self {
        let to_chrono =
            |d: std::time::Duration| Duration::from_std(d).unwrap_or_else(|_| Duration::days(365));
        Self {
            active: to_chrono(config.active_recheck),
            inactive: to_chrono(config.inactive_recheck),
            on_error: config.recheck_on_error,
        }
    }
}

impl Default for RecheckPolicy {
    fn default() -> Self {
        Self {
            active: Duration::seconds(60),
            inactive: Duration::seconds(300),
            on_error: RecheckOnError::Advance,
        }
    }
}

/// Outcome of one `refresh_repositories` pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RepoRefreshReport {
    pub scopes_refreshed: usize,
    pub scopes_failed: usize,
    pub upserted: usize,
    pub evicted: Vec<String>,
}

/// Outcome of one `refresh_workflows` sweep.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WorkflowRefreshReport {
    pub scanned: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cleaned: Vec<String>,
}

pub struct ActionsCache {
    client: Arc<dyn GithubApi>,
    clock: Arc<dyn Clock>,
    scope: Scope,
    policy: RecheckPolicy,
    repos: RepoCache,
    workflows: WorkflowCache,
    repo_refresh: Mutex<()>,
    workflow_refresh: Mutex<()>,
}

impl ActionsCache {
    pub fn new(
        client: Arc<dyn GithubApi>,
        clock: Arc<dyn Clock>,
        scope: Scope,
        policy: RecheckPolicy,
    ) -> Self {
        Self {
            client,
            clock,
            scope,
            policy,
            repos: RepoCache::new(),
            workflows: WorkflowCache::new(),
            repo_refresh: Mutex::new(()),
            workflow_refresh: Mutex::new(()),
        }
    }

    pub fn repos(&self) -> &RepoCache {
        &self.repos
    }

    pub fn workflows(&self) -> &WorkflowCache {
        &self.workflows
    }

    pub fn client(&self) -> &Arc<dyn GithubApi> {
        &self.client
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn policy(&self) -> RecheckPolicy {
        self.policy
    }

    /// Warm both caches once so the first scrape is not empty.
    pub async fn pre_seed(&self) {
        tracing::info!("Pre-seeding cache");
        self.refresh_repositories().await;
        self.refresh_workflows().await;
        let repos = self.repos.len().await;
        let workflow_repos = self.workflows.len().await;
        tracing::info!(repos, workflow_repos, "Pre-seeding cache complete");
    }

    pub async fn refresh_repositories(&self) -> RepoRefreshReport {
        let _serial = self.repo_refresh.lock().await;
        let mut report = RepoRefreshReport::default();

        match &self.scope {
            Scope::Organizations(orgs) => {
                for org in orgs {
                    self.refresh_organization(org, &mut report).await;
                }
            }
            Scope::Repositories(identities) => {
                for identity in identities {
                    self.refresh_listed_repository(identity, &mut report).await;
                }
            }
        }

        let repos = self.repos.len().await;
        tracing::info!(
            repos,
            upserted = report.upserted,
            evicted = report.evicted.len(),
            failed_scopes = report.scopes_failed,
            "Repo cache refreshed"
        );
        self.log_rate_limit().await;
        report
    }

    async fn refresh_organization(&self, org: &str, report: &mut RepoRefreshReport) {
        let fetched = fetch_all_pages(self.clock.as_ref(), org, |page| {
            self.client.list_org_repositories(org, page)
        })
        .await;

        // A partial listing would evict repositories that merely sit on a
        // page we never saw.
        let repos = match fetched.into_result() {
            Ok(repos) => repos,
            Err(err) => {
                tracing::error!(org, "Error getting repos for org: {}", err);
                report.scopes_failed += 1;
                return;
            }
        };
        tracing::debug!(org, count = repos.len(), "Listed organization repositories");

        let mut present = HashSet::with_capacity(repos.len());
        for repo in repos {
            present.insert(repo.full_name.clone());
            self.upsert_repository(repo).await;
            report.upserted += 1;
        }

        let evicted = self
            .repos
            .evict_absent(|key| is_owned_by(key, org), &present)
            .await;
        for identity in &evicted {
            tracing::info!(org, repo = %identity, "Repo no longer listed, removed from cache");
        }
        report.evicted.extend(evicted);
        report.scopes_refreshed += 1;
    }

    async fn refresh_listed_repository(&self, identity: &str, report: &mut RepoRefreshReport) {
        let result = call_with_rate_limit(self.clock.as_ref(), identity, || {
            self.client.get_repository(identity)
        })
        .await;

        match result {
            Ok(repo) => {
                let present: HashSet<String> = [repo.full_name.clone()].into_iter().collect();
                self.upsert_repository(repo).await;
                report.upserted += 1;
                // Drop a stale key left behind by a rename or case change.
                let evicted = self
                    .repos
                    .evict_absent(|key| key.eq_ignore_ascii_case(identity), &present)
                    .await;
                report.evicted.extend(evicted);
                report.scopes_refreshed += 1;
            }
            Err(GithubError::NotFound { .. }) => {
                let evicted = self
                    .repos
                    .evict_absent(|key| key.eq_ignore_ascii_case(identity), &HashSet::new())
                    .await;
                tracing::warn!(repo = identity, "Repo not found upstream, removed from cache");
                report.evicted.extend(evicted);
                report.scopes_refreshed += 1;
            }
            Err(err) => {
                tracing::error!(repo = identity, "Error getting repo: {}", err);
                report.scopes_failed += 1;
            }
        }
    }

    async fn upsert_repository(&self, repo: Repository) {
        let identity = repo.full_name.clone();
        let has_workflows = self.probe_has_workflows(&identity).await;
        self.repos
            .upsert(RepoCacheEntry {
                identity,
                metadata: repo,
                has_workflows,
                next_check_at: self.clock.now(),
            })
            .await;
    }

    /// On failure an existing entry keeps its previous answer.
    async fn probe_has_workflows(&self, identity: &str) -> bool {
        let result = call_with_rate_limit(self.clock.as_ref(), identity, || {
            self.client.probe_has_workflows(identity)
        })
        .await;

        match result {
            Ok(has_workflows) => has_workflows,
            Err(err) => {
                tracing::warn!(repo = identity, "Error probing workflows: {}", err);
                self.repos
                    .get(identity)
                    .await
                    .map(|entry| entry.has_workflows)
                    .unwrap_or(false)
            }
        }
    }

    pub async fn refresh_workflows(&self) -> WorkflowRefreshReport {
        let _serial = self.workflow_refresh.lock().await;
        let mut report = WorkflowRefreshReport::default();
        tracing::info!("Caching workflows...");

        for entry in self.repos.snapshot().await {
            let now = self.clock.now();
            if !(entry.has_workflows && entry.is_due(now)) {
                tracing::trace!(repo = %entry.identity, "Skipping repo");
                self.repos
                    .set_next_check(&entry.identity, recheck_at(now, self.policy.inactive))
                    .await;
                report.skipped += 1;
                continue;
            }

            tracing::debug!(repo = %entry.identity, "Checking for workflows");
            let fetched = fetch_all_pages(self.clock.as_ref(), &entry.identity, |page| {
                self.client.list_workflows(&entry.identity, page)
            })
            .await;

            match fetched.into_result() {
                Ok(workflows) => {
                    let count = self.workflows.replace(&entry.identity, workflows).await;
                    self.repos
                        .set_next_check(&entry.identity, recheck_at(self.clock.now(), self.policy.active))
                        .await;
                    tracing::debug!(repo = %entry.identity, count, "Cached workflows");
                    report.scanned += 1;
                }
                Err(err) => {
                    tracing::error!(repo = %entry.identity, "Error getting workflows: {}", err);
                    if self.policy.on_error == RecheckOnError::Advance {
                        self.repos
                            .set_next_check(&entry.identity, recheck_at(self.clock.now(), self.policy.active))
                            .await;
                    }
                    report.failed += 1;
                }
            }
        }

        report.cleaned = self.cleanup_workflows().await;
        let workflow_repos = self.workflows.len().await;
        let workflows = self.workflows.workflow_count().await;
        tracing::info!(
            workflow_repos,
            workflows,
            scanned = report.scanned,
            skipped = report.skipped,
            failed = report.failed,
            "Workflow cache refreshed"
        );
        self.log_rate_limit().await;
        report
    }

    /// Remove workflow entries whose repository left the repository cache.
    pub async fn cleanup_workflows(&self) -> Vec<String> {
        let keep = self.repos.keys().await;
        let dropped = self.workflows.retain_repositories(&keep).await;
        for identity in &dropped {
            tracing::debug!(repo = %identity, "Deleting workflow cache for repo");
        }
        dropped
    }

    async fn log_rate_limit(&self) {
        match self.client.rate_limit_status().await {
            Ok(status) => tracing::info!("API rate limit: {}/{}", status.remaining, status.limit),
            Err(err) => tracing::warn!("Error getting rate limit: {}", err),
        }
    }
}
