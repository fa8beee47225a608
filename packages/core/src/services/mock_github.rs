//! Scriptable in-memory [`GithubApi`] for tests.
//!
//! Holds organizations, repositories, workflows, runs and runners in memory,
//! pages listings with a configurable page size, records every call, and can
//! inject errors for specific calls. An optional latency makes listing calls
//! yield so concurrent refreshes actually interleave.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::services::error::{GithubError, GithubResult};
use crate::services::github::GithubApi;
use crate::services::types::*;

/// A single recorded upstream call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Call {
    ListOrgRepositories { org: String, page: u32 },
    GetRepository(String),
    ProbeHasWorkflows(String),
    ListWorkflows { repo: String, page: u32 },
    ListWorkflowRuns { repo: String, page: u32 },
    ListWorkflowJobs { repo: String, run_id: i64 },
    GetRunUsage { repo: String, run_id: i64 },
    ListRepoRunners(String),
    ListOrgRunners { org: String, page: u32 },
    RateLimitStatus,
}

struct Failure {
    call: Call,
    error: GithubError,
    persistent: bool,
}

struct MockState {
    page_size: usize,
    org_repos: HashMap<String, Vec<Repository>>,
    workflows: HashMap<String, Vec<Workflow>>,
    runs: HashMap<String, Vec<WorkflowRun>>,
    jobs: HashMap<(String, i64), Vec<WorkflowJob>>,
    usage: HashMap<(String, i64), RunUsage>,
    repo_runners: HashMap<String, Vec<Runner>>,
    org_runners: HashMap<String, Vec<Runner>>,
    failures: Vec<Failure>,
    calls: Vec<Call>,
    rate_limit: RateLimitStatus,
    latency: Option<std::time::Duration>,
    org_listings_in_flight: usize,
    max_org_listings_in_flight: usize,
}

pub struct MockGithubClient {
    state: Mutex<MockState>,
}

impl Default for MockGithubClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a repository payload for `owner/name`.
pub fn repository(full_name: &str) -> Repository {
    let (owner, name) = split_identity(full_name).unwrap_or((full_name, full_name));
    Repository {
        id: full_name.bytes().map(u64::from).sum(),
        name: name.to_string(),
        full_name: full_name.to_string(),
        owner: Owner { login: owner.to_string() },
        default_branch: Some("main".to_string()),
        private: false,
        archived: false,
        html_url: Some(format!("https://github.com/{full_name}")),
    }
}

pub fn workflow(id: i64, name: &str) -> Workflow {
    Workflow {
        id,
        name: name.to_string(),
        path: format!(".github/workflows/{}.yml", name.to_lowercase().replace(' ', "-")),
        state: "active".to_string(),
    }
}

impl MockGithubClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                page_size: 100,
                org_repos: HashMap::new(),
                workflows: HashMap::new(),
                runs: HashMap::new(),
                jobs: HashMap::new(),
                usage: HashMap::new(),
                repo_runners: HashMap::new(),
                org_runners: HashMap::new(),
                failures: Vec::new(),
                calls: Vec::new(),
                rate_limit: RateLimitStatus {
                    remaining: 5000,
                    limit: 5000,
                    reset_at: DateTime::<Utc>::UNIX_EPOCH,
                },
                latency: None,
                org_listings_in_flight: 0,
                max_org_listings_in_flight: 0,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_page_size(self, page_size: usize) -> Self {
        self.state().page_size = page_size.max(1);
        self
    }

    /// Every listing and probe call sleeps for `latency` (tokio time).
    pub fn with_latency(self, latency: std::time::Duration) -> Self {
        self.state().latency = Some(latency);
        self
    }

    pub fn with_org_repos(self, org: &str, names: &[&str]) -> Self {
        self.set_org_repos(org, names);
        self
    }

    pub fn with_workflows(self, repo: &str, workflows: Vec<Workflow>) -> Self {
        self.set_workflows(repo, workflows);
        self
    }

    pub fn with_runs(self, repo: &str, runs: Vec<WorkflowRun>) -> Self {
        self.state().runs.insert(repo.to_string(), runs);
        self
    }

    pub fn with_jobs(self, repo: &str, run_id: i64, jobs: Vec<WorkflowJob>) -> Self {
        self.state().jobs.insert((repo.to_string(), run_id), jobs);
        self
    }

    pub fn with_usage(self, repo: &str, run_id: i64, run_duration_ms: u64) -> Self {
        self.state()
            .usage
            .insert((repo.to_string(), run_id), RunUsage { run_duration_ms });
        self
    }

    pub fn with_repo_runners(self, repo: &str, runners: Vec<Runner>) -> Self {
        self.state().repo_runners.insert(repo.to_string(), runners);
        self
    }

    pub fn with_org_runners(self, org: &str, runners: Vec<Runner>) -> Self {
        self.set_org_runners(org, runners);
        self
    }

    pub fn set_org_runners(&self, org: &str, runners: Vec<Runner>) {
        self.state().org_runners.insert(org.to_string(), runners);
    }

    /// Replace the listing of `org` with repositories `org/<name>`.
    pub fn set_org_repos(&self, org: &str, names: &[&str]) {
        let repos = names
            .iter()
            .map(|name| repository(&format!("{org}/{name}")))
            .collect();
        self.state().org_repos.insert(org.to_string(), repos);
    }

    pub fn set_workflows(&self, repo: &str, workflows: Vec<Workflow>) {
        self.state().workflows.insert(repo.to_string(), workflows);
    }

    pub fn set_rate_limit(&self, remaining: u64, limit: u64) {
        let mut state = self.state();
        state.rate_limit.remaining = remaining;
        state.rate_limit.limit = limit;
    }

    pub fn set_rate_limit_reset(&self, reset_at: DateTime<Utc>) {
        self.state().rate_limit.reset_at = reset_at;
    }

    /// Fail the next matching call once with `error`.
    pub fn fail_next(&self, call: Call, error: GithubError) {
        self.state().failures.push(Failure { call, error, persistent: false });
    }

    /// Fail every matching call with `error` until [`Self::clear_failures`].
    pub fn fail_always(&self, call: Call, error: GithubError) {
        self.state().failures.push(Failure { call, error, persistent: true });
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Number of workflow-definition listing calls made for `repo`.
    pub fn workflow_listings_for(&self, repo: &str) -> usize {
        self.count_calls(|c| matches!(c, Call::ListWorkflows { repo: r, .. } if r == repo))
    }

    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }

    /// Highest number of organization listing calls that were in flight at once.
    pub fn max_concurrent_org_listings(&self) -> usize {
        self.state().max_org_listings_in_flight
    }

    async fn simulate_latency(&self) {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Record `call` and return an injected failure if one matches.
    fn record(&self, call: Call) -> GithubResult<()> {
        let mut state = self.state();
        state.calls.push(call.clone());
        if let Some(pos) = state.failures.iter().position(|f| f.call == call) {
            let error = state.failures[pos].error.clone();
            if !state.failures[pos].persistent {
                state.failures.remove(pos);
            }
            return Err(error);
        }
        Ok(())
    }

    fn page_of<T: Clone>(&self, items: &[T], page: u32) -> Page<T> {
        let size = self.state().page_size;
        let start = (page.max(1) as usize - 1) * size;
        let end = (start + size).min(items.len());
        let slice = if start < items.len() { items[start..end].to_vec() } else { Vec::new() };
        let next_page = if end < items.len() { Some(page.max(1) + 1) } else { None };
        Page { items: slice, next_page }
    }

    fn find_repository(&self, identity: &str) -> Option<Repository> {
        self.state()
            .org_repos
            .values()
            .flatten()
            .find(|r| r.full_name.eq_ignore_ascii_case(identity))
            .cloned()
    }
}

#[async_trait]
impl GithubApi for MockGithubClient {
    async fn list_org_repositories(&self, org: &str, page: u32) -> GithubResult<Page<Repository>> {
        self.record(Call::ListOrgRepositories { org: org.to_string(), page })?;
        {
            let mut state = self.state();
            state.org_listings_in_flight += 1;
            state.max_org_listings_in_flight =
                state.max_org_listings_in_flight.max(state.org_listings_in_flight);
        }
        self.simulate_latency().await;
        self.state().org_listings_in_flight -= 1;
        let repos = self
            .state()
            .org_repos
            .get(org)
            .cloned()
            .ok_or_else(|| GithubError::not_found(format!("/orgs/{org}/repos")))?;
        Ok(self.page_of(&repos, page))
    }

    async fn get_repository(&self, identity: &str) -> GithubResult<Repository> {
        self.record(Call::GetRepository(identity.to_string()))?;
        self.find_repository(identity)
            .ok_or_else(|| GithubError::not_found(format!("/repos/{identity}")))
    }

    async fn probe_has_workflows(&self, identity: &str) -> GithubResult<bool> {
        self.record(Call::ProbeHasWorkflows(identity.to_string()))?;
        self.simulate_latency().await;
        Ok(self
            .state()
            .workflows
            .get(identity)
            .map(|w| !w.is_empty())
            .unwrap_or(false))
    }

    async fn list_workflows(&self, identity: &str, page: u32) -> GithubResult<Page<Workflow>> {
        self.record(Call::ListWorkflows { repo: identity.to_string(), page })?;
        self.simulate_latency().await;
        let workflows = self.state().workflows.get(identity).cloned().unwrap_or_default();
        Ok(self.page_of(&workflows, page))
    }

    async fn list_workflow_runs(
        &self,
        identity: &str,
        page: u32,
    ) -> GithubResult<Page<WorkflowRun>> {
        self.record(Call::ListWorkflowRuns { repo: identity.to_string(), page })?;
        let runs = self.state().runs.get(identity).cloned().unwrap_or_default();
        Ok(self.page_of(&runs, page))
    }

    async fn list_workflow_jobs(
        &self,
        identity: &str,
        run_id: i64,
    ) -> GithubResult<Vec<WorkflowJob>> {
        self.record(Call::ListWorkflowJobs { repo: identity.to_string(), run_id })?;
        Ok(self
            .state()
            .jobs
            .get(&(identity.to_string(), run_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_run_usage(&self, identity: &str, run_id: i64) -> GithubResult<RunUsage> {
        self.record(Call::GetRunUsage { repo: identity.to_string(), run_id })?;
        Ok(self
            .state()
            .usage
            .get(&(identity.to_string(), run_id))
            .cloned()
            .unwrap_or(RunUsage { run_duration_ms: 0 }))
    }

    async fn list_repo_runners(&self, identity: &str) -> GithubResult<Vec<Runner>> {
        self.record(Call::ListRepoRunners(identity.to_string()))?;
        Ok(self.state().repo_runners.get(identity).cloned().unwrap_or_default())
    }

    async fn list_org_runners(&self, org: &str, page: u32) -> GithubResult<Page<Runner>> {
        self.record(Call::ListOrgRunners { org: org.to_string(), page })?;
        let runners = self.state().org_runners.get(org).cloned().unwrap_or_default();
        Ok(self.page_of(&runners, page))
    }

    async fn rate_limit_status(&self) -> GithubResult<RateLimitStatus> {
        self.record(Call::RateLimitStatus)?;
        Ok(self.state().rate_limit)
    }
}
