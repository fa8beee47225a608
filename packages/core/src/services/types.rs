//! GitHub REST payloads used by the exporter.
//!
//! Only the attributes the exporter reads are modelled; everything else in
//! the upstream JSON is ignored on deserialisation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One page of a listing plus the cursor of the following page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` once the listing is exhausted.
    pub next_page: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub login: String,
}

/// Repository metadata snapshot. Opaque to the cache apart from `full_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: Owner,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkflowList {
    pub total_count: u64,
    #[serde(default)]
    pub workflows: Vec<Workflow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub head_branch: Option<String>,
    pub run_number: i64,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    pub workflow_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkflowRunList {
    #[serde(default)]
    pub workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowJob {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub runner_name: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkflowJobList {
    #[serde(default)]
    pub jobs: Vec<WorkflowJob>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunUsage {
    #[serde(default)]
    pub run_duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerLabel {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runner {
    pub id: i64,
    pub name: String,
    pub os: String,
    pub status: String,
    #[serde(default)]
    pub busy: bool,
    #[serde(default)]
    pub labels: Vec<RunnerLabel>,
}

impl Runner {
    pub fn is_online(&self) -> bool {
        self.status == "online"
    }

    /// Comma separated label names, in upstream order.
    pub fn label_list(&self) -> String {
        self.labels
            .iter()
            .map(|l| l.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RunnerList {
    #[serde(default)]
    pub runners: Vec<Runner>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitStatus {
    pub remaining: u64,
    pub limit: u64,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RateLimitResponse {
    pub rate: RateLimitRate,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RateLimitRate {
    pub limit: u64,
    pub remaining: u64,
    pub reset: i64,
}

/// Split an `owner/name` identity. `None` when either half is missing.
pub fn split_identity(identity: &str) -> Option<(&str, &str)> {
    match identity.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Some((owner, name))
        }
        _ => None,
    }
}

/// True when `identity` belongs to `owner` (GitHub logins are case-insensitive).
pub fn is_owned_by(identity: &str, owner: &str) -> bool {
    split_identity(identity)
        .map(|(o, _)| o.eq_ignore_ascii_case(owner))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_identity_accepts_owner_and_name() {
        assert_eq!(split_identity("acme/api"), Some(("acme", "api")));
    }

    #[test]
    fn split_identity_rejects_malformed_values() {
        assert_eq!(split_identity("acme"), None);
        assert_eq!(split_identity("/api"), None);
        assert_eq!(split_identity("acme/"), None);
        assert_eq!(split_identity("acme/api/extra"), None);
    }

    #[test]
    fn is_owned_by_ignores_case() {
        assert!(is_owned_by("Acme/api", "acme"));
        assert!(!is_owned_by("acme-labs/api", "acme"));
    }

    #[test]
    fn runner_label_list_joins_names() {
        let runner = Runner {
            id: 7,
            name: "builder-1".into(),
            os: "linux".into(),
            status: "online".into(),
            busy: false,
            labels: vec![
                RunnerLabel { name: "self-hosted".into() },
                RunnerLabel { name: "x64".into() },
            ],
        };
        assert_eq!(runner.label_list(), "self-hosted,x64");
        assert!(runner.is_online());
    }

    #[test]
    fn repository_deserialises_with_missing_optional_fields() {
        let json = r#"{"id":1,"name":"api","full_name":"acme/api","owner":{"login":"acme"}}"#;
        let repo: Repository = serde_json::from_str(json).unwrap();
        assert_eq!(repo.full_name, "acme/api");
        assert!(repo.default_branch.is_none());
        assert!(!repo.archived);
    }
}
