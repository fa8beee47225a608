use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::services::split_identity;

pub const DEFAULT_EXPORT_FIELDS: &str =
    "repo,head_branch,run_number,workflow,event,status,runner_name,job_name,job_status";

/// Upper bound for every interval setting (one year).
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// Labels a workflow-run gauge may carry.
pub const KNOWN_EXPORT_FIELDS: &[&str] = &[
    "repo",
    "id",
    "head_branch",
    "run_number",
    "workflow",
    "event",
    "status",
    "runner_name",
    "job_name",
    "job_status",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub github_token: Option<Token>,
    pub api_url: String,
    pub scope: Scope,
    pub port: u16,
    /// Interval of the run/runner metric producers.
    pub refresh_interval: Duration,
    pub repo_refresh_interval: Duration,
    pub workflow_refresh_interval: Duration,
    /// Recheck window for repositories that run workflows.
    pub active_recheck: Duration,
    /// Recheck window for repositories skipped in a sweep.
    pub inactive_recheck: Duration,
    pub recheck_on_error: RecheckOnError,
    pub export_fields: Vec<String>,
}

/// Personal access token. Never printed.
#[derive(Clone, PartialEq)]
pub struct Token(pub String);

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// The set of repositories the exporter is responsible for.
#[derive(Debug, Clone, PartialEq)]
pub enum Scope {
    Organizations(Vec<String>),
    /// Explicit `owner/name` identities.
    Repositories(Vec<String>),
}

impl Scope {
    /// Configured organizations; empty for an explicit repository list.
    pub fn organizations(&self) -> &[String] {
        match self {
            Scope::Organizations(orgs) => orgs,
            Scope::Repositories(_) => &[],
        }
    }
}

/// What happens to `next_check_at` when a due workflow scan fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecheckOnError {
    /// Push the next check out by the active interval.
    #[default]
    Advance,
    /// Keep `next_check_at` so the next sweep retries.
    Retry,
}

impl FromStr for RecheckOnError {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "advance" => Ok(Self::Advance),
            "retry" => Ok(Self::Retry),
            other => Err(format!("Invalid GITHUB_RECHECK_ON_ERROR: {}", other)),
        }
    }
}

impl Config {
    /// Environment values with `overrides` taking precedence.
    pub fn from_env_with(overrides: &HashMap<&'static str, String>) -> Result<Self, String> {
        Self::from_lookup(|key| overrides.get(key).cloned().or_else(|| env::var(key).ok()))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let orgs = value("GITHUB_ORGS").map(|v| split_list(&v)).unwrap_or_default();
        let repos = value("GITHUB_REPOS").map(|v| split_list(&v)).unwrap_or_default();
        let scope = match (orgs.is_empty(), repos.is_empty()) {
            (false, true) => Scope::Organizations(orgs),
            (true, false) => {
                if let Some(bad) = repos.iter().find(|r| split_identity(r).is_none()) {
                    return Err(format!("GITHUB_REPOS entry '{}' is not owner/name", bad));
                }
                Scope::Repositories(repos)
            }
            (false, false) => {
                return Err("GITHUB_ORGS and GITHUB_REPOS are mutually exclusive".into())
            }
            (true, true) => return Err("One of GITHUB_ORGS or GITHUB_REPOS is required".into()),
        };

        let port = match value("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| "PORT must be a valid port number")?,
            None => 9999,
        };

        let seconds = |key: &str, default: u64| -> Result<Duration, String> {
            let secs = match value(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| format!("{} must be a valid number", key))?,
                None => default,
            };
            if secs == 0 {
                return Err(format!("{} must be greater than zero", key));
            }
            if secs > MAX_INTERVAL_SECS {
                return Err(format!("{} must be at most {} seconds", key, MAX_INTERVAL_SECS));
            }
            Ok(Duration::from_secs(secs))
        };

        let recheck_on_error = match value("GITHUB_RECHECK_ON_ERROR") {
            Some(raw) => raw.parse()?,
            None => RecheckOnError::default(),
        };

        let export_fields =
            split_list(&value("EXPORT_FIELDS").unwrap_or_else(|| DEFAULT_EXPORT_FIELDS.into()));
        if export_fields.is_empty() {
            return Err("EXPORT_FIELDS must name at least one field".into());
        }
        if let Some(bad) = export_fields
            .iter()
            .find(|f| !KNOWN_EXPORT_FIELDS.contains(&f.as_str()))
        {
            return Err(format!("Unknown EXPORT_FIELDS entry: {}", bad));
        }

        Ok(Self {
            github_token: value("GITHUB_TOKEN").map(|t| Token(t.trim().to_string())),
            api_url: value("GITHUB_API_URL").unwrap_or_else(|| "api.github.com".into()),
            scope,
            port,
            refresh_interval: seconds("GITHUB_REFRESH", 60)?,
            repo_refresh_interval: seconds("GITHUB_REPO_REFRESH", 3600)?,
            workflow_refresh_interval: seconds("GITHUB_WORKFLOW_REFRESH", 3600)?,
            active_recheck: seconds("GITHUB_ACTIVE_RECHECK", 60)?,
            inactive_recheck: seconds("GITHUB_INACTIVE_RECHECK", 300)?,
            recheck_on_error,
            export_fields,
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<Config, String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn organizations_scope_with_defaults() {
        let cfg = config(&[("GITHUB_ORGS", "acme, globex ,")]).unwrap();

        assert_eq!(
            cfg.scope,
            Scope::Organizations(vec!["acme".into(), "globex".into()])
        );
        assert_eq!(cfg.port, 9999);
        assert_eq!(cfg.refresh_interval, Duration::from_secs(60));
        assert_eq!(cfg.repo_refresh_interval, Duration::from_secs(3600));
        assert_eq!(cfg.active_recheck, Duration::from_secs(60));
        assert_eq!(cfg.inactive_recheck, Duration::from_secs(300));
        assert_eq!(cfg.recheck_on_error, RecheckOnError::Advance);
        assert_eq!(cfg.export_fields.len(), 9);
        assert_eq!(cfg.api_url, "api.github.com");
        assert!(cfg.github_token.is_none());
    }

    #[test]
    fn repositories_scope_is_validated() {
        let cfg = config(&[("GITHUB_REPOS", "acme/api,acme/web")]).unwrap();
        assert_eq!(cfg.scope.organizations().len(), 0);

        let err = config(&[("GITHUB_REPOS", "acme")]).unwrap_err();
        assert!(err.contains("owner/name"));
    }

    #[test]
    fn scope_is_required_and_exclusive() {
        assert!(config(&[]).unwrap_err().contains("required"));
        assert!(config(&[("GITHUB_ORGS", "acme"), ("GITHUB_REPOS", "acme/api")])
            .unwrap_err()
            .contains("mutually exclusive"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = config(&[("GITHUB_ORGS", "acme"), ("GITHUB_ACTIVE_RECHECK", "0")]).unwrap_err();
        assert!(err.contains("GITHUB_ACTIVE_RECHECK"));
    }

    #[test]
    fn intervals_longer_than_a_year_are_rejected() {
        let err = config(&[("GITHUB_ORGS", "acme"), ("GITHUB_ACTIVE_RECHECK", "9000000000000")])
            .unwrap_err();
        assert!(err.contains("GITHUB_ACTIVE_RECHECK"));

        let year = MAX_INTERVAL_SECS.to_string();
        let cfg = config(&[("GITHUB_ORGS", "acme"), ("GITHUB_INACTIVE_RECHECK", year.as_str())]).unwrap();
        assert_eq!(cfg.inactive_recheck, Duration::from_secs(MAX_INTERVAL_SECS));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        assert!(config(&[("GITHUB_ORGS", "acme"), ("PORT", "http")]).is_err());
        assert!(config(&[("GITHUB_ORGS", "acme"), ("GITHUB_REFRESH", "-1")]).is_err());
    }

    #[test]
    fn recheck_policy_parses() {
        let cfg = config(&[("GITHUB_ORGS", "acme"), ("GITHUB_RECHECK_ON_ERROR", "Retry")]).unwrap();
        assert_eq!(cfg.recheck_on_error, RecheckOnError::Retry);
        assert!(config(&[("GITHUB_ORGS", "acme"), ("GITHUB_RECHECK_ON_ERROR", "later")]).is_err());
    }

    #[test]
    fn unknown_export_field_is_rejected() {
        let err = config(&[("GITHUB_ORGS", "acme"), ("EXPORT_FIELDS", "repo,colour")]).unwrap_err();
        assert!(err.contains("colour"));
    }

    #[test]
    fn token_is_redacted_in_debug_output() {
        let cfg = config(&[("GITHUB_ORGS", "acme"), ("GITHUB_TOKEN", "ghp_secret")]).unwrap();
        let printed = format!("{:?}", cfg);
        assert!(!printed.contains("ghp_secret"));
        assert_eq!(cfg.github_token, Some(Token("ghp_secret".into())));
    }
}
