use std::collections::HashMap;

use clap::Parser;

/// GitHub Actions exporter CLI arguments.
///
/// Every flag overrides the matching environment variable.
#[derive(Debug, Parser)]
#[command(
    name = "actions-exporter",
    version,
    about = "Prometheus exporter for GitHub Actions workflows and runners"
)]
pub struct Cli {
    /// Comma separated organizations to watch
    #[arg(long, short = 'o')]
    pub orgs: Option<String>,

    /// Comma separated owner/name repositories to watch
    #[arg(long)]
    pub repos: Option<String>,

    /// GitHub API host or GitHub Enterprise URL
    #[arg(long)]
    pub api_url: Option<String>,

    /// Exporter port
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Run and runner metrics refresh interval in seconds
    #[arg(long)]
    pub refresh: Option<u64>,

    /// Repository cache refresh interval in seconds
    #[arg(long)]
    pub repo_refresh: Option<u64>,

    /// Workflow cache refresh interval in seconds
    #[arg(long)]
    pub workflow_refresh: Option<u64>,

    /// Recheck window for repositories that run workflows, in seconds
    #[arg(long)]
    pub active_recheck: Option<u64>,

    /// Recheck window for skipped repositories, in seconds
    #[arg(long)]
    pub inactive_recheck: Option<u64>,

    /// Comma separated labels for workflow run metrics
    #[arg(long)]
    pub export_fields: Option<String>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Flags given on the command line, keyed by environment variable name.
    pub fn overrides(&self) -> HashMap<&'static str, String> {
        let mut map = HashMap::new();
        let mut put = |key: &'static str, value: Option<String>| {
            if let Some(value) = value {
                map.insert(key, value);
            }
        };
        put("GITHUB_ORGS", self.orgs.clone());
        put("GITHUB_REPOS", self.repos.clone());
        // A scope flag replaces the scope from the environment; an empty
        // value reads as unset.
        match (&self.orgs, &self.repos) {
            (Some(_), None) => put("GITHUB_REPOS", Some(String::new())),
            (None, Some(_)) => put("GITHUB_ORGS", Some(String::new())),
            _ => {}
        }
        put("GITHUB_API_URL", self.api_url.clone());
        put("PORT", self.port.map(|v| v.to_string()));
        put("GITHUB_REFRESH", self.refresh.map(|v| v.to_string()));
        put("GITHUB_REPO_REFRESH", self.repo_refresh.map(|v| v.to_string()));
        put("GITHUB_WORKFLOW_REFRESH", self.workflow_refresh.map(|v| v.to_string()));
        put("GITHUB_ACTIVE_RECHECK", self.active_recheck.map(|v| v.to_string()));
        put("GITHUB_INACTIVE_RECHECK", self.inactive_recheck.map(|v| v.to_string()));
        put("EXPORT_FIELDS", self.export_fields.clone());
        map
    }
}
