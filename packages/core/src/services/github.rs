use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::services::error::{GithubError, GithubResult};
use crate::services::types::*;

pub const DEFAULT_API_HOST: &str = "api.github.com";
pub const PER_PAGE: u32 = 100;

/// Upstream capabilities consumed by the cache engine and the metric producers.
///
/// Listing calls take a 1-based page cursor and return the next cursor in
/// [`Page::next_page`]. Rate limiting is reported as
/// [`GithubError::RateLimited`]; callers decide whether to wait.
#[async_trait]
pub trait GithubApi: Send + Sync {
    async fn list_org_repositories(&self, org: &str, page: u32) -> GithubResult<Page<Repository>>;

    async fn get_repository(&self, identity: &str) -> GithubResult<Repository>;

    /// Single non-paginated call answering "does this repository define at
    /// least one workflow".
    async fn probe_has_workflows(&self, identity: &str) -> GithubResult<bool>;

    async fn list_workflows(&self, identity: &str, page: u32) -> GithubResult<Page<Workflow>>;

    async fn list_workflow_runs(&self, identity: &str, page: u32)
        -> GithubResult<Page<WorkflowRun>>;

    async fn list_workflow_jobs(&self, identity: &str, run_id: i64)
        -> GithubResult<Vec<WorkflowJob>>;

    async fn get_run_usage(&self, identity: &str, run_id: i64) -> GithubResult<RunUsage>;

    async fn list_repo_runners(&self, identity: &str) -> GithubResult<Vec<Runner>>;

    async fn list_org_runners(&self, org: &str, page: u32) -> GithubResult<Page<Runner>>;

    async fn rate_limit_status(&self) -> GithubResult<RateLimitStatus>;
}

/// REST client for github.com or a GitHub Enterprise server.
#[derive(Clone)]
pub struct GithubClient {
    base_url: String,
    http: Client,
}

impl GithubClient {
    /// `base_url` is an already resolved API root, see [`resolve_api_base`].
    pub fn new(base_url: String, token: Option<&str>) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static(concat!("actions-exporter/", env!("CARGO_PKG_VERSION"))),
        );
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| AppError::Config("GITHUB_TOKEN contains invalid characters".into()))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| AppError::Network(err.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> GithubResult<(T, Option<u32>)> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|err| GithubError::network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &headers, path, body, Utc::now()));
        }

        let next = next_page(response.headers());
        let body = response
            .json::<T>()
            .await
            .map_err(|err| GithubError::parse(format!("{path}: {err}")))?;

        Ok((body, next))
    }
}

fn page_query(page: u32) -> Vec<(&'static str, String)> {
    vec![("per_page", PER_PAGE.to_string()), ("page", page.to_string())]
}

#[async_trait]
impl GithubApi for GithubClient {
    async fn list_org_repositories(&self, org: &str, page: u32) -> GithubResult<Page<Repository>> {
        let (items, next_page) = self
            .get_json::<Vec<Repository>>(&format!("/orgs/{org}/repos"), &page_query(page))
            .await?;
        Ok(Page { items, next_page })
    }

    async fn get_repository(&self, identity: &str) -> GithubResult<Repository> {
        let (repo, _) = self
            .get_json::<Repository>(&format!("/repos/{identity}"), &[])
            .await?;
        Ok(repo)
    }

    async fn probe_has_workflows(&self, identity: &str) -> GithubResult<bool> {
        let (list, _) = self
            .get_json::<WorkflowList>(
                &format!("/repos/{identity}/actions/workflows"),
                &[("per_page", "1".to_string())],
            )
            .await?;
        Ok(list.total_count > 0)
    }

    async fn list_workflows(&self, identity: &str, page: u32) -> GithubResult<Page<Workflow>> {
        let (list, next_page) = self
            .get_json::<WorkflowList>(
                &format!("/repos/{identity}/actions/workflows"),
                &page_query(page),
            )
            .await?;
        Ok(Page { items: list.workflows, next_page })
    }

    async fn list_workflow_runs(
        &self,
        identity: &str,
        page: u32,
    ) -> GithubResult<Page<WorkflowRun>> {
        let (list, next_page) = self
            .get_json::<WorkflowRunList>(
                &format!("/repos/{identity}/actions/runs"),
                &page_query(page),
            )
            .await?;
        Ok(Page { items: list.workflow_runs, next_page })
    }

    async fn list_workflow_jobs(
        &self,
        identity: &str,
        run_id: i64,
    ) -> GithubResult<Vec<WorkflowJob>> {
        let (list, _) = self
            .get_json::<WorkflowJobList>(
                &format!("/repos/{identity}/actions/runs/{run_id}/jobs"),
                &[("per_page", PER_PAGE.to_string())],
            )
            .await?;
        Ok(list.jobs)
    }

    async fn get_run_usage(&self, identity: &str, run_id: i64) -> GithubResult<RunUsage> {
        let (usage, _) = self
            .get_json::<RunUsage>(
                &format!("/repos/{identity}/actions/runs/{run_id}/timing"),
                &[],
            )
            .await?;
        Ok(usage)
    }

    async fn list_repo_runners(&self, identity: &str) -> GithubResult<Vec<Runner>> {
        let (list, _) = self
            .get_json::<RunnerList>(
                &format!("/repos/{identity}/actions/runners"),
                &[("per_page", PER_PAGE.to_string())],
            )
            .await?;
        Ok(list.runners)
    }

    async fn list_org_runners(&self, org: &str, page: u32) -> GithubResult<Page<Runner>> {
        let (list, next_page) = self
            .get_json::<RunnerList>(&format!("/orgs/{org}/actions/runners"), &page_query(page))
            .await?;
        Ok(Page { items: list.runners, next_page })
    }

    async fn rate_limit_status(&self) -> GithubResult<RateLimitStatus> {
        let (body, _) = self.get_json::<RateLimitResponse>("/rate_limit", &[]).await?;
        Ok(RateLimitStatus {
            remaining: body.rate.remaining,
            limit: body.rate.limit,
            reset_at: DateTime::from_timestamp(body.rate.reset, 0).unwrap_or_else(Utc::now),
        })
    }
}

/// Map a non-success response to a [`GithubError`].
///
/// 403/429 count as rate limiting when the primary quota is exhausted
/// (`x-ratelimit-remaining: 0`) or a secondary limit sent `retry-after`.
fn classify_failure(
    status: StatusCode,
    headers: &HeaderMap,
    resource: &str,
    body: String,
    now: DateTime<Utc>,
) -> GithubError {
    if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
        if let Some(reset_at) = rate_limit_reset(headers, now) {
            return GithubError::RateLimited { reset_at };
        }
    }
    if status == StatusCode::NOT_FOUND {
        return GithubError::not_found(resource);
    }
    GithubError::Status {
        status: status.as_u16(),
        message: body,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// Wait applied when the upstream reset hint is missing or unusable.
const DEFAULT_RESET_WAIT_SECS: i64 = 60;

fn rate_limit_reset(headers: &HeaderMap, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let fallback = now + Duration::seconds(DEFAULT_RESET_WAIT_SECS);

    if let Some(secs) = header_str(headers, "retry-after").and_then(|v| v.parse::<i64>().ok()) {
        let reset_at = Duration::try_seconds(secs).and_then(|wait| now.checked_add_signed(wait));
        return Some(reset_at.unwrap_or(fallback));
    }
    if header_str(headers, "x-ratelimit-remaining") != Some("0") {
        return None;
    }
    header_str(headers, "x-ratelimit-reset")
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
        .or(Some(fallback))
}

/// Extract the `page` parameter of the `rel="next"` link, if any.
pub(crate) fn next_page(headers: &HeaderMap) -> Option<u32> {
    let link = header_str(headers, "link")?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.split(';').any(|p| p.trim() == r#"rel="next""#) {
            return None;
        }
        let url = Url::parse(target.trim().trim_start_matches('<').trim_end_matches('>')).ok()?;
        let (_, page) = url.query_pairs().find(|(k, _)| k == "page")?;
        page.parse::<u32>().ok()
    })
}

/// Resolve a configured API location to a REST root.
///
/// `api.github.com` maps to the public API. Anything else is a GitHub
/// Enterprise host whose REST root lives under `/api/v3` unless the host is
/// already an `api.` host.
pub fn resolve_api_base(raw: &str) -> Result<String, AppError> {
    let raw = raw.trim();
    if raw.is_empty() || raw == DEFAULT_API_HOST {
        return Ok(format!("https://{DEFAULT_API_HOST}"));
    }

    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let mut url = Url::parse(&with_scheme)
        .map_err(|err| AppError::Config(format!("Invalid GITHUB_API_URL '{raw}': {err}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| AppError::Config(format!("GITHUB_API_URL '{raw}' has no host")))?
        .to_string();

    let mut path = url.path().to_string();
    if !path.ends_with('/') {
        path.push('/');
    }
    if !path.ends_with("/api/v3/") && !host.starts_with("api.") && !host.contains(".api.") {
        path.push_str("api/v3/");
    }
    url.set_path(&path);
    url.set_query(None);

    Ok(url.as_str().trim_end_matches('/').to_string())
}
