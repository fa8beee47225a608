//! Paginated fetcher.
//!
//! Follows page cursors of a single upstream listing to completion. A
//! rate-limit response suspends the calling task until the reported reset
//! time and then repeats the same page request; any other error stops the
//! listing and is returned together with the items gathered so far.

use std::future::Future;

use crate::clock::Clock;
use crate::services::error::{GithubError, GithubResult};
use crate::services::github::GithubApi;
use crate::services::types::Page;

/// Items accumulated by [`fetch_all_pages`], in upstream order.
#[derive(Debug)]
pub struct Fetched<T> {
    pub items: Vec<T>,
    /// Set when pagination stopped early.
    pub error: Option<GithubError>,
}

impl<T> Fetched<T> {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// All items, or the error if the listing is partial.
    pub fn into_result(self) -> GithubResult<Vec<T>> {
        match self.error {
            None => Ok(self.items),
            Some(err) => Err(err),
        }
    }
}

pub async fn fetch_all_pages<T, F, Fut>(clock: &dyn Clock, what: &str, mut fetch_page: F) -> Fetched<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = GithubResult<Page<T>>>,
{
    let mut items = Vec::new();
    let mut page = 1u32;

    loop {
        match fetch_page(page).await {
            Ok(fetched) => {
                items.extend(fetched.items);
                match fetched.next_page {
                    Some(next) if next > page => page = next,
                    Some(next) => {
                        tracing::warn!(what, page, next, "Non-advancing page cursor, stopping");
                        break;
                    }
                    None => break,
                }
            }
            Err(GithubError::RateLimited { reset_at }) => {
                tracing::info!(
                    what,
                    page,
                    "Hit rate limit, sleeping until rate limit reset ({})",
                    reset_at.to_rfc3339()
                );
                clock.sleep_until(reset_at).await;
            }
            Err(err) => {
                tracing::debug!(what, page, fetched = items.len(), "Pagination aborted: {}", err);
                return Fetched { items, error: Some(err) };
            }
        }
    }

    Fetched { items, error: None }
}

/// Run a single non-paginated call, waiting out rate limits.
pub async fn call_with_rate_limit<T, F, Fut>(clock: &dyn Clock, what: &str, mut call: F) -> GithubResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GithubResult<T>>,
{
    loop {
        match call().await {
            Err(GithubError::RateLimited { reset_at }) => {
                tracing::info!(
                    what,
                    "Hit rate limit, sleeping until rate limit reset ({})",
                    reset_at.to_rfc3339()
                );
                clock.sleep_until(reset_at).await;
            }
            other => return other,
        }
    }
}

/// Block until the API quota is available. Used once before the pre-seed so
/// startup does not burn through a window that is already exhausted.
pub async fn wait_for_quota(client: &dyn GithubApi, clock: &dyn Clock) {
    match client.rate_limit_status().await {
        Ok(status) if status.remaining == 0 => {
            tracing::info!(
                "Rate limit exhausted, sleeping until rate limit reset ({})",
                status.reset_at.to_rfc3339()
            );
            clock.sleep_until(status.reset_at).await;
        }
        Ok(status) => tracing::info!("API rate limit: {}/{}", status.remaining, status.limit),
        Err(err) => tracing::warn!("Error getting rate limit: {}", err),
    }
}
