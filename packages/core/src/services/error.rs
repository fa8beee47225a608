//! Errors at the GitHub API boundary.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GithubError {
    /// Quota exhausted; requests may resume at `reset_at`.
    #[error("Rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("GitHub returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Data format error: {message}")]
    Parse { message: String },
}

impl GithubError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into() }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

pub type GithubResult<T> = Result<T, GithubError>;
