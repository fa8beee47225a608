pub mod error;
pub mod github;
#[cfg(any(test, feature = "test-util"))]
pub mod mock_github;
pub mod types;

pub use error::GithubError;
pub use github::{GithubApi, GithubClient};
pub use types::*;
