//! Tiered repository / workflow cache and its refresh engine.

pub mod refresh;
pub mod repos;
pub mod workflows;

pub use refresh::{ActionsCache, RecheckPolicy, RepoRefreshReport, WorkflowRefreshReport};
pub use repos::{RepoCache, RepoCacheEntry};
pub use workflows::{WorkflowCache, WorkflowSet};
