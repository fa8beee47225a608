//! Workflow cache: repository identity → workflow id → definition.
//!
//! Entries are replaced wholesale on every successful scan of a repository.

use std::collections::{BTreeMap, HashMap, HashSet};

use tokio::sync::RwLock;

use crate::services::types::Workflow;

pub type WorkflowSet = BTreeMap<i64, Workflow>;

#[derive(Debug, Default)]
pub struct WorkflowCache {
    entries: RwLock<HashMap<String, WorkflowSet>>,
}

impl WorkflowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn replace(&self, identity: &str, workflows: Vec<Workflow>) -> usize {
        let set: WorkflowSet = workflows.into_iter().map(|w| (w.id, w)).collect();
        let count = set.len();
        self.entries.write().await.insert(identity.to_string(), set);
        count
    }

    pub async fn get(&self, identity: &str) -> Option<WorkflowSet> {
        self.entries.read().await.get(identity).cloned()
    }

    pub async fn workflow(&self, identity: &str, workflow_id: i64) -> Option<Workflow> {
        self.entries
            .read()
            .await
            .get(identity)
            .and_then(|set| set.get(&workflow_id))
            .cloned()
    }

    pub async fn contains(&self, identity: &str) -> bool {
        self.entries.read().await.contains_key(identity)
    }

    /// Cached repository identities, sorted.
    pub async fn repositories(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of repositories with a cached workflow set.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn workflow_count(&self) -> usize {
        self.entries.read().await.values().map(BTreeMap::len).sum()
    }

    /// Drop every repository not in `keep`. Returns the dropped identities.
    pub async fn retain_repositories(&self, keep: &HashSet<String>) -> Vec<String> {
        let mut entries = self.entries.write().await;
        let mut dropped: Vec<String> = entries
            .keys()
            .filter(|key| !keep.contains(*key))
            .cloned()
            .collect();
        for key in &dropped {
            entries.remove(key);
        }
        dropped.sort();
        dropped
    }
}
