//! Repository cache.
//!
//! Maps `owner/name` to the latest repository snapshot, whether the
//! repository runs workflows, and when it is next eligible for a workflow
//! scan. Shared between the refresh tasks and the metric producers behind a
//! `tokio::sync::RwLock`; every read returns owned data so callers never
//! hold the lock across upstream calls.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::services::types::Repository;

#[derive(Debug, Clone, PartialEq)]
pub struct RepoCacheEntry {
    pub identity: String,
    pub metadata: Repository,
    pub has_workflows: bool,
    pub next_check_at: DateTime<Utc>,
}

impl RepoCacheEntry {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_check_at <= now
    }
}

#[derive(Debug, Default)]
pub struct RepoCache {
    entries: RwLock<HashMap<String, RepoCacheEntry>>,
}

impl RepoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, identity: &str) -> Option<RepoCacheEntry> {
        self.entries.read().await.get(identity).cloned()
    }

    pub async fn contains(&self, identity: &str) -> bool {
        self.entries.read().await.contains_key(identity)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Consistent copy of every entry, ordered by identity.
    pub async fn snapshot(&self) -> Vec<RepoCacheEntry> {
        let mut entries: Vec<_> = self.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.identity.cmp(&b.identity));
        entries
    }

    pub async fn keys(&self) -> HashSet<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    pub async fn upsert(&self, entry: RepoCacheEntry) {
        self.entries
            .write()
            .await
            .insert(entry.identity.clone(), entry);
    }

    /// Remove every entry selected by `in_scope` whose identity is not in
    /// `present`. Returns the evicted identities, sorted.
    pub async fn evict_absent(
        &self,
        in_scope: impl Fn(&str) -> bool,
        present: &HashSet<String>,
    ) -> Vec<String> {
        let mut entries = self.entries.write().await;
        let mut evicted: Vec<String> = entries
            .keys()
            .filter(|key| in_scope(key) && !present.contains(*key))
            .cloned()
            .collect();
        for key in &evicted {
            entries.remove(key);
        }
        evicted.sort();
        evicted
    }

    /// Reschedule an existing entry. Never recreates an evicted one.
    pub async fn set_next_check(&self, identity: &str, at: DateTime<Utc>) -> bool {
        match self.entries.write().await.get_mut(identity) {
            Some(entry) => {
                entry.next_check_at = at;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::services::mock_github::repository;
    use crate::services::types::is_owned_by;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    fn entry(identity: &str) -> RepoCacheEntry {
        RepoCacheEntry {
            identity: identity.to_string(),
            metadata: repository(identity),
            has_workflows: true,
            next_check_at: now(),
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_entry() {
        let cache = RepoCache::new();
        cache.upsert(entry("acme/api")).await;

        let mut updated = entry("acme/api");
        updated.has_workflows = false;
        cache.upsert(updated).await;

        assert_eq!(cache.len().await, 1);
        assert!(!cache.get("acme/api").await.unwrap().has_workflows);
    }

    #[tokio::test]
    async fn evict_absent_only_touches_scope() {
        let cache = RepoCache::new();
        for id in ["acme/api", "acme/web", "globex/api"] {
            cache.upsert(entry(id)).await;
        }
        let present: HashSet<String> = ["acme/api".to_string()].into_iter().collect();

        let evicted = cache
            .evict_absent(|key| is_owned_by(key, "acme"), &present)
            .await;

        assert_eq!(evicted, vec!["acme/web".to_string()]);
        assert!(cache.contains("globex/api").await);
        assert!(cache.contains("acme/api").await);
    }

    #[tokio::test]
    async fn set_next_check_ignores_missing_entries() {
        let cache = RepoCache::new();
        cache.upsert(entry("acme/api")).await;
        let later = now() + Duration::seconds(60);

        assert!(cache.set_next_check("acme/api", later).await);
        assert!(!cache.set_next_check("acme/gone", later).await);
        assert_eq!(cache.get("acme/api").await.unwrap().next_check_at, later);
        assert!(!cache.contains("acme/gone").await);
    }

    #[tokio::test]
    async fn snapshot_is_sorted() {
        let cache = RepoCache::new();
        for id in ["acme/web", "acme/api"] {
            cache.upsert(entry(id)).await;
        }
        let ids: Vec<_> = cache.snapshot().await.into_iter().map(|e| e.identity).collect();
        assert_eq!(ids, vec!["acme/api", "acme/web"]);
    }

    #[test]
    fn entry_is_due_at_or_after_next_check() {
        let e = entry("acme/api");
        assert!(e.is_due(now()));
        assert!(e.is_due(now() + Duration::seconds(1)));
        assert!(!e.is_due(now() - Duration::seconds(1)));
    }
}
