//! Rule Storage Module
//!
//! Persists the ordered forwarding rule list as one JSON blob behind a
//! key-value port, and implements the management operations on top of it.

use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::rule_types::{ForwardingRule, RuleDraft, RuleId};
use crate::error::{ForwarderError, ForwarderResult};

/// Key under which the rule list is stored unless configured otherwise
pub const DEFAULT_RULES_KEY: &str = "forwarding_rules";

/// Key-value blob persistence port
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> ForwarderResult<Option<Vec<u8>>>;

    /// Replace the blob stored under `key` as a whole
    async fn put(&self, key: &str, blob: Vec<u8>) -> ForwarderResult<()>;
}

/// Blob store kept in process memory
pub struct InMemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: DashMap::new(),
        }
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get(&self, key: &str) -> ForwarderResult<Option<Vec<u8>>> {
        Ok(self.blobs.get(key).map(|blob| blob.value().clone()))
    }

    async fn put(&self, key: &str, blob: Vec<u8>) -> ForwarderResult<()> {
        self.blobs.insert(key.to_string(), blob);
        Ok(())
    }
}

/// Blob store writing one `<key>.json` file per key under a directory.
///
/// Writes go to a uniquely named temporary file that is renamed over the
/// target, so readers see either the old or the new blob.
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn get(&self, key: &str) -> ForwarderResult<Option<Vec<u8>>> {
        let path = self.path_for(key);

        match tokio::fs::read(&path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ForwarderError::Persistence(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn put(&self, key: &str, blob: Vec<u8>) -> ForwarderResult<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            ForwarderError::Persistence(format!(
                "failed to prepare {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let path = self.path_for(key);
        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));

        if let Err(e) = tokio::fs::write(&temp_path, &blob).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(ForwarderError::Persistence(format!(
                "failed to write {}: {}",
                temp_path.display(),
                e
            )));
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(ForwarderError::Persistence(format!(
                "failed to finalize {}: {}",
                path.display(),
                e
            )));
        }

        debug!("Wrote {} bytes to {}", blob.len(), path.display());
        Ok(())
    }
}

/// Stored record shape, tolerating snapshots written before rules had ids
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRule {
    #[serde(default)]
    id: Option<RuleId>,
    #[serde(default)]
    filter_number: String,
    #[serde(default)]
    filter_word: String,
    #[serde(default)]
    substitution_rule: String,
    #[serde(default)]
    forwarding_numbers: Vec<String>,
}

/// Decoded snapshot plus whether any record had to be given a new id
struct Snapshot {
    rules: Vec<ForwardingRule>,
    upgraded: bool,
}

fn decode_snapshot(blob: &[u8]) -> serde_json::Result<Snapshot> {
    let stored: Vec<StoredRule> = serde_json::from_slice(blob)?;
    let upgraded = stored.iter().any(|record| record.id.is_none());

    let rules = stored
        .into_iter()
        .map(|record| ForwardingRule {
            id: record.id.unwrap_or_default(),
            filter_number: record.filter_number,
            filter_word: record.filter_word,
            substitution_rule: record.substitution_rule,
            forwarding_numbers: record.forwarding_numbers,
        })
        .collect();

    Ok(Snapshot { rules, upgraded })
}

/// Ordered forwarding rule list persisted through a [`BlobStore`]
pub struct RuleStore {
    blobs: Arc<dyn BlobStore>,
    key: String,
    // Serializes load-modify-save cycles
    mutation_lock: Mutex<()>,
}

impl RuleStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self::with_key(blobs, DEFAULT_RULES_KEY)
    }

    pub fn with_key(blobs: Arc<dyn BlobStore>, key: impl Into<String>) -> Self {
        Self {
            blobs,
            key: key.into(),
            mutation_lock: Mutex::new(()),
        }
    }

    /// Rule store over a fresh in-memory blob store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBlobStore::new()))
    }

    /// Load the current rule list.
    ///
    /// A missing, unreadable or unparsable blob yields an empty list.
    pub async fn load(&self) -> Vec<ForwardingRule> {
        match self.read_snapshot().await {
            Ok(snapshot) if snapshot.upgraded => self.persist_upgrade(snapshot.rules).await,
            Ok(snapshot) => snapshot.rules,
            Err(e) => {
                warn!("Failed to read forwarding rules, treating as empty: {}", e);
                Vec::new()
            }
        }
    }

    /// Replace the persisted rule list with `rules`
    pub async fn save(&self, rules: &[ForwardingRule]) -> ForwarderResult<()> {
        let blob = serde_json::to_vec(rules)?;
        self.blobs.put(&self.key, blob).await?;

        debug!("Saved {} forwarding rule(s)", rules.len());
        Ok(())
    }

    /// Validate `draft` and append it to the end of the list
    pub async fn add_rule(&self, draft: RuleDraft) -> ForwarderResult<ForwardingRule> {
        let rule = ForwardingRule::create(draft)?;

        self.mutate(|rules| {
            rules.push(rule.clone());
            Ok(())
        })
        .await?;

        info!("Added forwarding rule {}", rule.describe());
        Ok(rule)
    }

    /// Replace the rule with `id` in place, keeping its position and id
    pub async fn update_rule(&self, id: RuleId, draft: RuleDraft) -> ForwarderResult<ForwardingRule> {
        let updated = ForwardingRule::with_id(id, draft)?;

        self.mutate(|rules| {
            let slot = rules
                .iter_mut()
                .find(|rule| rule.id == id)
                .ok_or(ForwarderError::RuleNotFound(id))?;
            *slot = updated.clone();
            Ok(())
        })
        .await?;

        info!("Updated forwarding rule {}", updated.describe());
        Ok(updated)
    }

    /// Remove the rule with `id`, returning it
    pub async fn delete_rule(&self, id: RuleId) -> ForwarderResult<ForwardingRule> {
        let removed = self
            .mutate(|rules| {
                let index = rules
                    .iter()
                    .position(|rule| rule.id == id)
                    .ok_or(ForwarderError::RuleNotFound(id))?;
                Ok(rules.remove(index))
            })
            .await?;

        info!("Deleted forwarding rule {}", removed.describe());
        Ok(removed)
    }

    pub async fn list_rules(&self) -> Vec<ForwardingRule> {
        self.load().await
    }

    /// Every rule carrying the (filterNumber, filterWord) pair, in list order
    pub async fn find_by_filters(&self, filter_number: &str, filter_word: &str) -> Vec<ForwardingRule> {
        self.load()
            .await
            .into_iter()
            .filter(|rule| rule.has_filters(filter_number, filter_word))
            .collect()
    }

    /// Summary of the stored rule set
    pub async fn get_statistics(&self) -> Value {
        let rules = self.load().await;
        let destinations: usize = rules.iter().map(|rule| rule.forwarding_numbers.len()).sum();
        let with_substitution = rules
            .iter()
            .filter(|rule| !rule.substitution_rule.trim().is_empty())
            .count();

        serde_json::json!({
            "key": self.key,
            "total_rules": rules.len(),
            "total_destinations": destinations,
            "rules_with_substitution": with_substitution,
        })
    }

    async fn read_snapshot(&self) -> ForwarderResult<Snapshot> {
        let Some(blob) = self.blobs.get(&self.key).await? else {
            return Ok(Snapshot { rules: Vec::new(), upgraded: false });
        };

        match decode_snapshot(&blob) {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                warn!("Stored forwarding rules under '{}' are corrupt, treating as empty: {}", self.key, e);
                Ok(Snapshot { rules: Vec::new(), upgraded: false })
            }
        }
    }

    /// Write back ids assigned to a legacy snapshot and return the rules as
    /// persisted. Callers racing on the same legacy blob all see the ids of
    /// whichever write landed first.
    async fn persist_upgrade(&self, assigned: Vec<ForwardingRule>) -> Vec<ForwardingRule> {
        let _guard = self.mutation_lock.lock().await;

        let rules = match self.read_snapshot().await {
            Ok(current) if !current.upgraded => return current.rules,
            Ok(current) => current.rules,
            Err(e) => {
                warn!("Failed to re-read forwarding rules before upgrade: {}", e);
                return assigned;
            }
        };

        match self.save(&rules).await {
            Ok(()) => info!("Assigned ids to {} legacy forwarding rule(s)", rules.len()),
            Err(e) => warn!("Failed to persist upgraded forwarding rules: {}", e),
        }
        rules
    }

    async fn mutate<T, F>(&self, operation: F) -> ForwarderResult<T>
    where
        F: FnOnce(&mut Vec<ForwardingRule>) -> ForwarderResult<T>,
    {
        let _guard = self.mutation_lock.lock().await;

        let mut rules = self.read_snapshot().await?.rules;
        let result = operation(&mut rules)?;
        self.save(&rules).await?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Blob store whose reads always fail, counting attempted writes
    #[derive(Default)]
    struct UnreadableBlobStore {
        puts: AtomicUsize,
    }

    #[async_trait]
    impl BlobStore for UnreadableBlobStore {
        async fn get(&self, _key: &str) -> ForwarderResult<Option<Vec<u8>>> {
            Err(ForwarderError::Persistence("disk unavailable".to_string()))
        }

        async fn put(&self, _key: &str, _blob: Vec<u8>) -> ForwarderResult<()> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn legacy_blob() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!([
            {"filterNumber": "555", "filterWord": "", "substitutionRule": "", "forwardingNumbers": ["+200"]},
            {"filterNumber": "", "filterWord": "OTP", "substitutionRule": "", "forwardingNumbers": ["+100"]}
        ]))
        .unwrap()
    }

    fn draft(number: &str, word: &str, to: &[&str]) -> RuleDraft {
        RuleDraft::new(number, word, "", to.iter().map(|n| n.to_string()).collect())
    }

    #[tokio::test]
    async fn test_load_without_blob_is_empty() {
        let store = RuleStore::in_memory();
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let store = RuleStore::in_memory();
        let rules = vec![
            ForwardingRule::create(draft("555", "", &["+200"])).unwrap(),
            ForwardingRule::create(RuleDraft::new("", "OTP", "CODE -> PIN", vec!["+100".into(), "+101".into()]))
                .unwrap(),
        ];

        store.save(&rules).await.unwrap();
        assert_eq!(store.load().await, rules);
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_treated_as_empty() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        blobs.put(DEFAULT_RULES_KEY, b"{not json".to_vec()).await.unwrap();
        let store = RuleStore::new(blobs);

        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_legacy_records_get_stable_ids() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let legacy = serde_json::json!([
            {"filterNumber": "555", "filterWord": "", "substitutionRule": "", "forwardingNumbers": ["+200"]}
        ]);
        blobs.put(DEFAULT_RULES_KEY, serde_json::to_vec(&legacy).unwrap()).await.unwrap();
        let store = RuleStore::new(blobs);

        let first = store.load().await;
        let second = store.load().await;

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].filter_number, "555");
        assert_eq!(first[0].id, second[0].id);
    }

    #[tokio::test]
    async fn test_concurrent_loads_of_legacy_file_agree_on_persisted_ids() {
        for _ in 0..20 {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("forwarding_rules.json"), legacy_blob()).unwrap();
            let store = RuleStore::new(Arc::new(FileBlobStore::new(dir.path())));

            let (first, second) = tokio::join!(store.load(), store.load());
            let persisted = store.load().await;

            assert_eq!(persisted.len(), 2);
            assert_eq!(first, persisted);
            assert_eq!(second, persisted);

            let removed = store.delete_rule(first[0].id).await.unwrap();
            assert_eq!(removed.filter_number, "555");
        }
    }

    #[tokio::test]
    async fn test_load_racing_a_mutation_on_legacy_blob_returns_persisted_ids() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("forwarding_rules.json"), legacy_blob()).unwrap();
        let store = RuleStore::new(Arc::new(FileBlobStore::new(dir.path())));

        let (loaded, added) = tokio::join!(store.load(), store.add_rule(draft("777", "", &["+7"])));
        let added = added.unwrap();
        let persisted = store.load().await;

        assert_eq!(persisted.len(), 3);
        assert_eq!(persisted[2], added);
        for rule in &loaded {
            assert!(persisted.iter().any(|stored| stored.id == rule.id));
        }
        store.update_rule(loaded[1].id, draft("", "OTP", &["+101"])).await.unwrap();
    }

    #[tokio::test]
    async fn test_mutation_read_error_propagates_without_writing() {
        let blobs = Arc::new(UnreadableBlobStore::default());
        let store = RuleStore::new(blobs.clone());

        let err = store.add_rule(draft("555", "", &["+1"])).await.unwrap_err();
        assert!(matches!(err, ForwarderError::Persistence(_)));

        let err = store.delete_rule(RuleId::new()).await.unwrap_err();
        assert!(matches!(err, ForwarderError::Persistence(_)));

        assert_eq!(blobs.puts.load(Ordering::SeqCst), 0);
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_appends_in_order() {
        let store = RuleStore::in_memory();
        let a = store.add_rule(draft("111", "", &["+1"])).await.unwrap();
        let b = store.add_rule(draft("222", "", &["+2"])).await.unwrap();

        let ids: Vec<_> = store.list_rules().await.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn test_invalid_rule_is_not_persisted() {
        let store = RuleStore::in_memory();
        let err = store.add_rule(draft("", " ", &["+1"])).await.unwrap_err();

        assert!(matches!(err, ForwarderError::Validation(_)));
        assert!(store.list_rules().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_position_and_id() {
        let store = RuleStore::in_memory();
        let a = store.add_rule(draft("111", "", &["+1"])).await.unwrap();
        let b = store.add_rule(draft("222", "", &["+2"])).await.unwrap();

        let updated = store
            .update_rule(a.id, RuleDraft::new("111", "bank", "x -> y", vec!["+9".into()]))
            .await
            .unwrap();

        let rules = store.list_rules().await;
        assert_eq!(rules[0], updated);
        assert_eq!(rules[0].id, a.id);
        assert_eq!(rules[0].filter_word, "bank");
        assert_eq!(rules[1], b);
    }

    #[tokio::test]
    async fn test_update_validates_and_reports_missing() {
        let store = RuleStore::in_memory();
        let a = store.add_rule(draft("111", "", &["+1"])).await.unwrap();

        let err = store.update_rule(a.id, draft("111", "", &[])).await.unwrap_err();
        assert!(matches!(err, ForwarderError::Validation(_)));
        assert_eq!(store.list_rules().await, vec![a]);

        let missing = RuleId::new();
        let err = store.update_rule(missing, draft("1", "", &["+1"])).await.unwrap_err();
        assert!(matches!(err, ForwarderError::RuleNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_duplicate_filter_pairs_are_addressed_by_id() {
        let store = RuleStore::in_memory();
        let first = store.add_rule(draft("555", "OTP", &["+1"])).await.unwrap();
        let second = store.add_rule(draft("555", "OTP", &["+2"])).await.unwrap();

        let duplicates = store.find_by_filters("555", "OTP").await;
        assert_eq!(duplicates, vec![first.clone(), second.clone()]);

        store.update_rule(second.id, draft("555", "OTP", &["+3"])).await.unwrap();
        let removed = store.delete_rule(first.id).await.unwrap();
        assert_eq!(removed, first);

        let rules = store.list_rules().await;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, second.id);
        assert_eq!(rules[0].forwarding_numbers, vec!["+3".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_missing_rule() {
        let store = RuleStore::in_memory();
        let err = store.delete_rule(RuleId::new()).await.unwrap_err();
        assert!(matches!(err, ForwarderError::RuleNotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_not_lost() {
        let store = Arc::new(RuleStore::in_memory());

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let store = store.clone();
                async move { store.add_rule(draft(&format!("{}", i), "", &["+1"])).await }
            })
            .collect();
        for result in futures::future::join_all(handles).await {
            result.unwrap();
        }

        assert_eq!(store.list_rules().await.len(), 10);
    }

    #[tokio::test]
    async fn test_statistics() {
        let store = RuleStore::in_memory();
        store.add_rule(RuleDraft::new("1", "", "a -> b", vec!["+1".into(), "+2".into()])).await.unwrap();
        store.add_rule(draft("2", "", &["+3"])).await.unwrap();

        let stats = store.get_statistics().await;
        assert_eq!(stats["total_rules"], 2);
        assert_eq!(stats["total_destinations"], 3);
        assert_eq!(stats["rules_with_substitution"], 1);
    }

    #[tokio::test]
    async fn test_file_store_round_trip_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::new(Arc::new(FileBlobStore::new(dir.path().join("rules"))));

        let rule = store.add_rule(draft("555", "", &["+200"])).await.unwrap();
        store.add_rule(draft("", "OTP", &["+100"])).await.unwrap();

        let reopened = RuleStore::new(Arc::new(FileBlobStore::new(dir.path().join("rules"))));
        let rules = reopened.load().await;
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0], rule);

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("rules"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries, vec!["forwarding_rules.json".to_string()]);
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FileBlobStore::new(dir.path());
        assert!(blobs.get("absent").await.unwrap().is_none());
    }
}
