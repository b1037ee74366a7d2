//! Memoization of evaluation results.
//!
//! [`EvaluationCache`] is the seam the engine talks to; [`RuleCache`] is the
//! in-process implementation on top of moka. Writers are serialized behind
//! one lock so a store never interleaves with a clear.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tokio::sync::Mutex;
use tracing::debug;

use super::fingerprint::CacheKey;
use crate::config::CacheConfig;
use crate::models::EvaluationResult;

/// Storage for evaluation results, keyed by context fingerprint
#[async_trait]
pub trait EvaluationCache: Send + Sync {
    /// Stored result for `key`, or `None` on a miss or an expired entry
    async fn get_cached_evaluation(&self, key: &CacheKey) -> Option<EvaluationResult>;

    /// Store `result` under `key`, replacing any previous entry
    async fn cache_evaluation(&self, result: EvaluationResult, key: &CacheKey);

    /// Drop every entry
    async fn clear_cache(&self);

    /// Drop the entries whose context references `subject_id`; returns how many
    async fn invalidate_for_doctor(&self, subject_id: &str) -> usize;
}

/// Cached evaluation with the key it was stored under
pub type CachedEvaluation = (CacheKey, EvaluationResult);

/// Bounded in-memory [`EvaluationCache`] with optional time-to-live.
///
/// Backed by moka: capacity eviction and expiry are handled by the cache
/// itself. Writers are serialized behind `writes`; reads go straight to
/// moka.
pub struct RuleCache {
    entries: Cache<String, CachedEvaluation>,
    writes: Mutex<()>,
    max_entries: usize,
}

impl RuleCache {
    pub fn new(max_entries: usize, ttl: Option<Duration>) -> Self {
        let max_entries = max_entries.max(1);
        let mut builder = Cache::builder().max_capacity(max_entries as u64);
        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }

        Self {
            entries: builder.build(),
            writes: Mutex::new(()),
            max_entries,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.ttl())
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Live entries, after moka has applied pending evictions
    pub async fn len(&self) -> usize {
        self.entries.run_pending_tasks().await;
        self.entries.iter().count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for RuleCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

#[async_trait]
impl EvaluationCache for RuleCache {
    async fn get_cached_evaluation(&self, key: &CacheKey) -> Option<EvaluationResult> {
        let (_, result) = self.entries.get(key.fingerprint()).await?;
        Some(result)
    }

    async fn cache_evaluation(&self, mut result: EvaluationResult, key: &CacheKey) {
        result.from_cache = false;

        let _guard = self.writes.lock().await;
        self.entries
            .insert(key.fingerprint().to_string(), (key.clone(), result))
            .await;
    }

    async fn clear_cache(&self) {
        let _guard = self.writes.lock().await;
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
        debug!("Cleared evaluation cache");
    }

    async fn invalidate_for_doctor(&self, subject_id: &str) -> usize {
        let _guard = self.writes.lock().await;
        let stale: Vec<Arc<String>> = self
            .entries
            .iter()
            .filter(|(_, (key, _))| key.references(subject_id))
            .map(|(fingerprint, _)| fingerprint)
            .collect();

        for fingerprint in &stale {
            self.entries.invalidate(fingerprint.as_str()).await;
        }
        debug!(subject_id, dropped = stale.len(), "Invalidated cache entries for subject");
        stale.len()
    }
}
