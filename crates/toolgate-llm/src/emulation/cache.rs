//! Memoized normalization results
//!
//! Keys are the SHA-256 of the serialized backend payload plus the
//! normalization options. Once the ceiling is reached the oldest entry is
//! evicted first.

use std::sync::{Mutex, PoisonError};

use indexmap::IndexMap;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::normalizer::NormalizationResult;

/// Bounded FIFO cache of normalization results
pub struct NormalizationCache {
    capacity: usize,
    entries: Mutex<IndexMap<String, NormalizationResult>>,
}

impl NormalizationCache {
    /// Create a cache holding at most `capacity` results
    ///
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(IndexMap::with_capacity(capacity.min(1024))),
        }
    }

    pub fn get(&self, key: &str) -> Option<NormalizationResult> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: String, result: NormalizationResult) {
        if self.capacity == 0 {
            return;
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, result);

        while entries.len() > self.capacity {
            entries.shift_remove_index(0);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache key for a payload and the options it is normalized under
///
/// `None` when either side cannot be serialized.
pub fn cache_key<P: Serialize, O: Serialize>(payload: &P, options: &O) -> Option<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(payload).ok()?);
    hasher.update(b"|");
    hasher.update(serde_json::to_vec(options).ok()?);

    Some(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::backend::BackendKind;
    use crate::types::{Choice, ChoiceMessage, CompletionResponse, FinishReason, Usage};

    fn result(content: &str) -> NormalizationResult {
        NormalizationResult {
            response: CompletionResponse {
                id: "chatcmpl-1".to_owned(),
                created: 1,
                model: "m".to_owned(),
                choices: vec![Choice {
                    index: 0,
                    message: ChoiceMessage::text(content.to_owned()),
                    finish_reason: FinishReason::Stop,
                }],
                usage: Usage::default(),
            },
            source: BackendKind::Text,
            tool_call_count: 0,
            latency: Duration::ZERO,
        }
    }

    #[test]
    fn evicts_oldest_first() {
        let cache = NormalizationCache::new(2);
        cache.insert("a".to_owned(), result("a"));
        cache.insert("b".to_owned(), result("b"));
        cache.insert("c".to_owned(), result("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("c").unwrap().response.content(), "c");
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = NormalizationCache::new(0);
        cache.insert("a".to_owned(), result("a"));
        assert!(cache.is_empty());
    }

    #[test]
    fn key_depends_on_payload_and_options() {
        let payload = json!({"text": "hi"});

        let first = cache_key(&payload, &json!({"emulate": true})).unwrap();
        let again = cache_key(&payload, &json!({"emulate": true})).unwrap();
        let other = cache_key(&payload, &json!({"emulate": false})).unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(first.len(), 64);
    }
}
