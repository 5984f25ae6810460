//! Bounded send-id -> bundle correlation cache.
//!
//! Purely an optimization: a miss just means the bundle hash is derived from
//! the source receipt again.

use alloy_primitives::B256;
use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Mutex;

pub const DEFAULT_BUNDLE_INDEX_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRef {
    pub bundle_hash: B256,
    pub source_tx_hash: B256,
}

/// Shared behind an `Arc` by every interop resource of one client.
pub struct BundleIndex {
    entries: Mutex<LruCache<B256, BundleRef>>,
}

impl Default for BundleIndex {
    fn default() -> Self {
        Self::new(DEFAULT_BUNDLE_INDEX_CAPACITY)
    }
}

impl BundleIndex {
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn insert(&self, send_id: B256, entry: BundleRef) {
        if let Ok(mut entries) = self.entries.lock() {
            let evicted = entries.push(send_id, entry).filter(|(key, _)| *key != send_id);
            if let Some((evicted, _)) = evicted {
                tracing::trace!(%evicted, "bundle index evicted entry");
            }
        }
    }

    pub fn get(&self, send_id: &B256) -> Option<BundleRef> {
        self.entries.lock().ok()?.get(send_id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(byte: u8) -> BundleRef {
        BundleRef {
            bundle_hash: B256::repeat_byte(byte),
            source_tx_hash: B256::repeat_byte(byte.wrapping_add(1)),
        }
    }

    #[test]
    fn evicts_least_recently_used() {
        let index = BundleIndex::new(2);
        index.insert(B256::repeat_byte(1), entry(1));
        index.insert(B256::repeat_byte(2), entry(2));
        // touch 1 so 2 becomes the eviction candidate
        assert_eq!(index.get(&B256::repeat_byte(1)), Some(entry(1)));
        index.insert(B256::repeat_byte(3), entry(3));
        assert_eq!(index.len(), 2);
        assert!(index.get(&B256::repeat_byte(2)).is_none());
        assert!(index.get(&B256::repeat_byte(1)).is_some());
    }

    #[test]
    fn zero_capacity_still_holds_one() {
        let index = BundleIndex::new(0);
        index.insert(B256::repeat_byte(1), entry(1));
        assert_eq!(index.len(), 1);
    }
}
