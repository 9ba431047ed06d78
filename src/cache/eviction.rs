use std::collections::VecDeque;

use ahash::AHashMap;
use cycompile_ffi::Callable;

use super::key::CacheKey;

/// Eviction policy for the loaded-artifact tier
pub trait EvictionPolicy: Send + Sync {
    /// Decide which entry to evict
    fn evict(&mut self, loaded: &AHashMap<CacheKey, Callable>) -> Option<CacheKey>;

    /// Called when an entry is looked up
    fn on_access(&mut self, key: &CacheKey);

    /// Called when an entry is added
    fn on_add(&mut self, key: &CacheKey);

    /// Called when an entry is removed
    fn on_remove(&mut self, key: &CacheKey);

    fn clear(&mut self);
}

/// Evicts the oldest inserted entry; lookups do not refresh an entry.
#[derive(Debug, Default)]
pub struct InsertionOrderPolicy {
    order: VecDeque<CacheKey>,
}

impl InsertionOrderPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvictionPolicy for InsertionOrderPolicy {
    fn evict(&mut self, loaded: &AHashMap<CacheKey, Callable>) -> Option<CacheKey> {
        while let Some(oldest) = self.order.pop_front() {
            if loaded.contains_key(&oldest) {
                return Some(oldest);
            }
        }
        None
    }

    fn on_access(&mut self, _key: &CacheKey) {}

    fn on_add(&mut self, key: &CacheKey) {
        self.order.push_back(key.clone());
    }

    fn on_remove(&mut self, key: &CacheKey) {
        self.order.retain(|k| k != key);
    }

    fn clear(&mut self) {
        self.order.clear();
    }
}
