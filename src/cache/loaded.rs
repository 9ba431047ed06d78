use ahash::AHashMap;
use cycompile_ffi::Callable;
use parking_lot::{Mutex, RwLock};

use super::eviction::{EvictionPolicy, InsertionOrderPolicy};
use super::key::CacheKey;

/// In-process tier: identifier to loaded callable, bounded by entry count.
pub struct LoadedArtifacts<P = InsertionOrderPolicy> {
    entries: RwLock<AHashMap<CacheKey, Callable>>,
    policy: Mutex<P>,
    capacity: usize,
}

impl LoadedArtifacts<InsertionOrderPolicy> {
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, InsertionOrderPolicy::new())
    }
}

impl<P: EvictionPolicy> LoadedArtifacts<P> {
    pub fn with_policy(capacity: usize, policy: P) -> Self {
        Self {
            entries: RwLock::new(AHashMap::new()),
            policy: Mutex::new(policy),
            capacity,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Callable> {
        let entries = self.entries.read();
        let found = entries.get(key).cloned();
        if found.is_some() {
            self.policy.lock().on_access(key);
        }
        found
    }

    /// Inserts `callable`, evicting until there is room. Returns the evicted
    /// identifiers. Replacing an existing identifier evicts nothing; a
    /// capacity of zero disables the tier.
    pub fn insert(&self, key: CacheKey, callable: Callable) -> Vec<CacheKey> {
        let mut evicted = Vec::new();
        if self.capacity == 0 {
            return evicted;
        }

        let mut entries = self.entries.write();
        let mut policy = self.policy.lock();

        if let Some(existing) = entries.get_mut(&key) {
            *existing = callable;
            return evicted;
        }

        while entries.len() >= self.capacity {
            let Some(victim) = policy.evict(&entries) else {
                break;
            };
            entries.remove(&victim);
            policy.on_remove(&victim);
            evicted.push(victim);
        }

        entries.insert(key.clone(), callable);
        policy.on_add(&key);
        evicted
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.clear();
        self.policy.lock().clear();
    }
}
