use std::{
    borrow::Borrow,
    collections::{HashMap, hash_map::Entry},
    hash::Hash,
};

use crate::foundation::error::VolserveResult;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests answered by an existing entry.
    pub hits: u64,
    /// Entries successfully constructed.
    pub builds: u64,
}

/// Construct-once, never-mutated entries.
///
/// The key fully determines the value. A failed build inserts nothing; entries are never evicted.
pub struct ImmutableCache<K, V> {
    entries: HashMap<K, V>,
    stats: CacheStats,
}

impl<K, V> Default for ImmutableCache<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }
}

impl<K: Eq + Hash, V> ImmutableCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_try_insert_with(
        &mut self,
        key: K,
        build: impl FnOnce() -> VolserveResult<V>,
    ) -> VolserveResult<&V> {
        match self.entries.entry(key) {
            Entry::Occupied(e) => {
                self.stats.hits = self.stats.hits.saturating_add(1);
                tracing::debug!(hits = self.stats.hits, "cache hit");
                Ok(e.into_mut())
            }
            Entry::Vacant(e) => {
                tracing::debug!("cache miss");
                let value = build()?;
                self.stats.builds = self.stats.builds.saturating_add(1);
                Ok(e.insert(value))
            }
        }
    }

    /// Lookup without counting a hit.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

/// Construct-once, mutate-per-call entries.
///
/// One object per coarse key. Every request runs `update` on the cached value and hands back the
/// same object, so all callers share whatever the last update wrote.
pub struct MutableCache<K, V> {
    entries: HashMap<K, V>,
    stats: CacheStats,
}

impl<K, V> Default for MutableCache<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }
}

impl<K: Eq + Hash, V> MutableCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (or build) the entry for `key`, then apply `update` to it.
    ///
    /// A new entry is stored only after both `build` and the first `update` succeed.
    pub fn update_or_try_insert_with(
        &mut self,
        key: K,
        build: impl FnOnce() -> VolserveResult<V>,
        update: impl FnOnce(&mut V) -> VolserveResult<()>,
    ) -> VolserveResult<&V> {
        match self.entries.entry(key) {
            Entry::Occupied(e) => {
                self.stats.hits = self.stats.hits.saturating_add(1);
                let value = e.into_mut();
                update(value)?;
                Ok(value)
            }
            Entry::Vacant(e) => {
                let mut value = build()?;
                update(&mut value)?;
                self.stats.builds = self.stats.builds.saturating_add(1);
                Ok(e.insert(value))
            }
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/policy.rs"]
mod tests;
