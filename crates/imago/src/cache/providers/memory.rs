//! # Memory Cache Provider
//!
//! This module provides an in-memory image cache bounded by a byte budget.
//!
//! When an insertion pushes the memory usage above the capacity, entries are
//! evicted least recently used first until the usage drops to the preferred
//! usage after purge. Every successful lookup refreshes an entry's access stamp.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::cache::providers::{ImageCache, ImageRequestCache};
use crate::cache::types::CacheConfig;
use crate::error::ConfigError;
use crate::image::Image;

/// Entry in the memory cache
#[derive(Debug)]
struct CacheEntry {
    image: Image,
    /// Bytes accounted for this entry
    byte_size: u64,
    /// Access stamp, unique within the cache
    last_access: u64,
}

#[derive(Debug)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Access stamp -> key, oldest first
    recency: BTreeMap<u64, String>,
    /// Stamps are handed out from a strictly increasing counter, so two entries
    /// never share one and eviction order follows the order of adds and lookups.
    clock: u64,
    memory_usage: u64,
    memory_capacity: u64,
    preferred_usage: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.last_access);
        self.memory_usage = self.memory_usage.saturating_sub(entry.byte_size);
        Some(entry)
    }

    /// Evict least recently used entries until usage is at or below the preferred
    /// usage or the cache is empty
    fn purge(&mut self) {
        let before = self.memory_usage;
        let mut evicted = 0usize;

        while self.memory_usage > self.preferred_usage {
            let Some((_, key)) = self.recency.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.memory_usage = self.memory_usage.saturating_sub(entry.byte_size);
                evicted += 1;
                trace!(key = %key, size = entry.byte_size, "Evicted image from memory cache");
            }
        }

        debug!(
            evicted,
            before,
            after = self.memory_usage,
            preferred = self.preferred_usage,
            "Purged memory cache"
        );
    }
}

/// Memory cache with least recently used auto-purging
#[derive(Debug)]
pub struct AutoPurgingImageCache {
    state: Mutex<CacheState>,
}

impl Default for AutoPurgingImageCache {
    fn default() -> Self {
        let config = CacheConfig::default();
        Self::from_valid(config)
    }
}

impl AutoPurgingImageCache {
    /// Create a new memory cache with the specified limits
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        debug!(
            memory_capacity = config.memory_capacity,
            preferred_usage = config.preferred_memory_usage_after_purge,
            "Memory cache created"
        );
        Ok(Self::from_valid(config))
    }

    pub fn with_capacity(
        memory_capacity: u64,
        preferred_memory_usage_after_purge: u64,
    ) -> Result<Self, ConfigError> {
        Self::new(CacheConfig::new(
            memory_capacity,
            preferred_memory_usage_after_purge,
        ))
    }

    fn from_valid(config: CacheConfig) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                clock: 0,
                memory_usage: 0,
                memory_capacity: config.memory_capacity,
                preferred_usage: config.preferred_memory_usage_after_purge,
            }),
        }
    }

    /// Total bytes of all images currently stored
    pub fn memory_usage(&self) -> u64 {
        self.state.lock().memory_usage
    }

    pub fn memory_capacity(&self) -> u64 {
        self.state.lock().memory_capacity
    }

    pub fn preferred_memory_usage_after_purge(&self) -> u64 {
        self.state.lock().preferred_usage
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Change the capacity. Purges right away if the current usage exceeds it.
    pub fn set_memory_capacity(&self, memory_capacity: u64) -> Result<(), ConfigError> {
        let mut state = self.state.lock();
        CacheConfig::new(memory_capacity, state.preferred_usage).validate()?;

        state.memory_capacity = memory_capacity;
        if state.memory_usage > state.memory_capacity {
            state.purge();
        }
        Ok(())
    }

    pub fn set_preferred_memory_usage_after_purge(
        &self,
        preferred_usage: u64,
    ) -> Result<(), ConfigError> {
        let mut state = self.state.lock();
        CacheConfig::new(state.memory_capacity, preferred_usage).validate()?;

        state.preferred_usage = preferred_usage;
        Ok(())
    }
}

impl ImageCache for AutoPurgingImageCache {
    fn add(&self, key: &str, image: Image) {
        let byte_size = image.byte_size();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        // Still inserted; the purge below evicts it along with everything older
        if byte_size > state.memory_capacity {
            warn!(
                key = %key,
                size = byte_size,
                max_size = state.memory_capacity,
                "Image larger than memory cache capacity"
            );
        }

        state.remove_entry(key);
        let last_access = state.tick();
        state.recency.insert(last_access, key.to_owned());
        state.entries.insert(
            key.to_owned(),
            CacheEntry {
                image,
                byte_size,
                last_access,
            },
        );
        state.memory_usage = state.memory_usage.saturating_add(byte_size);

        if state.memory_usage > state.memory_capacity {
            state.purge();
        }
    }

    fn lookup(&self, key: &str) -> Option<Image> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let stamp = state.tick();
        let entry = state.entries.get_mut(key)?;
        let previous = std::mem::replace(&mut entry.last_access, stamp);
        let image = entry.image.clone();

        state.recency.remove(&previous);
        state.recency.insert(stamp, key.to_owned());
        Some(image)
    }

    fn remove(&self, key: &str) -> bool {
        let removed = self.state.lock().remove_entry(key).is_some();
        if removed {
            debug!(key = %key, "Removed image from memory cache");
        }
        removed
    }

    fn remove_all(&self) -> bool {
        let mut state = self.state.lock();
        let had_entries = !state.entries.is_empty();

        state.entries.clear();
        state.recency.clear();
        state.memory_usage = 0;

        debug!("Memory cache cleared");
        had_entries
    }
}

impl ImageRequestCache for AutoPurgingImageCache {}
