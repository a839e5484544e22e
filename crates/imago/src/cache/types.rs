//! # Cache Types
//!
//! This module defines common types used across the caching system.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for the memory cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of bytes the cache may hold once an insertion returns
    pub memory_capacity: u64,
    /// Number of bytes a purge evicts down to
    pub preferred_memory_usage_after_purge: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 100 * 1024 * 1024,                   // 100MB
            preferred_memory_usage_after_purge: 60 * 1024 * 1024, // 60MB
        }
    }
}

impl CacheConfig {
    pub fn new(memory_capacity: u64, preferred_memory_usage_after_purge: u64) -> Self {
        Self {
            memory_capacity,
            preferred_memory_usage_after_purge,
        }
    }

    /// The purge target must sit strictly below the capacity
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preferred_memory_usage_after_purge >= self.memory_capacity {
            return Err(ConfigError::PreferredUsageNotBelowCapacity {
                capacity: self.memory_capacity,
                preferred: self.preferred_memory_usage_after_purge,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.memory_capacity, 100 * 1024 * 1024);
    }

    #[test]
    fn test_preferred_must_be_below_capacity() {
        assert_eq!(
            CacheConfig::new(100, 100).validate(),
            Err(ConfigError::PreferredUsageNotBelowCapacity {
                capacity: 100,
                preferred: 100,
            })
        );
        assert!(CacheConfig::new(100, 99).validate().is_ok());
        assert!(CacheConfig::new(0, 0).validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: CacheConfig =
            serde_json::from_str(r#"{ "memory_capacity": 2048, "preferred_memory_usage_after_purge": 1024 }"#)
                .unwrap();
        assert_eq!(config, CacheConfig::new(2048, 1024));

        let config: CacheConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CacheConfig::default());
    }
}
