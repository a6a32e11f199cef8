//! Tree and node store configuration
//!
//! Provides the minimum degree, duplicate-key policy and the durability
//! options of the directory-backed store.

use crate::{BTreeError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Smallest legal minimum degree.
pub const MIN_DEGREE: usize = 2;

/// Default minimum degree (nodes hold 2..=5 keys).
pub const DEFAULT_DEGREE: usize = 3;

/// Largest accepted minimum degree. Keeps `2t - 1` far from overflow.
pub const MAX_DEGREE: usize = 1 << 16;

/// Durability level of a node record write
///
/// Trade-off between write latency and crash safety:
/// - Synchronous: every record write is followed by `fsync`
/// - NoSync: records are left in the OS buffer cache (tests, bulk loads)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DurabilityLevel {
    /// `fsync` after every record write, rename and removal.
    ///
    /// Each committed node survives a crash. It does NOT make a multi-node
    /// split or merge atomic.
    #[default]
    Synchronous,

    /// Only write to the OS buffer cache.
    NoSync,
}

impl DurabilityLevel {
    pub fn requires_sync(&self) -> bool {
        matches!(self, Self::Synchronous)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Synchronous => "fsync every record",
            Self::NoSync => "no fsync (testing only)",
        }
    }
}

/// What `insert` does when the key is already present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DuplicatePolicy {
    /// Leave the tree untouched and report `Ok(false)`.
    #[default]
    Ignore,

    /// Fail with [`BTreeError::DuplicateKey`].
    Reject,
}

/// B-tree configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Minimum degree `t`; non-root nodes hold `t-1..=2t-1` keys
    pub min_degree: usize,

    /// Duplicate insertion behaviour
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            min_degree: DEFAULT_DEGREE,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl TreeConfig {
    pub fn with_degree(min_degree: usize) -> Self {
        Self {
            min_degree,
            ..Default::default()
        }
    }

    pub fn rejecting_duplicates(mut self) -> Self {
        self.duplicate_policy = DuplicatePolicy::Reject;
        self
    }

    /// Maximum keys per node (`2t - 1`)
    pub fn max_keys(&self) -> usize {
        2 * self.min_degree - 1
    }

    /// Minimum keys per non-root node (`t - 1`)
    pub fn min_keys(&self) -> usize {
        self.min_degree - 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_degree < MIN_DEGREE {
            return Err(BTreeError::Config(format!(
                "minimum degree must be at least {}, got {}",
                MIN_DEGREE, self.min_degree
            )));
        }
        if self.min_degree > MAX_DEGREE {
            return Err(BTreeError::Config(format!(
                "minimum degree must be at most {}, got {}",
                MAX_DEGREE, self.min_degree
            )));
        }
        Ok(())
    }
}

/// Directory-backed node store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the superblock and one file per node
    pub path: PathBuf,

    /// Record write durability
    pub durability: DurabilityLevel,

    /// Frame records with a CRC32 and verify it on read
    pub checksum: bool,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            durability: DurabilityLevel::default(),
            checksum: true,
        }
    }

    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            durability: DurabilityLevel::NoSync,
            ..Self::new(path)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(BTreeError::Config("store path must not be empty".into()));
        }
        if self.path.try_exists()? && !self.path.is_dir() {
            return Err(BTreeError::Config(format!(
                "store path {} is not a directory",
                self.path.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degree_bounds() {
        assert!(TreeConfig::with_degree(0).validate().is_err());
        assert!(TreeConfig::with_degree(1).validate().is_err());
        assert!(TreeConfig::with_degree(2).validate().is_ok());

        assert!(TreeConfig::with_degree(MAX_DEGREE).validate().is_ok());
        assert!(matches!(
            TreeConfig::with_degree(MAX_DEGREE + 1).validate(),
            Err(BTreeError::Config(_))
        ));
        assert!(matches!(
            TreeConfig::with_degree(usize::MAX).validate(),
            Err(BTreeError::Config(_))
        ));

        let config = TreeConfig::default();
        assert_eq!(config.min_degree, 3);
        assert_eq!(config.max_keys(), 5);
        assert_eq!(config.min_keys(), 2);
    }

    #[test]
    fn test_store_config() {
        assert!(StoreConfig::new("").validate().is_err());

        let config = StoreConfig::for_testing("some/dir");
        assert!(!config.durability.requires_sync());
        assert!(config.checksum);
        assert!(StoreConfig::new("x").durability.requires_sync());
    }

    #[test]
    fn test_config_serde() {
        let config = TreeConfig::with_degree(4).rejecting_duplicates();
        let json = serde_json::to_string(&config).unwrap();
        let back: TreeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
