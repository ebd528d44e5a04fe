//! Configuration parsing and validation.
//!
//! Master configuration is loaded from TOML files. Sizing knobs (hash
//! index buckets, lock stripes, log budgets) must be set before the
//! object manager is constructed; they are fixed for the process
//! lifetime.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level master configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Number of hash index buckets. Must be a power of two.
    #[serde(default = "default_hash_index_buckets")]
    pub hash_index_buckets: usize,

    /// Number of bucket lock stripes. Must be a power of two and no
    /// larger than `hash_index_buckets`.
    #[serde(default = "default_bucket_lock_stripes")]
    pub bucket_lock_stripes: usize,

    /// Total byte budget for the main log. Appends beyond this fail and
    /// surface as `Retry` to clients.
    #[serde(default = "default_log_byte_budget")]
    pub log_byte_budget: u64,

    /// Byte budget for each side log used during recovery replay.
    #[serde(default = "default_side_log_byte_budget")]
    pub side_log_byte_budget: u64,

    /// Bytes of log appended before a segment is sealed and a new head
    /// segment opened.
    #[serde(default = "default_segment_size_bytes")]
    pub segment_size_bytes: u64,

    /// Replay yields to the replication driver after roughly this many
    /// iterated bytes.
    #[serde(default = "default_replay_yield_bytes")]
    pub replay_yield_bytes: u64,

    /// Policy for checksum failures encountered during replay.
    #[serde(default)]
    pub replay_checksum_policy: ChecksumPolicy,

    /// Whether the log cleaner is enabled at startup.
    #[serde(default = "default_cleaner_enabled")]
    pub cleaner_enabled: bool,
}

/// Policy for checksum failures during recovery replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    /// Count the failure, log a warning, and process the entry anyway.
    /// The orchestrator may re-replay from a different replica.
    Warn,
    /// Abort the replay; the orchestrator must retry another replica.
    Abort,
}

impl Default for ChecksumPolicy {
    fn default() -> Self {
        Self::Warn
    }
}

fn default_hash_index_buckets() -> usize {
    1024
}

fn default_bucket_lock_stripes() -> usize {
    1024
}

fn default_log_byte_budget() -> u64 {
    64 * 1024 * 1024
}

fn default_side_log_byte_budget() -> u64 {
    64 * 1024 * 1024
}

fn default_segment_size_bytes() -> u64 {
    8 * 1024 * 1024
}

fn default_replay_yield_bytes() -> u64 {
    50_000
}

fn default_cleaner_enabled() -> bool {
    true
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            hash_index_buckets: default_hash_index_buckets(),
            bucket_lock_stripes: default_bucket_lock_stripes(),
            log_byte_budget: default_log_byte_budget(),
            side_log_byte_budget: default_side_log_byte_budget(),
            segment_size_bytes: default_segment_size_bytes(),
            replay_yield_bytes: default_replay_yield_bytes(),
            replay_checksum_policy: ChecksumPolicy::default(),
            cleaner_enabled: default_cleaner_enabled(),
        }
    }
}

impl MasterConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).context("failed to parse config file as TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate sizing constraints.
    pub fn validate(&self) -> Result<()> {
        if !self.hash_index_buckets.is_power_of_two() {
            anyhow::bail!(
                "hash_index_buckets must be a power of two, got {}",
                self.hash_index_buckets
            );
        }
        if !self.bucket_lock_stripes.is_power_of_two() {
            anyhow::bail!(
                "bucket_lock_stripes must be a power of two, got {}",
                self.bucket_lock_stripes
            );
        }
        if self.bucket_lock_stripes > self.hash_index_buckets {
            anyhow::bail!(
                "bucket_lock_stripes ({}) must not exceed hash_index_buckets ({})",
                self.bucket_lock_stripes,
                self.hash_index_buckets
            );
        }
        if self.segment_size_bytes == 0 {
            anyhow::bail!("segment_size_bytes must be > 0");
        }
        if self.log_byte_budget < self.segment_size_bytes {
            anyhow::bail!("log_byte_budget must hold at least one segment");
        }
        if self.replay_yield_bytes == 0 {
            anyhow::bail!("replay_yield_bytes must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        assert!(MasterConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_power_of_two_buckets() {
        let config = MasterConfig {
            hash_index_buckets: 1000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_more_stripes_than_buckets() {
        let config = MasterConfig {
            hash_index_buckets: 512,
            bucket_lock_stripes: 1024,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "hash_index_buckets = 256\nreplay_checksum_policy = \"abort\""
        )
        .unwrap();

        let config = MasterConfig::load(file.path()).unwrap();
        assert_eq!(config.hash_index_buckets, 256);
        assert_eq!(config.replay_checksum_policy, ChecksumPolicy::Abort);
        // Unspecified fields take defaults.
        assert_eq!(config.replay_yield_bytes, 50_000);
    }

    #[test]
    fn test_load_rejects_invalid_sizing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bucket_lock_stripes = 3").unwrap();
        assert!(MasterConfig::load(file.path()).is_err());
    }
}
