//! Configuration options recognized by the core.
//!
//! Loading and merging configuration files belongs to the front-ends; the
//! crate only consumes this parsed, defaulted struct.

use std::time::Duration;

use serde::Deserialize;

/// Policy for a cache miss that cannot be satisfied from the content
/// store (no transfer manager configured, or the block fetch failed).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SparseReadFill {
    /// Zero-fill the missing range (sparse-file semantics).
    #[default]
    Zero,
    /// Surface an I/O error to the client.
    Fail,
}

/// Tunables of the data path.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Cache chunking granularity in bytes; must be a power of two.
    pub chunk_size: u64,
    /// RPC record cap for non-WRITE procedures.
    pub max_record_size_read: usize,
    /// RPC record cap for WRITE; also the transport reassembly limit.
    pub max_record_size_write: usize,
    /// Graceful-close deadline for connections on shutdown.
    #[serde(with = "seconds")]
    pub shutdown_timeout: Duration,
    /// Block uploader pool size.
    pub upload_workers: usize,
    /// Upload queue bound; a full queue blocks flush enqueues.
    pub upload_queue_depth: usize,
    /// Fixed write verifier for deterministic tests; none means OS
    /// randomness at startup.
    pub write_verifier_seed: Option<u64>,
    /// Residual cache-miss policy.
    pub sparse_read_fill: SparseReadFill,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            chunk_size: 4 * 1024 * 1024,
            max_record_size_read: 1024 * 1024,
            max_record_size_write: 16 * 1024 * 1024,
            shutdown_timeout: Duration::from_secs(10),
            upload_workers: 4,
            upload_queue_depth: 64,
            write_verifier_seed: None,
            sparse_read_fill: SparseReadFill::default(),
        }
    }
}

impl CoreConfig {
    /// Rejects values the data path cannot operate with.
    pub fn validate(&self) -> Result<(), String> {
        if !self.chunk_size.is_power_of_two() {
            return Err(format!("chunk_size {} is not a power of two", self.chunk_size));
        }
        if self.max_record_size_read > self.max_record_size_write {
            return Err("max_record_size_read exceeds max_record_size_write".into());
        }
        if self.upload_workers == 0 || self.upload_queue_depth == 0 {
            return Err("upload_workers and upload_queue_depth must be non-zero".into());
        }
        Ok(())
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
