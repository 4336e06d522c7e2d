//! Configuration for uniqueness counting
//!
//! Parameters for bucket routing, the in-memory sort budget and
//! scratch-file placement.

use crate::constants::{
    DEFAULT_MAX_OPEN_BUCKETS, DEFAULT_MAX_RECORDS_IN_RAM, DEFAULT_PREFIX_LENGTH,
    DEFAULT_SEED_LENGTH,
};
use std::path::PathBuf;

/// Configuration parameters for a uniqueness computation
#[derive(Debug, Clone)]
pub struct CounterConfiguration {
    /// Length of the bucket key taken from the front of each fingerprint
    pub prefix_length: usize,

    /// Bases taken from each mate when building read-pair fingerprints
    pub seed_length: usize,

    /// Maximum number of fingerprints buffered in memory (whole computation)
    pub max_records_in_ram: usize,

    /// Maximum fingerprint bytes buffered in memory (0 = unlimited)
    pub max_bytes_in_ram: usize,

    /// Maximum number of simultaneously open bucket writers
    pub max_open_buckets: usize,

    /// Number of buckets counted in parallel (0 = all available cores)
    pub num_threads: usize,

    /// Directory under which the scratch directory is created
    pub tmp_dirname: PathBuf,

    /// Verbose per-bucket logging
    pub verbose: bool,
}

impl Default for CounterConfiguration {
    fn default() -> Self {
        Self {
            prefix_length: DEFAULT_PREFIX_LENGTH,
            seed_length: DEFAULT_SEED_LENGTH,
            max_records_in_ram: DEFAULT_MAX_RECORDS_IN_RAM,
            max_bytes_in_ram: 0,
            max_open_buckets: DEFAULT_MAX_OPEN_BUCKETS,
            num_threads: 1,
            tmp_dirname: std::env::temp_dir(),
            verbose: false,
        }
    }
}

impl CounterConfiguration {
    /// Create a configuration with the given prefix length and record budget
    pub fn new(prefix_length: usize, max_records_in_ram: usize) -> Result<Self, String> {
        let config = Self {
            prefix_length,
            max_records_in_ram,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.prefix_length == 0 {
            return Err("prefix_length must be at least 1".to_string());
        }
        if self.seed_length == 0 {
            return Err("seed_length must be at least 1".to_string());
        }
        if self.max_records_in_ram == 0 {
            return Err("max_records_in_ram must be at least 1".to_string());
        }
        if self.max_open_buckets == 0 {
            return Err("max_open_buckets must be at least 1".to_string());
        }
        Ok(())
    }

    /// Record budget of one bucket when `num_threads` buckets are in flight
    ///
    /// The shared budget is split evenly so the overall bound still holds.
    pub fn records_per_thread(&self, num_threads: usize) -> usize {
        (self.max_records_in_ram / num_threads.max(1)).max(1)
    }

    /// Byte budget of one bucket when `num_threads` buckets are in flight (0 = unlimited)
    pub fn bytes_per_thread(&self, num_threads: usize) -> usize {
        if self.max_bytes_in_ram == 0 {
            0
        } else {
            (self.max_bytes_in_ram / num_threads.max(1)).max(1)
        }
    }

    /// Log configuration parameters via tracing
    pub fn print(&self) {
        tracing::info!("Counter Configuration:");
        tracing::info!("  prefix_length = {}", self.prefix_length);
        tracing::debug!("  seed_length = {}", self.seed_length);
        tracing::info!("  max_records_in_ram = {}", self.max_records_in_ram);
        if self.max_bytes_in_ram == 0 {
            tracing::debug!("  max_bytes_in_ram = unlimited");
        } else {
            tracing::debug!("  max_bytes_in_ram = {}", self.max_bytes_in_ram);
        }
        tracing::debug!("  max_open_buckets = {}", self.max_open_buckets);
        if self.num_threads == 0 {
            tracing::info!("  num_threads = all available cores");
        } else {
            tracing::info!("  num_threads = {}", self.num_threads);
        }
        tracing::debug!("  tmp_dirname = {:?}", self.tmp_dirname);
        tracing::debug!("  verbose = {}", self.verbose);
    }
}
