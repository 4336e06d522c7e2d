//! Constants and defaults for uniqueness counting
//!
//! This module defines the default engine parameters and the naming
//! scheme used for scratch files.

/// Default length of the bucket key taken from the front of each fingerprint
pub const DEFAULT_PREFIX_LENGTH: usize = 5;

/// Default number of bases taken from each mate of a read pair
pub const DEFAULT_SEED_LENGTH: usize = 30;

/// Default record budget for the in-memory sort buffer (whole computation)
pub const DEFAULT_MAX_RECORDS_IN_RAM: usize = 10_000_000;

/// Default limit on simultaneously open bucket writers
pub const DEFAULT_MAX_OPEN_BUCKETS: usize = 4096;

/// Extension of bucket files
pub const BUCKET_EXTENSION: &str = "seq";

/// Extension of spilled run files
pub const RUN_EXTENSION: &str = "tmp";

/// Prefix of the per-computation scratch directory
pub const SCRATCH_DIR_PREFIX: &str = "uniqseq.tmp.run_";

/// Capacity of buffered writers for bucket files
pub const BUCKET_WRITER_CAPACITY: usize = 64 * 1024;

/// Capacity of buffered writers for run files
pub const RUN_WRITER_CAPACITY: usize = 1024 * 1024;

/// Capacity of buffered readers for bucket and run files
pub const READER_CAPACITY: usize = 256 * 1024;

/// Name of the result metric
pub const METRIC_NAME: &str = "Uniqueness";

/// Version number
pub const VERSION: (u8, u8, u8) = (0, 1, 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_usable() {
        assert!(DEFAULT_PREFIX_LENGTH > 0);
        assert!(DEFAULT_SEED_LENGTH >= DEFAULT_PREFIX_LENGTH);
        assert!(DEFAULT_MAX_RECORDS_IN_RAM > 0);
        assert!(DEFAULT_MAX_OPEN_BUCKETS > 0);
    }

    #[test]
    fn test_extensions_differ() {
        // Bucket and run files share the scratch directory
        assert_ne!(BUCKET_EXTENSION, RUN_EXTENSION);
    }
}
