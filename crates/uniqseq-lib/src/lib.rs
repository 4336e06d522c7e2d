// uniqseq: bounded-memory uniqueness counting of read fingerprints
//
// Counts total and distinct fingerprints of an arbitrarily large stream by
// bucketing on disk, sorting each bucket within a memory budget and
// merging spilled runs.

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod constants;
pub mod error;
pub mod fingerprint;
pub mod metrics;
pub mod counter;
pub mod source;

// Re-export common types at crate root
pub use counter::{count_unique, CounterConfiguration, UniquenessCalculator};
pub use error::{Result, Stage, UniquenessError};
pub use fingerprint::read_pair_fingerprint;
pub use metrics::{ResultMetric, UniquenessResult};

/// Version information
pub fn version() -> (u8, u8, u8) {
    constants::VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let (major, minor, patch) = version();
        assert_eq!(major, 0);
        assert_eq!(minor, 1);
        assert_eq!(patch, 0);
    }
}
