//! Error type for uniqueness counting
//!
//! Every failure aborts the whole computation: partial counts are never
//! merged with an in-flight error.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Phase of the computation in which an I/O error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Creating the scratch directory
    Setup,
    /// Writing fingerprints into bucket files
    Routing,
    /// Reading a bucket and spilling sorted runs
    Sorting,
    /// K-way merge of the runs of one bucket
    Merging,
    /// Removing scratch files
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Setup => "setup",
            Stage::Routing => "routing",
            Stage::Sorting => "sorting",
            Stage::Merging => "merging",
            Stage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Error type for uniqueness counting
#[derive(Error, Debug)]
pub enum UniquenessError {
    /// A configuration parameter is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A fingerprint is shorter than the bucket key
    #[error(
        "Fingerprint #{index} has length {len}, shorter than the prefix length {prefix_length}"
    )]
    FingerprintTooShort {
        /// Zero-based position of the fingerprint in the input
        index: u64,
        /// Length of the fingerprint in bytes
        len: usize,
        /// Configured prefix length
        prefix_length: usize,
    },

    /// A fingerprint contains a line break
    #[error("Fingerprint #{index} contains a line break")]
    InvalidFingerprint {
        /// Zero-based position of the fingerprint in the input
        index: u64,
    },

    /// A read is shorter than the seed taken from it
    #[error("Read {mate} has length {len}, shorter than the seed length {seed_length}")]
    ReadTooShort {
        /// Mate number (1 or 2)
        mate: u8,
        /// Read length
        len: usize,
        /// Configured seed length
        seed_length: usize,
    },

    /// More distinct bucket keys than allowed open writers
    #[error(
        "Too many buckets: opening bucket '{key}' would exceed the limit of {limit} open writers"
    )]
    TooManyBuckets {
        /// Configured writer limit
        limit: usize,
        /// Key of the bucket that could not be opened
        key: String,
    },

    /// An I/O operation on a scratch file failed
    #[error("I/O error during {stage} on {}: {source}", path.display())]
    Io {
        /// Phase of the computation
        stage: Stage,
        /// Offending file or directory
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The worker pool could not be created
    #[error("Failed to create thread pool: {0}")]
    ThreadPool(String),
}

impl UniquenessError {
    /// Wrap an I/O error with the stage and path it belongs to
    pub fn io(stage: Stage, path: impl AsRef<Path>, source: io::Error) -> Self {
        UniquenessError::Io {
            stage,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Stage of an I/O failure, if this is one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            UniquenessError::Io { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, UniquenessError>;
