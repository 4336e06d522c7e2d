//! Disk-assisted uniqueness counting
//!
//! This module implements the counting pipeline:
//! 1. Route fingerprints into prefix buckets on disk
//! 2. Sort each bucket in memory, or spill sorted runs when it exceeds the
//!    memory budget
//! 3. K-way merge the runs of spilled buckets
//! 4. Sum the per-bucket (total, unique) counts

pub mod config;
pub mod scratch;
pub mod buckets;
pub mod external_sort;
pub mod merge;
pub mod uniqueness;

pub use config::CounterConfiguration;
pub use buckets::{BucketFile, BucketRouter};
pub use external_sort::{count_bucket, count_sorted, ExternalSorter, RecordBuffer};
pub use merge::RunMerger;
pub use scratch::ScratchSpace;
pub use uniqueness::{count_unique, UniquenessCalculator};
