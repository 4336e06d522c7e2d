//! Uniqueness result and its report metric
//!
//! [`UniquenessResult`] is the (total, unique) pair produced per bucket and
//! summed by the aggregator. [`ResultMetric`] turns the final pair into the
//! named key/value entries a report builder embeds.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use crate::constants::METRIC_NAME;

/// Total and distinct fingerprint counts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UniquenessResult {
    /// Number of fingerprints seen
    pub total_reads: u64,
    /// Number of distinct fingerprints (case-insensitive)
    pub unique_reads: u64,
}

impl UniquenessResult {
    /// Create a result from its two counts
    pub fn new(total_reads: u64, unique_reads: u64) -> Self {
        Self { total_reads, unique_reads }
    }

    /// Percentage of distinct fingerprints, or `None` for an empty input
    pub fn percent_unique(&self) -> Option<f64> {
        if self.total_reads == 0 {
            None
        } else {
            Some(self.unique_reads as f64 * 100.0 / self.total_reads as f64)
        }
    }

    /// Number of fingerprints that repeat an earlier one
    pub fn duplicate_reads(&self) -> u64 {
        self.total_reads - self.unique_reads
    }
}

impl Add for UniquenessResult {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            total_reads: self.total_reads + other.total_reads,
            unique_reads: self.unique_reads + other.unique_reads,
        }
    }
}

impl AddAssign for UniquenessResult {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sum for UniquenessResult {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Format a percentage with two decimal places
pub fn format_percent(value: f64) -> String {
    format!("{:.2}", value)
}

/// Named metric with ordered key/value entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMetric {
    name: String,
    entries: Vec<(String, String)>,
}

impl ResultMetric {
    /// Create an empty metric
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Metric for a finished uniqueness computation
    ///
    /// `PercentUnique` is `NA` when no fingerprints were seen.
    pub fn from_result(result: &UniquenessResult) -> Self {
        let mut metric = Self::new(METRIC_NAME);
        metric.add_key_value("TotalReads", result.total_reads.to_string());
        metric.add_key_value("UniqueReads", result.unique_reads.to_string());
        let percent = result
            .percent_unique()
            .map(format_percent)
            .unwrap_or_else(|| "NA".to_string());
        metric.add_key_value("PercentUnique", percent);
        metric
    }

    /// Append an entry
    pub fn add_key_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Metric name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Look up an entry value by key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for ResultMetric {
    /// One `Key<TAB>Value` line per entry
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            writeln!(f, "{}\t{}", key, value)?;
        }
        Ok(())
    }
}
