//! Uniqueness computation orchestration
//!
//! Coordinates the two phases of one computation:
//! 1. Route every fingerprint into its prefix bucket
//! 2. Close all bucket writers, then count each bucket (in memory or via
//!    spill and k-way merge) and sum the per-bucket results
//!
//! Either the whole computation succeeds with one final result, or it fails
//! with the first error; counts of buckets finished before a failure are
//! discarded.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::counter::buckets::{BucketFile, BucketRouter};
use crate::counter::config::CounterConfiguration;
use crate::counter::external_sort::count_bucket;
use crate::counter::scratch::{remove_scratch_file, ScratchSpace};
use crate::error::{Result, UniquenessError};
use crate::fingerprint::read_pair_fingerprint;
use crate::metrics::UniquenessResult;

/// Incremental total/unique fingerprint counter
///
/// Feed fingerprints with [`add_fingerprint`](Self::add_fingerprint) or
/// [`add_read_pair`](Self::add_read_pair), then call
/// [`finish`](Self::finish). All scratch files are removed when the
/// calculator is finished or dropped.
pub struct UniquenessCalculator {
    config: CounterConfiguration,
    // Declared before `scratch` so writers close before the directory goes
    router: BucketRouter,
    scratch: ScratchSpace,
}

impl UniquenessCalculator {
    /// Create a calculator and its scratch directory
    pub fn new(config: CounterConfiguration) -> Result<Self> {
        config.validate().map_err(UniquenessError::InvalidConfig)?;
        if config.verbose {
            config.print();
        }

        let scratch = ScratchSpace::new(&config.tmp_dirname)?;
        let router = BucketRouter::new(&scratch, config.prefix_length, config.max_open_buckets);

        Ok(Self {
            config,
            router,
            scratch,
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &CounterConfiguration {
        &self.config
    }

    /// Route one fingerprint
    pub fn add_fingerprint(&mut self, fingerprint: impl AsRef<[u8]>) -> Result<()> {
        self.router.route(fingerprint.as_ref())
    }

    /// Build the fingerprint of a read pair and route it
    pub fn add_read_pair(&mut self, read1: &[u8], read2: Option<&[u8]>) -> Result<()> {
        let fingerprint = read_pair_fingerprint(read1, read2, self.config.seed_length)?;
        self.router.route(&fingerprint)
    }

    /// Number of fingerprints routed so far
    pub fn num_fingerprints(&self) -> u64 {
        self.router.num_routed()
    }

    /// Finish routing, count every bucket and return the aggregate
    ///
    /// # Parallelism
    /// Buckets are counted on a rayon pool of `config.num_threads` threads
    /// (`0` = all cores). Each in-flight bucket gets an equal share of the
    /// memory budget.
    pub fn finish(self) -> Result<UniquenessResult> {
        let Self {
            config,
            router,
            scratch,
        } = self;

        debug!("Closing {} bucket writers", router.num_buckets());
        let buckets = router.finish()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .build()
            .map_err(|e| UniquenessError::ThreadPool(e.to_string()))?;

        let result = pool.install(|| count_buckets(&buckets, &config))?;

        info!(
            "Uniqueness: {} total, {} unique, {} duplicates",
            result.total_reads,
            result.unique_reads,
            result.duplicate_reads()
        );

        // Scratch directory goes last, after every bucket was handled
        drop(scratch);
        Ok(result)
    }
}

/// Count all buckets inside the current rayon pool and sum the results
fn count_buckets(
    buckets: &[BucketFile],
    config: &CounterConfiguration,
) -> Result<UniquenessResult> {
    let num_threads = rayon::current_num_threads();
    let max_records = config.records_per_thread(num_threads);
    let max_bytes = config.bytes_per_thread(num_threads);

    info!(
        "Counting {} buckets on {} threads, {} records per buffer",
        buckets.len(),
        num_threads,
        max_records
    );

    buckets
        .par_iter()
        .map(|bucket| {
            let result = count_bucket(bucket, max_records, max_bytes, config.verbose);
            // Removed whether or not counting succeeded
            remove_scratch_file(&bucket.path);
            if config.verbose {
                if let Ok(r) = &result {
                    debug!(
                        "Bucket '{}': {} total, {} unique",
                        bucket.key_str(),
                        r.total_reads,
                        r.unique_reads
                    );
                }
            }
            result
        })
        .try_reduce(UniquenessResult::default, |a, b| Ok(a + b))
}

/// Count total and distinct fingerprints of a finite sequence
///
/// # Examples
/// ```
/// use uniqseq_lib::{count_unique, CounterConfiguration};
///
/// let tmp = std::env::temp_dir();
/// let config = CounterConfiguration {
///     prefix_length: 2,
///     tmp_dirname: tmp,
///     ..CounterConfiguration::default()
/// };
/// let result = count_unique(["AAAAA", "AAAAA", "BBBBB"], config).unwrap();
/// assert_eq!(result.total_reads, 3);
/// assert_eq!(result.unique_reads, 2);
/// ```
pub fn count_unique<I, S>(fingerprints: I, config: CounterConfiguration) -> Result<UniquenessResult>
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut calculator = UniquenessCalculator::new(config)?;
    for fingerprint in fingerprints {
        calculator.add_fingerprint(fingerprint)?;
    }
    calculator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use std::fs;
    use tempfile::TempDir;

    fn config_in(tmp: &TempDir, prefix_length: usize, max_records: usize) -> CounterConfiguration {
        CounterConfiguration {
            prefix_length,
            max_records_in_ram: max_records,
            tmp_dirname: tmp.path().to_path_buf(),
            ..CounterConfiguration::default()
        }
    }

    #[test]
    fn test_calculator_invalid_config() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp, 0, 10);
        assert!(matches!(
            UniquenessCalculator::new(config),
            Err(UniquenessError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_calculator_basic() {
        let tmp = TempDir::new().unwrap();
        let mut calc = UniquenessCalculator::new(config_in(&tmp, 2, 10)).unwrap();
        assert_eq!(calc.config().prefix_length, 2);
        calc.add_fingerprint("AAAAA").unwrap();
        calc.add_fingerprint(b"AAAAA").unwrap();
        calc.add_fingerprint(String::from("BBBBB")).unwrap();
        assert_eq!(calc.num_fingerprints(), 3);

        let result = calc.finish().unwrap();
        assert_eq!(result, UniquenessResult::new(3, 2));
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_calculator_read_pairs() {
        let tmp = TempDir::new().unwrap();
        let config = CounterConfiguration {
            seed_length: 4,
            ..config_in(&tmp, 2, 10)
        };
        let mut calc = UniquenessCalculator::new(config).unwrap();
        calc.add_read_pair(b"ACGTAAAA", Some(b"TTTTCCCC")).unwrap();
        calc.add_read_pair(b"acgtGGGG", Some(b"ttttAAAA")).unwrap();
        calc.add_read_pair(b"ACGTAAAA", Some(b"GGGGCCCC")).unwrap();
        calc.add_read_pair(b"ACGTAAAA", None).unwrap();

        let result = calc.finish().unwrap();
        assert_eq!(result, UniquenessResult::new(4, 3));
    }

    #[test]
    fn test_calculator_dropped_without_finish_cleans_up() {
        let tmp = TempDir::new().unwrap();
        {
            let mut calc = UniquenessCalculator::new(config_in(&tmp, 2, 10)).unwrap();
            calc.add_fingerprint("ACGTACGT").unwrap();
        }
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_count_unique_parallel_matches_serial() {
        let tmp = TempDir::new().unwrap();
        let fingerprints: Vec<String> = (0..2000)
            .map(|i| format!("{:03}{:05}", i % 37, (i * 7) % 500))
            .collect();

        let serial = count_unique(&fingerprints, config_in(&tmp, 2, 50)).unwrap();
        let parallel = count_unique(
            &fingerprints,
            CounterConfiguration {
                num_threads: 4,
                ..config_in(&tmp, 2, 50)
            },
        )
        .unwrap();

        assert_eq!(serial.total_reads, 2000);
        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_count_unique_error_leaves_no_files() {
        let tmp = TempDir::new().unwrap();
        let err = count_unique(["ACGTACGT", "AC"], config_in(&tmp, 5, 10)).unwrap_err();
        assert!(matches!(err, UniquenessError::FingerprintTooShort { index: 1, .. }));
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failing_bucket_fails_whole_count() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("AA.seq");
        fs::write(&good, "AAAAA\nAAAAA\n").unwrap();
        let buckets = vec![
            BucketFile {
                key: b"AA".to_vec(),
                path: good,
                num_records: 2,
            },
            BucketFile {
                key: b"CC".to_vec(),
                path: tmp.path().join("CC.seq"),
                num_records: 1,
            },
        ];
        let config = CounterConfiguration {
            num_threads: 2,
            ..config_in(&tmp, 2, 10)
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .build()
            .unwrap();
        let err = pool.install(|| count_buckets(&buckets, &config)).unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Sorting));
        assert!(err.to_string().contains("CC.seq"));
    }
}
