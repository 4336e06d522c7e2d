//! Per-bucket sorting and counting with disk spill
//!
//! A bucket is read into a RAM-bounded [`RecordBuffer`]:
//!
//! 1. If the whole bucket fits the budget, the buffer is sorted once and
//!    counted in memory.
//! 2. Otherwise, every time the buffer fills it is sorted and flushed to a
//!    run file; the final partial buffer becomes the last run.
//! 3. The runs are then counted by the k-way [`RunMerger`].
//!
//! Both paths use the same case-insensitive order and give identical counts.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::debug;

use crate::constants::{READER_CAPACITY, RUN_EXTENSION, RUN_WRITER_CAPACITY};
use crate::counter::buckets::BucketFile;
use crate::counter::merge::{read_record, RunMerger};
use crate::counter::scratch::remove_scratch_file;
use crate::error::{Result, Stage, UniquenessError};
use crate::fingerprint::{bucket_stem, compare_fingerprints, fingerprints_equal};
use crate::metrics::UniquenessResult;

/// Growable fingerprint buffer bounded by a record and byte budget
///
/// Records are stored back to back in one byte vector and addressed by
/// `(start, end)` spans, so sorting moves spans rather than records.
#[derive(Debug)]
pub struct RecordBuffer {
    data: Vec<u8>,
    spans: Vec<(usize, usize)>,
    max_records: usize,
    max_bytes: usize,
}

impl RecordBuffer {
    /// Create a buffer holding at most `max_records` records and, unless
    /// `max_bytes` is 0, at most about `max_bytes` record bytes
    pub fn new(max_records: usize, max_bytes: usize) -> Self {
        Self {
            data: Vec::new(),
            spans: Vec::new(),
            max_records: max_records.max(1),
            max_bytes,
        }
    }

    /// Reserve room for `num_records` records, capped at the record budget
    pub fn reserve_records(&mut self, num_records: usize) {
        self.spans.reserve(num_records.min(self.max_records));
    }

    /// Whether the budget is used up
    ///
    /// An empty buffer is never full, so every record fits on its own.
    pub fn is_full(&self) -> bool {
        self.spans.len() >= self.max_records
            || (self.max_bytes > 0 && !self.spans.is_empty() && self.data.len() >= self.max_bytes)
    }

    /// Append one record
    pub fn push(&mut self, record: &[u8]) {
        let start = self.data.len();
        self.data.extend_from_slice(record);
        self.spans.push((start, self.data.len()));
    }

    /// Number of buffered records
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Whether the buffer holds no records
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Drop all records, keeping the allocations
    pub fn clear(&mut self) {
        self.data.clear();
        self.spans.clear();
    }

    /// Sort records in case-insensitive order
    pub fn sort(&mut self) {
        let data = &self.data;
        self.spans
            .par_sort_unstable_by(|a, b| compare_fingerprints(&data[a.0..a.1], &data[b.0..b.1]));
    }

    /// Records in buffer order
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.spans.iter().map(move |&(start, end)| &self.data[start..end])
    }
}

/// Count total and distinct records of an already sorted sequence
///
/// A record is distinct when it differs, ignoring case, from the one before.
pub fn count_sorted<'a, I>(records: I) -> UniquenessResult
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut result = UniquenessResult::default();
    let mut prev: Option<&[u8]> = None;
    for record in records {
        result.total_reads += 1;
        if !prev.is_some_and(|p| fingerprints_equal(p, record)) {
            result.unique_reads += 1;
        }
        prev = Some(record);
    }
    result
}

/// Spills sorted runs of one bucket and merges them
///
/// Run files are removed after merging, and on drop if merging never
/// happened.
pub struct ExternalSorter {
    dir: PathBuf,
    stem: String,
    runs: Vec<PathBuf>,
    verbose: bool,
}

impl ExternalSorter {
    /// Create a sorter whose runs live next to `bucket_path`
    pub fn new(bucket_path: &Path, key: &[u8], verbose: bool) -> Self {
        let dir = bucket_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            dir,
            stem: bucket_stem(key),
            runs: Vec::new(),
            verbose,
        }
    }

    fn run_path(&self, id: usize) -> PathBuf {
        self.dir
            .join(format!("{}.run_{}.{}", self.stem, id, RUN_EXTENSION))
    }

    /// Sort a buffer and flush it to a new run file, then clear it
    pub fn sort_and_flush(&mut self, buffer: &mut RecordBuffer) -> Result<()> {
        buffer.sort();

        let path = self.run_path(self.runs.len());
        if self.verbose {
            debug!("Flushing {} records to {:?}", buffer.len(), path);
        }

        // Registered before writing so a failed run is still cleaned up
        self.runs.push(path.clone());

        let file = File::create(&path).map_err(|e| UniquenessError::io(Stage::Sorting, &path, e))?;
        let mut writer = BufWriter::with_capacity(RUN_WRITER_CAPACITY, file);
        let written: io::Result<()> = buffer
            .iter()
            .try_for_each(|record| writer.write_all(record).and_then(|_| writer.write_all(b"\n")))
            .and_then(|_| writer.flush());
        written.map_err(|e| UniquenessError::io(Stage::Sorting, &path, e))?;

        buffer.clear();
        Ok(())
    }

    /// Number of runs spilled so far
    pub fn num_runs(&self) -> usize {
        self.runs.len()
    }

    /// Merge all runs and count, removing the run files afterwards
    pub fn merge(&mut self) -> Result<UniquenessResult> {
        let result = RunMerger::open(&self.runs).and_then(|merger| {
            if self.verbose {
                debug!(
                    "Merging {} runs of '{}', {} non-empty",
                    self.runs.len(),
                    self.stem,
                    merger.num_active()
                );
            }
            merger.count()
        });
        self.remove_runs();
        result
    }

    fn remove_runs(&mut self) {
        for path in self.runs.drain(..) {
            remove_scratch_file(&path);
        }
    }
}

impl Drop for ExternalSorter {
    fn drop(&mut self) {
        self.remove_runs();
    }
}

/// Count one bucket within a record/byte budget
///
/// Uses the in-memory path when the bucket fits, spill and merge otherwise.
///
/// # Errors
/// - `Io` with stage `Sorting` if the bucket cannot be read, a run cannot be
///   written, or the bucket holds a different number of records than were
///   routed into it
/// - `Io` with stage `Merging` if a run cannot be read back
pub fn count_bucket(
    bucket: &BucketFile,
    max_records: usize,
    max_bytes: usize,
    verbose: bool,
) -> Result<UniquenessResult> {
    let path = &bucket.path;
    let file = File::open(path).map_err(|e| UniquenessError::io(Stage::Sorting, path, e))?;
    let mut reader = BufReader::with_capacity(READER_CAPACITY, file);

    let mut buffer = RecordBuffer::new(max_records, max_bytes);
    buffer.reserve_records(usize::try_from(bucket.num_records).unwrap_or(usize::MAX));
    let mut sorter = ExternalSorter::new(path, &bucket.key, verbose);
    let mut line = Vec::new();
    let mut num_read: u64 = 0;

    while read_record(&mut reader, &mut line)
        .map_err(|e| UniquenessError::io(Stage::Sorting, path, e))?
    {
        if buffer.is_full() {
            sorter.sort_and_flush(&mut buffer)?;
        }
        buffer.push(&line);
        num_read += 1;
    }
    drop(reader);

    if num_read != bucket.num_records {
        return Err(UniquenessError::io(
            Stage::Sorting,
            path,
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "bucket holds {} records, {} were routed into it",
                    num_read, bucket.num_records
                ),
            ),
        ));
    }

    if sorter.num_runs() == 0 {
        buffer.sort();
        return Ok(count_sorted(buffer.iter()));
    }

    if !buffer.is_empty() {
        sorter.sort_and_flush(&mut buffer)?;
    }
    // Release the buffer before the merge opens its readers
    drop(buffer);

    if verbose {
        debug!(
            "Bucket '{}': {} records spilled into {} runs",
            bucket.key_str(),
            num_read,
            sorter.num_runs()
        );
    }
    sorter.merge()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_bucket(dir: &Path, key: &str, records: &[&str]) -> BucketFile {
        let path = dir.join(format!("{}.seq", key));
        let mut contents = String::new();
        for r in records {
            contents.push_str(r);
            contents.push('\n');
        }
        fs::write(&path, contents).unwrap();
        BucketFile {
            key: key.as_bytes().to_vec(),
            path,
            num_records: records.len() as u64,
        }
    }

    #[test]
    fn test_record_buffer_sort() {
        let mut buffer = RecordBuffer::new(10, 0);
        for r in ["CCC", "aaa", "BBB", "AAA"] {
            buffer.push(r.as_bytes());
        }
        buffer.sort();
        let sorted: Vec<&[u8]> = buffer.iter().collect();
        assert!(fingerprints_equal(sorted[0], b"AAA"));
        assert!(fingerprints_equal(sorted[1], b"AAA"));
        assert_eq!(sorted[2], b"BBB");
        assert_eq!(sorted[3], b"CCC");
    }

    #[test]
    fn test_record_buffer_budget() {
        let mut buffer = RecordBuffer::new(2, 0);
        assert!(!buffer.is_full());
        buffer.push(b"A");
        buffer.push(b"B");
        assert!(buffer.is_full());
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());

        // Byte budget
        let mut buffer = RecordBuffer::new(100, 8);
        buffer.push(b"ACGT");
        assert!(!buffer.is_full());
        buffer.push(b"ACGT");
        assert!(buffer.is_full());

        // A single oversized record still fits an empty buffer
        let mut buffer = RecordBuffer::new(100, 2);
        assert!(!buffer.is_full());
        buffer.push(b"ACGTACGT");
        assert!(buffer.is_full());
    }

    #[test]
    fn test_count_sorted() {
        let records: Vec<&[u8]> = ["AAAAA", "aaaaa", "BBBBB", "CCCCC", "CCCCC"]
            .iter()
            .map(|s| s.as_bytes())
            .collect();
        assert_eq!(count_sorted(records), UniquenessResult::new(5, 3));
        assert_eq!(count_sorted(Vec::<&[u8]>::new()), UniquenessResult::default());
    }

    #[test]
    fn test_count_bucket_in_memory() {
        let tmp = TempDir::new().unwrap();
        let bucket = write_bucket(tmp.path(), "AA", &["AAAAA", "AAAAA", "AAccc", "AACCC"]);
        let result = count_bucket(&bucket, 100, 0, false).unwrap();
        assert_eq!(result, UniquenessResult::new(4, 2));
        // No runs were written
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_count_bucket_exactly_at_budget_stays_in_memory() {
        let tmp = TempDir::new().unwrap();
        let bucket = write_bucket(tmp.path(), "AC", &["ACA", "ACC", "ACG"]);
        let result = count_bucket(&bucket, 3, 0, false).unwrap();
        assert_eq!(result, UniquenessResult::new(3, 3));
    }

    #[test]
    fn test_count_bucket_spills_and_merges() {
        let tmp = TempDir::new().unwrap();
        let records = ["ACGTT", "ACGAA", "acgtt", "ACGCC", "ACGAA", "ACGGG", "ACGTT"];
        let bucket = write_bucket(tmp.path(), "ACG", &records);

        for budget in 1..=records.len() {
            let result = count_bucket(&bucket, budget, 0, true).unwrap();
            assert_eq!(result, UniquenessResult::new(7, 4), "budget {}", budget);
        }
        // Run files are gone, only the bucket remains
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_count_bucket_byte_budget() {
        let tmp = TempDir::new().unwrap();
        let bucket = write_bucket(tmp.path(), "GG", &["GGAA", "GGCC", "GGAA", "ggcc", "GGTT"]);
        let result = count_bucket(&bucket, 100, 5, false).unwrap();
        assert_eq!(result, UniquenessResult::new(5, 3));
    }

    #[test]
    fn test_sorter_runs_are_sorted_files() {
        let tmp = TempDir::new().unwrap();
        let bucket_path = tmp.path().join("TT.seq");
        let mut sorter = ExternalSorter::new(&bucket_path, b"TT", false);

        let mut buffer = RecordBuffer::new(10, 0);
        for r in ["TTG", "TTA", "TTC"] {
            buffer.push(r.as_bytes());
        }
        sorter.sort_and_flush(&mut buffer).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(sorter.num_runs(), 1);

        let run = sorter.run_path(0);
        assert!(run.ends_with("TT.run_0.tmp"));
        assert_eq!(fs::read_to_string(&run).unwrap(), "TTA\nTTC\nTTG\n");

        drop(sorter);
        assert!(!run.exists());
    }

    #[test]
    fn test_count_bucket_missing_file() {
        let tmp = TempDir::new().unwrap();
        let bucket = BucketFile {
            key: b"AA".to_vec(),
            path: tmp.path().join("AA.seq"),
            num_records: 1,
        };
        let err = count_bucket(&bucket, 10, 0, false).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Sorting));
        assert!(err.to_string().contains("AA.seq"));
    }

    #[test]
    fn test_count_bucket_record_mismatch() {
        let tmp = TempDir::new().unwrap();
        let mut bucket = write_bucket(tmp.path(), "CC", &["CCA", "CCB"]);
        bucket.num_records = 3;
        let err = count_bucket(&bucket, 10, 0, false).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Sorting));
    }
}
