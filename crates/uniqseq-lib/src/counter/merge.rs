//! K-way merge of sorted runs
//!
//! Merges the sorted run files of one bucket into a single globally sorted
//! stream and counts duplicates on the fly. The frontier is a binary heap
//! holding exactly one pending record per run that is not yet exhausted,
//! so memory is O(k) records for k runs regardless of run length.
//!
//! Equal records from different runs are popped in ascending run order.
//! Counting does not depend on that order: every popped record adds to the
//! total and only the first of an equal streak adds to the unique count.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::constants::READER_CAPACITY;
use crate::error::{Result, Stage, UniquenessError};
use crate::fingerprint::{compare_fingerprints, fingerprints_equal};
use crate::metrics::UniquenessResult;

/// Read one newline-terminated record into `buf`, without the line ending
///
/// Returns `false` at end of input.
pub(crate) fn read_record<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(false);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(true)
}

/// Sequential reader over one run file
struct RunReader {
    path: PathBuf,
    reader: BufReader<File>,
}

impl RunReader {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| UniquenessError::io(Stage::Merging, path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::with_capacity(READER_CAPACITY, file),
        })
    }

    fn next_into(&mut self, buf: &mut Vec<u8>) -> Result<bool> {
        read_record(&mut self.reader, buf)
            .map_err(|e| UniquenessError::io(Stage::Merging, &self.path, e))
    }
}

/// Pending record of one run
#[derive(Debug)]
struct FrontierEntry {
    record: Vec<u8>,
    run: usize,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierEntry {}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap
        compare_fingerprints(&other.record, &self.record).then_with(|| other.run.cmp(&self.run))
    }
}

/// K-way merger over the sorted runs of one bucket
pub struct RunMerger {
    readers: Vec<RunReader>,
    frontier: BinaryHeap<FrontierEntry>,
}

impl RunMerger {
    /// Open every run and seed the frontier with its first record
    ///
    /// Empty runs contribute no frontier entry.
    pub fn open(paths: &[PathBuf]) -> Result<Self> {
        let mut readers = Vec::with_capacity(paths.len());
        let mut frontier = BinaryHeap::with_capacity(paths.len());

        for (run, path) in paths.iter().enumerate() {
            let mut reader = RunReader::open(path)?;
            let mut record = Vec::new();
            if reader.next_into(&mut record)? {
                frontier.push(FrontierEntry { record, run });
            }
            readers.push(reader);
        }

        debug!(
            "Merging {} runs ({} non-empty)",
            readers.len(),
            frontier.len()
        );
        Ok(Self { readers, frontier })
    }

    /// Number of runs that still have pending records
    pub fn num_active(&self) -> usize {
        self.frontier.len()
    }

    /// Pop the smallest pending record and refill from its run
    ///
    /// `spare` is reused as the buffer for the refill.
    fn pop(&mut self, mut spare: Vec<u8>) -> Result<Option<(Vec<u8>, usize)>> {
        let Some(FrontierEntry { record, run }) = self.frontier.pop() else {
            return Ok(None);
        };
        if self.readers[run].next_into(&mut spare)? {
            self.frontier.push(FrontierEntry { record: spare, run });
        }
        Ok(Some((record, run)))
    }

    /// Drain all runs, counting total and distinct records
    ///
    /// # Errors
    /// Returns an `InvalidData` I/O error naming the run if a run is not
    /// sorted, since its counts would be wrong.
    pub fn count(mut self) -> Result<UniquenessResult> {
        let mut result = UniquenessResult::default();
        let mut prev: Option<Vec<u8>> = None;
        let mut spare = Vec::new();

        while let Some((record, run)) = self.pop(spare)? {
            result.total_reads += 1;
            match prev.as_deref() {
                Some(p) if fingerprints_equal(p, &record) => {}
                Some(p) if compare_fingerprints(p, &record) == Ordering::Greater => {
                    return Err(UniquenessError::io(
                        Stage::Merging,
                        &self.readers[run].path,
                        io::Error::new(io::ErrorKind::InvalidData, "run file is not sorted"),
                    ));
                }
                _ => result.unique_reads += 1,
            }
            spare = prev.replace(record).unwrap_or_default();
        }

        Ok(result)
    }
}
