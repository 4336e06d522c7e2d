//! Bucket routing
//!
//! Splits the fingerprint stream into on-disk buckets keyed by a
//! fixed-length, case-folded prefix. Each bucket is later sorted and
//! counted on its own.
//!
//! The router owns every open writer for the duration of routing.
//! [`BucketRouter::finish`] consumes it, flushes and closes all writers,
//! and hands back closed [`BucketFile`]s for the counting phase.

use std::collections::hash_map::Entry;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use ahash::AHashMap;
use tracing::{debug, info};

use crate::constants::{BUCKET_EXTENSION, BUCKET_WRITER_CAPACITY};
use crate::counter::scratch::ScratchSpace;
use crate::error::{Result, Stage, UniquenessError};
use crate::fingerprint::{bucket_stem, prefix_key, validate_fingerprint};

/// A closed bucket file ready for counting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketFile {
    /// Case-folded prefix shared by every fingerprint in the bucket
    pub key: Vec<u8>,
    /// Location of the newline-delimited bucket file
    pub path: PathBuf,
    /// Number of fingerprints written to the bucket
    pub num_records: u64,
}

impl BucketFile {
    /// Printable form of the bucket key
    pub fn key_str(&self) -> String {
        String::from_utf8_lossy(&self.key).into_owned()
    }
}

/// Open writer of one bucket
struct BucketWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    num_records: u64,
}

impl BucketWriter {
    fn create(path: PathBuf) -> Result<Self> {
        let file = File::create(&path).map_err(|e| UniquenessError::io(Stage::Routing, &path, e))?;
        Ok(Self {
            path,
            writer: BufWriter::with_capacity(BUCKET_WRITER_CAPACITY, file),
            num_records: 0,
        })
    }

    fn append(&mut self, fingerprint: &[u8]) -> Result<()> {
        self.writer
            .write_all(fingerprint)
            .and_then(|_| self.writer.write_all(b"\n"))
            .map_err(|e| UniquenessError::io(Stage::Routing, &self.path, e))?;
        self.num_records += 1;
        Ok(())
    }

    /// Flush and close, surfacing errors that a plain drop would swallow
    fn close(self, key: Vec<u8>) -> Result<BucketFile> {
        let Self { path, writer, num_records } = self;
        let file = writer
            .into_inner()
            .map_err(|e| UniquenessError::io(Stage::Routing, &path, e.into_error()))?;
        file.sync_data().map_err(|e| UniquenessError::io(Stage::Routing, &path, e))?;
        drop(file);
        Ok(BucketFile { key, path, num_records })
    }
}

/// Routes fingerprints into bucket files by prefix
pub struct BucketRouter {
    dir: PathBuf,
    prefix_length: usize,
    max_open_buckets: usize,
    writers: AHashMap<Vec<u8>, BucketWriter>,
    num_routed: u64,
}

impl BucketRouter {
    /// Create a router writing into the scratch directory
    pub fn new(scratch: &ScratchSpace, prefix_length: usize, max_open_buckets: usize) -> Self {
        Self {
            dir: scratch.path().to_path_buf(),
            prefix_length,
            max_open_buckets,
            writers: AHashMap::new(),
            num_routed: 0,
        }
    }

    /// Append one fingerprint to the bucket of its prefix
    ///
    /// The bucket file and its writer are created on first use of a key.
    ///
    /// # Errors
    /// - `FingerprintTooShort` / `InvalidFingerprint` for malformed input
    /// - `TooManyBuckets` when a new key would exceed the writer limit
    /// - `Io` if the bucket file cannot be created or written
    pub fn route(&mut self, fingerprint: &[u8]) -> Result<()> {
        let index = self.num_routed;
        validate_fingerprint(fingerprint, index)?;
        let key = prefix_key(fingerprint, self.prefix_length, index)?;

        let num_open = self.writers.len();
        let writer = match self.writers.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                if num_open >= self.max_open_buckets {
                    return Err(UniquenessError::TooManyBuckets {
                        limit: self.max_open_buckets,
                        key: String::from_utf8_lossy(entry.key()).into_owned(),
                    });
                }
                let path = self
                    .dir
                    .join(format!("{}.{}", bucket_stem(entry.key()), BUCKET_EXTENSION));
                debug!("Opening bucket {:?}", path);
                entry.insert(BucketWriter::create(path)?)
            }
        };

        writer.append(fingerprint)?;
        self.num_routed += 1;
        Ok(())
    }

    /// Number of fingerprints routed so far
    pub fn num_routed(&self) -> u64 {
        self.num_routed
    }

    /// Number of buckets opened so far
    pub fn num_buckets(&self) -> usize {
        self.writers.len()
    }

    /// Close every writer and hand the buckets over, sorted by key
    pub fn finish(self) -> Result<Vec<BucketFile>> {
        let mut buckets = self
            .writers
            .into_iter()
            .map(|(key, writer)| writer.close(key))
            .collect::<Result<Vec<_>>>()?;
        buckets.sort_unstable_by(|a, b| a.key.cmp(&b.key));

        info!(
            "Routed {} fingerprints into {} buckets",
            self.num_routed,
            buckets.len()
        );
        Ok(buckets)
    }
}
