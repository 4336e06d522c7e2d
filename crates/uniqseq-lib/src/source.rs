//! Fingerprint sources
//!
//! Feeds fingerprints to the counter from files:
//! - plain text, one fingerprint per line
//! - FASTA/FASTQ reads or read pairs (gzip handled by needletail), from
//!   which read-pair fingerprints are built

use anyhow::{bail, Context, Result};
use needletail::parse_fastx_file;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Call `callback` for every fingerprint of a newline-delimited text file
///
/// Blank lines are skipped and `\r\n` line endings are accepted. A path of
/// `-` reads standard input.
///
/// # Returns
/// Number of fingerprints passed to `callback`
pub fn for_each_fingerprint_line<P, F>(path: P, mut callback: F) -> Result<u64>
where
    P: AsRef<Path>,
    F: FnMut(&[u8]) -> Result<()>,
{
    let path = path.as_ref();
    let mut reader: Box<dyn BufRead> = if path == Path::new("-") {
        Box::new(io::stdin().lock())
    } else {
        let file = File::open(path)
            .with_context(|| format!("Failed to open fingerprint file: {}", path.display()))?;
        Box::new(BufReader::new(file))
    };

    let mut line = Vec::new();
    let mut count = 0u64;
    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        while matches!(line.last(), Some(b'\n') | Some(b'\r')) {
            line.pop();
        }
        if line.is_empty() {
            continue;
        }
        callback(&line)?;
        count += 1;
    }

    Ok(count)
}

/// Call `callback` for every read (single-end) or read pair (paired-end)
///
/// Mates are read in lockstep; the two files must hold the same number of
/// records.
///
/// # Returns
/// Number of reads or pairs passed to `callback`
pub fn for_each_read_pair<P, Q, F>(read1: P, read2: Option<Q>, mut callback: F) -> Result<u64>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    F: FnMut(&[u8], Option<&[u8]>) -> Result<()>,
{
    let path1 = read1.as_ref();
    let mut reader1 = parse_fastx_file(path1)
        .with_context(|| format!("Failed to open sequence file: {}", path1.display()))?;

    let Some(read2) = read2 else {
        let mut count = 0u64;
        while let Some(record) = reader1.next() {
            let record = record.with_context(|| {
                format!("Failed to parse sequence record in {}", path1.display())
            })?;
            callback(&*record.seq(), None)?;
            count += 1;
        }
        return Ok(count);
    };

    let path2 = read2.as_ref();
    let mut reader2 = parse_fastx_file(path2)
        .with_context(|| format!("Failed to open sequence file: {}", path2.display()))?;

    let mut count = 0u64;
    loop {
        match (reader1.next(), reader2.next()) {
            (None, None) => break,
            (Some(r1), Some(r2)) => {
                let r1 = r1.with_context(|| {
                    format!("Failed to parse sequence record in {}", path1.display())
                })?;
                let r2 = r2.with_context(|| {
                    format!("Failed to parse sequence record in {}", path2.display())
                })?;
                callback(&*r1.seq(), Some(&*r2.seq()))?;
                count += 1;
            }
            (Some(_), None) => bail!(
                "{} has more records than {} ({} pairs read)",
                path1.display(),
                path2.display(),
                count
            ),
            (None, Some(_)) => bail!(
                "{} has more records than {} ({} pairs read)",
                path2.display(),
                path1.display(),
                count
            ),
        }
    }

    Ok(count)
}
