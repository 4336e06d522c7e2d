//! Fingerprint ordering and construction
//!
//! A fingerprint is an opaque byte string. Two fingerprints that differ
//! only in ASCII letter case are the same fingerprint, so both ordering
//! and bucket keys work on case-folded bytes.

use std::cmp::Ordering;

use crate::error::{Result, UniquenessError};

/// Compare two fingerprints lexicographically, ignoring ASCII case
#[inline]
pub fn compare_fingerprints(a: &[u8], b: &[u8]) -> Ordering {
    a.iter()
        .map(u8::to_ascii_uppercase)
        .cmp(b.iter().map(u8::to_ascii_uppercase))
}

/// Check two fingerprints for equality, ignoring ASCII case
#[inline]
pub fn fingerprints_equal(a: &[u8], b: &[u8]) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Case-folded bucket key of a fingerprint
///
/// # Errors
/// Returns `FingerprintTooShort` if the fingerprint is shorter than
/// `prefix_length`; short fingerprints are never padded or truncated.
pub fn prefix_key(fingerprint: &[u8], prefix_length: usize, index: u64) -> Result<Vec<u8>> {
    if fingerprint.len() < prefix_length {
        return Err(UniquenessError::FingerprintTooShort {
            index,
            len: fingerprint.len(),
            prefix_length,
        });
    }
    Ok(fingerprint[..prefix_length].to_ascii_uppercase())
}

/// Reject fingerprints that cannot be stored as a single line
pub fn validate_fingerprint(fingerprint: &[u8], index: u64) -> Result<()> {
    if fingerprint.iter().any(|&b| b == b'\n' || b == b'\r') {
        return Err(UniquenessError::InvalidFingerprint { index });
    }
    Ok(())
}

/// File stem for a bucket key
///
/// Plain ASCII alphanumeric keys are used as-is; anything else is
/// hex-encoded with an `x` marker so the name is always a valid file name.
pub fn bucket_stem(key: &[u8]) -> String {
    if !key.is_empty() && key.iter().all(u8::is_ascii_alphanumeric) {
        key.iter().map(|&b| b as char).collect()
    } else {
        let mut stem = String::with_capacity(1 + 2 * key.len());
        stem.push('x');
        for b in key {
            stem.push_str(&format!("{:02x}", b));
        }
        stem
    }
}

/// Build the fingerprint of a read pair
///
/// Takes the first `seed_length` bases of read 1 and, if read 2 is
/// present and non-empty, appends its first `seed_length` bases.
///
/// # Errors
/// Returns `ReadTooShort` if a used mate is shorter than `seed_length`.
pub fn read_pair_fingerprint(
    read1: &[u8],
    read2: Option<&[u8]>,
    seed_length: usize,
) -> Result<Vec<u8>> {
    if read1.len() < seed_length {
        return Err(UniquenessError::ReadTooShort {
            mate: 1,
            len: read1.len(),
            seed_length,
        });
    }

    let mut fingerprint = Vec::with_capacity(2 * seed_length);
    fingerprint.extend_from_slice(&read1[..seed_length]);

    if let Some(read2) = read2.filter(|r| !r.is_empty()) {
        if read2.len() < seed_length {
            return Err(UniquenessError::ReadTooShort {
                mate: 2,
                len: read2.len(),
                seed_length,
            });
        }
        fingerprint.extend_from_slice(&read2[..seed_length]);
    }

    Ok(fingerprint)
}
