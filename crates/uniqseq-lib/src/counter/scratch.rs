//! Per-computation scratch directory
//!
//! All bucket and run files of one computation live in a single directory
//! that is removed when the [`ScratchSpace`] is dropped, whichever way the
//! computation ends.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::constants::SCRATCH_DIR_PREFIX;
use crate::error::{Result, Stage, UniquenessError};

/// Owner of the scratch directory for one computation
#[derive(Debug)]
pub struct ScratchSpace {
    dir: PathBuf,
}

impl ScratchSpace {
    /// Create a fresh scratch directory under `parent`
    pub fn new(parent: impl AsRef<Path>) -> Result<Self> {
        let parent = parent.as_ref();
        fs::create_dir_all(parent).map_err(|e| UniquenessError::io(Stage::Setup, parent, e))?;

        // Run identifier from timestamp and pid; retry on collision
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let base = nanos ^ ((std::process::id() as u64) << 32);

        for attempt in 0..64u64 {
            let name = format!("{}{:x}", SCRATCH_DIR_PREFIX, base.wrapping_add(attempt));
            let dir = parent.join(name);
            match fs::create_dir(&dir) {
                Ok(()) => {
                    debug!("Created scratch directory {:?}", dir);
                    return Ok(Self { dir });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(UniquenessError::io(Stage::Setup, &dir, e)),
            }
        }

        Err(UniquenessError::io(
            Stage::Setup,
            parent,
            io::Error::new(io::ErrorKind::AlreadyExists, "no free scratch directory name"),
        ))
    }

    /// Path of the scratch directory
    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("{}", UniquenessError::io(Stage::Cleanup, &self.dir, e));
            }
        }
    }
}

/// Remove a scratch file, logging instead of failing
///
/// Used after a file's counts are extracted; the directory sweep on drop
/// catches anything left behind.
pub fn remove_scratch_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("{}", UniquenessError::io(Stage::Cleanup, path, e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scratch_created_and_removed() {
        let tmp = TempDir::new().unwrap();
        let path = {
            let scratch = ScratchSpace::new(tmp.path()).unwrap();
            assert!(scratch.path().is_dir());
            fs::write(scratch.path().join("AAAAA.seq"), b"AAAAA\n").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_two_scratch_spaces_are_distinct() {
        let tmp = TempDir::new().unwrap();
        let a = ScratchSpace::new(tmp.path()).unwrap();
        let b = ScratchSpace::new(tmp.path()).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_scratch_creates_parent() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("a").join("b");
        let scratch = ScratchSpace::new(&nested).unwrap();
        assert!(scratch.path().starts_with(&nested));
    }

    #[test]
    fn test_remove_missing_file_is_quiet() {
        let tmp = TempDir::new().unwrap();
        remove_scratch_file(&tmp.path().join("missing.seq"));
    }
}
