//! Filesystem view used by conflict detection and the strategies that touch
//! disk (backup, rename probing).

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

const CHECKSUM_BUFFER_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Missing,
    File,
    Directory,
}

impl EntryKind {
    pub fn exists(self) -> bool {
        self != Self::Missing
    }
}

pub trait TargetFs: Send + Sync {
    fn entry_kind(&self, path: &Path) -> EntryKind;

    /// Hex SHA-256 of a regular file; `None` for anything else.
    fn checksum(&self, path: &Path) -> Option<String>;

    /// Whether a write at `path` would be permitted.
    fn is_writable(&self, path: &Path) -> bool;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// [`TargetFs`] over `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdTargetFs;

impl TargetFs for StdTargetFs {
    fn entry_kind(&self, path: &Path) -> EntryKind {
        match fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => EntryKind::Directory,
            Ok(_) => EntryKind::File,
            Err(_) => EntryKind::Missing,
        }
    }

    fn checksum(&self, path: &Path) -> Option<String> {
        match sha256_file(path) {
            Ok(digest) => Some(digest),
            Err(error) => {
                tracing::trace!(path = %path.display(), %error, "checksum unavailable");
                None
            }
        }
    }

    // Checks the target itself when it exists, otherwise the nearest existing
    // ancestor the target would be created under.
    fn is_writable(&self, path: &Path) -> bool {
        let mut current = Some(path);
        while let Some(candidate) = current {
            if let Ok(metadata) = fs::metadata(candidate) {
                return !metadata.permissions().readonly();
            }
            current = candidate.parent();
        }
        false
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    if !file.metadata()?.is_file() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a file"));
    }
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHECKSUM_BUFFER_BYTES];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn entry_kinds() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "hello").unwrap();

        let target = StdTargetFs;
        assert_eq!(target.entry_kind(dir.path()), EntryKind::Directory);
        assert_eq!(target.entry_kind(&file), EntryKind::File);
        assert_eq!(target.entry_kind(&dir.path().join("b")), EntryKind::Missing);
    }

    #[test]
    fn checksum_is_hex_sha256() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "hello").unwrap();

        let target = StdTargetFs;
        assert_eq!(
            target.checksum(&file).as_deref(),
            Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
        );
        assert_eq!(target.checksum(dir.path()), None);
    }

    #[test]
    fn missing_targets_inherit_parent_writability() {
        let dir = tempdir().unwrap();
        let target = StdTargetFs;
        assert!(target.is_writable(&dir.path().join("new/deeper/file.txt")));
    }
}
