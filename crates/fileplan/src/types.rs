//! Shared identifiers and the file metadata snapshot consumed by the matcher.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::query::extension_of_name;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identity of a stored pattern.
    PatternId
);
string_id!(
    /// Identity of a rule owned by the orchestration layer.
    RuleId
);
string_id!(
    /// Identity of a ruleset owned by the orchestration layer.
    RulesetId
);

impl PatternId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Read-only metadata snapshot of one filesystem entry.
///
/// Records are produced by the walker collaborator and never mutated by the
/// engine. Timestamps are local wall-clock times so that calendar-day
/// predicates (`today`, `yesterday`) line up with what the user sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub name: String,
    /// Lowercase extension without the leading dot.
    pub extension: Option<String>,
    pub size: u64,
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
    pub accessed: Option<NaiveDateTime>,
    pub is_hidden: bool,
    pub is_dir: bool,
    pub mime_type: Option<String>,
    pub checksum: Option<String>,
}

impl FileRecord {
    /// Builds a file record with name-derived fields filled in.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|value| value.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = extension_of_name(&name);
        let is_hidden = name.starts_with('.');
        let mime_type = extension.as_ref().and_then(|_| {
            mime_guess::from_path(&path)
                .first()
                .map(|mime| mime.essence_str().to_string())
        });
        Self {
            path,
            name,
            extension,
            size: 0,
            created: None,
            modified: None,
            accessed: None,
            is_hidden,
            is_dir: false,
            mime_type,
            checksum: None,
        }
    }

    pub fn file(path: impl Into<PathBuf>, size: u64) -> Self {
        Self::new(path).with_size(size)
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        let mut record = Self::new(path);
        record.is_dir = true;
        record.extension = None;
        record.mime_type = None;
        record
    }

    /// Reads metadata for `path` without opening the file.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::symlink_metadata(path)?;
        let mut record = if metadata.is_dir() {
            Self::directory(path)
        } else {
            Self::file(path, metadata.len())
        };
        record.created = metadata.created().ok().map(local_naive);
        record.modified = metadata.modified().ok().map(local_naive);
        record.accessed = metadata.accessed().ok().map(local_naive);
        Ok(record)
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_modified(mut self, modified: NaiveDateTime) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_created(mut self, created: NaiveDateTime) -> Self {
        self.created = Some(created);
        self
    }

    pub fn with_accessed(mut self, accessed: NaiveDateTime) -> Self {
        self.accessed = Some(accessed);
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn hidden(mut self, is_hidden: bool) -> Self {
        self.is_hidden = is_hidden;
        self
    }

    /// File name without its final extension.
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(0) | None => self.name.as_str(),
            Some(split) if split + 1 < self.name.len() => &self.name[..split],
            Some(_) => self.name.as_str(),
        }
    }

    pub fn parent(&self) -> Option<&Path> {
        self.path.parent()
    }
}

/// Converts a filesystem timestamp to local wall-clock time.
pub fn local_naive(time: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(time).naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_derives_name_fields() {
        let record = FileRecord::file("/photos/Holiday.JPG", 12);
        assert_eq!(record.name, "Holiday.JPG");
        assert_eq!(record.extension.as_deref(), Some("jpg"));
        assert_eq!(record.stem(), "Holiday");
        assert_eq!(record.mime_type.as_deref(), Some("image/jpeg"));
        assert!(!record.is_hidden);
    }

    #[test]
    fn dotfiles_are_hidden_and_keep_their_stem() {
        let record = FileRecord::file("/home/me/.bashrc", 1);
        assert!(record.is_hidden);
        assert_eq!(record.stem(), ".bashrc");
    }

    #[test]
    fn directories_have_no_extension() {
        let record = FileRecord::directory("/archive/2024.old");
        assert!(record.is_dir);
        assert_eq!(record.extension, None);
    }

    #[test]
    fn from_path_reads_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"hello").unwrap();

        let record = FileRecord::from_path(&path).unwrap();
        assert_eq!(record.size, 5);
        assert!(record.modified.is_some());
        assert!(!record.is_dir);
    }
}
