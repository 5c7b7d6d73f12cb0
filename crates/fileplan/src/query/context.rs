//! Per-record evaluation context.

use std::borrow::Cow;

use chrono::{NaiveDate, NaiveDateTime};

use crate::types::FileRecord;

use super::field::Field;
use super::path::{normalize_path_for_compare, path_string};

/// Query context for one [`FileRecord`].
///
/// Text fields are precomputed once per record and lowercased when the query
/// is case-insensitive, matching the lowercased operands of the query.
pub struct RecordContext<'a> {
    record: &'a FileRecord,
    name: Cow<'a, str>,
    stem: Cow<'a, str>,
    path: String,
    parent: String,
    mime_type: Option<Cow<'a, str>>,
    checksum: Option<Cow<'a, str>>,
    now: NaiveDateTime,
    case_sensitive: bool,
}

impl<'a> RecordContext<'a> {
    pub fn new(record: &'a FileRecord, now: NaiveDateTime, case_sensitive: bool) -> Self {
        let fold = |value: &'a str| -> Cow<'a, str> {
            if case_sensitive {
                Cow::Borrowed(value)
            } else {
                Cow::Owned(value.to_lowercase())
            }
        };
        let mut path = path_string(&record.path);
        let mut parent = record
            .parent()
            .map(path_string)
            .unwrap_or_else(|| normalize_path_for_compare(""));
        if !case_sensitive {
            path = path.to_lowercase();
            parent = parent.to_lowercase();
        }

        Self {
            record,
            name: fold(record.name.as_str()),
            stem: fold(record.stem()),
            path,
            parent,
            mime_type: record.mime_type.as_deref().map(fold),
            checksum: record.checksum.as_deref().map(fold),
            now,
            case_sensitive,
        }
    }

    pub fn record(&self) -> &'a FileRecord {
        self.record
    }

    /// Text value of a text-typed field, `None` when the record lacks it.
    pub fn text(&self, field: Field) -> Option<&str> {
        match field {
            Field::Name => Some(self.name.as_ref()),
            Field::Stem => Some(self.stem.as_ref()),
            Field::Extension => self.record.extension.as_deref(),
            Field::Path => Some(self.path.as_str()),
            Field::Parent => Some(self.parent.as_str()),
            Field::MimeType => self.mime_type.as_deref(),
            Field::Checksum => self.checksum.as_deref(),
            _ => None,
        }
    }

    pub fn timestamp(&self, field: Field) -> Option<NaiveDateTime> {
        match field {
            Field::Created => self.record.created,
            Field::Modified => self.record.modified,
            Field::Accessed => self.record.accessed,
            _ => None,
        }
    }

    pub fn flag(&self, field: Field) -> Option<bool> {
        match field {
            Field::Hidden => Some(self.record.is_hidden),
            Field::IsDir => Some(self.record.is_dir),
            _ => None,
        }
    }

    pub fn size(&self) -> u64 {
        self.record.size
    }

    pub fn is_dir(&self) -> bool {
        self.record.is_dir
    }

    pub fn now(&self) -> &NaiveDateTime {
        &self.now
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date()
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }
}
