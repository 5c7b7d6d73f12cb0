//! Typed fields and comparison operators of the query language.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Integer,
    DateTime,
    Boolean,
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Stem,
    Extension,
    Path,
    Parent,
    MimeType,
    Checksum,
    Size,
    Created,
    Modified,
    Accessed,
    Hidden,
    IsDir,
    Content,
}

impl Field {
    /// Resolves a field name or alias, case-insensitively.
    pub fn lookup(raw: &str) -> Option<Self> {
        let field = match raw.to_ascii_lowercase().as_str() {
            "name" | "filename" => Self::Name,
            "stem" => Self::Stem,
            "extension" | "ext" => Self::Extension,
            "path" => Self::Path,
            "parent" | "dir" | "folder" => Self::Parent,
            "mime" | "mime_type" | "mimetype" => Self::MimeType,
            "checksum" | "hash" => Self::Checksum,
            "size" => Self::Size,
            "created" | "dc" => Self::Created,
            "modified" | "dm" => Self::Modified,
            "accessed" | "da" => Self::Accessed,
            "hidden" => Self::Hidden,
            "isdir" | "is_dir" => Self::IsDir,
            "content" => Self::Content,
            _ => return None,
        };
        Some(field)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Stem => "stem",
            Self::Extension => "extension",
            Self::Path => "path",
            Self::Parent => "parent",
            Self::MimeType => "mime_type",
            Self::Checksum => "checksum",
            Self::Size => "size",
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Accessed => "accessed",
            Self::Hidden => "hidden",
            Self::IsDir => "isdir",
            Self::Content => "content",
        }
    }

    pub fn field_type(self) -> FieldType {
        match self {
            Self::Name
            | Self::Stem
            | Self::Extension
            | Self::Path
            | Self::Parent
            | Self::MimeType
            | Self::Checksum => FieldType::Text,
            Self::Size => FieldType::Integer,
            Self::Created | Self::Modified | Self::Accessed => FieldType::DateTime,
            Self::Hidden | Self::IsDir => FieldType::Boolean,
            Self::Content => FieldType::Content,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
}

impl Operator {
    pub fn from_symbol(raw: &str) -> Option<Self> {
        match raw {
            "=" | "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Lte),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Gte),
            _ => None,
        }
    }

    pub fn from_keyword(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "LIKE" => Some(Self::Like),
            "CONTAINS" => Some(Self::Contains),
            "STARTSWITH" => Some(Self::StartsWith),
            "ENDSWITH" => Some(Self::EndsWith),
            "MATCHES" => Some(Self::Matches),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Like => "LIKE",
            Self::Contains => "CONTAINS",
            Self::StartsWith => "STARTSWITH",
            Self::EndsWith => "ENDSWITH",
            Self::Matches => "MATCHES",
        }
    }

    /// Whether the operator is defined for values of `field_type`.
    pub fn supports(self, field_type: FieldType) -> bool {
        match field_type {
            FieldType::Text => matches!(
                self,
                Self::Eq
                    | Self::Ne
                    | Self::Like
                    | Self::Contains
                    | Self::StartsWith
                    | Self::EndsWith
                    | Self::Matches
            ),
            FieldType::Integer | FieldType::DateTime => matches!(
                self,
                Self::Eq | Self::Ne | Self::Lt | Self::Lte | Self::Gt | Self::Gte
            ),
            FieldType::Boolean => matches!(self, Self::Eq | Self::Ne),
            FieldType::Content => matches!(self, Self::Contains | Self::Matches),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_case_insensitively() {
        assert_eq!(Field::lookup("EXT"), Some(Field::Extension));
        assert_eq!(Field::lookup("mime"), Some(Field::MimeType));
        assert_eq!(Field::lookup("is_dir"), Some(Field::IsDir));
        assert_eq!(Field::lookup("colour"), None);
    }

    #[test]
    fn numeric_fields_reject_text_operators() {
        assert!(!Operator::Contains.supports(Field::Size.field_type()));
        assert!(Operator::Gte.supports(Field::Size.field_type()));
        assert!(!Operator::Gt.supports(Field::Name.field_type()));
        assert!(!Operator::Eq.supports(Field::Content.field_type()));
        assert!(Operator::Matches.supports(Field::Content.field_type()));
    }

    #[test]
    fn symbols_and_keywords() {
        assert_eq!(Operator::from_symbol("=="), Some(Operator::Eq));
        assert_eq!(Operator::from_symbol(">>"), None);
        assert_eq!(Operator::from_keyword("startswith"), Some(Operator::StartsWith));
    }
}
