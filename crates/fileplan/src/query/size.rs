//! Size literal parsing and matching.

use std::fmt;

use super::field::Operator;

const KB: u64 = 1024;
const MB: u64 = 1024 * 1024;

/// Named size buckets. Ranges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeKeyword {
    Empty,
    Tiny,
    Small,
    Medium,
    Large,
    Huge,
    Gigantic,
}

impl SizeKeyword {
    pub fn lookup(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "empty" => Some(Self::Empty),
            "tiny" => Some(Self::Tiny),
            "small" => Some(Self::Small),
            "medium" => Some(Self::Medium),
            "large" => Some(Self::Large),
            "huge" => Some(Self::Huge),
            "gigantic" | "giant" => Some(Self::Gigantic),
            _ => None,
        }
    }

    pub fn bounds(self) -> (Option<u64>, Option<u64>) {
        match self {
            Self::Empty => (Some(0), Some(0)),
            Self::Tiny => (Some(0), Some(10 * KB)),
            Self::Small => (Some(10 * KB + 1), Some(100 * KB)),
            Self::Medium => (Some(100 * KB + 1), Some(MB)),
            Self::Large => (Some(MB + 1), Some(16 * MB)),
            Self::Huge => (Some(16 * MB + 1), Some(128 * MB)),
            Self::Gigantic => (Some(128 * MB + 1), None),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Tiny => "tiny",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Huge => "huge",
            Self::Gigantic => "gigantic",
        }
    }

    fn contains(self, value: u64) -> bool {
        let (min, max) = self.bounds();
        if let Some(minimum) = min {
            if value < minimum {
                return false;
            }
        }
        if let Some(maximum) = max {
            if value > maximum {
                return false;
            }
        }
        true
    }
}

/// Right-hand side of a `size` comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeValue {
    Bytes(u64),
    Keyword(SizeKeyword),
}

impl SizeValue {
    /// Parses a keyword (`large`) or a literal (`10MB`, `1.5G`, `512`).
    pub fn parse(raw: &str) -> Result<Self, String> {
        if let Some(keyword) = SizeKeyword::lookup(raw) {
            return Ok(Self::Keyword(keyword));
        }
        parse_size_literal(raw).map(Self::Bytes)
    }

    pub fn is_keyword(&self) -> bool {
        matches!(self, Self::Keyword(_))
    }

    pub fn matches(&self, operator: Operator, size: u64) -> bool {
        match (self, operator) {
            (Self::Bytes(right), Operator::Eq) => size == *right,
            (Self::Bytes(right), Operator::Ne) => size != *right,
            (Self::Bytes(right), Operator::Lt) => size < *right,
            (Self::Bytes(right), Operator::Lte) => size <= *right,
            (Self::Bytes(right), Operator::Gt) => size > *right,
            (Self::Bytes(right), Operator::Gte) => size >= *right,
            (Self::Keyword(keyword), Operator::Eq) => keyword.contains(size),
            (Self::Keyword(keyword), Operator::Ne) => !keyword.contains(size),
            _ => false,
        }
    }
}

impl fmt::Display for SizeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "{bytes}"),
            Self::Keyword(keyword) => f.write_str(keyword.name()),
        }
    }
}

/// Parses a size literal into bytes. Units are powers of 1024.
pub fn parse_size_literal(raw: &str) -> Result<u64, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("expected a size".to_string());
    }

    let mut split = trimmed.len();
    for (index, ch) in trimmed.char_indices() {
        if ch.is_ascii_digit() || ch == '.' {
            continue;
        }
        split = index;
        break;
    }
    let (number_part, unit_part) = trimmed.split_at(split);
    if number_part.is_empty() {
        return Err(format!("expected a numeric size in {raw:?}"));
    }

    let value: f64 = number_part
        .parse()
        .map_err(|_| format!("failed to parse number in {raw:?}"))?;
    let multiplier = size_unit_multiplier(unit_part)
        .ok_or_else(|| format!("unknown size unit {unit_part:?}"))?;
    let bytes = (value * multiplier as f64).round();
    if !bytes.is_finite() || bytes < 0.0 {
        return Err(format!("size {raw:?} is out of range"));
    }

    if bytes > u64::MAX as f64 {
        Ok(u64::MAX)
    } else {
        Ok(bytes as u64)
    }
}

fn size_unit_multiplier(unit: &str) -> Option<u64> {
    match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" | "byte" | "bytes" => Some(1),
        "k" | "kb" | "kib" => Some(KB),
        "m" | "mb" | "mib" => Some(MB),
        "g" | "gb" | "gib" => Some(1024 * MB),
        "t" | "tb" | "tib" => Some(1024_u64.pow(4)),
        _ => None,
    }
}
