//! Content search using the Rabin-Karp finder from memchr.
//!
//! Files are streamed in fixed-size chunks; the tail of each chunk is carried
//! into the next one so matches spanning a chunk boundary are found.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use memchr::arch::all::rabinkarp;
use regex::bytes::RegexBuilder;

use super::expression::RegexValue;

/// Buffer size for file content reading (64KB).
pub const CONTENT_BUFFER_BYTES: usize = 64 * 1024;

/// Upper bound on bytes fed to a content regex.
pub const REGEX_CONTENT_LIMIT_BYTES: u64 = 16 * 1024 * 1024;

/// Returns whether the file at `path` contains `needle`.
///
/// When `case_insensitive` is set the needle must already be lowercase. An
/// ASCII needle is compared against ASCII-lowercased file bytes; any other
/// needle goes through a Unicode case-insensitive search.
pub fn file_content_contains(
    path: &Path,
    needle: &[u8],
    case_insensitive: bool,
) -> io::Result<bool> {
    debug_assert!(
        !case_insensitive || needle == needle.to_ascii_lowercase(),
        "needle must be lowercased when case_insensitive is true"
    );

    let mut file = File::open(path)?;
    if needle.is_empty() {
        return Ok(false);
    }
    if case_insensitive && !needle.is_ascii() {
        return folded_content_contains(file, needle);
    }

    let overlap = needle.len().saturating_sub(1);
    let finder = rabinkarp::Finder::new(needle);
    let mut buffer = vec![0u8; CONTENT_BUFFER_BYTES + overlap];
    let mut carry_len = 0usize;

    loop {
        let read = file.read(&mut buffer[carry_len..])?;
        if read == 0 {
            break;
        }

        let chunk_len = carry_len + read;
        let chunk = &mut buffer[..chunk_len];
        if case_insensitive {
            chunk[carry_len..].make_ascii_lowercase();
        }
        if finder.find(chunk, needle).is_some() {
            return Ok(true);
        }

        let keep = overlap.min(chunk_len);
        if keep > 0 {
            buffer.copy_within(chunk_len - keep..chunk_len, 0);
        }
        carry_len = keep;
    }

    Ok(false)
}

fn folded_content_contains(mut file: File, needle: &[u8]) -> io::Result<bool> {
    let literal = regex::escape(&String::from_utf8_lossy(needle));
    let regex = RegexBuilder::new(&literal)
        .case_insensitive(true)
        .build()
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;

    // Case variants of one character differ in UTF-8 length by up to 3x.
    let overlap = needle.len() * 3;
    let mut buffer = vec![0u8; CONTENT_BUFFER_BYTES + overlap];
    let mut carry_len = 0usize;

    loop {
        let read = file.read(&mut buffer[carry_len..])?;
        if read == 0 {
            break;
        }

        let chunk_len = carry_len + read;
        if regex.is_match(&buffer[..chunk_len]) {
            return Ok(true);
        }

        let keep = overlap.min(chunk_len);
        if keep > 0 {
            buffer.copy_within(chunk_len - keep..chunk_len, 0);
        }
        carry_len = keep;
    }

    Ok(false)
}

/// Returns whether the (lossily decoded) file content matches `regex`.
pub fn file_content_matches_regex(path: &Path, regex: &RegexValue) -> io::Result<bool> {
    let file = File::open(path)?;
    let mut bytes = Vec::new();
    file.take(REGEX_CONTENT_LIMIT_BYTES).read_to_end(&mut bytes)?;
    Ok(regex.is_match(&String::from_utf8_lossy(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn empty_needle_returns_false() {
        let file = create_temp_file(b"hello world");
        assert!(!file_content_contains(file.path(), b"", false).unwrap());
    }

    #[test]
    fn finds_multi_byte_needle() {
        let file = create_temp_file(b"quarterly invoice total");
        assert!(file_content_contains(file.path(), b"invoice", false).unwrap());
        assert!(!file_content_contains(file.path(), b"receipt", false).unwrap());
    }

    #[test]
    fn case_insensitive_lowercases_file_bytes() {
        let file = create_temp_file(b"Quarterly INVOICE total");
        assert!(file_content_contains(file.path(), b"invoice", true).unwrap());
        assert!(!file_content_contains(file.path(), b"invoice", false).unwrap());
    }

    #[test]
    fn case_insensitive_folds_non_ascii_needles() {
        let file = create_temp_file("Grüße ÜBER alles".as_bytes());
        assert!(file_content_contains(file.path(), "über".as_bytes(), true).unwrap());
        assert!(file_content_contains(file.path(), "grüße".as_bytes(), true).unwrap());
        assert!(!file_content_contains(file.path(), "übel".as_bytes(), true).unwrap());
        assert!(!file_content_contains(file.path(), "über".as_bytes(), false).unwrap());
    }

    #[test]
    fn folded_match_spanning_buffer_boundary() {
        // The first chunk ends inside "ÜBER".
        let overlap = "über".len() * 3;
        let mut content = vec![b'x'; CONTENT_BUFFER_BYTES + overlap - 2];
        content.extend_from_slice("ÜBER alles".as_bytes());
        let file = create_temp_file(&content);
        assert!(file_content_contains(file.path(), "über".as_bytes(), true).unwrap());
    }

    #[test]
    fn match_spanning_buffer_boundary() {
        let mut content = vec![b'x'; CONTENT_BUFFER_BYTES - 3];
        content.extend_from_slice(b"needle");
        content.extend(vec![b'y'; 100]);
        let file = create_temp_file(&content);
        assert!(file_content_contains(file.path(), b"needle", false).unwrap());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = file_content_contains(&dir.path().join("missing.txt"), b"x", false);
        assert!(result.is_err());
    }

    #[test]
    fn regex_over_content() {
        let file = create_temp_file(b"order #12345 shipped");
        let regex = RegexValue::new(r"#\d{5}\b", false).unwrap();
        assert!(file_content_matches_regex(file.path(), &regex).unwrap());
    }
}
