//! Derives the object key and chunk indices from a request path.
//!
//! - key: first segment after the leading `/` (`/` when blank)
//! - range: last segment, either `n` or `start,end`; empty means `0`
//!
//! `/photos/3,5` therefore addresses chunks 3 to 5 of `photos`.

use crate::models::chunk::{ChunkIndex, IndexRange, MAX_CHUNK_INDEX, ObjectKey};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexParseError {
    #[error("index `{0}` is not a non-negative integer")]
    NotANumber(String),
    #[error("index `{0}` is beyond the largest storable index")]
    OutOfRange(String),
    #[error("index segment `{0}` has more than two parts")]
    TooManyParts(String),
    #[error("range start {start} is after end {end}")]
    Inverted { start: ChunkIndex, end: ChunkIndex },
}

/// Resolve the object key a request addresses.
pub fn object_key(path: &str) -> ObjectKey {
    let first = path
        .strip_prefix('/')
        .unwrap_or(path)
        .split('/')
        .next()
        .unwrap_or("");
    ObjectKey::new(first)
}

/// Resolve the inclusive index range a write addresses.
pub fn index_range(path: &str) -> Result<IndexRange, IndexParseError> {
    let segment = last_segment(path);
    if segment.trim().is_empty() {
        return Ok(IndexRange::single(0));
    }

    let mut parts = segment.split(',');
    let start = parse_index(parts.next().unwrap_or(""))?;
    let Some(end) = parts.next() else {
        return Ok(IndexRange::single(start));
    };
    if parts.next().is_some() {
        return Err(IndexParseError::TooManyParts(segment.to_string()));
    }
    let end = parse_index(end)?;

    IndexRange::new(start, end).ok_or(IndexParseError::Inverted { start, end })
}

/// Resolve the single chunk index a read addresses.
pub fn chunk_index(path: &str) -> Result<ChunkIndex, IndexParseError> {
    let segment = last_segment(path);
    if segment.trim().is_empty() {
        return Ok(0);
    }
    parse_index(segment)
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

fn parse_index(raw: &str) -> Result<ChunkIndex, IndexParseError> {
    let digits = raw.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IndexParseError::NotANumber(raw.to_string()));
    }
    digits
        .parse::<ChunkIndex>()
        .ok()
        .filter(|index| *index <= MAX_CHUNK_INDEX)
        .ok_or_else(|| IndexParseError::OutOfRange(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_first_segment() {
        assert_eq!(object_key("/photos/3").as_str(), "photos");
        assert_eq!(object_key("/photos").as_str(), "photos");
        assert_eq!(object_key("/photos/nested/3,4").as_str(), "photos");
        assert_eq!(object_key("photos/3").as_str(), "photos");
    }

    #[test]
    fn blank_first_segment_is_root() {
        assert_eq!(object_key("/").as_str(), "/");
        assert_eq!(object_key("").as_str(), "/");
        assert_eq!(object_key("//3").as_str(), "/");
        assert_eq!(object_key("/%20/3").as_str(), "%20");
    }

    #[test]
    fn range_from_last_segment() {
        assert_eq!(index_range("/k/4").unwrap(), IndexRange::single(4));
        assert_eq!(
            index_range("/k/3,5").unwrap(),
            IndexRange::new(3, 5).unwrap()
        );
        assert_eq!(
            index_range("/k/ 3 , 5 ").unwrap(),
            IndexRange::new(3, 5).unwrap()
        );
        assert_eq!(index_range("/k/").unwrap(), IndexRange::single(0));
        assert_eq!(index_range("/").unwrap(), IndexRange::single(0));
        assert_eq!(index_range("/k/2,2").unwrap(), IndexRange::single(2));
    }

    #[test]
    fn malformed_ranges_are_rejected() {
        assert_eq!(
            index_range("/k/abc"),
            Err(IndexParseError::NotANumber("abc".into()))
        );
        assert_eq!(
            index_range("/k/1,x"),
            Err(IndexParseError::NotANumber("x".into()))
        );
        assert_eq!(
            index_range("/k/1,"),
            Err(IndexParseError::NotANumber("".into()))
        );
        assert_eq!(
            index_range("/k/-1"),
            Err(IndexParseError::NotANumber("-1".into()))
        );
        assert_eq!(
            index_range("/k/1,2,3"),
            Err(IndexParseError::TooManyParts("1,2,3".into()))
        );
        assert_eq!(
            index_range("/k/5,3"),
            Err(IndexParseError::Inverted { start: 5, end: 3 })
        );
    }

    #[test]
    fn indices_stop_at_the_largest_storable_row() {
        assert_eq!(
            chunk_index("/k/9223372036854775807").unwrap(),
            MAX_CHUNK_INDEX
        );
        assert_eq!(
            chunk_index("/k/9223372036854775808"),
            Err(IndexParseError::OutOfRange("9223372036854775808".into()))
        );
        assert_eq!(
            index_range("/k/0,18446744073709551616"),
            Err(IndexParseError::OutOfRange("18446744073709551616".into()))
        );
    }

    #[test]
    fn key_only_path_parses_key_as_index() {
        // `/photos` has `photos` as both first and last segment.
        assert!(index_range("/photos").is_err());
        assert!(chunk_index("/photos").is_err());
    }

    #[test]
    fn single_index_for_reads() {
        assert_eq!(chunk_index("/k/9").unwrap(), 9);
        assert_eq!(chunk_index("/k/").unwrap(), 0);
        assert!(matches!(
            chunk_index("/k/1,2"),
            Err(IndexParseError::NotANumber(_))
        ));
    }
}
