//! Object keys, chunk indices and inclusive index ranges.

use std::{fmt, ops::RangeInclusive};

/// Position of one chunk within an object's chunk sequence.
pub type ChunkIndex = u64;

/// Largest addressable index; both backends can store every index up to it.
pub const MAX_CHUNK_INDEX: ChunkIndex = i64::MAX as ChunkIndex;

/// Key used when the first path segment is empty or blank.
pub const ROOT_KEY: &str = "/";

/// Logical name of one object, and of the shard actor that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Build a key from a raw path segment. Blank segments map to [`ROOT_KEY`].
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.trim().is_empty() {
            Self::root()
        } else {
            Self(raw)
        }
    }

    pub fn root() -> Self {
        Self(ROOT_KEY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inclusive range of chunk indices written by one request.
///
/// Constructed through [`IndexRange::new`], which rejects `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    start: ChunkIndex,
    end: ChunkIndex,
}

impl IndexRange {
    pub fn new(start: ChunkIndex, end: ChunkIndex) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn single(index: ChunkIndex) -> Self {
        Self {
            start: index,
            end: index,
        }
    }

    pub fn start(&self) -> ChunkIndex {
        self.start
    }

    /// True when the range covers exactly one index.
    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    /// Number of indices covered, saturating at `u64::MAX`.
    pub fn len(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }

    pub fn indices(&self) -> RangeInclusive<ChunkIndex> {
        self.start..=self.end
    }
}

impl fmt::Display for IndexRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{},{}", self.start, self.end)
        }
    }
}
