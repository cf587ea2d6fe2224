//! Resolution of a requested chapter range against a directory.

use crate::chapter::ChapterIndex;
use crate::directory::ChapterDirectory;
use crate::error::RangeError;

/// Inclusive span of chapter indices.
///
/// Only the endpoints are known to be in the directory; indices in between
/// may be missing and are reported when they are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChapterRange {
    start: ChapterIndex,
    end: ChapterIndex,
}

impl ChapterRange {
    pub fn start(&self) -> ChapterIndex {
        self.start
    }

    pub fn end(&self) -> ChapterIndex {
        self.end
    }

    pub fn len(&self) -> usize {
        (self.end.get() - self.start.get()) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = ChapterIndex> {
        (self.start.get()..=self.end.get()).filter_map(ChapterIndex::new)
    }

    /// Indices in their string key form.
    pub fn keys(&self) -> Vec<String> {
        self.indices().map(|i| i.to_string()).collect()
    }
}

/// Validates the requested endpoints and returns the span to fetch.
///
/// A given `start` or `end` must be a key of `directory`. Without `start`
/// the span begins at 1 (not looked up). Without `end` it stops at the
/// numerically largest index in the directory.
pub fn resolve_range(
    directory: &ChapterDirectory,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<ChapterRange, RangeError> {
    resolve_span(
        |index| directory.contains(index),
        ChapterIndex::FIRST,
        directory.max_index(),
        start,
        end,
    )
}

/// Same checks as [`resolve_range`] against any set of known indices.
///
/// `first` is the start used when none is requested and `last` the end,
/// `None` meaning there is nothing to span.
pub fn resolve_span(
    contains: impl Fn(ChapterIndex) -> bool,
    first: ChapterIndex,
    last: Option<ChapterIndex>,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<ChapterRange, RangeError> {
    let lookup = |key: &str| key.parse::<ChapterIndex>().ok().filter(|index| contains(*index));

    let start = match start {
        Some(key) => lookup(key).ok_or_else(|| RangeError::BadStart(key.to_string()))?,
        None => first,
    };

    let end = match end {
        Some(key) => lookup(key).ok_or_else(|| RangeError::BadEnd(key.to_string()))?,
        None => last.ok_or(RangeError::EmptyDirectory)?,
    };

    if start > end {
        return Err(RangeError::Inverted {
            start: start.get(),
            end: end.get(),
        });
    }

    Ok(ChapterRange { start, end })
}
