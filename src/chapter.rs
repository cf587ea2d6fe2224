//! Chapter identity types shared across the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical, 1-based chapter index.
///
/// Displays and parses as the plain decimal string used for directory keys
/// and archive filename prefixes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u32", into = "u32")]
pub struct ChapterIndex(u32);

impl ChapterIndex {
    /// The first chapter.
    pub const FIRST: ChapterIndex = ChapterIndex(1);

    /// Creates an index, rejecting zero.
    pub fn new(value: u32) -> Option<Self> {
        (value > 0).then_some(Self(value))
    }

    /// Returns the numeric value.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for ChapterIndex {
    type Error = ParseIndexError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| ParseIndexError(value.to_string()))
    }
}

impl From<ChapterIndex> for u32 {
    fn from(index: ChapterIndex) -> Self {
        index.0
    }
}

impl fmt::Display for ChapterIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a string is not a positive decimal integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIndexError(pub String);

impl fmt::Display for ParseIndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a positive chapter index", self.0)
    }
}

impl std::error::Error for ParseIndexError {}

impl FromStr for ChapterIndex {
    type Err = ParseIndexError;

    /// Accepts only the canonical key form: digits without padding,
    /// whitespace or sign, so `"07"` is not the key `"7"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.starts_with('0') || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseIndexError(s.to_string()));
        }
        s.parse::<u32>()
            .ok()
            .and_then(ChapterIndex::new)
            .ok_or_else(|| ParseIndexError(s.to_string()))
    }
}

/// A chapter as fetched from a source, before it is archived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRecord {
    pub index: ChapterIndex,
    pub title: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index() {
        assert_eq!("7".parse::<ChapterIndex>().unwrap().get(), 7);
        assert_eq!("120".parse::<ChapterIndex>().unwrap().get(), 120);
        assert!(" 12 ".parse::<ChapterIndex>().is_err());
        assert!("07".parse::<ChapterIndex>().is_err());
        assert!("4294967296".parse::<ChapterIndex>().is_err());
        assert!("0".parse::<ChapterIndex>().is_err());
        assert!("-3".parse::<ChapterIndex>().is_err());
        assert!("+3".parse::<ChapterIndex>().is_err());
        assert!("abc".parse::<ChapterIndex>().is_err());
        assert!("".parse::<ChapterIndex>().is_err());
    }

    #[test]
    fn test_display_matches_key_form() {
        let index = ChapterIndex::new(42).unwrap();
        assert_eq!(index.to_string(), "42");
        assert_eq!(index.to_string().parse::<ChapterIndex>().unwrap(), index);
    }
}
