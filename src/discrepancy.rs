//! Book-specific corrections for inconsistent source numbering.
//!
//! Sites sometimes reuse or skip native numbers around split and merged
//! chapters. Each correction is a [`DiscrepancyRule`] in a [`RuleTable`]
//! keyed by book id, loaded from TOML independently of any site code:
//!
//! ```toml
//! [[books."11992"]]
//! candidate = 10
//! title_len = 4
//! replacement = 11
//! ```

use crate::chapter::ChapterIndex;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// What the resolver knows about a directory entry besides its candidate index.
#[derive(Debug, Clone, Copy)]
pub struct EntryContext<'a> {
    /// Raw source location (usually the chapter URL or its id).
    pub location: &'a str,
    /// Title text following the numeral.
    pub native_title: &'a str,
    /// The numeral as written on the site.
    pub native_numeral: &'a str,
}

/// One correction. Every matcher that is set must match; lengths count chars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancyRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<ChapterIndex>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_len: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeral_len: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Index the entry is stored under when the rule matches.
    pub replacement: ChapterIndex,
}

impl DiscrepancyRule {
    /// Creates a rule with no matchers; add them with the builder methods.
    pub fn to(replacement: ChapterIndex) -> Self {
        Self {
            candidate: None,
            title_len: None,
            numeral_len: None,
            location: None,
            replacement,
        }
    }

    pub fn when_candidate(mut self, candidate: ChapterIndex) -> Self {
        self.candidate = Some(candidate);
        self
    }

    pub fn when_title_len(mut self, len: usize) -> Self {
        self.title_len = Some(len);
        self
    }

    pub fn when_numeral_len(mut self, len: usize) -> Self {
        self.numeral_len = Some(len);
        self
    }

    pub fn when_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    fn has_matchers(&self) -> bool {
        self.candidate.is_some()
            || self.title_len.is_some()
            || self.numeral_len.is_some()
            || self.location.is_some()
    }

    /// Returns true if every configured matcher accepts the entry.
    pub fn matches(&self, candidate: ChapterIndex, ctx: &EntryContext<'_>) -> bool {
        if !self.has_matchers() {
            return false;
        }
        self.candidate.is_none_or(|c| c == candidate)
            && self
                .title_len
                .is_none_or(|len| ctx.native_title.chars().count() == len)
            && self
                .numeral_len
                .is_none_or(|len| ctx.native_numeral.chars().count() == len)
            && self.location.as_deref().is_none_or(|loc| loc == ctx.location)
    }
}

/// Ordered correction rules per book id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTable {
    #[serde(default)]
    books: BTreeMap<String, Vec<DiscrepancyRule>>,
}

impl RuleTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a table from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let table: RuleTable =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        table.validate()?;
        Ok(table)
    }

    /// Loads a table from disk. A missing file yields an empty table.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no discrepancy rules file");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (book, rules) in &self.books {
            if let Some(pos) = rules.iter().position(|r| !r.has_matchers()) {
                return Err(ConfigError::InvalidValue {
                    key: format!("books.{}[{}]", book, pos),
                    message: "rule needs at least one matcher".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Appends a rule at the lowest priority for `book_id`.
    pub fn push(&mut self, book_id: impl Into<String>, rule: DiscrepancyRule) {
        self.books.entry(book_id.into()).or_default().push(rule);
    }

    /// Rules for a book in priority order.
    pub fn rules_for(&self, book_id: &str) -> &[DiscrepancyRule] {
        self.books.get(book_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of rules across all books.
    pub fn len(&self) -> usize {
        self.books.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the corrected index for an entry, or `candidate` unchanged.
    ///
    /// The first matching rule for the book wins.
    pub fn resolve(
        &self,
        book_id: &str,
        candidate: ChapterIndex,
        ctx: &EntryContext<'_>,
    ) -> ChapterIndex {
        self.rules_for(book_id)
            .iter()
            .find(|rule| rule.matches(candidate, ctx))
            .map(|rule| rule.replacement)
            .unwrap_or(candidate)
    }
}
