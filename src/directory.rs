//! Chapter directory construction and caching.
//!
//! A [`ChapterDirectory`] maps canonical chapter indices to where each
//! chapter lives on the source site. [`DirectoryBuilder`] walks a site's
//! paginated table of contents to produce one and keeps the result in a
//! [`DirectoryCache`] until it is explicitly invalidated.

use crate::chapter::ChapterIndex;
use crate::discrepancy::{EntryContext, RuleTable};
use crate::error::FetchError;
use crate::numeral;
use crate::sources::{Numbering, PageFetcher, SiteLayout, TocEntry};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Where a chapter lives and what the site calls it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterDirectoryEntry {
    /// Absolute chapter URL.
    pub source_location: String,
    /// Title without the leading numeral.
    pub native_title: String,
    /// Numeral as written by the site, or the list position for sequential sites.
    pub native_index: String,
}

/// Index-to-location map for one book.
///
/// Later inserts under an existing index replace the earlier entry. The
/// largest index is tracked as entries arrive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterDirectory {
    entries: HashMap<ChapterIndex, ChapterDirectoryEntry>,
    max_index: Option<ChapterIndex>,
}

impl ChapterDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, returning the one it replaced.
    pub fn insert(
        &mut self,
        index: ChapterIndex,
        entry: ChapterDirectoryEntry,
    ) -> Option<ChapterDirectoryEntry> {
        if self.max_index.is_none_or(|max| index > max) {
            self.max_index = Some(index);
        }
        self.entries.insert(index, entry)
    }

    pub fn get(&self, index: ChapterIndex) -> Option<&ChapterDirectoryEntry> {
        self.entries.get(&index)
    }

    /// Looks up an entry by its string key.
    pub fn get_key(&self, key: &str) -> Option<&ChapterDirectoryEntry> {
        key.parse::<ChapterIndex>().ok().and_then(|i| self.get(i))
    }

    pub fn contains(&self, index: ChapterIndex) -> bool {
        self.entries.contains_key(&index)
    }

    /// Numerically largest index.
    pub fn max_index(&self) -> Option<ChapterIndex> {
        self.max_index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by index.
    pub fn iter_ordered(&self) -> Vec<(ChapterIndex, &ChapterDirectoryEntry)> {
        let mut entries: Vec<_> = self.entries.iter().map(|(i, e)| (*i, e)).collect();
        entries.sort_unstable_by_key(|(i, _)| *i);
        entries
    }
}

/// Splits `第十章 血脉觉醒` into `("第十章", "血脉觉醒")`.
///
/// The title is empty when the line has a single token.
pub fn split_title_line(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((numeral, title)) => (numeral, title.trim()),
        None => (line, ""),
    }
}

/// Built directories per book id.
#[derive(Debug, Default)]
pub struct DirectoryCache {
    books: HashMap<String, Arc<ChapterDirectory>>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, book_id: &str) -> Option<Arc<ChapterDirectory>> {
        self.books.get(book_id).cloned()
    }

    pub fn insert(&mut self, book_id: &str, directory: ChapterDirectory) -> Arc<ChapterDirectory> {
        let directory = Arc::new(directory);
        self.books.insert(book_id.to_string(), Arc::clone(&directory));
        directory
    }

    /// Drops the cached directory for a book. Returns true if one was cached.
    pub fn invalidate(&mut self, book_id: &str) -> bool {
        self.books.remove(book_id).is_some()
    }

    pub fn clear(&mut self) {
        self.books.clear();
    }

    pub fn contains(&self, book_id: &str) -> bool {
        self.books.contains_key(book_id)
    }
}

/// Builds chapter directories from a site's table of contents.
pub struct DirectoryBuilder {
    fetcher: Arc<dyn PageFetcher>,
    layout: Arc<dyn SiteLayout>,
    rules: RuleTable,
    cache: DirectoryCache,
    max_pages: u32,
}

impl DirectoryBuilder {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        layout: Arc<dyn SiteLayout>,
        rules: RuleTable,
        max_pages: u32,
    ) -> Self {
        Self {
            fetcher,
            layout,
            rules,
            cache: DirectoryCache::new(),
            max_pages,
        }
    }

    pub fn cache(&self) -> &DirectoryCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut DirectoryCache {
        &mut self.cache
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Returns the directory for `book_id`, walking the table of contents
    /// on first use.
    ///
    /// Only a complete walk is cached; a failed page leaves the cache untouched.
    pub async fn build(&mut self, book_id: &str) -> Result<Arc<ChapterDirectory>, FetchError> {
        if let Some(directory) = self.cache.get(book_id) {
            return Ok(directory);
        }

        let directory = self.walk_toc(book_id).await?;
        tracing::info!(
            book = book_id,
            chapters = directory.len(),
            max = ?directory.max_index().map(ChapterIndex::get),
            "chapter directory built"
        );
        Ok(self.cache.insert(book_id, directory))
    }

    /// Discards any cached directory and builds it again.
    pub async fn rebuild(&mut self, book_id: &str) -> Result<Arc<ChapterDirectory>, FetchError> {
        self.cache.invalidate(book_id);
        self.build(book_id).await
    }

    async fn walk_toc(&self, book_id: &str) -> Result<ChapterDirectory, FetchError> {
        let mut directory = ChapterDirectory::new();
        let mut visited = HashSet::new();
        let mut position: u32 = 0;
        let mut url = self.layout.toc_url(book_id);

        loop {
            if visited.len() as u32 >= self.max_pages {
                return Err(FetchError::PageLimit {
                    limit: self.max_pages,
                });
            }
            visited.insert(url.clone());

            let markup = self.fetcher.fetch_page(&url).await?;
            let page = self.layout.parse_toc(&markup, &url)?;
            tracing::debug!(url = %url, entries = page.entries.len(), "table of contents page");

            for entry in page.entries {
                match self.layout.numbering() {
                    Numbering::Native => self.add_native(&mut directory, book_id, entry),
                    Numbering::Sequential => {
                        position += 1;
                        add_sequential(&mut directory, position, entry);
                    }
                }
            }

            match page.next_page {
                Some(next) if visited.contains(&next) => {
                    tracing::warn!(url = %next, "table of contents links back to a visited page");
                    break;
                }
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(directory)
    }

    fn add_native(&self, directory: &mut ChapterDirectory, book_id: &str, entry: TocEntry) {
        let (numeral, title) = split_title_line(&entry.title_line);

        let candidate = match numeral::normalize(numeral) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(
                    book = book_id,
                    location = %entry.location,
                    line = %entry.title_line,
                    "skipping table of contents entry: {}",
                    e
                );
                return;
            }
        };

        let ctx = EntryContext {
            location: &entry.location,
            native_title: title,
            native_numeral: numeral,
        };
        let index = self.rules.resolve(book_id, candidate, &ctx);
        if index != candidate {
            tracing::debug!(book = book_id, from = candidate.get(), to = index.get(), "numbering corrected");
        }

        let new_entry = ChapterDirectoryEntry {
            native_title: title.to_string(),
            native_index: numeral.to_string(),
            source_location: entry.location,
        };
        if let Some(previous) = directory.insert(index, new_entry) {
            tracing::warn!(
                book = book_id,
                index = index.get(),
                replaced = %previous.source_location,
                "two table of contents entries resolve to the same chapter, keeping the later one"
            );
        }
    }
}

fn add_sequential(directory: &mut ChapterDirectory, position: u32, entry: TocEntry) {
    let Some(index) = ChapterIndex::new(position) else {
        return;
    };
    directory.insert(
        index,
        ChapterDirectoryEntry {
            source_location: entry.location,
            native_title: entry.title_line.trim().to_string(),
            native_index: position.to_string(),
        },
    );
}
