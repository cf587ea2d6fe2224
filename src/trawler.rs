//! Fetch-and-archive and translate runs over chapter ranges.
//!
//! Every run is sequential: one request at a time, in ascending index
//! order, stopping at the first failure. Chapters written before a failure
//! stay in the archive, so a rerun with `skip_existing` resumes.

use crate::archive::{Archive, BookMetadata};
use crate::chapter::{ChapterIndex, ChapterRecord};
use crate::config::Config;
use crate::console::Console;
use crate::directory::{ChapterDirectory, DirectoryBuilder};
use crate::discrepancy::RuleTable;
use crate::error::{FetchError, TrawlError};
use crate::range::{ChapterRange, resolve_range, resolve_span};
use crate::sources::{HttpFetcher, PageFetcher, SiteLayout};
use crate::translator::TextTranslator;
use crate::utils::split_text_into_line_chunks;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

/// What a ranged run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub written: Vec<ChapterIndex>,
    pub skipped: Vec<ChapterIndex>,
}

/// Fetches chapters of one site into an archive.
pub struct Trawler {
    directories: DirectoryBuilder,
    fetcher: Arc<dyn PageFetcher>,
    layout: Arc<dyn SiteLayout>,
    archive: Archive,
    console: Console,
}

impl Trawler {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        layout: Arc<dyn SiteLayout>,
        rules: RuleTable,
        max_toc_pages: u32,
        archive: Archive,
    ) -> Self {
        Self {
            directories: DirectoryBuilder::new(fetcher.clone(), layout.clone(), rules, max_toc_pages),
            fetcher,
            layout,
            archive,
            console: Console::new(),
        }
    }

    /// Trawler over HTTP using the scraping and path settings of `config`.
    pub fn from_config(
        config: &Config,
        layout: Arc<dyn SiteLayout>,
        rules: RuleTable,
    ) -> Result<Self, FetchError> {
        let fetcher = Arc::new(HttpFetcher::new(&config.scraping)?);
        Ok(Self::new(
            fetcher,
            layout,
            rules,
            config.scraping.max_toc_pages,
            Archive::new(&config.paths.archive_directory),
        ))
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn layout(&self) -> &dyn SiteLayout {
        self.layout.as_ref()
    }

    /// Chapter directory for `book`, built on first use.
    pub async fn directory(&mut self, book: &str) -> Result<Arc<ChapterDirectory>, FetchError> {
        self.directories.build(book).await
    }

    /// Drops the cached directory so the next call walks the site again.
    pub fn forget_directory(&mut self, book: &str) -> bool {
        self.directories.cache_mut().invalidate(book)
    }

    /// Validates a requested range against the book's directory.
    pub async fn resolve(
        &mut self,
        book: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<ChapterRange, TrawlError> {
        let directory = self.directory(book).await?;
        Ok(resolve_range(&directory, start, end)?)
    }

    /// Fetches one chapter through its directory entry.
    ///
    /// An index missing from the directory is an error naming the gap.
    pub async fn fetch_chapter(&mut self, book: &str, index: ChapterIndex) -> Result<ChapterRecord, TrawlError> {
        let directory = self.directory(book).await?;
        let entry = directory.get(index).ok_or_else(|| FetchError::NotInDirectory {
            index: index.to_string(),
        })?;

        let markup = self.fetcher.fetch_page(&entry.source_location).await?;
        let page = self.layout.parse_chapter(&markup)?;

        let title = if page.title.trim().is_empty() {
            format!("{} {}", entry.native_index, entry.native_title)
                .trim()
                .to_string()
        } else {
            page.title
        };

        Ok(ChapterRecord {
            index,
            title,
            content: page.content,
        })
    }

    /// Fetches one chapter and writes it to the archive.
    pub async fn archive_chapter(&mut self, book: &str, index: ChapterIndex) -> Result<(PathBuf, String), TrawlError> {
        let record = self.fetch_chapter(book, index).await?;
        let path = self
            .archive
            .write_chapter(book, record.index, &record.title, &record.content)?;
        Ok((path, record.title))
    }

    /// Fetches and archives every chapter from `start` to `end`.
    ///
    /// Both endpoints are validated before any chapter is requested. With
    /// `skip_existing`, indices that already have a file are not fetched.
    pub async fn archive_range(
        &mut self,
        book: &str,
        start: Option<&str>,
        end: Option<&str>,
        skip_existing: bool,
    ) -> Result<RunReport, TrawlError> {
        let range = self.resolve(book, start, end).await?;
        let existing = if skip_existing {
            self.archive.archived_indices(book)?
        } else {
            BTreeSet::new()
        };

        let mut report = RunReport::default();
        let total = range.len();
        for (position, index) in range.indices().enumerate() {
            if existing.contains(&index) {
                self.console.chapter_skipped(position + 1, total, index.get());
                report.skipped.push(index);
                continue;
            }

            let (_, title) = self.archive_chapter(book, index).await?;
            self.console.chapter_done(position + 1, total, index.get(), &title);
            report.written.push(index);
        }

        tracing::info!(
            book,
            written = report.written.len(),
            skipped = report.skipped.len(),
            "range archived"
        );
        Ok(report)
    }

    /// Directory titles in index order, as the site lists them.
    pub async fn chapter_titles(&mut self, book: &str) -> Result<Vec<(ChapterIndex, String)>, TrawlError> {
        let directory = self.directory(book).await?;
        Ok(directory
            .iter_ordered()
            .into_iter()
            .map(|(index, entry)| (index, entry.native_title.clone()))
            .collect())
    }

    /// Archives the book page's details as metadata, plus the cover when
    /// the page links one.
    ///
    /// A cover that fails to download is logged and skipped.
    pub async fn archive_book_info(&mut self, book: &str) -> Result<BookMetadata, TrawlError> {
        let url = self.layout.book_url(book);
        let markup = self.fetcher.fetch_page(&url).await?;
        let details = self.layout.parse_book_details(&markup, &url);

        let mut metadata = BookMetadata::new();
        metadata.insert("book_id".to_string(), book.into());
        metadata.insert("site".to_string(), self.layout.id().into());
        metadata.insert("source".to_string(), url.into());
        if let Some(title) = details.title {
            metadata.insert("title".to_string(), title.into());
        }
        if let Some(author) = details.author {
            metadata.insert("Author".to_string(), author.into());
        }
        if let Some(description) = details.description {
            metadata.insert("description".to_string(), description.into());
        }

        if let Some(cover_url) = details.cover_url {
            match self.fetcher.fetch_bytes(&cover_url).await {
                Ok(image) => {
                    self.archive.save_cover(book, &image)?;
                }
                Err(e) => tracing::warn!(book, url = %cover_url, "cover download failed: {}", e),
            }
        }

        self.archive.save_metadata(book, &metadata)?;
        Ok(metadata)
    }
}

/// Translates archived chapters of one book into a second archive.
pub struct ArchiveTranslation<'a> {
    source: &'a Archive,
    target: &'a Archive,
    translator: &'a dyn TextTranslator,
    chunk_size: usize,
    titles: Option<&'a HashMap<ChapterIndex, String>>,
    console: Console,
}

impl<'a> ArchiveTranslation<'a> {
    pub fn new(
        source: &'a Archive,
        target: &'a Archive,
        translator: &'a dyn TextTranslator,
        chunk_size: usize,
    ) -> Self {
        Self {
            source,
            target,
            translator,
            chunk_size,
            titles: None,
            console: Console::new(),
        }
    }

    /// Uses pre-translated titles instead of translating them.
    /// Every chapter in the range must then have one.
    pub fn with_titles(mut self, titles: &'a HashMap<ChapterIndex, String>) -> Self {
        self.titles = Some(titles);
        self
    }

    /// Translates one archived chapter and writes it under the same index.
    pub async fn translate_chapter(&self, book: &str, index: ChapterIndex) -> Result<ChapterRecord, TrawlError> {
        let chapter = self.source.read_chapter(book, index)?;
        self.translator.start_chapter();

        let title = match self.titles {
            Some(titles) => titles
                .get(&index)
                .cloned()
                .ok_or(TrawlError::MissingTitle(index))?,
            None => self.translator.translate_title(chapter.title()).await?,
        };

        let mut translated = Vec::new();
        for chunk in split_text_into_line_chunks(&chapter.content, self.chunk_size) {
            translated.push(self.translator.translate(&chunk).await?);
        }
        let content = translated.join("\n");

        self.target.write_chapter(book, index, &title, &content)?;
        Ok(ChapterRecord { index, title, content })
    }

    /// Translates the archived chapters from `start` to `end`.
    ///
    /// Endpoints must be archived. The defaults are the lowest and highest
    /// archived indices; an index missing in between stops the run.
    pub async fn translate_range(
        &self,
        book: &str,
        start: Option<&str>,
        end: Option<&str>,
        skip_existing: bool,
    ) -> Result<RunReport, TrawlError> {
        let archived = self.source.archived_indices(book)?;
        let first = archived.first().copied().unwrap_or(ChapterIndex::FIRST);
        let range = resolve_span(
            |index| archived.contains(&index),
            first,
            archived.last().copied(),
            start,
            end,
        )?;

        let existing = if skip_existing {
            self.target.archived_indices(book)?
        } else {
            BTreeSet::new()
        };

        let mut report = RunReport::default();
        let total = range.len();
        for (position, index) in range.indices().enumerate() {
            if existing.contains(&index) {
                self.console.chapter_skipped(position + 1, total, index.get());
                report.skipped.push(index);
                continue;
            }

            let record = self.translate_chapter(book, index).await?;
            self.console.chapter_done(position + 1, total, index.get(), &record.title);
            report.written.push(index);
        }
        Ok(report)
    }
}
