//! Shared test doubles for the trawler test suite.
//!
//! Provides an in-memory [`PageFetcher`] that records every request, a
//! plain-text [`SiteLayout`] so directory and trawl tests do not depend on
//! HTML, and a [`TextTranslator`] that tags its input.
//!
//! Table-of-contents pages for [`LineLayout`] are one entry per line as
//! `location|title line`, plus an optional `next <url>` line. Chapter pages
//! are the title on the first line and the content after it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{FetchError, TranslationError};
use crate::sources::{ChapterPage, Numbering, PageFetcher, SiteLayout, TocEntry, TocPage};
use crate::translator::TextTranslator;

// =========================================================================
// Fetcher
// =========================================================================

/// Serves canned pages; unknown URLs answer 404.
#[derive(Default)]
pub struct MockFetcher {
    pages: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    /// URLs requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn serve(&self, url: &str) -> Result<&String, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.pages.get(url).ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        self.serve(url).cloned()
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.serve(url).map(|body| body.as_bytes().to_vec())
    }
}

// =========================================================================
// Layout
// =========================================================================

/// Line-oriented layout rooted at `mock://{book}/toc`.
pub struct LineLayout {
    numbering: Numbering,
}

impl LineLayout {
    pub fn native() -> Self {
        Self {
            numbering: Numbering::Native,
        }
    }

    pub fn sequential() -> Self {
        Self {
            numbering: Numbering::Sequential,
        }
    }
}

impl SiteLayout for LineLayout {
    fn name(&self) -> &'static str {
        "Line"
    }

    fn id(&self) -> &'static str {
        "line"
    }

    fn numbering(&self) -> Numbering {
        self.numbering
    }

    fn toc_url(&self, book_id: &str) -> String {
        format!("mock://{}/toc", book_id)
    }

    fn book_url(&self, book_id: &str) -> String {
        format!("mock://{}/info", book_id)
    }

    fn parse_toc(&self, markup: &str, _page_url: &str) -> Result<TocPage, FetchError> {
        let mut page = TocPage::default();
        for line in markup.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(next) = line.strip_prefix("next ") {
                page.next_page = Some(next.trim().to_string());
                continue;
            }
            let (location, title_line) = line
                .split_once('|')
                .ok_or_else(|| FetchError::ElementNotFound(format!("toc entry in line: {}", line)))?;
            page.entries.push(TocEntry {
                location: location.to_string(),
                title_line: title_line.to_string(),
            });
        }
        Ok(page)
    }

    fn parse_chapter(&self, markup: &str) -> Result<ChapterPage, FetchError> {
        let (title, content) = markup.split_once('\n').unwrap_or((markup, ""));
        Ok(ChapterPage {
            title: title.trim().to_string(),
            content: content.to_string(),
        })
    }
}

// =========================================================================
// Translator
// =========================================================================

/// Returns `EN(<input>)`; fails for any input containing `fail_on`.
#[derive(Default)]
pub struct MockTranslator {
    fail_on: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_on: Some(marker.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextTranslator for MockTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        self.calls.lock().unwrap().push(text.to_string());
        if let Some(marker) = &self.fail_on
            && text.contains(marker.as_str())
        {
            return Err(TranslationError::ApiError(format!("refused {}", marker)));
        }
        Ok(format!("EN({})", text))
    }
}
