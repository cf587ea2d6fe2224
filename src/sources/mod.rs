//! Source site interfaces and their implementations.
//!
//! A source is split in two: a [`PageFetcher`] that retrieves raw markup and
//! a [`SiteLayout`] that knows where a site keeps its table of contents and
//! how to pull entries, chapter text and book details out of its pages.

mod novelhi;
mod uukanshu;

pub use novelhi::NovelHiLayout;
pub use uukanshu::UukanshuLayout;

use crate::config::ScrapingConfig;
use crate::error::FetchError;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// How a site numbers the chapters in its table of contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Numbering {
    /// Title lines start with a native numeral that must be normalized.
    Native,
    /// The list is already in reading order; position is the index.
    Sequential,
}

/// A raw table-of-contents link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    /// Absolute chapter URL.
    pub location: String,
    /// Link text, e.g. `第十章 血脉觉醒`.
    pub title_line: String,
}

/// Everything extracted from one table-of-contents page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TocPage {
    /// Absolute URL of the following page, if any.
    pub next_page: Option<String>,
    pub entries: Vec<TocEntry>,
}

/// Title and text of a chapter page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterPage {
    pub title: String,
    pub content: String,
}

/// Book details shown on a site's book page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookDetails {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
}

/// Retrieves pages from a source. Failures are never retried.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches a page as text.
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;

    /// Fetches raw bytes (cover images).
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Site-specific markup knowledge.
pub trait SiteLayout: Send + Sync {
    /// Returns the human-readable name of this site.
    fn name(&self) -> &'static str;

    /// Returns the identifier used on the command line.
    fn id(&self) -> &'static str;

    /// How this site numbers its chapter list.
    fn numbering(&self) -> Numbering;

    /// First table-of-contents page for a book.
    fn toc_url(&self, book_id: &str) -> String;

    /// Page holding the book's title, author, synopsis and cover.
    fn book_url(&self, book_id: &str) -> String {
        self.toc_url(book_id)
    }

    /// Extracts entries and the next-page link from a table-of-contents page.
    fn parse_toc(&self, markup: &str, page_url: &str) -> Result<TocPage, FetchError>;

    /// Extracts the title and text of a chapter page.
    fn parse_chapter(&self, markup: &str) -> Result<ChapterPage, FetchError>;

    /// Extracts book details from the book page.
    fn parse_book_details(&self, markup: &str, page_url: &str) -> BookDetails {
        parse_open_graph_details(&Html::parse_document(markup), page_url)
    }
}

/// Registry of available site layouts.
pub struct SiteRegistry {
    layouts: Vec<Arc<dyn SiteLayout>>,
}

impl Default for SiteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteRegistry {
    /// Creates a registry with every supported site.
    pub fn new() -> Self {
        let layouts: Vec<Arc<dyn SiteLayout>> =
            vec![Arc::new(UukanshuLayout::new()), Arc::new(NovelHiLayout::new())];
        Self { layouts }
    }

    /// Finds a layout by its id.
    pub fn find(&self, id: &str) -> Option<Arc<dyn SiteLayout>> {
        self.layouts
            .iter()
            .find(|l| l.id().eq_ignore_ascii_case(id))
            .cloned()
    }

    /// Ids of all registered layouts.
    pub fn ids(&self) -> Vec<&'static str> {
        self.layouts.iter().map(|l| l.id()).collect()
    }
}

/// Common HTTP client configuration for sources.
pub fn create_http_client(user_agent: &str) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .cookie_store(true)
        .timeout(Duration::from_secs(30))
        .build()
}

/// Applies the politeness delay between requests.
pub async fn rate_limit(delay_sec: f64) {
    if delay_sec > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(delay_sec)).await;
    }
}

/// [`PageFetcher`] over HTTP with a fixed delay before every request.
pub struct HttpFetcher {
    client: reqwest::Client,
    delay_sec: f64,
}

impl HttpFetcher {
    pub fn new(config: &ScrapingConfig) -> Result<Self, FetchError> {
        Ok(Self {
            client: create_http_client(&config.user_agent)?,
            delay_sec: config.delay_between_requests_sec,
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        rate_limit(self.delay_sec).await;
        tracing::debug!(url, "GET");

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        Ok(self.get(url).await?.text().await?)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        Ok(self.get(url).await?.bytes().await?.to_vec())
    }
}

/// Resolves a possibly relative link against the page it appeared on.
pub fn resolve_url(base: &str, relative: &str) -> Result<String, FetchError> {
    let relative = relative.trim();
    if relative.starts_with("http://") || relative.starts_with("https://") {
        return Ok(relative.to_string());
    }

    url::Url::parse(base)
        .and_then(|b| b.join(relative))
        .map(|u| u.to_string())
        .map_err(|e| FetchError::InvalidUrl(format!("{} relative to {}: {}", relative, base, e)))
}

/// Collapses an element's text into trimmed, non-empty lines.
///
/// Uses the text of each `paragraph` match when there are any, otherwise
/// the element's own text nodes.
pub(crate) fn extract_lines(elem: ElementRef<'_>, paragraph: &Selector) -> String {
    let paragraphs: Vec<String> = elem
        .select(paragraph)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if !paragraphs.is_empty() {
        return paragraphs.join("\n");
    }

    elem.text()
        .flat_map(str::lines)
        .map(|line| line.trim().trim_start_matches('\u{3000}').trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

static OG_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:novel:book_name"]"#).unwrap());
static OG_AUTHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:novel:author"]"#).unwrap());
static OG_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:description"]"#).unwrap());
static OG_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:image"]"#).unwrap());

/// Reads the `og:` meta tags most Chinese novel sites publish.
pub(crate) fn parse_open_graph_details(doc: &Html, page_url: &str) -> BookDetails {
    let meta = |selector: &Selector| {
        doc.select(selector)
            .next()
            .and_then(|e| e.value().attr("content"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    BookDetails {
        title: meta(&OG_TITLE),
        author: meta(&OG_AUTHOR),
        description: meta(&OG_DESCRIPTION),
        cover_url: meta(&OG_IMAGE).and_then(|src| resolve_url(page_url, &src).ok()),
    }
}
