//! NovelHi (novelhi.com) layout.
//!
//! The chapter list is a single page already in reading order, so the
//! position in the list is the chapter index.

use super::{ChapterPage, Numbering, SiteLayout, TocEntry, TocPage, extract_lines, resolve_url};
use crate::error::FetchError;
use scraper::{Html, Selector};

const BASE_URL: &str = "https://novelhi.com";

struct Selectors {
    toc_entry: Selector,
    chapter_title: Selector,
    content: Selector,
    paragraph: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            toc_entry: Selector::parse(".dirList li a, ul.chapter-list li a").unwrap(),
            chapter_title: Selector::parse(".book_title h1, h1").unwrap(),
            content: Selector::parse("#showReading").unwrap(),
            paragraph: Selector::parse("sent, p").unwrap(),
        }
    }
}

/// Layout for novelhi.com books.
pub struct NovelHiLayout {
    selectors: Selectors,
}

impl Default for NovelHiLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl NovelHiLayout {
    pub fn new() -> Self {
        Self {
            selectors: Selectors::new(),
        }
    }
}

impl SiteLayout for NovelHiLayout {
    fn name(&self) -> &'static str {
        "NovelHi"
    }

    fn id(&self) -> &'static str {
        "novelhi"
    }

    fn numbering(&self) -> Numbering {
        Numbering::Sequential
    }

    fn toc_url(&self, book_id: &str) -> String {
        format!("{}/s/index/{}", BASE_URL, book_id)
    }

    fn book_url(&self, book_id: &str) -> String {
        format!("{}/s/{}", BASE_URL, book_id)
    }

    fn parse_toc(&self, markup: &str, page_url: &str) -> Result<TocPage, FetchError> {
        let doc = Html::parse_document(markup);
        let mut entries = Vec::new();

        for elem in doc.select(&self.selectors.toc_entry) {
            let Some(href) = elem.value().attr("href") else {
                continue;
            };
            entries.push(TocEntry {
                location: resolve_url(page_url, href)?,
                title_line: elem.text().collect::<String>().trim().to_string(),
            });
        }

        Ok(TocPage {
            next_page: None,
            entries,
        })
    }

    fn parse_chapter(&self, markup: &str) -> Result<ChapterPage, FetchError> {
        let doc = Html::parse_document(markup);

        let title = doc
            .select(&self.selectors.chapter_title)
            .next()
            .map(|e| e.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let body = doc
            .select(&self.selectors.content)
            .next()
            .ok_or_else(|| FetchError::ElementNotFound("chapter content".to_string()))?;

        Ok(ChapterPage {
            title,
            content: extract_lines(body, &self.selectors.paragraph),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flat_toc() {
        let layout = NovelHiLayout::new();
        let html = r#"<ul class="dirList">
            <li><a href="/s/Nine-Star-Hegemon-Body-Art/1">Chapter 1 Nine Star</a></li>
            <li><a href="/s/Nine-Star-Hegemon-Body-Art/2">Chapter 2 Awakening</a></li>
        </ul>"#;
        let page = layout
            .parse_toc(html, "https://novelhi.com/s/index/Nine-Star-Hegemon-Body-Art")
            .unwrap();

        assert!(page.next_page.is_none());
        assert_eq!(page.entries.len(), 2);
        assert_eq!(
            page.entries[1].location,
            "https://novelhi.com/s/Nine-Star-Hegemon-Body-Art/2"
        );
        assert_eq!(page.entries[1].title_line, "Chapter 2 Awakening");
    }

    #[test]
    fn test_parse_chapter_paragraphs() {
        let layout = NovelHiLayout::new();
        let html = r#"<div class="book_title"><h1>Chapter 1 Nine Star</h1></div>
            <div id="showReading"><p>First.</p><p> </p><p>Second.</p></div>"#;
        let chapter = layout.parse_chapter(html).unwrap();
        assert_eq!(chapter.title, "Chapter 1 Nine Star");
        assert_eq!(chapter.content, "First.\nSecond.");
    }
}
