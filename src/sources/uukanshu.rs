//! UU Kanshu (uukanshu.cc) layout.
//!
//! Chapter links carry Chinese numerals (`第一百零五章 …`) and the table of
//! contents is split over several pages.

use super::{ChapterPage, Numbering, SiteLayout, TocEntry, TocPage, extract_lines, resolve_url};
use crate::error::FetchError;
use scraper::{Html, Selector};

const BASE_URL: &str = "https://uukanshu.cc";

/// CSS selectors used for parsing.
struct Selectors {
    /// Chapter links in the table of contents.
    toc_entry: Selector,
    /// Explicit next-page link of the table of contents.
    next_page: Selector,
    /// Any link, for the text-based next-page fallback.
    link: Selector,
    /// Chapter heading.
    chapter_title: Selector,
    /// Chapter body.
    content: Selector,
    /// Paragraph selector.
    paragraph: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            toc_entry: Selector::parse("#list-chapterAll dd > a, ul.chapterlist li > a").unwrap(),
            next_page: Selector::parse("a.next, .pagination a[rel=next]").unwrap(),
            link: Selector::parse("a").unwrap(),
            chapter_title: Selector::parse("h1").unwrap(),
            content: Selector::parse("p.readcotent, div.readcotent").unwrap(),
            paragraph: Selector::parse(".readcotent > p").unwrap(),
        }
    }
}

/// Layout for uukanshu.cc books.
pub struct UukanshuLayout {
    selectors: Selectors,
}

impl Default for UukanshuLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl UukanshuLayout {
    pub fn new() -> Self {
        Self {
            selectors: Selectors::new(),
        }
    }

    fn find_next_page(&self, doc: &Html) -> Option<String> {
        if let Some(elem) = doc.select(&self.selectors.next_page).next()
            && let Some(href) = elem.value().attr("href")
        {
            return Some(href.to_string());
        }

        // Fallback: a link whose text is "下一页" (next page)
        doc.select(&self.selectors.link)
            .find(|elem| {
                let text = elem.text().collect::<String>();
                text.contains("下一页") || text.contains("下页")
            })
            .and_then(|elem| elem.value().attr("href"))
            .map(str::to_string)
    }
}

impl SiteLayout for UukanshuLayout {
    fn name(&self) -> &'static str {
        "UU Kanshu"
    }

    fn id(&self) -> &'static str {
        "uukanshu"
    }

    fn numbering(&self) -> Numbering {
        Numbering::Native
    }

    fn toc_url(&self, book_id: &str) -> String {
        format!("{}/book/{}/", BASE_URL, book_id)
    }

    fn parse_toc(&self, markup: &str, page_url: &str) -> Result<TocPage, FetchError> {
        let doc = Html::parse_document(markup);

        let entries = doc
            .select(&self.selectors.toc_entry)
            .filter_map(|elem| {
                let href = elem.value().attr("href")?;
                let title_line = elem.text().collect::<String>().trim().to_string();
                Some((href, title_line))
            })
            .map(|(href, title_line)| {
                resolve_url(page_url, href).map(|location| TocEntry {
                    location,
                    title_line,
                })
            })
            .collect::<Result<Vec<_>, FetchError>>()?;

        let next_page = match self.find_next_page(&doc) {
            // Last pages often link back to themselves or to "#".
            Some(href) if href.starts_with('#') || href.starts_with("javascript") => None,
            Some(href) => {
                let resolved = resolve_url(page_url, &href)?;
                (resolved != page_url).then_some(resolved)
            }
            None => None,
        };

        Ok(TocPage { next_page, entries })
    }

    fn parse_chapter(&self, markup: &str) -> Result<ChapterPage, FetchError> {
        let doc = Html::parse_document(markup);

        let title = doc
            .select(&self.selectors.chapter_title)
            .next()
            .map(|e| e.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FetchError::ElementNotFound("chapter title".to_string()))?;

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

    const TOC_PAGE: &str = r##"<html><body>
        <div id="list-chapterAll"><dl>
          <dd><a href="/book/11992/1001.html">第一章 九星霸体</a></dd>
          <dd><a href="/book/11992/1002.html"> 第二章 觉醒 </a></dd>
          <dd><a>第三章 no link</a></dd>
        </dl></div>
        <div class="pages"><a href="index_2.html">下一页</a></div>
    </body></html>"##;

    #[test]
    fn test_parse_toc_page() {
        let layout = UukanshuLayout::new();
        let page = layout
            .parse_toc(TOC_PAGE, "https://uukanshu.cc/book/11992/")
            .unwrap();

        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].location, "https://uukanshu.cc/book/11992/1001.html");
        assert_eq!(page.entries[0].title_line, "第一章 九星霸体");
        assert_eq!(page.entries[1].title_line, "第二章 觉醒");
        assert_eq!(
            page.next_page.as_deref(),
            Some("https://uukanshu.cc/book/11992/index_2.html")
        );
    }

    #[test]
    fn test_last_page_has_no_next() {
        let layout = UukanshuLayout::new();
        let html = r##"<div id="list-chapterAll"><dd><a href="/b/9.html">第九章</a></dd></div>
            <a class="next" href="#">下一页</a>"##;
        let page = layout.parse_toc(html, "https://uukanshu.cc/book/1/").unwrap();
        assert_eq!(page.entries.len(), 1);
        assert!(page.next_page.is_none());
    }

    #[test]
    fn test_parse_chapter() {
        let layout = UukanshuLayout::new();
        let html = "<html><body><h1>第一章 九星霸体</h1>\
            <p class=\"readcotent bbb font-normal\">\u{3000}\u{3000}第一段<br>\u{3000}\u{3000}第二段</p>\
            </body></html>";
        let chapter = layout.parse_chapter(html).unwrap();
        assert_eq!(chapter.title, "第一章 九星霸体");
        assert_eq!(chapter.content, "第一段\n第二段");
    }

    #[test]
    fn test_parse_chapter_missing_content() {
        let layout = UukanshuLayout::new();
        let err = layout.parse_chapter("<h1>第一章</h1>").unwrap_err();
        assert!(matches!(err, FetchError::ElementNotFound(_)));
    }
}
