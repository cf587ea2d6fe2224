//! EPUB export of an archived book.
//!
//! Reads chapters, cover and metadata from an [`Archive`] and packages them
//! as an EPUB 3 file with an EPUB 2 NCX for older readers.

use crate::archive::{Archive, BookMetadata};
use crate::chapter::ChapterIndex;
use crate::error::ExportError;
use chrono::Utc;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::Path;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Export settings.
#[derive(Debug, Clone)]
pub struct EpubOptions {
    /// BCP-47 language tag of the text.
    pub lang: String,
}

impl Default for EpubOptions {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
        }
    }
}

#[derive(Debug)]
struct ChapterDoc {
    stem: String,
    title: String,
    body: String,
}

/// Turns a book id like `martial-peak` into `Martial Peak`.
pub fn book_title_from_id(book_id: &str) -> String {
    book_id
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Writes `book` from `archive` to `out_path`, replacing any existing file.
///
/// Chapters go in index order; chapters with no text are left out. The
/// title comes from the archived metadata when present, otherwise from the
/// book id. Returns the number of chapters written.
pub fn export_epub(
    archive: &Archive,
    book: &str,
    out_path: &Path,
    options: &EpubOptions,
) -> Result<usize, ExportError> {
    let metadata = archive.load_metadata(book)?.unwrap_or_default();
    let cover = archive.load_cover(book)?;

    let mut chapters = Vec::new();
    for index in archive.archived_indices(book)? {
        let chapter = archive.read_chapter(book, index)?;
        if chapter.content.trim().is_empty() {
            tracing::info!(book, index = index.get(), "skipping empty chapter");
            continue;
        }
        let title = match chapter.title() {
            "" => format!("Chapter {}", index),
            title => title.to_string(),
        };
        chapters.push(ChapterDoc {
            stem: chapter_stem(index),
            body: render_text_body(&title, &chapter.content),
            title,
        });
    }
    if chapters.is_empty() {
        return Err(ExportError::NoChapters(book.to_string()));
    }

    let meta = |key: &str| metadata.get(key).and_then(|v| v.as_str()).map(str::trim);
    let title = meta("title")
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| book_title_from_id(book));
    let author = meta("Author").unwrap_or("Unknown").to_string();

    if let Some(description) = meta("description").filter(|d| !d.is_empty()) {
        chapters.insert(
            0,
            ChapterDoc {
                stem: "intro".to_string(),
                title: "Introduction".to_string(),
                body: render_text_body("Introduction", description),
            },
        );
    }

    let book_meta = BookMeta {
        identifier: format!("trawler-{}", book),
        title,
        author,
        lang: options.lang.clone(),
        modified: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        has_cover: cover.is_some(),
    };

    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| ExportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let file = File::create(out_path).map_err(|source| ExportError::Io {
        path: out_path.to_path_buf(),
        source,
    })?;

    let written = write_package(file, &book_meta, &chapters, cover.as_deref(), &metadata)
        .map_err(|e| match e {
            PackageError::Zip(e) => ExportError::Zip(e),
            PackageError::Io(source) => ExportError::Io {
                path: out_path.to_path_buf(),
                source,
            },
        })?;

    tracing::info!(book, path = %out_path.display(), chapters = written, "epub written");
    Ok(written)
}

fn chapter_stem(index: ChapterIndex) -> String {
    format!("chapter-{:05}", index.get())
}

struct BookMeta {
    identifier: String,
    title: String,
    author: String,
    lang: String,
    modified: String,
    has_cover: bool,
}

enum PackageError {
    Zip(zip::result::ZipError),
    Io(std::io::Error),
}

impl From<zip::result::ZipError> for PackageError {
    fn from(e: zip::result::ZipError) -> Self {
        PackageError::Zip(e)
    }
}

impl From<std::io::Error> for PackageError {
    fn from(e: std::io::Error) -> Self {
        PackageError::Io(e)
    }
}

/// Counts only real chapters, not the introduction.
fn write_package(
    file: File,
    meta: &BookMeta,
    chapters: &[ChapterDoc],
    cover: Option<&[u8]>,
    metadata: &BookMetadata,
) -> Result<usize, PackageError> {
    let mut zip = ZipWriter::new(file);

    // `mimetype` must be the first entry and stored uncompressed.
    let stored = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    zip.start_file("mimetype", stored)?;
    zip.write_all(b"application/epub+zip")?;

    let deflated = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let description = metadata.get("description").and_then(|v| v.as_str());
    let entries: [(&str, String); 5] = [
        ("META-INF/container.xml", render_container_xml()),
        ("OEBPS/content.opf", render_content_opf(meta, description, chapters)),
        ("OEBPS/nav.xhtml", render_nav_xhtml(meta, chapters)),
        ("OEBPS/toc.ncx", render_toc_ncx(meta, chapters)),
        ("OEBPS/style.css", default_style_css().to_string()),
    ];
    for (name, content) in entries {
        zip.start_file(name, deflated)?;
        zip.write_all(content.as_bytes())?;
    }

    if let Some(image) = cover {
        zip.start_file("OEBPS/images/cover.jpg", stored)?;
        zip.write_all(image)?;
    }

    for chapter in chapters {
        zip.start_file(format!("OEBPS/{}.xhtml", chapter.stem), deflated)?;
        zip.write_all(wrap_xhtml_document(&chapter.title, &meta.lang, &chapter.body).as_bytes())?;
    }

    zip.finish()?;
    Ok(chapters.iter().filter(|c| c.stem != "intro").count())
}

/// Heading plus one `<p>` per blank-line separated block.
fn render_text_body(title: &str, text: &str) -> String {
    let mut out = format!("  <h1>{}</h1>\n", xml_escape(title));
    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let lines: Vec<String> = paragraph.lines().map(|l| xml_escape(l.trim())).collect();
        out.push_str(&format!("  <p>{}</p>\n", lines.join("<br />")));
    }
    out
}

fn render_container_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#
    .to_string()
}

fn default_style_css() -> &'static str {
    r#"@charset "utf-8";

body { font-family: serif; margin: 5%; padding: 0; line-height: 1.6; }
h1 { text-align: center; margin: 1em 0; }
p { text-indent: 1.5em; margin: 0.6em 0; }
"#
}

fn render_content_opf(meta: &BookMeta, description: Option<&str>, chapters: &[ChapterDoc]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(&format!(
        "<package xmlns=\"http://www.idpf.org/2007/opf\" unique-identifier=\"bookid\" version=\"3.0\" xml:lang=\"{}\">\n",
        xml_escape(&meta.lang)
    ));
    out.push_str("  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n");
    out.push_str(&format!(
        "    <dc:identifier id=\"bookid\">{}</dc:identifier>\n",
        xml_escape(&meta.identifier)
    ));
    out.push_str(&format!("    <dc:title>{}</dc:title>\n", xml_escape(&meta.title)));
    out.push_str(&format!("    <dc:creator>{}</dc:creator>\n", xml_escape(&meta.author)));
    out.push_str(&format!("    <dc:language>{}</dc:language>\n", xml_escape(&meta.lang)));
    if let Some(description) = description {
        out.push_str(&format!(
            "    <dc:description>{}</dc:description>\n",
            xml_escape(description)
        ));
    }
    out.push_str(&format!(
        "    <meta property=\"dcterms:modified\">{}</meta>\n",
        xml_escape(&meta.modified)
    ));
    if meta.has_cover {
        out.push_str("    <meta name=\"cover\" content=\"cover-image\" />\n");
    }
    out.push_str("  </metadata>\n");

    out.push_str("  <manifest>\n");
    out.push_str(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\" />\n",
    );
    out.push_str("    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\" />\n");
    out.push_str("    <item id=\"css\" href=\"style.css\" media-type=\"text/css\" />\n");
    if meta.has_cover {
        out.push_str(
            "    <item id=\"cover-image\" href=\"images/cover.jpg\" media-type=\"image/jpeg\" properties=\"cover-image\" />\n",
        );
    }
    for ch in chapters {
        out.push_str(&format!(
            "    <item id=\"{0}\" href=\"{0}.xhtml\" media-type=\"application/xhtml+xml\" />\n",
            xml_escape(&ch.stem)
        ));
    }
    out.push_str("  </manifest>\n");

    out.push_str("  <spine toc=\"ncx\">\n");
    for ch in chapters {
        out.push_str(&format!("    <itemref idref=\"{}\" />\n", xml_escape(&ch.stem)));
    }
    out.push_str("  </spine>\n");
    out.push_str("</package>\n");
    out
}

fn render_nav_xhtml(meta: &BookMeta, chapters: &[ChapterDoc]) -> String {
    let mut items = String::new();
    for ch in chapters {
        items.push_str(&format!(
            "      <li><a href=\"{}.xhtml\">{}</a></li>\n",
            xml_escape(&ch.stem),
            xml_escape(&ch.title)
        ));
    }

    let body = format!(
        "  <h1>{}</h1>\n  <nav epub:type=\"toc\" id=\"toc\">\n    <ol>\n{}    </ol>\n  </nav>\n",
        xml_escape(&meta.title),
        items
    );
    wrap_xhtml_document(&meta.title, &meta.lang, &body).replacen(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\"",
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\"",
        1,
    )
}

fn render_toc_ncx(meta: &BookMeta, chapters: &[ChapterDoc]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n");
    out.push_str("  <head>\n");
    out.push_str(&format!(
        "    <meta name=\"dtb:uid\" content=\"{}\" />\n",
        xml_escape(&meta.identifier)
    ));
    out.push_str("    <meta name=\"dtb:depth\" content=\"1\" />\n");
    out.push_str("  </head>\n");
    out.push_str(&format!("  <docTitle><text>{}</text></docTitle>\n", xml_escape(&meta.title)));
    out.push_str("  <navMap>\n");
    for (i, ch) in chapters.iter().enumerate() {
        out.push_str(&format!(
            "    <navPoint id=\"navPoint-{0}\" playOrder=\"{0}\">\n      <navLabel><text>{1}</text></navLabel>\n      <content src=\"{2}.xhtml\" />\n    </navPoint>\n",
            i + 1,
            xml_escape(&ch.title),
            xml_escape(&ch.stem)
        ));
    }
    out.push_str("  </navMap>\n");
    out.push_str("</ncx>\n");
    out
}

fn wrap_xhtml_document(title: &str, lang: &str, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<!DOCTYPE html>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\" lang=\"{lang}\" xml:lang=\"{lang}\">\n\
         <head>\n  <title>{title}</title>\n  <meta charset=\"utf-8\" />\n  \
         <link rel=\"stylesheet\" type=\"text/css\" href=\"style.css\" />\n</head>\n\
         <body>\n{body}</body>\n</html>\n",
        lang = xml_escape(lang),
        title = xml_escape(title),
        body = body
    )
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn idx(n: u32) -> ChapterIndex {
        ChapterIndex::new(n).unwrap()
    }

    fn entry_names(path: &Path) -> Vec<String> {
        let file = File::open(path).unwrap();
        let zip = zip::ZipArchive::new(file).unwrap();
        zip.file_names().map(str::to_string).collect()
    }

    fn read_entry(path: &Path, name: &str) -> String {
        let mut zip = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut out = String::new();
        zip.by_name(name).unwrap().read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_book_title_from_id() {
        assert_eq!(book_title_from_id("martial-peak"), "Martial Peak");
        assert_eq!(book_title_from_id("the_KING-returns"), "The King Returns");
        assert_eq!(book_title_from_id("11992"), "11992");
    }

    #[test]
    fn test_render_text_body_splits_paragraphs() {
        let body = render_text_body("T & U", "First line\nsame para\n\n\nSecond <para>\n\n");
        assert_eq!(
            body,
            "  <h1>T &amp; U</h1>\n  <p>First line<br />same para</p>\n  <p>Second &lt;para&gt;</p>\n"
        );
    }

    #[test]
    fn test_export_layout() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::new(dir.path().join("archive"));
        archive.write_chapter("my-book", idx(10), "Chapter 10", "Ten.").unwrap();
        archive.write_chapter("my-book", idx(2), "Chapter 2", "Two.\n\nMore.").unwrap();
        archive.write_chapter("my-book", idx(3), "Chapter 3", "  \n").unwrap();
        archive.save_cover("my-book", b"JPEG").unwrap();

        let out = dir.path().join("out").join("my-book.epub");
        let written = export_epub(&archive, "my-book", &out, &EpubOptions::default()).unwrap();
        assert_eq!(written, 2);

        let mut zip = zip::ZipArchive::new(File::open(&out).unwrap()).unwrap();
        let first = zip.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), zip::CompressionMethod::Stored);
        drop(first);

        let names = entry_names(&out);
        let chapters: Vec<&String> = names.iter().filter(|n| n.starts_with("OEBPS/chapter-")).collect();
        assert_eq!(chapters, vec!["OEBPS/chapter-00002.xhtml", "OEBPS/chapter-00010.xhtml"]);
        assert!(names.contains(&"OEBPS/images/cover.jpg".to_string()));
        assert!(!names.contains(&"OEBPS/intro.xhtml".to_string()));

        let opf = read_entry(&out, "OEBPS/content.opf");
        assert!(opf.contains("<dc:title>My Book</dc:title>"));
        assert!(opf.contains("<dc:creator>Unknown</dc:creator>"));
        let spine = &opf[opf.find("<spine").unwrap()..];
        assert!(spine.find("chapter-00002").unwrap() < spine.find("chapter-00010").unwrap());
    }

    #[test]
    fn test_metadata_adds_author_and_introduction() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::new(dir.path());
        archive.write_chapter("b", idx(1), "Chapter 1", "Text").unwrap();
        let mut metadata = BookMetadata::new();
        metadata.insert("title".to_string(), "Nine Star Hegemon".into());
        metadata.insert("Author".to_string(), "Ordinary Magician".into());
        metadata.insert("description".to_string(), "A <great> tale.".into());
        archive.save_metadata("b", &metadata).unwrap();

        let out = dir.path().join("b.epub");
        assert_eq!(export_epub(&archive, "b", &out, &EpubOptions::default()).unwrap(), 1);

        let opf = read_entry(&out, "OEBPS/content.opf");
        assert!(opf.contains("<dc:title>Nine Star Hegemon</dc:title>"));
        assert!(opf.contains("<dc:creator>Ordinary Magician</dc:creator>"));
        assert!(opf.contains("<dc:description>A &lt;great&gt; tale.</dc:description>"));
        assert!(!opf.contains("cover-image"));

        let intro = read_entry(&out, "OEBPS/intro.xhtml");
        assert!(intro.contains("<p>A &lt;great&gt; tale.</p>"));
        let nav = read_entry(&out, "OEBPS/nav.xhtml");
        assert!(nav.find("intro.xhtml").unwrap() < nav.find("chapter-00001.xhtml").unwrap());
        assert!(nav.contains("xmlns:epub="));
    }

    #[test]
    fn test_empty_book_is_an_error() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::new(dir.path());
        archive.write_chapter("b", idx(1), "Blank", "").unwrap();

        let err = export_epub(&archive, "b", &dir.path().join("b.epub"), &EpubOptions::default()).unwrap_err();
        assert!(matches!(err, ExportError::NoChapters(_)));
    }
}
