//! File-based archive of chapters, covers and book metadata.
//!
//! Layout under the archive root:
//!
//! ```text
//! {root}/{book}/{index}_{title}.txt
//! {root}/{book}/cover_image.jpg
//! {root}/{book}/book_info.json
//! ```
//!
//! The text before the first `_` of a chapter filename is its identity;
//! the title part is only for people browsing the directory.

use crate::chapter::ChapterIndex;
use crate::error::ArchiveError;
use crate::utils::extract_chapter_number;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

/// Fixed name of the cover image.
pub const COVER_FILENAME: &str = "cover_image.jpg";

/// Fixed name of the book metadata file.
pub const METADATA_FILENAME: &str = "book_info.json";

const CHAPTER_EXTENSION: &str = ".txt";

/// Longest sanitized title, in bytes, so filenames stay under common limits.
const MAX_TITLE_BYTES: usize = 200;

/// Free-form book metadata as stored in `book_info.json`.
pub type BookMetadata = serde_json::Map<String, serde_json::Value>;

/// A chapter read back from the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedChapter {
    pub index: ChapterIndex,
    /// File stem, e.g. `7_Some Title`.
    pub name: String,
    pub content: String,
}

impl ArchivedChapter {
    /// Title part of the file stem.
    pub fn title(&self) -> &str {
        self.name.split_once('_').map(|(_, t)| t).unwrap_or("")
    }
}

/// A line of an archived chapter containing a searched string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    pub file: String,
    /// 1-based line number within the file.
    pub line_number: usize,
    pub line: String,
}

/// Outcome of [`Archive::clean_lines`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanReport {
    pub files: usize,
    /// Lines that kept some text after the removal.
    pub edited: usize,
    /// Lines dropped because nothing but whitespace was left.
    pub removed: usize,
}

/// Makes a chapter title safe to use in a filename.
pub fn sanitize_title(title: &str) -> String {
    let mut safe = String::with_capacity(title.len());
    for c in title.trim().chars() {
        match c {
            '/' | '\\' => safe.push('-'),
            ':' => safe.push('_'),
            '?' | '<' | '>' | '"' | '|' | '*' => {}
            c if c.is_control() => {}
            c => safe.push(c),
        }
    }

    if safe.len() > MAX_TITLE_BYTES {
        let mut cut = MAX_TITLE_BYTES;
        while !safe.is_char_boundary(cut) {
            cut -= 1;
        }
        safe.truncate(cut);
    }

    safe.trim_end_matches(['.', ' ']).to_string()
}

/// Identity prefix of a chapter filename: everything before the first `_`.
pub fn index_prefix(filename: &str) -> Option<&str> {
    filename.split_once('_').map(|(prefix, _)| prefix)
}

/// Archive rooted at a directory. Holds no state besides the root.
#[derive(Debug, Clone)]
pub struct Archive {
    root: PathBuf,
}

impl Archive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn book_dir(&self, book: &str) -> PathBuf {
        self.root.join(book)
    }

    /// Filename a chapter is stored under.
    pub fn chapter_filename(index: ChapterIndex, title: &str) -> String {
        format!("{}_{}{}", index, sanitize_title(title), CHAPTER_EXTENSION)
    }

    /// Writes a chapter, replacing any file that already holds this index.
    ///
    /// A stored chapter whose title differs is removed so that one index
    /// never maps to two files.
    pub fn write_chapter(
        &self,
        book: &str,
        index: ChapterIndex,
        title: &str,
        content: &str,
    ) -> Result<PathBuf, ArchiveError> {
        let dir = self.book_dir(book);
        std::fs::create_dir_all(&dir).map_err(io_error(book, &dir))?;

        // The new file goes down first so a failed write leaves the old chapter in place.
        let filename = Self::chapter_filename(index, title);
        let path = dir.join(&filename);
        std::fs::write(&path, content).map_err(io_error(book, &path))?;

        for stale in self.files_with_index(book, index)? {
            if stale != filename {
                tracing::info!(book, index = index.get(), file = %stale, "replacing archived chapter");
                let stale_path = dir.join(&stale);
                std::fs::remove_file(&stale_path).map_err(io_error(book, &stale_path))?;
            }
        }
        Ok(path)
    }

    /// Deletes every file holding `index`. Returns how many were removed.
    pub fn remove_chapter(&self, book: &str, index: ChapterIndex) -> Result<usize, ArchiveError> {
        let files = self.files_with_index(book, index)?;
        let dir = self.book_dir(book);
        for name in &files {
            let path = dir.join(name);
            std::fs::remove_file(&path).map_err(io_error(book, &path))?;
        }
        Ok(files.len())
    }

    /// Reads the chapter stored under `index`.
    pub fn read_chapter(&self, book: &str, index: ChapterIndex) -> Result<ArchivedChapter, ArchiveError> {
        let mut matches = self.files_with_index(book, index)?;
        let filename = match matches.len() {
            0 => {
                return Err(ArchiveError::NotFound {
                    book: book.to_string(),
                    index: index.to_string(),
                });
            }
            1 => matches.remove(0),
            _ => {
                matches.sort();
                return Err(ArchiveError::Ambiguous {
                    book: book.to_string(),
                    index: index.to_string(),
                    names: matches,
                });
            }
        };

        let path = self.book_dir(book).join(&filename);
        let content = std::fs::read_to_string(&path).map_err(io_error(book, &path))?;
        let name = filename
            .strip_suffix(CHAPTER_EXTENSION)
            .unwrap_or(&filename)
            .to_string();

        Ok(ArchivedChapter {
            index,
            name,
            content,
        })
    }

    /// Indices that already have a chapter file.
    pub fn archived_indices(&self, book: &str) -> Result<BTreeSet<ChapterIndex>, ArchiveError> {
        Ok(self
            .chapter_files(book)?
            .iter()
            .filter_map(|name| index_prefix(name)?.parse().ok())
            .collect())
    }

    /// Chapter filenames, without the cover and metadata files.
    ///
    /// With `order`, files are sorted by the integer in the pattern's first
    /// capture group (files without a match sort first). Without it, the
    /// filesystem's directory order is kept.
    pub fn list_ordered(&self, book: &str, order: Option<&Regex>) -> Result<Vec<String>, ArchiveError> {
        let mut files = self.chapter_files(book)?;
        if let Some(pattern) = order {
            files.sort_by_key(|name| extract_chapter_number(name, Some(pattern)));
        }
        Ok(files)
    }

    /// Finds up to `limit` lines containing `needle`, walking chapter files
    /// in index order.
    pub fn find_lines(&self, book: &str, needle: &str, limit: usize) -> Result<Vec<LineMatch>, ArchiveError> {
        if needle.is_empty() {
            return Err(ArchiveError::EmptySearch);
        }

        let mut files = self.chapter_files(book)?;
        files.sort_by_cached_key(|name| {
            let index = index_prefix(name).and_then(|p| p.parse::<ChapterIndex>().ok());
            (index.map_or(u32::MAX, ChapterIndex::get), name.clone())
        });

        let dir = self.book_dir(book);
        let mut matches = Vec::new();
        for file in files {
            if matches.len() >= limit {
                break;
            }
            let path = dir.join(&file);
            let content = std::fs::read_to_string(&path).map_err(io_error(book, &path))?;
            for (i, line) in content.lines().enumerate() {
                if matches.len() >= limit {
                    break;
                }
                if line.contains(needle) {
                    matches.push(LineMatch {
                        file: file.clone(),
                        line_number: i + 1,
                        line: line.to_string(),
                    });
                }
            }
        }
        Ok(matches)
    }

    /// Removes `needle` from the matched lines and drops lines left blank.
    ///
    /// Only lines listed in `matches` are touched, so a limited search cleans
    /// exactly what was shown. Edited lines are trimmed; other lines and
    /// line endings are kept as they are.
    pub fn clean_lines(&self, book: &str, needle: &str, matches: &[LineMatch]) -> Result<CleanReport, ArchiveError> {
        if needle.is_empty() {
            return Err(ArchiveError::EmptySearch);
        }

        let mut by_file: BTreeMap<&str, BTreeSet<usize>> = BTreeMap::new();
        for m in matches {
            by_file.entry(m.file.as_str()).or_default().insert(m.line_number);
        }

        let dir = self.book_dir(book);
        let mut report = CleanReport::default();
        for (file, line_numbers) in by_file {
            let path = dir.join(file);
            let content = std::fs::read_to_string(&path).map_err(io_error(book, &path))?;

            let mut cleaned = String::with_capacity(content.len());
            for (i, line) in content.split_inclusive('\n').enumerate() {
                let text = line.trim_end_matches(['\r', '\n']);
                if !line_numbers.contains(&(i + 1)) || !text.contains(needle) {
                    cleaned.push_str(line);
                    continue;
                }

                let stripped = text.replace(needle, "");
                if stripped.trim().is_empty() {
                    report.removed += 1;
                } else {
                    cleaned.push_str(stripped.trim());
                    cleaned.push_str(&line[text.len()..]);
                    report.edited += 1;
                }
            }

            std::fs::write(&path, cleaned).map_err(io_error(book, &path))?;
            report.files += 1;
        }

        tracing::info!(
            book,
            files = report.files,
            edited = report.edited,
            removed = report.removed,
            "cleaned archived chapters"
        );
        Ok(report)
    }

    pub fn save_cover(&self, book: &str, image: &[u8]) -> Result<PathBuf, ArchiveError> {
        let dir = self.book_dir(book);
        std::fs::create_dir_all(&dir).map_err(io_error(book, &dir))?;
        let path = dir.join(COVER_FILENAME);
        std::fs::write(&path, image).map_err(io_error(book, &path))?;
        Ok(path)
    }

    /// Cover image bytes, or `None` if the book has no cover.
    pub fn load_cover(&self, book: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
        let path = self.book_dir(book).join(COVER_FILENAME);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(book, "no cover image archived");
                Ok(None)
            }
            Err(e) => Err(io_error(book, &path)(e)),
        }
    }

    pub fn save_metadata(&self, book: &str, metadata: &BookMetadata) -> Result<PathBuf, ArchiveError> {
        let dir = self.book_dir(book);
        std::fs::create_dir_all(&dir).map_err(io_error(book, &dir))?;
        let path = dir.join(METADATA_FILENAME);
        let json = serde_json::to_string_pretty(metadata).map_err(|source| ArchiveError::Metadata {
            book: book.to_string(),
            source,
        })?;
        std::fs::write(&path, json).map_err(io_error(book, &path))?;
        Ok(path)
    }

    /// Book metadata, or `None` if none was archived.
    pub fn load_metadata(&self, book: &str) -> Result<Option<BookMetadata>, ArchiveError> {
        let path = self.book_dir(book).join(METADATA_FILENAME);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(book, "no book metadata archived");
                return Ok(None);
            }
            Err(e) => return Err(io_error(book, &path)(e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| ArchiveError::Metadata {
                book: book.to_string(),
                source,
            })
    }

    fn chapter_files(&self, book: &str) -> Result<Vec<String>, ArchiveError> {
        let dir = self.book_dir(book);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(book, &dir)(e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_error(book, &dir))?;
            let is_file = entry.file_type().map_err(io_error(book, &entry.path()))?.is_file();
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_file && name != COVER_FILENAME && name != METADATA_FILENAME {
                files.push(name);
            }
        }
        Ok(files)
    }

    fn files_with_index(&self, book: &str, index: ChapterIndex) -> Result<Vec<String>, ArchiveError> {
        let key = index.to_string();
        Ok(self
            .chapter_files(book)?
            .into_iter()
            .filter(|name| index_prefix(name) == Some(key.as_str()))
            .collect())
    }
}

fn io_error(book: &str, path: &Path) -> impl FnOnce(io::Error) -> ArchiveError {
    let book = book.to_string();
    let path = path.to_path_buf();
    move |source| ArchiveError::Io { book, path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn idx(n: u32) -> ChapterIndex {
        ChapterIndex::new(n).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::new(dir.path());

        let path = archive.write_chapter("book", idx(7), "Some Title", "content").unwrap();
        assert_eq!(path, dir.path().join("book").join("7_Some Title.txt"));

        let chapter = archive.read_chapter("book", idx(7)).unwrap();
        assert_eq!(chapter.name, "7_Some Title");
        assert_eq!(chapter.content, "content");
        assert_eq!(chapter.title(), "Some Title");
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("a/b\\c"), "a-b-c");
        assert_eq!(sanitize_title("Part 1: Dawn?"), "Part 1_ Dawn");
        assert_eq!(sanitize_title("<\"x\"|*>"), "x");
        assert_eq!(sanitize_title(" 第十章 血脉觉醒 "), "第十章 血脉觉醒");
        assert_eq!(sanitize_title("trailing..."), "trailing");

        let long = "章".repeat(100);
        let safe = sanitize_title(&long);
        assert!(safe.len() <= MAX_TITLE_BYTES);
        assert!(safe.chars().all(|c| c == '章'));
    }

    #[test]
    fn test_sanitized_title_round_trip() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::new(dir.path());

        archive.write_chapter("book", idx(3), "A/B: C?", "text").unwrap();
        let chapter = archive.read_chapter("book", idx(3)).unwrap();
        assert_eq!(chapter.name, "3_A-B_ C");
        assert_eq!(chapter.title(), "A-B_ C");
    }

    #[test]
    fn test_rewrite_with_new_title_replaces_old_file() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::new(dir.path());

        archive.write_chapter("book", idx(2), "Old", "v1").unwrap();
        archive.write_chapter("book", idx(2), "New", "v2").unwrap();

        let files = archive.list_ordered("book", None).unwrap();
        assert_eq!(files, vec!["2_New.txt"]);
        assert_eq!(archive.read_chapter("book", idx(2)).unwrap().content, "v2");
    }

    #[test]
    fn test_failed_rewrite_keeps_old_chapter() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::new(dir.path());

        archive.write_chapter("book", idx(2), "Old", "v1").unwrap();
        // A directory in the way makes the new file unwritable.
        std::fs::create_dir(dir.path().join("book").join("2_New.txt")).unwrap();

        let err = archive.write_chapter("book", idx(2), "New", "v2").unwrap_err();
        assert!(matches!(err, ArchiveError::Io { .. }));

        let chapter = archive.read_chapter("book", idx(2)).unwrap();
        assert_eq!(chapter.name, "2_Old");
        assert_eq!(chapter.content, "v1");
    }

    #[test]
    fn test_prefix_is_exact() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::new(dir.path());

        archive.write_chapter("book", idx(1), "One", "1").unwrap();
        archive.write_chapter("book", idx(12), "Twelve", "12").unwrap();
        archive.write_chapter("book", idx(1), "One again", "1b").unwrap();

        assert_eq!(archive.read_chapter("book", idx(12)).unwrap().content, "12");
        assert_eq!(archive.read_chapter("book", idx(1)).unwrap().content, "1b");
    }

    #[test]
    fn test_missing_chapter() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::new(dir.path());

        let err = archive.read_chapter("nothing", idx(1)).unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound { .. }));

        archive.write_chapter("book", idx(1), "One", "1").unwrap();
        let err = archive.read_chapter("book", idx(2)).unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound { .. }));
    }

    #[test]
    fn test_duplicate_prefix_is_ambiguous() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::new(dir.path());
        let book_dir = dir.path().join("book");
        std::fs::create_dir_all(&book_dir).unwrap();
        std::fs::write(book_dir.join("5_a.txt"), "a").unwrap();
        std::fs::write(book_dir.join("5_b.txt"), "b").unwrap();

        match archive.read_chapter("book", idx(5)).unwrap_err() {
            ArchiveError::Ambiguous { names, .. } => assert_eq!(names, vec!["5_a.txt", "5_b.txt"]),
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(archive.remove_chapter("book", idx(5)).unwrap(), 2);
        assert!(archive.list_ordered("book", None).unwrap().is_empty());
    }

    #[test]
    fn test_listing_excludes_cover_and_metadata() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::new(dir.path());

        archive.write_chapter("book", idx(10), "Ten", "x").unwrap();
        archive.save_cover("book", &[0xFF, 0xD8]).unwrap();
        archive.write_chapter("book", idx(2), "Two", "x").unwrap();
        archive.save_metadata("book", &BookMetadata::new()).unwrap();
        archive.write_chapter("book", idx(1), "One", "x").unwrap();

        let mut files = archive.list_ordered("book", None).unwrap();
        files.sort();
        assert_eq!(files, vec!["10_Ten.txt", "1_One.txt", "2_Two.txt"]);

        let pattern = Regex::new(r"^(\d+)_").unwrap();
        let ordered = archive.list_ordered("book", Some(&pattern)).unwrap();
        assert_eq!(ordered, vec!["1_One.txt", "2_Two.txt", "10_Ten.txt"]);
    }

    #[test]
    fn test_archived_indices() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::new(dir.path());
        assert!(archive.archived_indices("book").unwrap().is_empty());

        archive.write_chapter("book", idx(3), "Three", "x").unwrap();
        archive.write_chapter("book", idx(1), "One", "x").unwrap();
        archive.save_cover("book", b"img").unwrap();

        let indices: Vec<u32> = archive
            .archived_indices("book")
            .unwrap()
            .into_iter()
            .map(ChapterIndex::get)
            .collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn test_cover_round_trip_and_absence() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::new(dir.path());

        assert_eq!(archive.load_cover("book").unwrap(), None);
        archive.save_cover("book", b"jpeg bytes").unwrap();
        archive.save_cover("book", b"newer bytes").unwrap();
        assert_eq!(archive.load_cover("book").unwrap(), Some(b"newer bytes".to_vec()));
    }

    #[test]
    fn test_metadata_round_trip_and_absence() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::new(dir.path());
        assert!(archive.load_metadata("book").unwrap().is_none());

        let mut metadata = BookMetadata::new();
        metadata.insert("Author".to_string(), "平凡魔术师".into());
        metadata.insert("description".to_string(), "简介".into());
        let path = archive.save_metadata("book", &metadata).unwrap();

        let raw = std::fs::read_to_string(path).unwrap();
        assert!(raw.contains("\n  \"Author\": \"平凡魔术师\""));
        assert_eq!(archive.load_metadata("book").unwrap(), Some(metadata));
    }

    #[test]
    fn test_find_lines_in_index_order_with_limit() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::new(dir.path());

        archive.write_chapter("book", idx(10), "Ten", "正文\n请收藏本站 uukanshu\n").unwrap();
        archive.write_chapter("book", idx(2), "Two", "uukanshu 首发\n正文\nuukanshu\n").unwrap();
        archive.save_metadata("book", &BookMetadata::new()).unwrap();

        let all = archive.find_lines("book", "uukanshu", 200).unwrap();
        let found: Vec<(&str, usize)> = all.iter().map(|m| (m.file.as_str(), m.line_number)).collect();
        assert_eq!(found, vec![("2_Two.txt", 1), ("2_Two.txt", 3), ("10_Ten.txt", 2)]);
        assert_eq!(all[2].line, "请收藏本站 uukanshu");

        let limited = archive.find_lines("book", "uukanshu", 2).unwrap();
        assert_eq!(limited, all[..2].to_vec());

        assert!(archive.find_lines("book", "absent", 200).unwrap().is_empty());
        assert!(matches!(
            archive.find_lines("book", "", 200),
            Err(ArchiveError::EmptySearch)
        ));
    }

    #[test]
    fn test_clean_lines_strips_and_drops_blank_lines() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::new(dir.path());

        archive
            .write_chapter("book", idx(1), "One", "第一段\r\n  www.uukanshu.cc  \r\n林动 www.uukanshu.cc 说\r\n 保留缩进\r\n")
            .unwrap();
        archive.write_chapter("book", idx(2), "Two", "www.uukanshu.cc").unwrap();

        let matches = archive.find_lines("book", "www.uukanshu.cc", 200).unwrap();
        assert_eq!(matches.len(), 3);
        let report = archive.clean_lines("book", "www.uukanshu.cc", &matches).unwrap();
        assert_eq!(report, CleanReport { files: 2, edited: 1, removed: 2 });

        assert_eq!(
            archive.read_chapter("book", idx(1)).unwrap().content,
            "第一段\r\n林动  说\r\n 保留缩进\r\n"
        );
        assert_eq!(archive.read_chapter("book", idx(2)).unwrap().content, "");
    }

    #[test]
    fn test_clean_lines_leaves_unlisted_lines() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::new(dir.path());
        archive.write_chapter("book", idx(1), "One", "ad\ntext\nad\n").unwrap();

        let first = archive.find_lines("book", "ad", 1).unwrap();
        let report = archive.clean_lines("book", "ad", &first).unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(archive.read_chapter("book", idx(1)).unwrap().content, "text\nad\n");
    }

    #[test]
    fn test_invalid_metadata() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::new(dir.path());
        std::fs::create_dir_all(dir.path().join("book")).unwrap();
        std::fs::write(dir.path().join("book").join(METADATA_FILENAME), "{not json").unwrap();

        let err = archive.load_metadata("book").unwrap_err();
        assert!(matches!(err, ArchiveError::Metadata { .. }));
    }
}
