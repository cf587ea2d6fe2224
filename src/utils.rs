//! Utility functions for common operations.

use crate::chapter::ChapterIndex;
use crate::error::TranslationError;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

static DEFAULT_CHAPTER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Chapter (\d+)").unwrap());

/// Splits text into chunks by lines, respecting a maximum chunk size.
///
/// Sizes are in bytes. Lines are kept whole where possible; a single line
/// longer than `chunk_size` is cut on character boundaries, since Chinese
/// prose has no spaces to break on.
pub fn split_text_into_line_chunks(text: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let mut chunks: Vec<String> = Vec::new();
    let mut current_chunk: Vec<&str> = Vec::new();
    let mut current_size: usize = 0;

    for line in text.lines() {
        if line.len() > chunk_size {
            if !current_chunk.is_empty() {
                chunks.push(current_chunk.join("\n"));
                current_chunk.clear();
                current_size = 0;
            }
            chunks.extend(split_long_line(line, chunk_size));
            continue;
        }

        let line_size = line.len() + if current_chunk.is_empty() { 0 } else { 1 };

        if current_size + line_size > chunk_size && !current_chunk.is_empty() {
            chunks.push(current_chunk.join("\n"));
            current_chunk = vec![line];
            current_size = line.len();
        } else {
            current_chunk.push(line);
            current_size += line_size;
        }
    }

    if !current_chunk.is_empty() {
        chunks.push(current_chunk.join("\n"));
    }

    chunks
}

fn split_long_line(line: &str, chunk_size: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for c in line.chars() {
        if !current.is_empty() && current.len() + c.len_utf8() > chunk_size {
            pieces.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Checks if an HTTP response is successful, and if not, returns a detailed error.
pub async fn check_response_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, TranslationError> {
    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(TranslationError::ApiError(format!(
            "HTTP {}: {}",
            status, text
        )));
    }
    Ok(response)
}

/// Pulls a chapter number out of a title or filename.
///
/// Uses the first capture group of `pattern` (default `Chapter (\d+)`,
/// case-insensitive). Returns 0 when nothing matches.
pub fn extract_chapter_number(text: &str, pattern: Option<&Regex>) -> u32 {
    let pattern = pattern.unwrap_or(&DEFAULT_CHAPTER_PATTERN);
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Reads a file of `{index}_{title}` lines into an index to title map.
///
/// Blank lines are skipped; lines without a valid index prefix are logged
/// and ignored.
pub fn load_translated_titles(path: &Path) -> std::io::Result<HashMap<ChapterIndex, String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_translated_titles(&content))
}

fn parse_translated_titles(content: &str) -> HashMap<ChapterIndex, String> {
    let mut titles = HashMap::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let parsed = line
            .split_once('_')
            .and_then(|(index, title)| Some((index.parse::<ChapterIndex>().ok()?, title.trim())));
        match parsed {
            Some((index, title)) => {
                titles.insert(index, title.to_string());
            }
            None => tracing::warn!(line, "ignoring translated title line without index"),
        }
    }
    titles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_empty_text() {
        let chunks = split_text_into_line_chunks("", 100);
        assert_eq!(chunks.len(), 0);
    }

    #[test]
    fn test_split_multiple_lines_fits() {
        let text = "Line 1\nLine 2\nLine 3";
        let chunks = split_text_into_line_chunks(text, 100);
        assert_eq!(chunks, vec![text]);
    }

    #[test]
    fn test_split_multiple_chunks_needed() {
        let text = "Line 1\nLine 2\nLine 3\nLine 4";
        let chunks = split_text_into_line_chunks(text, 15);
        assert_eq!(chunks, vec!["Line 1\nLine 2", "Line 3\nLine 4"]);
    }

    #[test]
    fn test_split_long_chinese_line_on_char_boundaries() {
        // Each character is 3 bytes; 10 bytes fit 3 characters.
        let text = "一二三四五六七";
        let chunks = split_text_into_line_chunks(text, 10);
        assert_eq!(chunks, vec!["一二三", "四五六", "七"]);
    }

    #[test]
    fn test_split_long_line_flushes_pending_lines() {
        let text = "ab\n一二三四\ncd";
        let chunks = split_text_into_line_chunks(text, 6);
        assert_eq!(chunks, vec!["ab", "一二", "三四", "cd"]);
    }

    #[test]
    fn test_split_with_empty_lines() {
        let text = "Line 1\n\nLine 3";
        let chunks = split_text_into_line_chunks(text, 100);
        assert_eq!(chunks, vec![text]);
    }

    #[test]
    fn test_extract_chapter_number_default_pattern() {
        assert_eq!(extract_chapter_number("Chapter 12: The Gate", None), 12);
        assert_eq!(extract_chapter_number("chapter 7", None), 7);
        assert_eq!(extract_chapter_number("Prologue", None), 0);
    }

    #[test]
    fn test_extract_chapter_number_custom_pattern() {
        let pattern = Regex::new(r"^(\d+)_").unwrap();
        assert_eq!(extract_chapter_number("42_Title.txt", Some(&pattern)), 42);
        assert_eq!(extract_chapter_number("Title.txt", Some(&pattern)), 0);

        let whole = Regex::new(r"\d+").unwrap();
        assert_eq!(extract_chapter_number("vol 3", Some(&whole)), 3);
    }

    #[test]
    fn test_parse_translated_titles() {
        let titles = parse_translated_titles(
            "1_Chapter 1: Beginning\n\n2_Chapter 2: Under_score\nno index\n0_Zero\n",
        );
        assert_eq!(titles.len(), 2);
        assert_eq!(
            titles[&ChapterIndex::new(2).unwrap()],
            "Chapter 2: Under_score"
        );
    }

    #[test]
    fn test_load_translated_titles_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(load_translated_titles(&dir.path().join("none.txt")).is_err());
    }
}
