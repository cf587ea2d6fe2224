//! Error types for the trawler.
//!
//! Uses `thiserror` for structured error definitions, one enum per concern.
//! The binary wraps these in `anyhow` with extra context.

use std::path::PathBuf;
use thiserror::Error;

/// A site-native chapter numeral could not be converted to an index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// Nothing left to convert after stripping wrappers.
    #[error("Empty chapter numeral")]
    Empty,

    /// A character outside the supported numeral systems.
    #[error("Unrecognised character '{ch}' in chapter numeral '{input}'")]
    UnknownCharacter { input: String, ch: char },

    /// Characters are valid but do not form a well-formed number.
    #[error("Malformed chapter numeral '{0}'")]
    Malformed(String),

    /// The value is zero or does not fit a chapter index.
    #[error("Chapter numeral '{0}' is out of range")]
    OutOfRange(String),
}

/// Retrieval failure against a source site.
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// The required element isn't found in the page
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// URL parsing or validation failed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Index lies inside a requested range but the directory has no entry for it.
    #[error(
        "Chapter {index} lies inside the requested range but is missing from the chapter \
         directory (the source numbering has a gap here)"
    )]
    NotInDirectory { index: String },

    /// Table of contents kept reporting a next page.
    #[error("Table of contents exceeded {limit} pages")]
    PageLimit { limit: u32 },
}

/// A requested range endpoint is not usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("Bad starting chapter number '{0}': not present in the chapter directory")]
    BadStart(String),

    #[error("Bad ending chapter number '{0}': not present in the chapter directory")]
    BadEnd(String),

    #[error("Starting chapter {start} is after ending chapter {end}")]
    Inverted { start: u32, end: u32 },

    #[error("Chapter directory is empty, no default ending chapter")]
    EmptyDirectory,
}

/// Error type for archive operations.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// No archived file carries the requested index prefix.
    #[error("Chapter {index} not found in archive for '{book}'")]
    NotFound { book: String, index: String },

    /// More than one archived file carries the requested index prefix.
    #[error("Chapter {index} of '{book}' is ambiguous: {names:?}")]
    Ambiguous {
        book: String,
        index: String,
        names: Vec<String>,
    },

    /// Filesystem failure, with the book and path involved.
    #[error("I/O error for '{book}' at {}: {source}", path.display())]
    Io {
        book: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line search was asked for the empty string.
    #[error("Search text must not be empty")]
    EmptySearch,

    /// Metadata file could not be (de)serialised.
    #[error("Invalid book metadata for '{book}': {source}")]
    Metadata {
        book: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Error type for translation operations.
#[derive(Error, Debug)]
pub enum TranslationError {
    /// HTTP request to API failed
    #[error("API request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error: {0}")]
    ApiError(String),

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Translation was refused by the model
    #[error("Translation refused: {0}")]
    Refused(String),

    /// All retry attempts exhausted
    #[error("All retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// Invalid API configuration
    #[error("Invalid API configuration: {0}")]
    InvalidConfig(String),
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Missing required configuration value
    #[error("Missing required config value: {0}")]
    MissingValue(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Error type for EPUB export.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Failed to write EPUB {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to assemble EPUB: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("No chapters with content in archive for '{0}'")]
    NoChapters(String),
}

/// Failure of a trawl or translate run.
#[derive(Error, Debug)]
pub enum TrawlError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    /// A translated titles file has no line for this chapter.
    #[error("No translated title for chapter {0}")]
    MissingTitle(crate::chapter::ChapterIndex),
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
