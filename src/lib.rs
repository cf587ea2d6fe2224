//! Trawler - Chinese web novel archiver and translator.
//!
//! This library provides functionality for:
//! - Building a chapter directory from a site's paginated table of contents,
//!   normalizing native numerals and correcting known numbering mistakes
//! - Resolving chapter ranges and archiving chapters, covers and metadata
//! - Translating archived chapters and exporting them as EPUB

pub mod archive;
pub mod chapter;
pub mod config;
pub mod console;
pub mod directory;
pub mod discrepancy;
pub mod error;
pub mod export;
pub mod logging;
pub mod numeral;
pub mod range;
pub mod sources;
pub mod translator;
pub mod trawler;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use archive::{Archive, ArchivedChapter, BookMetadata, CleanReport, LineMatch};
pub use chapter::{ChapterIndex, ChapterRecord};
pub use config::Config;
pub use console::Console;
pub use directory::{ChapterDirectory, ChapterDirectoryEntry, DirectoryBuilder};
pub use discrepancy::{DiscrepancyRule, RuleTable};
pub use error::{
    ArchiveError, ConfigError, ConversionError, ExportError, FetchError, RangeError, TranslationError,
    TrawlError,
};
pub use range::{ChapterRange, resolve_range};
pub use sources::{PageFetcher, SiteLayout, SiteRegistry};
pub use translator::TextTranslator;
pub use trawler::{ArchiveTranslation, RunReport, Trawler};
