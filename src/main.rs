//! Trawler CLI - Chinese web novel archiver and translator.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use trawler::archive::Archive;
use trawler::chapter::ChapterIndex;
use trawler::config::Config;
use trawler::console::Console;
use trawler::discrepancy::RuleTable;
use trawler::export::{EpubOptions, export_epub};
use trawler::sources::{SiteLayout, SiteRegistry};
use trawler::translator::create_translator;
use trawler::trawler::{ArchiveTranslation, Trawler};
use trawler::utils::load_translated_titles;

/// Chinese web novel archiver and translator.
#[derive(Parser, Debug)]
#[command(name = "trawler")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source site.
    #[arg(long, global = true, default_value = "uukanshu")]
    site: String,

    /// Use this config file instead of the one in the user config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show debug diagnostics.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and archive a single chapter.
    Chapter {
        book: String,
        index: ChapterIndex,
    },

    /// Fetch and archive a range of chapters.
    Archive {
        book: String,

        /// First chapter (default 1).
        #[arg(long)]
        start: Option<String>,

        /// Last chapter (default: highest in the table of contents).
        #[arg(long)]
        end: Option<String>,

        /// Do not fetch chapters that are already archived.
        #[arg(long)]
        skip_existing: bool,

        /// Do not fetch book details and cover.
        #[arg(long)]
        no_info: bool,
    },

    /// List chapter titles from the table of contents.
    Titles { book: String },

    /// Translate archived chapters into the translated archive.
    Translate {
        book: String,

        /// First chapter (default: lowest archived).
        #[arg(long)]
        start: Option<String>,

        /// Last chapter (default: highest archived).
        #[arg(long)]
        end: Option<String>,

        /// Do not translate chapters that are already translated.
        #[arg(long)]
        skip_existing: bool,

        /// File of `{index}_{title}` lines to use instead of translating titles.
        #[arg(long)]
        titles: Option<PathBuf>,
    },

    /// Package an archived book as EPUB.
    Export {
        book: String,

        /// Export the translated archive instead of the source one.
        #[arg(long)]
        translated: bool,

        /// Output file (default: `{export_directory}/{book}.epub`).
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Language tag written to the EPUB.
        #[arg(long)]
        lang: Option<String>,
    },

    /// Remove a watermark or ad string from archived chapters.
    Clean {
        book: String,

        /// Text to remove. Lines left empty are dropped.
        text: String,

        /// Most lines to change in one run.
        #[arg(long, default_value_t = 200)]
        limit: usize,

        /// Clean the translated archive instead of the source one.
        #[arg(long)]
        translated: bool,

        /// Apply without asking.
        #[arg(long, short)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    trawler::logging::init(args.verbose)?;
    let console = Console::new();

    console.section("Trawler - Web Novel Archiver");

    console.step("Loading configuration...");
    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    match args.command {
        Command::Chapter { book, index } => {
            let mut trawler = open_trawler(&config, &args.site, &console)?;
            console.step(&format!("Fetching chapter {} of {}...", index, book));
            let (path, title) = trawler
                .archive_chapter(&book, index)
                .await
                .with_context(|| format!("Failed to archive chapter {}", index))?;
            console.success(&format!("{} -> {}", title, path.display()));
        }

        Command::Archive {
            book,
            start,
            end,
            skip_existing,
            no_info,
        } => {
            let mut trawler = open_trawler(&config, &args.site, &console)?;

            if !no_info {
                console.step("Fetching book details...");
                match trawler.archive_book_info(&book).await {
                    Ok(metadata) => {
                        let title = metadata.get("title").and_then(|v| v.as_str()).unwrap_or(&book);
                        console.success(&format!("Found: {}", title));
                    }
                    Err(e) => console.warning(&format!("Could not archive book details: {}", e)),
                }
            }

            console.step("Building chapter directory...");
            let directory = trawler
                .directory(&book)
                .await
                .context("Failed to build chapter directory")?;
            console.success(&format!("Found {} chapters", directory.len()));

            let report = trawler
                .archive_range(&book, start.as_deref(), end.as_deref(), skip_existing)
                .await
                .context("Archiving stopped")?;
            console.success(&format!(
                "Archived {} chapters ({} skipped) to {}",
                report.written.len(),
                report.skipped.len(),
                trawler.archive().book_dir(&book).display()
            ));
        }

        Command::Titles { book } => {
            let mut trawler = open_trawler(&config, &args.site, &console)?;
            let titles = trawler
                .chapter_titles(&book)
                .await
                .context("Failed to build chapter directory")?;
            for (index, title) in &titles {
                println!("{}\t{}", index, title);
            }
            console.success(&format!("{} chapters", titles.len()));
        }

        Command::Translate {
            book,
            start,
            end,
            skip_existing,
            titles,
        } => {
            config
                .validate_for_translation()
                .context("Invalid translation configuration")?;
            let translator = create_translator(&config)?;
            let source = Archive::new(&config.paths.archive_directory);
            let target = Archive::new(&config.paths.translated_directory);

            let title_map = titles
                .as_deref()
                .map(|path| {
                    load_translated_titles(path)
                        .with_context(|| format!("Failed to read titles file {}", path.display()))
                })
                .transpose()?;

            let mut run = ArchiveTranslation::new(
                &source,
                &target,
                translator.as_ref(),
                config.translation.chunk_size_chars,
            );
            if let Some(map) = &title_map {
                run = run.with_titles(map);
            }

            console.step(&format!("Translating {} ({:?} backend)...", book, config.translation.backend));
            let report = run
                .translate_range(&book, start.as_deref(), end.as_deref(), skip_existing)
                .await
                .context("Translation stopped")?;
            console.success(&format!(
                "Translated {} chapters ({} skipped) to {}",
                report.written.len(),
                report.skipped.len(),
                target.book_dir(&book).display()
            ));
        }

        Command::Export {
            book,
            translated,
            output,
            lang,
        } => {
            let archive = Archive::new(archive_root(&config, translated));
            let out_path =
                output.unwrap_or_else(|| config.paths.export_directory.join(format!("{}.epub", book)));
            let options = EpubOptions {
                lang: lang.unwrap_or_else(|| if translated { "en" } else { "zh" }.to_string()),
            };

            console.step(&format!("Exporting {}...", book));
            let chapters = export_epub(&archive, &book, &out_path, &options)
                .with_context(|| format!("Failed to export {}", book))?;
            console.success(&format!("Wrote {} chapters to {}", chapters, out_path.display()));
        }

        Command::Clean {
            book,
            text,
            limit,
            translated,
            yes,
        } => {
            let archive = Archive::new(archive_root(&config, translated));
            let matches = archive
                .find_lines(&book, &text, limit)
                .with_context(|| format!("Failed to search {}", book))?;
            if matches.is_empty() {
                console.info(&format!("No occurrences of '{}' found", text));
            } else {
                console.step(&format!("Found {} occurrences of '{}':", matches.len(), text));
                for m in &matches {
                    println!("{} (line {}): {}", m.file, m.line_number, m.line.trim());
                }

                if yes || confirm("Remove the text and drop lines left empty? (yes/no): ")? {
                    let report = archive
                        .clean_lines(&book, &text, &matches)
                        .with_context(|| format!("Failed to clean {}", book))?;
                    console.success(&format!(
                        "Cleaned {} files: {} lines edited, {} lines removed",
                        report.files, report.edited, report.removed
                    ));
                } else {
                    console.warning("Aborted, nothing changed");
                }
            }
        }
    }

    console.section("Done!");
    Ok(())
}

/// Builds an HTTP trawler for `site` with the configured discrepancy rules.
fn open_trawler(config: &Config, site: &str, console: &Console) -> Result<Trawler> {
    let registry = SiteRegistry::new();
    let layout: Arc<dyn SiteLayout> = registry.find(site).with_context(|| {
        format!(
            "Unknown site '{}' (available: {})",
            site,
            registry.ids().join(", ")
        )
    })?;
    console.info(&format!("Using {} layout", layout.name()));

    let rules_path = config.discrepancy_rules_path()?;
    let rules = RuleTable::load_from(&rules_path)
        .with_context(|| format!("Failed to load discrepancy rules from {}", rules_path.display()))?;
    if !rules.is_empty() {
        console.info(&format!("Loaded {} discrepancy rules", rules.len()));
    }

    Ok(Trawler::from_config(config, layout, rules)?)
}

fn archive_root(config: &Config, translated: bool) -> &Path {
    if translated {
        &config.paths.translated_directory
    } else {
        &config.paths.archive_directory
    }
}

/// Asks on stdin; only `yes` or `y` confirms.
fn confirm(question: &str) -> Result<bool> {
    print!("{}", question);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "yes" | "y"))
}
