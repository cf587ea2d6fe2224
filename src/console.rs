//! Terminal output for the CLI and long-running runs.
//!
//! Colors are used only when stdout is a terminal and `NO_COLOR` is unset.

use std::io::{self, IsTerminal, Write};

/// Kind of line being printed; picks the label and its color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Ok,
    Warn,
    Error,
    Step,
    Skip,
    Progress,
}

impl Tone {
    fn label(self) -> &'static str {
        match self {
            Tone::Info => "INFO",
            Tone::Ok => "OK",
            Tone::Warn => "WARN",
            Tone::Error => "ERROR",
            Tone::Step => "STEP",
            Tone::Skip => "SKIP",
            Tone::Progress => "..",
        }
    }

    /// SGR parameters, always bold.
    fn sgr(self) -> &'static str {
        match self {
            Tone::Info => "1;34",
            Tone::Ok => "1;32",
            Tone::Warn => "1;33",
            Tone::Error => "1;31",
            Tone::Step | Tone::Progress => "1;36",
            Tone::Skip => "1;90",
        }
    }
}

const HEADING_SGR: &str = "1;35";
const MUTED_SGR: &str = "2;90";
const NUMBER_SGR: &str = "1;32";
const RESET: &str = "\x1b[0m";

/// Console writer. Cheap to copy into translators and runs.
#[derive(Debug, Clone, Copy)]
pub struct Console {
    colors: bool,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        let colors = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { colors }
    }

    pub fn with_colors(colors: bool) -> Self {
        Self { colors }
    }

    fn paint(&self, text: &str, sgr: &str) -> String {
        if self.colors {
            format!("\x1b[{}m{}{}", sgr, text, RESET)
        } else {
            text.to_string()
        }
    }

    /// `[LABEL] message` for the given tone.
    pub fn line(&self, tone: Tone, message: &str) -> String {
        format!("[{}] {}", self.paint(tone.label(), tone.sgr()), message)
    }

    pub fn info(&self, message: &str) {
        println!("{}", self.line(Tone::Info, message));
    }

    pub fn success(&self, message: &str) {
        println!("{}", self.line(Tone::Ok, message));
    }

    pub fn warning(&self, message: &str) {
        println!("{}", self.line(Tone::Warn, message));
    }

    /// Errors go to stderr.
    pub fn error(&self, message: &str) {
        eprintln!("{}", self.line(Tone::Error, message));
    }

    pub fn step(&self, message: &str) {
        println!("{}", self.line(Tone::Step, message));
    }

    pub fn section(&self, title: &str) {
        println!();
        println!("{}", self.paint(title, HEADING_SGR));
    }

    /// Erases the progress line. No-op without a terminal.
    pub fn clear_line(&self) {
        if self.colors {
            print!("\r\x1b[2K");
            let _ = io::stdout().flush();
        }
    }

    /// Text of the streaming progress line.
    pub fn stream_progress_line(&self, chars: usize, chars_per_sec: f64, preview: &str) -> String {
        self.line(
            Tone::Progress,
            &format!(
                "Progress: {} chars at {}. {}",
                self.paint(&chars.to_string(), NUMBER_SGR),
                self.paint(&format!("{:.0}/sec", chars_per_sec), "1;33"),
                self.paint(&format!("{}...", preview), MUTED_SGR)
            ),
        )
    }

    /// Redraws the streaming progress line in place.
    pub fn stream_progress(&self, chars: usize, chars_per_sec: f64, preview: &str) {
        self.clear_line();
        print!("{}", self.stream_progress_line(chars, chars_per_sec, preview));
        let _ = io::stdout().flush();
    }

    /// `[3/10] Chapter 7`
    pub fn chapter_position(&self, position: usize, total: usize, index: u32) -> String {
        self.paint(&format!("[{}/{}] Chapter {}", position, total, index), "1;36")
    }

    /// One line per processed chapter of a range.
    pub fn chapter_done(&self, position: usize, total: usize, index: u32, title: &str) {
        let position = self.chapter_position(position, total, index);
        println!("{}", self.line(Tone::Ok, &format!("{} {}", position, title)));
    }

    /// A chapter of a range that was left alone.
    pub fn chapter_skipped(&self, position: usize, total: usize, index: u32) {
        let position = self.chapter_position(position, total, index);
        let note = self.paint("already archived", MUTED_SGR);
        println!("{}", self.line(Tone::Skip, &format!("{} {}", position, note)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_lines() {
        let console = Console::with_colors(false);
        assert_eq!(console.line(Tone::Warn, "careful"), "[WARN] careful");
        assert_eq!(console.line(Tone::Skip, "x"), "[SKIP] x");
        assert_eq!(console.chapter_position(3, 10, 7), "[3/10] Chapter 7");
    }

    #[test]
    fn test_colored_label() {
        let console = Console::with_colors(true);
        let line = console.line(Tone::Error, "boom");
        assert!(line.starts_with("[\x1b[1;31mERROR\x1b[0m]"));
        assert!(line.ends_with(" boom"));
    }

    #[test]
    fn test_stream_progress_line() {
        let console = Console::with_colors(false);
        assert_eq!(
            console.stream_progress_line(1234, 56.4, "林动 said"),
            "[..] Progress: 1234 chars at 56/sec. 林动 said..."
        );
    }
}
