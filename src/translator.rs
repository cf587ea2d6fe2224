//! Translation backends for archived chapters.
//!
//! [`ChatTranslator`] talks to an OpenAI-compatible chat completions API with
//! streaming progress, a rolling message history and retry logic.
//! [`NovelHiTranslator`] posts text to NovelHi's machine translation endpoint.

use crate::config::{ApiConfig, Config, PromptsConfig, TranslationBackend, TranslationConfig};
use crate::console::Console;
use crate::error::TranslationError;
use crate::sources::rate_limit;
use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use reqwest::Client;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::sync::{LazyLock, Mutex};
use std::time::{Duration, Instant};

/// Refusal phrases that indicate the model declined to translate.
static REFUSAL_PHRASES: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    vec![
        "i'm sorry",
        "i cannot",
        "i am unable",
        "as an ai",
        "my apologies",
        "i am not programmed",
        "i do not have the ability",
    ]
});

/// Translates chapter text, one chunk per call.
#[async_trait]
pub trait TextTranslator: Send + Sync {
    /// Translates one chunk of chapter content.
    async fn translate(&self, text: &str) -> Result<String, TranslationError>;

    /// Translates a chapter title.
    async fn translate_title(&self, title: &str) -> Result<String, TranslationError> {
        self.translate(title).await
    }

    /// Called before the first chunk of each chapter.
    fn start_chapter(&self) {}
}

/// Builds the translator selected by `translation.backend`.
pub fn create_translator(config: &Config) -> Result<Box<dyn TextTranslator>, TranslationError> {
    match config.translation.backend {
        TranslationBackend::Chat => Ok(Box::new(ChatTranslator::new(
            config.api.clone(),
            config.translation.clone(),
            &config.prompts,
        ))),
        TranslationBackend::NovelHi => Ok(Box::new(NovelHiTranslator::new(&config.translation)?)),
    }
}

// =========================================================================
// Chat completions
// =========================================================================

/// A message in the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role: "system", "user", or "assistant".
    pub role: String,
    pub content: String,
}

impl Message {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// One parsed server-sent event line.
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Content(String),
    Done,
    Ignored,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.trim_end_matches('\r').strip_prefix("data:") else {
        return SseLine::Ignored;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
        return SseLine::Ignored;
    };
    let content: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.and_then(|d| d.content))
        .collect();
    if content.is_empty() {
        SseLine::Ignored
    } else {
        SseLine::Content(content)
    }
}

/// Collects raw stream bytes and hands out complete lines.
///
/// Network chunks can end inside an event or inside a multi-byte character,
/// so bytes are only decoded once their line is complete.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Whatever is left after the stream ends without a final newline.
    fn finish(self) -> String {
        String::from_utf8_lossy(&self.pending).into_owned()
    }
}

/// Rejects empty answers and answers that open with a refusal.
fn check_refusal(response: &str) -> Result<String, TranslationError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(TranslationError::Refused("Empty response".to_string()));
    }

    let lower = trimmed.to_lowercase();
    if let Some(phrase) = REFUSAL_PHRASES.iter().find(|p| lower.starts_with(*p)) {
        return Err(TranslationError::Refused(format!(
            "Response starts with refusal phrase: {}",
            phrase
        )));
    }
    Ok(trimmed.to_string())
}

/// Keeps the system message and the last `pairs` user/assistant pairs.
fn trim_history(history: &mut Vec<Message>, pairs: usize) {
    let max_messages = 1 + pairs * 2;
    if history.len() > max_messages {
        let remove_count = history.len() - max_messages;
        history.drain(1..1 + remove_count);
    }
}

/// Longest wait between two attempts.
const MAX_BACKOFF_SECS: u64 = 300;

/// Exponential backoff after the given failed attempt, capped.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt).min(MAX_BACKOFF_SECS))
}

fn snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Translator backed by an OpenAI-compatible chat completions API.
///
/// Content chunks of one chapter share a conversation so later chunks see
/// earlier translations; [`TextTranslator::start_chapter`] resets it.
pub struct ChatTranslator {
    client: Client,
    api_config: ApiConfig,
    translation_config: TranslationConfig,
    title_prompt: String,
    content_prompt: String,
    history: Mutex<Vec<Message>>,
    console: Console,
}

impl ChatTranslator {
    pub fn new(api_config: ApiConfig, translation_config: TranslationConfig, prompts: &PromptsConfig) -> Self {
        Self {
            client: Client::new(),
            api_config,
            translation_config,
            title_prompt: prompts.title_translation.clone(),
            content_prompt: prompts.content_translation.clone(),
            history: Mutex::new(vec![Message::new("system", &prompts.content_translation)]),
            console: Console::new(),
        }
    }

    fn history_snapshot(&self) -> Vec<Message> {
        match self.history.lock() {
            Ok(history) => history.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record_exchange(&self, chunk: &str, translated: &str) {
        let mut history = match self.history.lock() {
            Ok(history) => history,
            Err(poisoned) => poisoned.into_inner(),
        };
        history.push(Message::new("user", chunk));
        history.push(Message::new("assistant", translated));
        trim_history(&mut history, self.translation_config.history_length);
    }

    /// Sends `messages` with retries and exponential backoff.
    async fn complete_with_retries(&self, messages: &[Message]) -> Result<String, TranslationError> {
        let attempts = self.translation_config.retries.max(1);

        for attempt in 1..=attempts {
            match self.complete(messages).await {
                Ok(translated) => {
                    rate_limit(self.translation_config.delay_between_requests_sec).await;
                    return Ok(translated);
                }
                Err(e) if attempt < attempts => {
                    let delay = backoff_delay(attempt);
                    self.console.warning(&format!(
                        "Translation failed ({}), retrying in {:?} (attempt {}/{})",
                        e,
                        delay,
                        attempt + 1,
                        attempts
                    ));
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.console.error(&format!("Translation failed: {}", e));
                }
            }
        }

        Err(TranslationError::RetriesExhausted { attempts })
    }

    /// One streaming request.
    async fn complete(&self, messages: &[Message]) -> Result<String, TranslationError> {
        let request = ChatRequest {
            model: &self.api_config.model,
            messages,
            stream: true,
        };

        let url = format!("{}/chat/completions", self.api_config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_config.key)
            .json(&request)
            .send()
            .await?;
        let response = crate::utils::check_response_status(response).await?;

        let mut full_response = String::new();
        let mut lines = LineBuffer::default();
        let start_time = Instant::now();
        let mut last_update = Instant::now();
        let mut stream = response.bytes_stream();

        'stream: while let Some(bytes) = stream.next().await {
            for line in lines.push(&bytes?) {
                match parse_sse_line(&line) {
                    SseLine::Content(content) => full_response.push_str(&content),
                    SseLine::Done => break 'stream,
                    SseLine::Ignored => {}
                }
            }

            if last_update.elapsed() >= Duration::from_secs(1) {
                self.display_progress(&full_response, start_time.elapsed());
                last_update = Instant::now();
            }
        }
        if let SseLine::Content(content) = parse_sse_line(&lines.finish()) {
            full_response.push_str(&content);
        }

        self.console.clear_line();
        check_refusal(&full_response)
    }

    fn display_progress(&self, response: &str, elapsed: Duration) {
        let char_count = response.chars().count();
        let speed = if elapsed.as_secs_f64() > 0.0 {
            char_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let tail: Vec<char> = response.chars().rev().take(50).collect();
        let preview: String = tail
            .into_iter()
            .rev()
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect();

        self.console.stream_progress(char_count, speed, &preview);
    }
}

#[async_trait]
impl TextTranslator for ChatTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let mut messages = self.history_snapshot();
        messages.push(Message::new("user", text));

        let translated = self.complete_with_retries(&messages).await?;
        self.record_exchange(text, &translated);
        Ok(translated)
    }

    async fn translate_title(&self, title: &str) -> Result<String, TranslationError> {
        if title.trim().is_empty() {
            return Ok(String::new());
        }
        self.console
            .info(&format!("Translating title 「{}」", snippet(title, 30)));

        let messages = [
            Message::new("system", &self.title_prompt),
            Message::new("user", title),
        ];
        self.complete_with_retries(&messages).await
    }

    fn start_chapter(&self) {
        let mut history = match self.history.lock() {
            Ok(history) => history,
            Err(poisoned) => poisoned.into_inner(),
        };
        *history = vec![Message::new("system", &self.content_prompt)];
    }
}

// =========================================================================
// NovelHi
// =========================================================================

static BR_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(<br\s*/?>\s*)+").unwrap());

#[derive(Debug, Serialize)]
struct NovelHiRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct NovelHiResponse {
    data: Option<NovelHiData>,
}

#[derive(Debug, Deserialize)]
struct NovelHiData {
    content: Option<String>,
}

/// Extracts `data.content` from a NovelHi answer.
fn parse_novelhi_response(body: &str) -> Result<String, TranslationError> {
    let response: NovelHiResponse =
        serde_json::from_str(body).map_err(|e| TranslationError::ParseError(e.to_string()))?;
    response
        .data
        .and_then(|d| d.content)
        .ok_or_else(|| TranslationError::ParseError("missing data.content".to_string()))
}

/// Converts an HTML fragment to plain text, one line per `<br>` run.
fn html_fragment_to_text(html: &str) -> String {
    let with_breaks = BR_RUN.replace_all(html, "\n");
    let fragment = Html::parse_fragment(&with_breaks);
    let text: String = fragment.root_element().text().collect();

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Translator backed by NovelHi's translate endpoint.
pub struct NovelHiTranslator {
    client: Client,
    url: String,
    delay_sec: f64,
}

impl NovelHiTranslator {
    pub fn new(config: &TranslationConfig) -> Result<Self, TranslationError> {
        if config.novelhi_token.trim().is_empty() {
            return Err(TranslationError::InvalidConfig(
                "translation.novelhi_token is not set".to_string(),
            ));
        }
        Ok(Self {
            client: Client::new(),
            url: format!(
                "{}/{}",
                config.novelhi_endpoint.trim_end_matches('/'),
                config.novelhi_token.trim()
            ),
            delay_sec: config.delay_between_requests_sec,
        })
    }
}

#[async_trait]
impl TextTranslator for NovelHiTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        rate_limit(self.delay_sec).await;
        let response = self
            .client
            .post(&self.url)
            .json(&NovelHiRequest { content: text })
            .send()
            .await?;
        let body = crate::utils::check_response_status(response).await?.text().await?;

        let translated = html_fragment_to_text(&parse_novelhi_response(&body)?);
        if translated.is_empty() {
            return Err(TranslationError::Refused("Empty response".to_string()));
        }
        Ok(translated)
    }
}
