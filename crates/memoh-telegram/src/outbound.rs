//! Telegram outbound stream adapter — the Telegram-form implementation of
//! `memoh_channels::OutboundStream`'s single-message streaming edit state
//! machine: `(noMsg) -> sent -> editing -> finalizing -> closed`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use memoh_channels::OutboundStream;
use memoh_core::error::{MemohError, Result};
use memoh_core::StreamEvent;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, MessageId, ParseMode};
use tokio::sync::Mutex;
use tracing::warn;

/// Telegram's message limit is 4096 characters.
const MAX_MESSAGE_CHARS: usize = 4096;
/// Marker appended to an in-progress message so readers see more is coming.
const PENDING_SUFFIX: &str = "\n……";
/// Minimum interval between ordinary throttled edits.
const EDIT_INTERVAL: Duration = Duration::from_secs(5);
const FINAL_EDIT_MAX_RETRIES: u32 = 3;

struct State {
    message_id: Option<MessageId>,
    buffer: String,
    last_edited_text: String,
    last_edited_at: Option<Instant>,
}

impl State {
    fn new() -> Self {
        Self {
            message_id: None,
            buffer: String::new(),
            last_edited_text: String::new(),
            last_edited_at: None,
        }
    }

    fn reset(&mut self) {
        self.message_id = None;
        self.buffer.clear();
        self.last_edited_text.clear();
        self.last_edited_at = None;
    }
}

pub struct TelegramOutboundStream {
    bot: Bot,
    chat_id: ChatId,
    state: Mutex<State>,
}

impl TelegramOutboundStream {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id, state: Mutex::new(State::new()) }
    }

    async fn send_typing(&self) {
        let _ = self.bot.send_chat_action(self.chat_id, ChatAction::Typing).await;
    }

    async fn handle_text_delta(&self, delta: &str) -> Result<()> {
        if delta.is_empty() {
            return Ok(());
        }
        self.send_typing().await;

        let (message_id, send_buffer) = {
            let mut state = self.state.lock().await;
            state.buffer.push_str(delta);
            (state.message_id, state.buffer.clone())
        };

        match message_id {
            None => {
                let text = truncate_for_platform(&format!("{send_buffer}{PENDING_SUFFIX}"));
                let sent = self
                    .bot
                    .send_message(self.chat_id, &text)
                    .await
                    .map_err(|e| MemohError::Platform(e.to_string()))?;
                let mut state = self.state.lock().await;
                state.message_id = Some(sent.id);
                state.last_edited_text = text;
                state.last_edited_at = Some(Instant::now());
                Ok(())
            }
            Some(msg_id) => self.throttled_edit(msg_id, &send_buffer, true).await,
        }
    }

    /// Edit at most once per `EDIT_INTERVAL`; skip if the normalized content
    /// (ignoring the pending suffix and surrounding whitespace) hasn't
    /// changed.
    async fn throttled_edit(&self, message_id: MessageId, buffer: &str, pending: bool) -> Result<()> {
        let candidate_text = if pending { format!("{buffer}{PENDING_SUFFIX}") } else { buffer.to_string() };
        let candidate_text = truncate_for_platform(&candidate_text);

        {
            let state = self.state.lock().await;
            if let Some(last) = state.last_edited_at {
                if last.elapsed() < EDIT_INTERVAL {
                    return Ok(());
                }
            }
            if normalize(&state.last_edited_text) == normalize(&candidate_text) {
                return Ok(());
            }
        }

        self.apply_edit(message_id, &candidate_text, &candidate_text, 0, None).await
    }

    /// Unthrottled edit used by the final/error paths, with limited
    /// rate-limit retry honoring the server's `RetryAfter`. Converts the
    /// buffer's markdown to Telegram's HTML parse mode, falling back to the
    /// plain text if Telegram rejects the markup.
    async fn final_edit(&self, message_id: MessageId, text: &str) -> Result<()> {
        let plain = truncate_for_platform(text);
        let html = truncate_for_platform(&markdown_to_telegram_html(text));
        {
            let state = self.state.lock().await;
            if normalize(&state.last_edited_text) == normalize(&html) {
                return Ok(());
            }
        }
        self.apply_edit(message_id, &html, &plain, FINAL_EDIT_MAX_RETRIES, Some(ParseMode::Html)).await
    }

    async fn apply_edit(&self, message_id: MessageId, text: &str, plain_fallback: &str, max_retries: u32, mut parse_mode: Option<ParseMode>) -> Result<()> {
        let mut attempt = 0;
        let mut fell_back_to_plain = false;
        let mut current_text = text.to_string();
        loop {
            let mut request = self.bot.edit_message_text(self.chat_id, message_id, &current_text);
            if let Some(mode) = parse_mode {
                request = request.parse_mode(mode);
            }
            match request.await {
                Ok(_) => {
                    let mut state = self.state.lock().await;
                    state.last_edited_text = current_text.clone();
                    state.last_edited_at = Some(Instant::now());
                    return Ok(());
                }
                Err(e) => {
                    if is_not_modified(&e) {
                        let mut state = self.state.lock().await;
                        state.last_edited_text = current_text.clone();
                        state.last_edited_at = Some(Instant::now());
                        return Ok(());
                    }
                    if let Some(retry_after) = retry_after_secs(&e) {
                        let mut state = self.state.lock().await;
                        state.last_edited_at = Some(Instant::now() + Duration::from_secs(retry_after));
                        drop(state);
                        if attempt >= max_retries {
                            return Ok(());
                        }
                        attempt += 1;
                        tokio::time::sleep(Duration::from_secs(retry_after)).await;
                        continue;
                    }
                    // Telegram rejected the markup (bad HTML from a naive
                    // markdown conversion) — fall back to plain text once.
                    if parse_mode.is_some() && !fell_back_to_plain {
                        fell_back_to_plain = true;
                        parse_mode = None;
                        current_text = plain_fallback.to_string();
                        continue;
                    }
                    return Err(MemohError::Platform(e.to_string()));
                }
            }
        }
    }

    async fn ensure_message(&self, fallback_text: &str) -> Result<MessageId> {
        let existing = { self.state.lock().await.message_id };
        if let Some(id) = existing {
            return Ok(id);
        }
        let text = truncate_for_platform(fallback_text);
        let sent = self
            .bot
            .send_message(self.chat_id, &text)
            .await
            .map_err(|e| MemohError::Platform(e.to_string()))?;
        let mut state = self.state.lock().await;
        state.message_id = Some(sent.id);
        state.last_edited_text = text;
        state.last_edited_at = Some(Instant::now());
        Ok(sent.id)
    }
}

#[async_trait]
impl OutboundStream for TelegramOutboundStream {
    async fn forward(&mut self, event: &StreamEvent) -> Result<()> {
        match event {
            StreamEvent::AgentStart { .. }
            | StreamEvent::ReasoningStart
            | StreamEvent::ReasoningDelta { .. }
            | StreamEvent::ReasoningEnd
            | StreamEvent::TextStart
            | StreamEvent::TextEnd => Ok(()),

            StreamEvent::TextDelta { delta } => self.handle_text_delta(delta).await,

            StreamEvent::ToolCallStart { .. } => {
                let (message_id, buffer) = {
                    let state = self.state.lock().await;
                    (state.message_id, state.buffer.clone())
                };
                if let Some(id) = message_id {
                    self.final_edit(id, &buffer).await?;
                }
                self.state.lock().await.reset();
                Ok(())
            }

            StreamEvent::ToolCallEnd { .. } => {
                self.state.lock().await.reset();
                Ok(())
            }

            StreamEvent::AttachmentDelta { attachments } => {
                for attachment in attachments {
                    if let Err(e) = send_attachment(&self.bot, self.chat_id, attachment).await {
                        warn!(error = %e, "telegram: failed to send attachment");
                    }
                }
                Ok(())
            }

            StreamEvent::AgentEnd { .. } => {
                self.send_typing().await;
                let buffer = { self.state.lock().await.buffer.clone() };
                let id = self.ensure_message(&buffer).await?;
                self.final_edit(id, &buffer).await
            }

            StreamEvent::Error { message } => {
                self.send_typing().await;
                let id = self.ensure_message(message).await?;
                self.final_edit(id, &format!("Error: {message}")).await
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.state.lock().await.reset();
        Ok(())
    }
}

async fn send_attachment(bot: &Bot, chat_id: ChatId, attachment: &memoh_core::Attachment) -> Result<()> {
    use memoh_core::AttachmentType;
    use teloxide::types::InputFile;

    let input = if let Some(url) = &attachment.url {
        InputFile::url(url.parse().map_err(|e| MemohError::Platform(format!("invalid attachment url: {e}")))?)
    } else if let Some(b64) = &attachment.base64 {
        let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64)
            .map_err(|e| MemohError::Platform(format!("invalid attachment base64: {e}")))?;
        InputFile::memory(bytes)
    } else if let Some(path) = &attachment.path {
        InputFile::file(path)
    } else {
        return Err(MemohError::Platform("attachment has no url, base64, or path".into()));
    };

    let result = match attachment.kind {
        AttachmentType::Image => bot.send_photo(chat_id, input).await.map(|_| ()),
        AttachmentType::Audio => bot.send_audio(chat_id, input).await.map(|_| ()),
        AttachmentType::Video => bot.send_video(chat_id, input).await.map(|_| ()),
        AttachmentType::File => bot.send_document(chat_id, input).await.map(|_| ()),
    };
    result.map_err(|e| MemohError::Platform(e.to_string()))
}

fn is_not_modified(e: &teloxide::RequestError) -> bool {
    e.to_string().to_lowercase().contains("message is not modified")
}

fn retry_after_secs(e: &teloxide::RequestError) -> Option<u64> {
    if let teloxide::RequestError::RetryAfter(seconds) = e {
        return Some(seconds.seconds() as u64);
    }
    None
}

fn normalize(text: &str) -> String {
    text.trim_end_matches(PENDING_SUFFIX).trim().to_string()
}

/// Minimal markdown-to-Telegram-HTML conversion: escapes HTML specials
/// first, then rewrites `**bold**`, `*italic*`/`_italic_`, `` `code` ``, and
/// `[text](url)` links. Anything else passes through as escaped plain text.
fn markdown_to_telegram_html(text: &str) -> String {
    let escaped = text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;");
    let with_links = replace_pairs(&escaped, "[", "](", ")", |inner, url| format!("<a href=\"{url}\">{inner}</a>"));
    let with_code = replace_delim(&with_links, "`", |inner| format!("<code>{inner}</code>"));
    let with_bold = replace_delim(&with_code, "**", |inner| format!("<b>{inner}</b>"));
    replace_delim(&with_bold, "*", |inner| format!("<i>{inner}</i>"))
}

fn replace_delim(text: &str, delim: &str, wrap: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(delim) {
        let after_start = &rest[start + delim.len()..];
        if let Some(end) = after_start.find(delim) {
            out.push_str(&rest[..start]);
            out.push_str(&wrap(&after_start[..end]));
            rest = &after_start[end + delim.len()..];
        } else {
            break;
        }
    }
    out.push_str(rest);
    out
}

fn replace_pairs(text: &str, open: &str, mid: &str, close: &str, wrap: impl Fn(&str, &str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(open) {
        let after_open = &rest[start + open.len()..];
        if let Some(mid_at) = after_open.find(mid) {
            let label = &after_open[..mid_at];
            let after_mid = &after_open[mid_at + mid.len()..];
            if let Some(close_at) = after_mid.find(close) {
                out.push_str(&rest[..start]);
                out.push_str(&wrap(label, &after_mid[..close_at]));
                rest = &after_mid[close_at + close.len()..];
                continue;
            }
        }
        break;
    }
    out.push_str(rest);
    out
}

/// Truncates to a valid UTF-8 prefix within `MAX_MESSAGE_CHARS` characters
/// (never splitting a multi-byte rune), appending `"..."` when cut.
fn truncate_for_platform(text: &str) -> String {
    let valid = String::from_utf8_lossy(text.as_bytes()).into_owned();
    if valid.chars().count() <= MAX_MESSAGE_CHARS {
        return valid;
    }
    let truncated: String = valid.chars().take(MAX_MESSAGE_CHARS.saturating_sub(3)).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_under_limit_is_unchanged() {
        assert_eq!(truncate_for_platform("hello"), "hello");
    }

    #[test]
    fn truncate_over_limit_appends_ellipsis_on_char_boundary() {
        let text = "é".repeat(5000);
        let out = truncate_for_platform(&text);
        assert!(out.ends_with("..."));
        assert!(out.chars().count() <= MAX_MESSAGE_CHARS);
    }

    #[test]
    fn normalize_strips_pending_suffix_and_whitespace() {
        assert_eq!(normalize("hello\n……"), "hello");
        assert_eq!(normalize("  hello  "), "hello");
    }

    #[test]
    fn markdown_converts_bold_italic_code_and_links() {
        assert_eq!(markdown_to_telegram_html("**bold**"), "<b>bold</b>");
        assert_eq!(markdown_to_telegram_html("*italic*"), "<i>italic</i>");
        assert_eq!(markdown_to_telegram_html("`code`"), "<code>code</code>");
        assert_eq!(markdown_to_telegram_html("[text](http://x)"), "<a href=\"http://x\">text</a>");
    }

    #[test]
    fn markdown_escapes_html_specials_first() {
        assert_eq!(markdown_to_telegram_html("a < b & c > d"), "a &lt; b &amp; c &gt; d");
    }
}
