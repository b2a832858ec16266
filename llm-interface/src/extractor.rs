use crate::chat::{ChatMessage, ChatModel};
use crate::fallback::ModelFallback;
use chrono::{DateTime, Utc};
use engage_core::{BrowserSession, ContentProvider, CoreError, LlmError, RawRecord};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest page text sent to the model.
pub const MAX_PAGE_CHARS: usize = 20_000;

const PAGE_TEXT_SCRIPT: &str = "() => document.body.innerText";

const SYSTEM_PROMPT: &str = "You extract structured data from the visible text of a web page. \
Reply with a JSON array only, no prose and no code fences.";

/// Removes a surrounding ```json ... ``` (or bare ```) fence.
pub fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

fn parse_records(reply: &str, model: &str) -> Result<Vec<RawRecord>, LlmError> {
    let invalid = |details: String| LlmError::InvalidResponseFormat {
        model: model.to_string(),
        details,
    };

    let value: Value = serde_json::from_str(strip_markdown_fences(reply))
        .map_err(|e| invalid(format!("reply is not JSON: {}", e)))?;
    let items = match value {
        Value::Array(items) => items,
        other => return Err(invalid(format!("expected a JSON array, got {}", other))),
    };

    // Keep a blank record in place of non-objects so positions stay aligned.
    Ok(items
        .into_iter()
        .map(|item| {
            RawRecord::from_value(item).unwrap_or_else(|e| {
                warn!("Blanking model output item: {}", e);
                RawRecord::new()
            })
        })
        .collect())
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Content provider that reads the page text and lets a model pull posts and
/// comments out of it. Used for pages no script has been written for.
pub struct LlmExtractor<S, M> {
    session: S,
    chat: M,
    fallback: ModelFallback,
    settle: Duration,
}

impl<S: BrowserSession, M: ChatModel> LlmExtractor<S, M> {
    pub fn new(session: S, chat: M, fallback: ModelFallback, settle: Duration) -> Self {
        Self {
            session,
            chat,
            fallback,
            settle,
        }
    }

    async fn page_text(&self, url: &str) -> Result<String, CoreError> {
        self.session.navigate(url).await?;
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        let text = match self.session.evaluate(PAGE_TEXT_SCRIPT, Value::Null).await? {
            Value::String(text) => text,
            other => other.to_string(),
        };
        let truncated = truncate_chars(&text, MAX_PAGE_CHARS);
        if truncated.len() < text.len() {
            debug!("Page text truncated to {} characters", MAX_PAGE_CHARS);
        }
        Ok(truncated.to_string())
    }

    async fn extract(
        &self,
        instructions: String,
        page_text: String,
    ) -> Result<Vec<RawRecord>, CoreError> {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!("{}\n\nPage text:\n{}", instructions, page_text)),
        ];
        let messages = &messages;
        let chat = &self.chat;

        let records = self
            .fallback
            .run(move |model| async move {
                let reply = chat.complete(&model, messages).await?;
                parse_records(&reply, &model)
            })
            .await?;
        Ok(records)
    }
}

impl<S: BrowserSession, M: ChatModel> ContentProvider for LlmExtractor<S, M> {
    async fn list_posts(
        &self,
        source: &str,
        max_count: usize,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawRecord>, CoreError> {
        let page_text = self.page_text(source).await?;

        let mut instructions = format!(
            "The page at {} lists videos. Return at most {} objects with the keys \
\"url\" (absolute URL of the video, resolved against the page URL), \"title\", \
\"views\" and \"posted\" (the relative upload time exactly as shown, e.g. \"3 days ago\"). \
Keep the order of the page.",
            source, max_count
        );
        if let Some(cutoff) = cutoff {
            instructions.push_str(&format!(
                " Videos older than {} may be left out.",
                cutoff.to_rfc3339()
            ));
        }

        let mut records = self.extract(instructions, page_text).await?;
        records.truncate(max_count);
        info!("Model extracted {} posts from {}", records.len(), source);
        Ok(records)
    }

    async fn list_comments(
        &self,
        post_ref: &str,
        max_count: usize,
    ) -> Result<Vec<RawRecord>, CoreError> {
        let page_text = self.page_text(post_ref).await?;

        let instructions = format!(
            "The page at {} shows comments. Return at most {} top-level comments in page order \
as objects with the keys \"author\", \"text\", \"timestamp\" (relative time exactly as shown) \
and \"reply_count\" (integer). Include \"id\" only if a comment id is visible in the text.",
            post_ref, max_count
        );

        let mut records = self.extract(instructions, page_text).await?;
        records.truncate(max_count);
        info!("Model extracted {} comments from {}", records.len(), post_ref);
        Ok(records)
    }
}
