//! Telegram channel — long-polls the Bot API for updates.
//!
//! Native Rust Telegram Bot API implementation of the intake gateway:
//! updates become [`IncomingEvent`]s, outbound calls map onto
//! `sendMessage`, `sendDocument` and `getFile`.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::channels::{
    Channel, ChatId, DocumentUpload, EventStream, Gateway, IncomingEvent, IntakeEvent, Submitter,
};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Maximum caption length for media messages.
const TELEGRAM_MAX_CAPTION_LENGTH: usize = 1024;

/// Back-off after a failed poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

const CHANNEL_NAME: &str = "telegram";

/// Telegram channel — connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    poll_timeout: Duration,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, poll_timeout: Duration) -> Self {
        Self {
            bot_token,
            poll_timeout,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "https://api.telegram.org/file/bot{}/{file_path}",
            self.bot_token.expose_secret()
        )
    }

    /// POST a JSON body to a Bot API method and return its `result`.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| send_failed(format!("{method}: {}", e.without_url())))?;

        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .map_err(|e| {
                send_failed(format!(
                    "{method}: invalid response ({status}): {}",
                    e.without_url()
                ))
            })?;

        if !status.is_success() || data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(send_failed(format!("{method} returned {status}: {description}")));
        }

        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Send a text message, splitting anything over Telegram's 4096 char limit.
    /// The reply markup, if any, is attached to the last chunk.
    async fn send_message(
        &self,
        chat_id: &ChatId,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = serde_json::json!({
                "chat_id": chat_id.as_str(),
                "text": chunk,
            });
            if i == last {
                if let Some(markup) = &reply_markup {
                    body["reply_markup"] = markup.clone();
                }
            }
            self.call("sendMessage", &body).await?;
        }
        Ok(())
    }
}

// ── Gateway implementation ──────────────────────────────────────────

#[async_trait]
impl Gateway for TelegramChannel {
    async fn send_text(&self, to: &ChatId, text: &str) -> Result<(), ChannelError> {
        self.send_message(to, text, None).await
    }

    async fn send_contact_request(
        &self,
        to: &ChatId,
        text: &str,
        button_label: &str,
    ) -> Result<(), ChannelError> {
        self.send_message(to, text, Some(contact_keyboard(button_label)))
            .await
    }

    async fn remove_keyboard(&self, to: &ChatId, text: &str) -> Result<(), ChannelError> {
        self.send_message(to, text, Some(remove_keyboard_markup()))
            .await
    }

    async fn fetch_document(&self, file_id: &str) -> Result<Vec<u8>, ChannelError> {
        let download_failed = |reason: String| ChannelError::DownloadFailed {
            name: CHANNEL_NAME.into(),
            file_id: file_id.to_string(),
            reason,
        };

        let file = self
            .call("getFile", &serde_json::json!({ "file_id": file_id }))
            .await
            .map_err(|e| download_failed(e.to_string()))?;
        let file_path = file
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| download_failed("getFile returned no file_path".into()))?;

        let resp = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(|e| download_failed(e.without_url().to_string()))?;
        if !resp.status().is_success() {
            return Err(download_failed(format!("download returned {}", resp.status())));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| download_failed(e.without_url().to_string()))?;
        tracing::debug!(file_id, size = bytes.len(), "Telegram document downloaded");
        Ok(bytes.to_vec())
    }

    async fn forward_document(
        &self,
        to: &ChatId,
        file_id: &str,
        caption: &str,
    ) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "chat_id": to.as_str(),
            "document": file_id,
            "caption": truncate_chars(caption, TELEGRAM_MAX_CAPTION_LENGTH),
        });
        self.call("sendDocument", &body).await?;
        tracing::info!(chat_id = %to, file_id, "Telegram document sent");
        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let client = self.client.clone();
        let poll_timeout = self.poll_timeout.as_secs();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": poll_timeout,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {}", e.without_url());
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {}", e.without_url());
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    tracing::warn!(
                        description = data.get("description").and_then(serde_json::Value::as_str),
                        "Telegram getUpdates returned no result"
                    );
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(incoming) = parse_update(update) else {
                        continue;
                    };

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let me = self
            .call("getMe", &serde_json::json!({}))
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })?;
        tracing::info!(
            bot = me.get("username").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            "Telegram bot authenticated"
        );
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(bot_token: &SecretString, method: &str) -> String {
    format!(
        "https://api.telegram.org/bot{}/{method}",
        bot_token.expose_secret()
    )
}

fn send_failed(reason: String) -> ChannelError {
    ChannelError::SendFailed {
        name: CHANNEL_NAME.into(),
        reason,
    }
}

/// One-time, resized keyboard with a single "share contact" button.
fn contact_keyboard(button_label: &str) -> Value {
    serde_json::json!({
        "keyboard": [[{ "text": button_label, "request_contact": true }]],
        "one_time_keyboard": true,
        "resize_keyboard": true
    })
}

fn remove_keyboard_markup() -> Value {
    serde_json::json!({ "remove_keyboard": true })
}

/// Turn a raw update into an event. Returns `None` for updates that carry
/// no message or no identifiable chat.
pub fn parse_update(update: &Value) -> Option<IncomingEvent> {
    let message = update.get("message")?;

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)?;

    let mut submitter = Submitter::new(chat_id.to_string());
    if let Some(name) = message
        .get("from")
        .and_then(|f| f.get("first_name"))
        .and_then(Value::as_str)
    {
        submitter = submitter.with_first_name(name);
    }

    Some(IncomingEvent::new(submitter, parse_message(message)))
}

fn parse_message(message: &Value) -> IntakeEvent {
    if let Some(text) = message.get("text").and_then(Value::as_str) {
        return match parse_command(text) {
            Some("start") => IntakeEvent::Start,
            Some("cancel") => IntakeEvent::Cancel,
            Some(other) => IntakeEvent::Unsupported {
                description: format!("command /{other}"),
            },
            None => IntakeEvent::Text {
                text: text.to_string(),
            },
        };
    }

    if let Some(phone) = message
        .get("contact")
        .and_then(|c| c.get("phone_number"))
        .and_then(Value::as_str)
    {
        return IntakeEvent::Contact {
            phone: phone.to_string(),
        };
    }

    if let Some(document) = message.get("document") {
        let Some(file_id) = document.get("file_id").and_then(Value::as_str) else {
            return IntakeEvent::Unsupported {
                description: "document without file_id".into(),
            };
        };
        return IntakeEvent::Document(DocumentUpload {
            file_name: document
                .get("file_name")
                .and_then(Value::as_str)
                .unwrap_or("document")
                .to_string(),
            size_bytes: document
                .get("file_size")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            file_id: file_id.to_string(),
        });
    }

    let kind = message
        .as_object()
        .and_then(|obj| {
            obj.keys()
                .find(|k| !matches!(k.as_str(), "message_id" | "from" | "chat" | "date"))
        })
        .map(String::as_str)
        .unwrap_or("empty");
    IntakeEvent::Unsupported {
        description: format!("message with {kind}"),
    }
}

/// Extract the command name from `/cmd`, `/cmd@bot` or `/cmd args`.
fn parse_command(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    let command = first.strip_prefix('/')?;
    let command = command.split('@').next().unwrap_or(command);
    if command.is_empty() {
        return None;
    }
    Some(command)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut boundary = max_len;
        while !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }

        // Find a good split point
        let chunk = &remaining[..boundary];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(boundary);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { boundary } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
