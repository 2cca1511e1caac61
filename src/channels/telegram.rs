//! Telegram channel: long-polls the Bot API for operator turns and implements
//! the bot side of the transfer capabilities (fetch, copy, send, edit).
//!
//! The Bot API has no "get message by id" call. Reading a public message is
//! done by forwarding it into a scratch chat the bot owns, parsing the
//! returned message, and deleting the scratch copy.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::channels::{ChatId, IncomingMessage, MessageStream};
use crate::error::ChannelError;
use crate::transfer::link::ChatRef;
use crate::transfer::model::{ContentKind, FetchOrigin, MediaSource, SourceMessage};
use crate::transfer::traits::{BotApi, SentMessage};

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Description Telegram returns when the source slot holds nothing.
const MISSING_MESSAGE_MARKERS: &[&str] = &["message to forward not found", "message to copy not found"];

/// Telegram Bot API client, polling for turns and serving transfer calls.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    scratch_chat: Option<String>,
    client: reqwest::Client,
}

/// Why a Bot API call did not return a result.
#[derive(Debug)]
enum ApiFailure {
    Transport(String),
    Rejected { status: u16, description: String },
}

impl ApiFailure {
    fn reason(&self, method: &str) -> String {
        match self {
            Self::Transport(e) => format!("{method}: {e}"),
            Self::Rejected {
                status,
                description,
            } => format!("{method} failed ({status}): {description}"),
        }
    }

    fn is_missing_message(&self) -> bool {
        match self {
            Self::Rejected { description, .. } => {
                let lower = description.to_lowercase();
                MISSING_MESSAGE_MARKERS.iter().any(|m| lower.contains(m))
            }
            Self::Transport(_) => false,
        }
    }

    fn is_not_modified(&self) -> bool {
        matches!(self, Self::Rejected { description, .. } if description.contains("message is not modified"))
    }
}

impl TelegramChannel {
    pub fn new(
        bot_token: SecretString,
        allowed_users: Vec<String>,
        scratch_chat: Option<String>,
    ) -> Self {
        Self {
            bot_token,
            allowed_users,
            scratch_chat,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// POST a JSON body and unwrap the Bot API envelope.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ApiFailure> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(e.to_string()))?;
        read_envelope(resp).await
    }

    /// POST a multipart form and unwrap the Bot API envelope.
    async fn call_multipart(&self, method: &str, form: Form) -> Result<Value, ApiFailure> {
        let resp = self
            .client
            .post(self.api_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(e.to_string()))?;
        read_envelope(resp).await
    }

    /// Send a single message chunk (≤4096 chars), Markdown-first with fallback.
    async fn send_message_chunk(&self, chat_id: ChatId, text: &str) -> Result<Value, ChannelError> {
        let markdown_body = message_body(chat_id, text, Some("Markdown"));

        let markdown_err = match self.call("sendMessage", &markdown_body).await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };
        tracing::warn!(
            reason = %markdown_err.reason("sendMessage"),
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_body = message_body(chat_id, text, None);
        self.call("sendMessage", &plain_body)
            .await
            .map_err(|plain_err| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "markdown: {}, plain: {}",
                    markdown_err.reason("sendMessage"),
                    plain_err.reason("sendMessage")
                ),
            })
    }

    /// Best-effort removal of a scratch copy.
    async fn delete_message(&self, chat_id: &str, message_id: i64) {
        let body = serde_json::json!({ "chat_id": chat_id, "message_id": message_id });
        if let Err(e) = self.call("deleteMessage", &body).await {
            tracing::debug!(reason = %e.reason("deleteMessage"), "Scratch copy not deleted");
        }
    }

    /// Verify the bot token.
    pub async fn health_check(&self) -> Result<(), ChannelError> {
        self.call("getMe", &serde_json::json!({}))
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.reason("getMe"),
            })
    }

    /// Start long-polling. Turns from users outside the allow-list are dropped.
    pub fn start(&self) -> MessageStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    tracing::warn!(
                        description = data.get("description").and_then(serde_json::Value::as_str).unwrap_or(""),
                        "Telegram getUpdates rejected"
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
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

                    if !is_operator_allowed(&allowed_users, &incoming) {
                        tracing::warn!(
                            user_id = incoming.operator_id,
                            username = incoming.username.as_deref().unwrap_or("unknown"),
                            "Telegram: ignoring message from unauthorized user"
                        );
                        continue;
                    }

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

        Box::pin(stream)
    }
}

// ── BotApi implementation ───────────────────────────────────────────

#[async_trait]
impl BotApi for TelegramChannel {
    async fn fetch_message(
        &self,
        chat: &ChatRef,
        sequence: i64,
    ) -> Result<Option<SourceMessage>, ChannelError> {
        let Some(scratch) = self.scratch_chat.as_deref() else {
            return Err(ChannelError::FetchFailed {
                chat: chat.to_string(),
                sequence,
                reason: "no scratch chat configured for bot reads".into(),
            });
        };

        let body = serde_json::json!({
            "chat_id": scratch,
            "from_chat_id": api_chat_id(chat),
            "message_id": sequence,
            "disable_notification": true,
        });

        let forwarded = match self.call("forwardMessage", &body).await {
            Ok(result) => result,
            Err(e) if e.is_missing_message() => return Ok(None),
            Err(e) => {
                return Err(ChannelError::FetchFailed {
                    chat: chat.to_string(),
                    sequence,
                    reason: e.reason("forwardMessage"),
                });
            }
        };

        if let Some(copy_id) = forwarded.get("message_id").and_then(Value::as_i64) {
            self.delete_message(scratch, copy_id).await;
        }

        Ok(Some(parse_message(&forwarded, chat, sequence)))
    }

    async fn copy_message(
        &self,
        destination: ChatId,
        chat: &ChatRef,
        sequence: i64,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": destination,
            "from_chat_id": api_chat_id(chat),
            "message_id": sequence,
        });
        if let Some(cap) = caption {
            body["caption"] = Value::String(cap.to_string());
        }

        self.call("copyMessage", &body)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.reason("copyMessage"),
            })
    }

    /// Splits long messages; the handle points at the last chunk.
    async fn send_text(&self, destination: ChatId, text: &str) -> Result<SentMessage, ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);

        let mut last = None;
        for chunk in &chunks {
            last = Some(self.send_message_chunk(destination, chunk).await?);
        }

        let message_id = last
            .as_ref()
            .and_then(|m| m.get("message_id"))
            .and_then(Value::as_i64)
            .ok_or_else(|| ChannelError::InvalidMessage("sendMessage returned no message_id".into()))?;

        Ok(SentMessage {
            chat_id: destination,
            message_id,
        })
    }

    /// Transferred text: no parse mode, so markup characters survive.
    async fn send_plain_text(&self, destination: ChatId, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.call("sendMessage", &message_body(destination, &chunk, None))
                .await
                .map_err(|e| ChannelError::SendFailed {
                    name: "telegram".into(),
                    reason: e.reason("sendMessage"),
                })?;
        }
        Ok(())
    }

    async fn send_media(
        &self,
        destination: ChatId,
        kind: &ContentKind,
        media: MediaSource,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        let Some((method, field)) = media_endpoint(kind) else {
            return Err(ChannelError::InvalidMessage(format!(
                "cannot upload content kind {kind}"
            )));
        };
        let caption = caption.filter(|_| kind.supports_caption());

        let result = match media {
            MediaSource::FileId(file_id) => {
                let mut body = serde_json::json!({ "chat_id": destination });
                body[field] = Value::String(file_id);
                if let Some(cap) = caption {
                    body["caption"] = Value::String(cap.to_string());
                }
                self.call(method, &body).await
            }
            MediaSource::Bytes { data, file_name } => {
                let part = Part::bytes(data).file_name(file_name);
                let mut form = Form::new()
                    .text("chat_id", destination.to_string())
                    .part(field, part);
                if let Some(cap) = caption {
                    form = form.text("caption", cap.to_string());
                }
                self.call_multipart(method, form).await
            }
        };

        result.map(|_| ()).map_err(|e| ChannelError::SendFailed {
            name: "telegram".into(),
            reason: e.reason(method),
        })
    }

    async fn edit_text(&self, message: SentMessage, text: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "chat_id": message.chat_id,
            "message_id": message.message_id,
            "text": text,
        });

        match self.call("editMessageText", &body).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_modified() => Ok(()),
            Err(e) => Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.reason("editMessageText"),
            }),
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(token: &SecretString, method: &str) -> String {
    format!("https://api.telegram.org/bot{}/{method}", token.expose_secret())
}

async fn read_envelope(resp: reqwest::Response) -> Result<Value, ApiFailure> {
    let status = resp.status().as_u16();
    let data: Value = resp
        .json()
        .await
        .map_err(|e| ApiFailure::Transport(e.to_string()))?;
    unwrap_envelope(status, data)
}

/// Split a Bot API response into its result or a rejection.
fn unwrap_envelope(status: u16, data: Value) -> Result<Value, ApiFailure> {
    if data.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(data.get("result").cloned().unwrap_or(Value::Null));
    }
    let description = data
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    Err(ApiFailure::Rejected {
        status,
        description,
    })
}

/// `sendMessage` body. Without a parse mode the text is delivered verbatim.
fn message_body(chat_id: ChatId, text: &str, parse_mode: Option<&str>) -> Value {
    let mut body = serde_json::json!({
        "chat_id": chat_id,
        "text": text,
    });
    if let Some(mode) = parse_mode {
        body["parse_mode"] = Value::String(mode.to_string());
    }
    body
}

/// Bot API chat id: numeric ids pass through, handles get an `@`.
fn api_chat_id(chat: &ChatRef) -> Value {
    if chat.is_numeric()
        && let Ok(id) = chat.as_str().parse::<i64>()
    {
        return Value::from(id);
    }
    Value::String(format!("@{}", chat.as_str().trim_start_matches('@')))
}

/// Upload method and form field for a content kind.
fn media_endpoint(kind: &ContentKind) -> Option<(&'static str, &'static str)> {
    let pair = match kind {
        ContentKind::Photo => ("sendPhoto", "photo"),
        ContentKind::Video => ("sendVideo", "video"),
        ContentKind::Document => ("sendDocument", "document"),
        ContentKind::Audio => ("sendAudio", "audio"),
        ContentKind::Voice => ("sendVoice", "voice"),
        ContentKind::VideoNote => ("sendVideoNote", "video_note"),
        ContentKind::Sticker => ("sendSticker", "sticker"),
        ContentKind::Animation => ("sendAnimation", "animation"),
        ContentKind::Text | ContentKind::Unsupported(_) => return None,
    };
    Some(pair)
}

/// Non-media message fields the bot cannot re-deliver.
const UNSUPPORTED_FIELDS: &[&str] = &[
    "poll", "contact", "location", "venue", "dice", "game", "invoice", "story",
];

/// Turn a Bot API `Message` object into a `SourceMessage`.
fn parse_message(message: &Value, chat: &ChatRef, sequence: i64) -> SourceMessage {
    let caption = message
        .get("caption")
        .and_then(Value::as_str)
        .map(String::from);

    if let Some(text) = message.get("text").and_then(Value::as_str) {
        return SourceMessage::text(chat.clone(), sequence, text, FetchOrigin::Bot);
    }

    // Photos arrive as size variants; the last one is the largest.
    if let Some(photo) = message
        .get("photo")
        .and_then(Value::as_array)
        .and_then(|sizes| sizes.last())
    {
        let file_id = photo.get("file_id").and_then(Value::as_str).map(String::from);
        let mut msg =
            SourceMessage::media(chat.clone(), sequence, ContentKind::Photo, file_id, FetchOrigin::Bot);
        msg.caption = caption;
        return msg;
    }

    // Animation messages also carry a `document` field, so check them first.
    let file_fields = [
        ("animation", ContentKind::Animation),
        ("video", ContentKind::Video),
        ("video_note", ContentKind::VideoNote),
        ("audio", ContentKind::Audio),
        ("voice", ContentKind::Voice),
        ("sticker", ContentKind::Sticker),
        ("document", ContentKind::Document),
    ];
    for (field, kind) in file_fields {
        if let Some(file) = message.get(field) {
            let file_id = file.get("file_id").and_then(Value::as_str).map(String::from);
            let mut msg = SourceMessage::media(chat.clone(), sequence, kind, file_id, FetchOrigin::Bot);
            msg.caption = caption;
            msg.file_name = file
                .get("file_name")
                .and_then(Value::as_str)
                .map(String::from);
            return msg;
        }
    }

    if let Some(field) = UNSUPPORTED_FIELDS.iter().find(|f| message.get(**f).is_some()) {
        let mut msg = SourceMessage::empty(chat.clone(), sequence, FetchOrigin::Bot);
        msg.kind = ContentKind::Unsupported((*field).to_string());
        msg.empty = false;
        return msg;
    }

    SourceMessage::empty(chat.clone(), sequence, FetchOrigin::Bot)
}

/// Extract an operator turn from a raw update. Non-text updates are skipped.
fn parse_update(update: &Value) -> Option<IncomingMessage> {
    let message = update.get("message")?;
    let text = message.get("text").and_then(Value::as_str)?;
    let from = message.get("from")?;
    let operator_id = from.get("id").and_then(Value::as_i64)?;
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)?;

    let mut incoming = IncomingMessage::new(operator_id, chat_id, text);
    if let Some(username) = from.get("username").and_then(Value::as_str) {
        incoming = incoming.with_username(username);
    }
    Some(incoming)
}

/// Whether the sender of a turn is on the allow-list, by numeric id or username.
fn is_operator_allowed(allowed_users: &[String], incoming: &IncomingMessage) -> bool {
    let user_id = incoming.operator_id.to_string();
    allowed_users.iter().any(|u| {
        u == "*" || *u == user_id || incoming.username.as_deref() == Some(u.as_str())
    })
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
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

        // Largest char boundary within the limit
        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
