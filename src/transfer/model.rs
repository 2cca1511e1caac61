//! Transfer data model: source messages, per-item outcomes, batch reports.

use serde::{Deserialize, Serialize};

use crate::error::truncate_for_operator;
use crate::transfer::link::ChatRef;

/// What a source message carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    VideoNote,
    Sticker,
    Animation,
    /// Anything the bot cannot re-deliver (polls, contacts, locations...).
    Unsupported(String),
}

impl ContentKind {
    /// Whether the platform accepts a caption alongside this kind.
    pub fn supports_caption(&self) -> bool {
        matches!(
            self,
            Self::Photo | Self::Video | Self::Document | Self::Audio | Self::Voice | Self::Animation
        )
    }

    /// Whether this kind carries a file payload.
    pub fn is_media(&self) -> bool {
        !matches!(self, Self::Text | Self::Unsupported(_))
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Photo => write!(f, "photo"),
            Self::Video => write!(f, "video"),
            Self::Document => write!(f, "document"),
            Self::Audio => write!(f, "audio"),
            Self::Voice => write!(f, "voice"),
            Self::VideoNote => write!(f, "video_note"),
            Self::Sticker => write!(f, "sticker"),
            Self::Animation => write!(f, "animation"),
            Self::Unsupported(other) => write!(f, "{other}"),
        }
    }
}

/// Which capability produced a fetched message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOrigin {
    /// The bot read it; its file ids are usable by the bot.
    Bot,
    /// A delegated session read it; payloads must be downloaded and re-uploaded.
    Delegated,
}

/// A message resolved from the source chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub chat: ChatRef,
    pub sequence: i64,
    pub kind: ContentKind,
    /// Body for text messages.
    pub text: Option<String>,
    /// Caption for media messages.
    pub caption: Option<String>,
    /// Bot-usable file id, when fetched by the bot.
    pub file_id: Option<String>,
    pub file_name: Option<String>,
    /// Service or deleted message with nothing to deliver.
    pub empty: bool,
    pub origin: FetchOrigin,
}

impl SourceMessage {
    /// A plain text message, mostly useful for tests and stubs.
    pub fn text(chat: ChatRef, sequence: i64, body: impl Into<String>, origin: FetchOrigin) -> Self {
        Self {
            chat,
            sequence,
            kind: ContentKind::Text,
            text: Some(body.into()),
            caption: None,
            file_id: None,
            file_name: None,
            empty: false,
            origin,
        }
    }

    /// A media message of the given kind.
    pub fn media(
        chat: ChatRef,
        sequence: i64,
        kind: ContentKind,
        file_id: Option<String>,
        origin: FetchOrigin,
    ) -> Self {
        Self {
            chat,
            sequence,
            kind,
            text: None,
            caption: None,
            file_id,
            file_name: None,
            empty: false,
            origin,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// A service/deleted message slot.
    pub fn empty(chat: ChatRef, sequence: i64, origin: FetchOrigin) -> Self {
        Self {
            chat,
            sequence,
            kind: ContentKind::Text,
            text: None,
            caption: None,
            file_id: None,
            file_name: None,
            empty: true,
            origin,
        }
    }
}

/// Where a re-upload takes its bytes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Reuse a file the bot already knows.
    FileId(String),
    /// Upload raw bytes (downloaded through a delegated session).
    Bytes { data: Vec<u8>, file_name: String },
}

/// Why a single item was not delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Neither the bot nor a delegated session could read the message.
    CannotFetch,
    /// The slot is deleted, a service message, or absent.
    EmptyMessage,
    UnsupportedMedia(String),
    /// Delivery to the destination failed.
    Delivery(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CannotFetch => write!(f, "cannot fetch"),
            Self::EmptyMessage => write!(f, "empty message"),
            Self::UnsupportedMedia(kind) => write!(f, "unsupported media type: {kind}"),
            Self::Delivery(err) => write!(f, "{}", truncate_for_operator(err)),
        }
    }
}

/// Result of one fetch-and-deliver step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Delivered,
    Failed(FailureReason),
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// `"OK"` on success, otherwise the short cause.
    pub fn reason(&self) -> String {
        match self {
            Self::Delivered => "OK".to_string(),
            Self::Failed(reason) => reason.to_string(),
        }
    }
}

/// How a transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Completed,
    Cancelled,
    /// A private source was requested and no delegated session could be started.
    AuthorizationRequired,
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::AuthorizationRequired => "authorization_required",
        };
        write!(f, "{s}")
    }
}

/// Aggregate result of a transfer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    pub success: u32,
    pub failed: u32,
    pub total: u32,
    pub status: TransferStatus,
}

impl TransferReport {
    /// Items attempted so far.
    pub fn processed(&self) -> u32 {
        self.success + self.failed
    }

    /// Final status message shown to the operator.
    pub fn summary(&self) -> String {
        match self.status {
            TransferStatus::Completed => format!(
                "✅ Batch completed.\nSuccess: {}\nFailed: {}\nTotal: {}",
                self.success, self.failed, self.total
            ),
            TransferStatus::Cancelled => format!(
                "🛑 Batch cancelled at {}/{}.\nSuccess: {}\nFailed: {}",
                self.processed(),
                self.total,
                self.success,
                self.failed
            ),
            TransferStatus::AuthorizationRequired => {
                "🔐 Authorization required: log in with a user session to read private chats."
                    .to_string()
            }
        }
    }
}

/// Progress line for the edited status message.
pub fn progress_text(done: u32, total: u32, success: u32, failed: u32) -> String {
    format!("🔄 Processing: {done}/{total}\n✅ Success: {success}\n❌ Failed: {failed}")
}
