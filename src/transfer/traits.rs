//! Messaging capabilities the transfer loop is written against.
//!
//! `BotApi` is the bot's own account. `DelegatedSession` reads on behalf of an
//! end-user account when the bot cannot see a chat. Both are implemented outside
//! this module so tests can swap in stubs.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::channels::{ChatId, OperatorId};
use crate::error::ChannelError;
use crate::transfer::link::ChatRef;
use crate::transfer::model::{ContentKind, MediaSource, SourceMessage};

/// Handle of a message the bot sent, used for later edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub message_id: i64,
}

/// The bot's own messaging capability.
#[async_trait]
pub trait BotApi: Send + Sync {
    /// Read a message by chat and sequence. `Ok(None)` means the slot is empty.
    async fn fetch_message(
        &self,
        chat: &ChatRef,
        sequence: i64,
    ) -> Result<Option<SourceMessage>, ChannelError>;

    /// Replicate a message server-side, optionally replacing its caption.
    async fn copy_message(
        &self,
        destination: ChatId,
        chat: &ChatRef,
        sequence: i64,
        caption: Option<&str>,
    ) -> Result<(), ChannelError>;

    /// Send an operator-facing reply, formatted as Markdown when it parses.
    async fn send_text(&self, destination: ChatId, text: &str) -> Result<SentMessage, ChannelError>;

    /// Send transferred text verbatim, with no formatting applied.
    async fn send_plain_text(&self, destination: ChatId, text: &str) -> Result<(), ChannelError>;

    /// Upload a payload of the given kind.
    async fn send_media(
        &self,
        destination: ChatId,
        kind: &ContentKind,
        media: MediaSource,
        caption: Option<&str>,
    ) -> Result<(), ChannelError>;

    /// Replace the text of a message the bot sent earlier.
    async fn edit_text(&self, message: SentMessage, text: &str) -> Result<(), ChannelError>;
}

/// A running user-account session used to read chats the bot cannot.
#[async_trait]
pub trait DelegatedSession: Send + Sync {
    async fn start(&self) -> Result<(), ChannelError>;

    async fn stop(&self) -> Result<(), ChannelError>;

    async fn fetch_message(
        &self,
        chat: &ChatRef,
        sequence: i64,
    ) -> Result<Option<SourceMessage>, ChannelError>;

    /// Download the payload of a media message as bytes plus a file name.
    async fn download(&self, message: &SourceMessage) -> Result<(Vec<u8>, String), ChannelError>;
}

/// Builds a delegated session from a stored credential.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(
        &self,
        operator: OperatorId,
        credential: &SecretString,
    ) -> Result<Box<dyn DelegatedSession>, ChannelError>;
}

/// Connector for deployments without a user-session backend.
///
/// Every credential is refused, so private links report "authorization
/// required" and public links rely on the bot alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledConnector;

#[async_trait]
impl SessionConnector for DisabledConnector {
    async fn connect(
        &self,
        operator: OperatorId,
        _credential: &SecretString,
    ) -> Result<Box<dyn DelegatedSession>, ChannelError> {
        tracing::debug!(operator_id = operator, "Delegated sessions are disabled");
        Err(ChannelError::AuthFailed {
            name: "delegated".into(),
            reason: "no user-session backend configured".into(),
        })
    }
}
