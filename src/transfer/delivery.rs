//! Per-item work: resolve the source message, then deliver it.

use tracing::debug;

use crate::channels::ChatId;
use crate::transfer::link::{AccessClass, ChatRef};
use crate::transfer::model::{
    ContentKind, FailureReason, FetchOrigin, ItemOutcome, MediaSource, SourceMessage,
};
use crate::transfer::runner::{Delegation, TransferRequest, TransferRunner};

impl TransferRunner {
    /// Fetch and deliver the message at `sequence`. Never fails the batch.
    pub(crate) async fn transfer_one(
        &self,
        request: &TransferRequest,
        sequence: i64,
        caption_override: Option<&str>,
        delegation: &mut Delegation,
    ) -> ItemOutcome {
        let message = match self
            .resolve(request.link.access, &request.link.chat, sequence, delegation)
            .await
        {
            Ok(Some(m)) if !m.empty => m,
            Ok(_) => return ItemOutcome::Failed(FailureReason::EmptyMessage),
            Err(reason) => return ItemOutcome::Failed(reason),
        };

        self.deliver(&message, request.destination, caption_override, delegation)
            .await
    }

    /// Private chats go through the delegated session only. Public chats try
    /// the bot first and fall back to a delegated session when the bot fails.
    async fn resolve(
        &self,
        access: AccessClass,
        chat: &ChatRef,
        sequence: i64,
        delegation: &mut Delegation,
    ) -> Result<Option<SourceMessage>, FailureReason> {
        match access {
            AccessClass::Private => {
                let session = delegation.current().ok_or(FailureReason::CannotFetch)?;
                session.fetch_message(chat, sequence).await.map_err(|e| {
                    debug!(chat = %chat, sequence, error = %e, "Delegated fetch failed");
                    FailureReason::CannotFetch
                })
            }
            AccessClass::Public => {
                let bot_error = match self.bot.fetch_message(chat, sequence).await {
                    Ok(found) => return Ok(found),
                    Err(e) => e,
                };
                debug!(chat = %chat, sequence, error = %bot_error, "Bot fetch failed, trying delegated session");

                let session = delegation.acquire().await.ok_or(FailureReason::CannotFetch)?;
                session.fetch_message(chat, sequence).await.map_err(|e| {
                    debug!(chat = %chat, sequence, error = %e, "Delegated fetch failed");
                    FailureReason::CannotFetch
                })
            }
        }
    }

    /// Replicate the message when the bot can see it, otherwise re-upload it.
    async fn deliver(
        &self,
        message: &SourceMessage,
        destination: ChatId,
        caption_override: Option<&str>,
        delegation: &Delegation,
    ) -> ItemOutcome {
        if let ContentKind::Unsupported(kind) = &message.kind {
            return ItemOutcome::Failed(FailureReason::UnsupportedMedia(kind.clone()));
        }

        let caption = caption_override.filter(|_| message.kind.supports_caption());

        if message.origin == FetchOrigin::Bot {
            match self
                .bot
                .copy_message(destination, &message.chat, message.sequence, caption)
                .await
            {
                Ok(()) => return ItemOutcome::Delivered,
                Err(e) => {
                    debug!(sequence = message.sequence, error = %e, "Copy failed, re-uploading");
                }
            }
        }

        match self.reupload(message, destination, caption, delegation).await {
            Ok(()) => ItemOutcome::Delivered,
            Err(reason) => ItemOutcome::Failed(reason),
        }
    }

    /// Send the payload again by content kind.
    async fn reupload(
        &self,
        message: &SourceMessage,
        destination: ChatId,
        caption_override: Option<&str>,
        delegation: &Delegation,
    ) -> Result<(), FailureReason> {
        if !message.kind.is_media() {
            let text = message
                .text
                .as_deref()
                .filter(|t| !t.is_empty())
                .ok_or(FailureReason::EmptyMessage)?;
            return self
                .bot
                .send_plain_text(destination, text)
                .await
                .map_err(|e| FailureReason::Delivery(e.to_string()));
        }

        let media = match message.origin {
            FetchOrigin::Bot => message
                .file_id
                .clone()
                .map(MediaSource::FileId)
                .ok_or_else(|| FailureReason::Delivery("source message has no file id".into()))?,
            FetchOrigin::Delegated => {
                let session = delegation
                    .current()
                    .ok_or_else(|| FailureReason::Delivery("delegated session is gone".into()))?;
                let (data, file_name) = session
                    .download(message)
                    .await
                    .map_err(|e| FailureReason::Delivery(e.to_string()))?;
                MediaSource::Bytes { data, file_name }
            }
        };

        let caption = caption_override.or(message.caption.as_deref());
        self.bot
            .send_media(destination, &message.kind, media, caption)
            .await
            .map_err(|e| FailureReason::Delivery(e.to_string()))
    }
}
