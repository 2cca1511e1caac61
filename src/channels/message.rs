//! Incoming message model shared by the channel and the dispatcher.

use std::pin::Pin;

use futures::Stream;

/// Numeric Telegram user id of an operator.
pub type OperatorId = i64;

/// Numeric Telegram chat id.
pub type ChatId = i64;

/// Stream of operator turns produced by a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// One text turn from an authorized operator.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub operator_id: OperatorId,
    /// Chat the turn was sent in; replies and transferred items go here.
    pub chat_id: ChatId,
    pub username: Option<String>,
    pub text: String,
}

impl IncomingMessage {
    pub fn new(operator_id: OperatorId, chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            operator_id,
            chat_id,
            username: None,
            text: text.into(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}
