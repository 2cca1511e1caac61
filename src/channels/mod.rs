//! Channel layer: incoming operator turns and the Telegram Bot API client.

pub mod message;
pub mod telegram;

pub use message::{ChatId, IncomingMessage, MessageStream, OperatorId};
pub use telegram::TelegramChannel;
