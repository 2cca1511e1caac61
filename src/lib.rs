//! Cantarella: Telegram admin bot that transfers runs of messages.

pub mod channels;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod store;
pub mod transfer;
