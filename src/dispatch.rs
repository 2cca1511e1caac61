//! Command router: turns incoming operator messages into coordinator calls.

use std::sync::Arc;

use futures::StreamExt;

use crate::channels::{IncomingMessage, MessageStream};
use crate::conversation::{Coordinator, TurnOutcome};

/// Recognised slash commands. Matching is case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Batch,
    Single,
    Cancel,
    Help,
}

impl Command {
    /// Parse the leading command of a message, accepting a `@botname` suffix.
    ///
    /// Returns `None` for plain text. Unknown commands are reported as
    /// `Some(Err(name))` so the caller can ignore them instead of feeding
    /// them into a dialog.
    pub fn parse(text: &str) -> Option<Result<Self, &str>> {
        let word = text.split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split_once('@').map_or(name, |(name, _)| name);
        Some(match name {
            "batch" => Ok(Self::Batch),
            "single" => Ok(Self::Single),
            "cancel" => Ok(Self::Cancel),
            "start" | "help" => Ok(Self::Help),
            other => Err(other),
        })
    }
}

/// Routes every turn of every operator.
#[derive(Clone)]
pub struct Dispatcher {
    coordinator: Arc<Coordinator>,
}

impl Dispatcher {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    /// Handle one turn.
    pub async fn handle(&self, message: &IncomingMessage) -> TurnOutcome {
        let operator = message.operator_id;
        let chat = message.chat_id;
        match Command::parse(&message.text) {
            Some(Ok(Command::Batch)) => self.coordinator.start_batch(operator, chat).await,
            Some(Ok(Command::Single)) => self.coordinator.start_single(operator, chat).await,
            Some(Ok(Command::Cancel)) => self.coordinator.cancel(operator, chat).await,
            Some(Ok(Command::Help)) => self.coordinator.help(chat).await,
            Some(Err(unknown)) => {
                tracing::debug!(operator_id = operator, command = unknown, "Unknown command ignored");
                TurnOutcome::Ignored
            }
            None => {
                self.coordinator
                    .handle_text(operator, chat, &message.text)
                    .await
            }
        }
    }

    // ── Main loop ───────────────────────────────────────────────────

    /// Serve turns until the stream ends or Ctrl+C.
    ///
    /// Each turn runs on its own task so a long single-message transfer never
    /// blocks `/cancel` or other operators.
    pub async fn run(self, mut stream: MessageStream) {
        tracing::info!("Dispatcher ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("Message stream ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            let dispatcher = self.clone();
            tokio::spawn(async move {
                match dispatcher.handle(&message).await {
                    TurnOutcome::Spawned(_) => {
                        tracing::debug!(operator_id = message.operator_id, "Batch transfer spawned");
                    }
                    TurnOutcome::Finished(report) => {
                        tracing::debug!(
                            operator_id = message.operator_id,
                            status = %report.status,
                            "Single transfer finished"
                        );
                    }
                    TurnOutcome::Replied | TurnOutcome::Ignored => {}
                }
            });
        }
    }
}
