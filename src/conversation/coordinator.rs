//! Conversation coordinator: owns every operator's dialog and launches transfers.
//!
//! Each operator has a slot holding their open dialog. A turn handler locks
//! the operator's slot for the whole state update, so two turns from the same
//! operator never interleave their updates, while different operators never
//! contend. Running transfers are tracked separately in the [`JobRegistry`],
//! which is what `/cancel` reaches once the dialog is gone. A slot is dropped
//! from the map as soon as it is empty and no turn holds it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channels::{ChatId, OperatorId};
use crate::transfer::{
    JobGuard, JobRegistry, LinkClassifier, MessageLink, TransferReport, TransferRequest,
    TransferRunner,
};

use super::replies;
use super::state::{Dialog, DialogStep, Transition};

type Slot = Arc<AsyncMutex<Option<Dialog>>>;

/// Result of handling one operator turn.
#[derive(Debug)]
pub enum TurnOutcome {
    /// Turn did not apply to this operator (no dialog, unknown command).
    Ignored,
    /// A reply was sent and the dialog updated.
    Replied,
    /// A batch transfer was spawned; the handle yields its final report.
    Spawned(JoinHandle<TransferReport>),
    /// A transfer ran inline and finished.
    Finished(TransferReport),
}

pub struct Coordinator {
    dialogs: Mutex<HashMap<OperatorId, Slot>>,
    jobs: Arc<JobRegistry>,
    classifier: LinkClassifier,
    runner: Arc<TransferRunner>,
}

impl Coordinator {
    pub fn new(runner: Arc<TransferRunner>, jobs: Arc<JobRegistry>) -> Self {
        Self {
            dialogs: Mutex::new(HashMap::new()),
            jobs,
            classifier: LinkClassifier::new(),
            runner,
        }
    }

    fn slot(&self, operator: OperatorId) -> Slot {
        let mut dialogs = self.dialogs.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(dialogs.entry(operator).or_default())
    }

    /// Drop the operator's slot if it holds no dialog and only the map and
    /// the caller reference it. Clones are only made under the map lock.
    fn release_slot(&self, operator: OperatorId, slot: &Slot) {
        let mut dialogs = self.dialogs.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(stored) = dialogs.get(&operator) else {
            return;
        };
        if !Arc::ptr_eq(stored, slot) || Arc::strong_count(slot) > 2 {
            return;
        }
        let empty = slot.try_lock().is_ok_and(|current| current.is_none());
        if empty {
            dialogs.remove(&operator);
        }
    }

    #[cfg(test)]
    fn open_slots(&self) -> usize {
        self.dialogs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Current dialog step of an operator.
    pub async fn step(&self, operator: OperatorId) -> DialogStep {
        let slot = {
            let dialogs = self.dialogs.lock().unwrap_or_else(PoisonError::into_inner);
            dialogs.get(&operator).cloned()
        };
        let Some(slot) = slot else {
            return DialogStep::Idle;
        };
        let current = slot.lock().await;
        current.as_ref().map_or(DialogStep::Idle, Dialog::step)
    }

    /// `/batch`: open the batch dialog, replacing any open dialog.
    pub async fn start_batch(&self, operator: OperatorId, chat: ChatId) -> TurnOutcome {
        self.start(operator, chat, Dialog::AwaitingLink, replies::BATCH_PROMPT)
            .await
    }

    /// `/single`: open the single-message dialog, replacing any open dialog.
    pub async fn start_single(&self, operator: OperatorId, chat: ChatId) -> TurnOutcome {
        self.start(operator, chat, Dialog::AwaitingSingleLink, replies::SINGLE_PROMPT)
            .await
    }

    async fn start(
        &self,
        operator: OperatorId,
        chat: ChatId,
        dialog: Dialog,
        prompt: &str,
    ) -> TurnOutcome {
        let slot = self.slot(operator);
        let mut current = slot.lock().await;

        if self.jobs.is_active(operator) {
            drop(current);
            self.release_slot(operator, &slot);
            info!(
                operator_id = operator,
                started_at = ?self.jobs.started_at(operator),
                "Dialog start rejected: transfer running"
            );
            self.reply(chat, replies::ALREADY_RUNNING).await;
            return TurnOutcome::Replied;
        }

        let from = current.as_ref().map_or(DialogStep::Idle, Dialog::step);
        debug_assert!(from.can_transition_to(dialog.step()));
        debug!(operator_id = operator, from = %from, to = %dialog.step(), "Dialog started");
        *current = Some(dialog);
        drop(current);

        self.reply(chat, prompt).await;
        TurnOutcome::Replied
    }

    /// `/cancel`: drop the open dialog and flag the running transfer, if any.
    pub async fn cancel(&self, operator: OperatorId, chat: ChatId) -> TurnOutcome {
        let slot = self.slot(operator);
        let mut current = slot.lock().await;
        let had_dialog = current.take().is_some();
        let had_job = self.jobs.cancel(operator);
        drop(current);
        self.release_slot(operator, &slot);

        let reply = match (had_dialog, had_job) {
            (_, true) => replies::CANCELLING,
            (true, false) => replies::CANCELLED,
            (false, false) => replies::NOTHING_TO_CANCEL,
        };
        info!(operator_id = operator, had_dialog, had_job, "Cancel handled");
        self.reply(chat, reply).await;
        TurnOutcome::Replied
    }

    /// `/start` and `/help`.
    pub async fn help(&self, chat: ChatId) -> TurnOutcome {
        self.reply(chat, replies::HELP).await;
        TurnOutcome::Replied
    }

    /// A plain text turn. Ignored unless the operator has an open dialog.
    pub async fn handle_text(&self, operator: OperatorId, chat: ChatId, text: &str) -> TurnOutcome {
        let slot = self.slot(operator);
        let outcome = self.advance(operator, chat, text, &slot).await;
        self.release_slot(operator, &slot);
        outcome
    }

    async fn advance(&self, operator: OperatorId, chat: ChatId, text: &str, slot: &Slot) -> TurnOutcome {
        let mut current = slot.lock().await;
        let Some(dialog) = current.take() else {
            return TurnOutcome::Ignored;
        };

        let from = dialog.step();
        let transition = dialog.advance(text, &self.classifier, self.runner.config().max_batch);
        debug_assert!(from.can_transition_to(transition.step()));
        debug!(operator_id = operator, from = %from, to = %transition.step(), "Dialog turn");

        match transition {
            Transition::Stay { dialog, reply } | Transition::Next { dialog, reply } => {
                *current = Some(dialog);
                drop(current);
                self.reply(chat, &reply).await;
                TurnOutcome::Replied
            }
            Transition::LaunchSingle(link) => {
                let Some(job) = self.admit(operator, chat).await else {
                    return TurnOutcome::Replied;
                };
                drop(current);
                self.run_single(operator, chat, link, job).await
            }
            Transition::LaunchBatch { link, count } => {
                let Some(job) = self.admit(operator, chat).await else {
                    return TurnOutcome::Replied;
                };
                drop(current);
                self.spawn_batch(operator, chat, link, count, job).await
            }
        }
    }

    /// Gate a transfer on the usage limit and claim the operator's job slot.
    /// Called with the operator's dialog slot held.
    async fn admit(&self, operator: OperatorId, chat: ChatId) -> Option<JobGuard> {
        match self.runner.store().check_limit(operator).await {
            Ok(true) => {
                info!(operator_id = operator, "Transfer refused: daily limit reached");
                self.reply(chat, replies::LIMIT_REACHED).await;
                return None;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(operator_id = operator, error = %e, "Limit check failed, allowing transfer");
            }
        }

        let job = self.jobs.register(operator);
        if job.is_none() {
            self.reply(chat, replies::ALREADY_RUNNING).await;
        }
        job
    }

    async fn run_single(
        &self,
        operator: OperatorId,
        chat: ChatId,
        link: MessageLink,
        job: JobGuard,
    ) -> TurnOutcome {
        let request = TransferRequest {
            operator,
            link,
            count: 1,
            destination: chat,
        };
        let report = self.runner.run(&request, job, None).await;
        self.reply(chat, &replies::single_result(&request.link, &report))
            .await;
        TurnOutcome::Finished(report)
    }

    async fn spawn_batch(
        &self,
        operator: OperatorId,
        chat: ChatId,
        link: MessageLink,
        count: u32,
        job: JobGuard,
    ) -> TurnOutcome {
        let progress = match self
            .runner
            .bot()
            .send_text(chat, &replies::starting_batch(count))
            .await
        {
            Ok(sent) => Some(sent),
            Err(e) => {
                warn!(operator_id = operator, error = %e, "Failed to send progress message");
                None
            }
        };

        let request = TransferRequest {
            operator,
            link,
            count,
            destination: chat,
        };
        let runner = Arc::clone(&self.runner);
        let handle = tokio::spawn(async move {
            let report = runner.run(&request, job, progress).await;
            if let Err(e) = runner
                .bot()
                .send_text(request.destination, &report.summary())
                .await
            {
                warn!(operator_id = request.operator, error = %e, "Failed to send batch summary");
            }
            report
        });
        TurnOutcome::Spawned(handle)
    }

    async fn reply(&self, chat: ChatId, text: &str) {
        if let Err(e) = self.runner.bot().send_text(chat, text).await {
            warn!(chat_id = chat, error = %e, "Failed to send reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::TransferConfig;
    use crate::error::ChannelError;
    use crate::store::MemoryStore;
    use crate::transfer::{
        BotApi, ChatRef, ContentKind, DisabledConnector, FetchOrigin, MediaSource, SentMessage,
        SourceMessage, TransferStatus,
    };

    const OPERATOR: OperatorId = 9;

    /// Bot that can read every public sequence and accepts every send.
    struct EchoBot;

    #[async_trait]
    impl BotApi for EchoBot {
        async fn fetch_message(
            &self,
            chat: &ChatRef,
            sequence: i64,
        ) -> Result<Option<SourceMessage>, ChannelError> {
            Ok(Some(SourceMessage::text(
                chat.clone(),
                sequence,
                format!("post {sequence}"),
                FetchOrigin::Bot,
            )))
        }

        async fn copy_message(
            &self,
            _destination: ChatId,
            _chat: &ChatRef,
            _sequence: i64,
            _caption: Option<&str>,
        ) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn send_text(&self, destination: ChatId, _text: &str) -> Result<SentMessage, ChannelError> {
            Ok(SentMessage {
                chat_id: destination,
                message_id: 1,
            })
        }

        async fn send_plain_text(&self, _destination: ChatId, _text: &str) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn send_media(
            &self,
            _destination: ChatId,
            _kind: &ContentKind,
            _media: MediaSource,
            _caption: Option<&str>,
        ) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn edit_text(&self, _message: SentMessage, _text: &str) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    fn coordinator() -> Coordinator {
        let runner = TransferRunner::new(
            Arc::new(EchoBot),
            Arc::new(MemoryStore::new(None)),
            Arc::new(DisabledConnector),
            TransferConfig {
                item_delay: Duration::ZERO,
                ..TransferConfig::default()
            },
        );
        Coordinator::new(Arc::new(runner), JobRegistry::new())
    }

    #[tokio::test]
    async fn turns_without_a_dialog_leave_no_slot() {
        let c = coordinator();

        assert!(matches!(c.handle_text(OPERATOR, OPERATOR, "hello").await, TurnOutcome::Ignored));
        assert_eq!(c.step(OPERATOR).await, DialogStep::Idle);
        c.cancel(OPERATOR, OPERATOR).await;

        assert_eq!(c.open_slots(), 0);
    }

    #[tokio::test]
    async fn open_dialog_keeps_its_slot_until_cancelled() {
        let c = coordinator();

        c.start_batch(OPERATOR, OPERATOR).await;
        c.handle_text(OPERATOR, OPERATOR, "not a link").await;
        assert_eq!(c.step(OPERATOR).await, DialogStep::AwaitingLink);
        assert_eq!(c.open_slots(), 1);

        c.cancel(OPERATOR, OPERATOR).await;
        assert_eq!(c.open_slots(), 0);
    }

    #[tokio::test]
    async fn finished_single_transfer_drops_the_slot() {
        let c = coordinator();

        c.start_single(OPERATOR, OPERATOR).await;
        let outcome = c.handle_text(OPERATOR, OPERATOR, "https://t.me/news/5").await;

        let TurnOutcome::Finished(report) = outcome else {
            panic!("expected an inline transfer, got {outcome:?}");
        };
        assert_eq!(report.status, TransferStatus::Completed);
        assert_eq!(c.open_slots(), 0);
    }

    #[tokio::test]
    async fn launched_batch_drops_the_slot() {
        let c = coordinator();

        c.start_batch(OPERATOR, OPERATOR).await;
        c.handle_text(OPERATOR, OPERATOR, "https://t.me/news/1").await;
        let outcome = c.handle_text(OPERATOR, OPERATOR, "2").await;
        assert_eq!(c.open_slots(), 0);

        let TurnOutcome::Spawned(handle) = outcome else {
            panic!("expected a spawned batch, got {outcome:?}");
        };
        let report = handle.await.unwrap();
        assert_eq!((report.success, report.failed), (2, 0));
    }

    #[tokio::test]
    async fn many_operators_finish_without_growing_the_map() {
        let c = coordinator();

        for operator in 1..=50 {
            c.start_batch(operator, operator).await;
            c.cancel(operator, operator).await;
            c.handle_text(operator, operator, "stray").await;
        }

        assert_eq!(c.open_slots(), 0);
    }
}
