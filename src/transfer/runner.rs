//! Transfer runner: the bounded, cancellable, rate-limited fetch-and-deliver loop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::channels::{ChatId, OperatorId};
use crate::config::TransferConfig;
use crate::store::UserStore;
use crate::transfer::jobs::JobGuard;
use crate::transfer::link::{AccessClass, MessageLink};
use crate::transfer::model::{
    FailureReason, ItemOutcome, TransferReport, TransferStatus, progress_text,
};
use crate::transfer::traits::{BotApi, DelegatedSession, SentMessage, SessionConnector};

/// Parameters of one transfer, resolved by the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub operator: OperatorId,
    pub link: MessageLink,
    pub count: u32,
    pub destination: ChatId,
}

/// Delegated session for one run, connected at most once and released at the end.
pub(crate) struct Delegation {
    connector: Arc<dyn SessionConnector>,
    store: Arc<dyn UserStore>,
    operator: OperatorId,
    session: Option<Box<dyn DelegatedSession>>,
    attempted: bool,
}

impl Delegation {
    fn new(
        connector: Arc<dyn SessionConnector>,
        store: Arc<dyn UserStore>,
        operator: OperatorId,
    ) -> Self {
        Self {
            connector,
            store,
            operator,
            session: None,
            attempted: false,
        }
    }

    /// The started session, connecting on first use.
    pub(crate) async fn acquire(&mut self) -> Option<&dyn DelegatedSession> {
        if !self.attempted {
            self.attempted = true;
            self.session = self.connect().await;
        }
        self.session.as_deref()
    }

    /// The session if one was already started.
    pub(crate) fn current(&self) -> Option<&dyn DelegatedSession> {
        self.session.as_deref()
    }

    async fn connect(&self) -> Option<Box<dyn DelegatedSession>> {
        let credential: SecretString = match self.store.get_session(self.operator).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                debug!(operator_id = self.operator, "No delegated session stored");
                return None;
            }
            Err(e) => {
                warn!(operator_id = self.operator, error = %e, "Failed to load delegated session");
                return None;
            }
        };

        let session = match self.connector.connect(self.operator, &credential).await {
            Ok(s) => s,
            Err(e) => {
                warn!(operator_id = self.operator, error = %e, "Delegated session connect failed");
                return None;
            }
        };

        if let Err(e) = session.start().await {
            warn!(operator_id = self.operator, error = %e, "Delegated session start failed");
            return None;
        }
        info!(operator_id = self.operator, "Delegated session started");
        Some(session)
    }

    async fn release(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.stop().await {
                warn!(operator_id = self.operator, error = %e, "Delegated session stop failed");
            } else {
                debug!(operator_id = self.operator, "Delegated session stopped");
            }
        }
    }
}

/// Runs transfers against the bot, the user store and delegated sessions.
pub struct TransferRunner {
    pub(crate) bot: Arc<dyn BotApi>,
    store: Arc<dyn UserStore>,
    connector: Arc<dyn SessionConnector>,
    config: TransferConfig,
}

impl TransferRunner {
    pub fn new(
        bot: Arc<dyn BotApi>,
        store: Arc<dyn UserStore>,
        connector: Arc<dyn SessionConnector>,
        config: TransferConfig,
    ) -> Self {
        Self {
            bot,
            store,
            connector,
            config,
        }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn bot(&self) -> &Arc<dyn BotApi> {
        &self.bot
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    /// Run a transfer to completion or cancellation.
    ///
    /// The job guard is consumed: when this returns (or unwinds) the
    /// operator's cancel flag is gone. A delegated session started for this
    /// run is stopped on every exit path.
    pub async fn run(
        &self,
        request: &TransferRequest,
        job: JobGuard,
        progress: Option<SentMessage>,
    ) -> TransferReport {
        let mut delegation = Delegation::new(
            Arc::clone(&self.connector),
            Arc::clone(&self.store),
            request.operator,
        );

        if request.link.access == AccessClass::Private && delegation.acquire().await.is_none() {
            info!(
                operator_id = request.operator,
                chat = %request.link.chat,
                "Private transfer refused: no delegated session"
            );
            return TransferReport {
                success: 0,
                failed: 0,
                total: request.count,
                status: TransferStatus::AuthorizationRequired,
            };
        }

        info!(
            operator_id = request.operator,
            job_id = %job.id(),
            chat = %request.link.chat,
            start = request.link.sequence,
            count = request.count,
            access = %request.link.access,
            "Transfer started"
        );

        let result = AssertUnwindSafe(self.run_items(request, &job, &mut delegation, progress))
            .catch_unwind()
            .await;

        delegation.release().await;
        drop(job);

        match result {
            Ok(report) => {
                info!(
                    operator_id = request.operator,
                    success = report.success,
                    failed = report.failed,
                    total = report.total,
                    status = %report.status,
                    "Transfer finished"
                );
                report
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn run_items(
        &self,
        request: &TransferRequest,
        job: &JobGuard,
        delegation: &mut Delegation,
        progress: Option<SentMessage>,
    ) -> TransferReport {
        let caption = match self.store.get_caption(request.destination).await {
            Ok(c) => c,
            Err(e) => {
                warn!(destination = request.destination, error = %e, "Caption lookup failed");
                None
            }
        };

        let mut report = TransferReport {
            success: 0,
            failed: 0,
            total: request.count,
            status: TransferStatus::Completed,
        };

        for index in 0..request.count {
            if job.is_cancelled() {
                info!(operator_id = request.operator, done = index, "Transfer cancelled");
                report.status = TransferStatus::Cancelled;
                break;
            }

            let outcome = match request.link.sequence.checked_add(i64::from(index)) {
                Some(sequence) => {
                    self.transfer_one(request, sequence, caption.as_deref(), delegation)
                        .await
                }
                None => ItemOutcome::Failed(FailureReason::CannotFetch),
            };
            debug!(operator_id = request.operator, offset = index, outcome = %outcome.reason(), "Item processed");

            match outcome {
                ItemOutcome::Delivered => {
                    report.success += 1;
                    if let Err(e) = self.store.add_traffic(request.operator).await {
                        warn!(operator_id = request.operator, error = %e, "Failed to record traffic");
                    }
                }
                ItemOutcome::Failed(ref reason) => {
                    report.failed += 1;
                    warn!(
                        operator_id = request.operator,
                        chat = %request.link.chat,
                        offset = index,
                        reason = %reason,
                        "Transfer item failed"
                    );
                }
            }

            let done = index + 1;
            if done % self.config.progress_every == 0 || done == request.count {
                self.report_progress(progress, done, &report).await;
            }

            tokio::time::sleep(self.config.item_delay).await;
        }

        report
    }

    /// Best-effort edit of the progress message.
    async fn report_progress(&self, progress: Option<SentMessage>, done: u32, report: &TransferReport) {
        let Some(message) = progress else {
            return;
        };
        let text = progress_text(done, report.total, report.success, report.failed);
        if let Err(e) = self.bot.edit_text(message, &text).await {
            debug!(error = %e, "Progress update failed");
        }
    }
}
