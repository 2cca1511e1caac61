//! Operator-facing texts of the dialogs.

use crate::transfer::{MessageLink, TransferReport, TransferStatus};

pub const BATCH_PROMPT: &str = "*Initiating Batch Mode...*\n\n\
    Please send the *starting link* of the restricted content.\n\
    Example: `https://t.me/c/123456789/1`";

pub const SINGLE_PROMPT: &str = "*Single Message Mode*\n\n\
    Please send the *link* of the message to transfer.\n\
    Example: `https://t.me/channel/42`";

pub const INVALID_LINK: &str = "❌ Invalid link format. Please try again.";

pub const LINK_RECEIVED: &str =
    "✅ Link received! Now send the *number of messages* to download.";

pub const LIMIT_REACHED: &str =
    "⛔ Daily limit reached. Try again tomorrow or upgrade your plan.";

pub const NOTHING_TO_CANCEL: &str = "ℹ️ Nothing to cancel.";

pub const CANCELLED: &str = "🛑 Cancelled.";

pub const CANCELLING: &str = "🛑 Cancelling... the current item will finish first.";

pub const ALREADY_RUNNING: &str =
    "⏳ A transfer is already running. Send /cancel to stop it first.";

pub const HELP: &str = "*Cantarella*\n\n\
    /batch: transfer a run of messages starting from a link\n\
    /single: transfer one message\n\
    /cancel: stop the current dialog or transfer";

pub fn invalid_count(max_batch: u32) -> String {
    format!("❌ Please send a valid number between 1 and {max_batch}.")
}

pub fn starting_batch(count: u32) -> String {
    format!("🚀 Starting batch processing for {count} messages...")
}

/// Inline result of a one-message transfer.
pub fn single_result(link: &MessageLink, report: &TransferReport) -> String {
    match report.status {
        TransferStatus::Completed if report.success == 1 => {
            format!("✅ Message {} transferred.", link.sequence)
        }
        TransferStatus::Completed => {
            format!("❌ Message {} could not be transferred.", link.sequence)
        }
        TransferStatus::Cancelled | TransferStatus::AuthorizationRequired => report.summary(),
    }
}
