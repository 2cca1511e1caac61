//! Transfer engine: link classification, per-item delivery and the batch loop.
//!
//! The runner is written against capability traits (`BotApi`,
//! `DelegatedSession`, `UserStore`) so it never talks to the network directly.

pub mod delivery;
pub mod jobs;
pub mod link;
pub mod model;
pub mod runner;
pub mod traits;

pub use jobs::{JobGuard, JobRegistry};
pub use link::{AccessClass, ChatRef, LinkClassifier, MessageLink};
pub use model::{
    ContentKind, FailureReason, FetchOrigin, ItemOutcome, MediaSource, SourceMessage,
    TransferReport, TransferStatus,
};
pub use runner::{TransferRequest, TransferRunner};
pub use traits::{BotApi, DelegatedSession, DisabledConnector, SentMessage, SessionConnector};
