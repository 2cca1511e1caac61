//! Operator dialogs: the batch and single-message flows and cancellation.

pub mod coordinator;
pub mod replies;
pub mod state;

pub use coordinator::{Coordinator, TurnOutcome};
pub use state::{Dialog, DialogStep, Transition, parse_count};
