//! `UserStore` trait: the per-operator data the transfer flow consults.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::channels::{ChatId, OperatorId};
use crate::error::StoreError;

/// Backend-agnostic access to per-operator settings and counters.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Delegated session credential for an operator, if one was stored.
    async fn get_session(&self, operator: OperatorId) -> Result<Option<SecretString>, StoreError>;

    /// Caption override configured for a destination chat.
    async fn get_caption(&self, destination: ChatId) -> Result<Option<String>, StoreError>;

    /// Whether the operator has used up today's allowance (`true` = blocked).
    async fn check_limit(&self, operator: OperatorId) -> Result<bool, StoreError>;

    /// Record one successfully transferred item.
    async fn add_traffic(&self, operator: OperatorId) -> Result<(), StoreError>;
}
