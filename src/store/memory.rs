//! In-memory `UserStore`, optionally seeded from a JSON file.
//!
//! Usage counters reset at UTC midnight. Nothing is written back to disk.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use secrecy::SecretString;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::channels::{ChatId, OperatorId};
use crate::error::StoreError;

use super::traits::UserStore;

/// Seed file layout.
///
/// ```json
/// { "sessions": { "12345": "<session string>" }, "captions": { "12345": "via @me" } }
/// ```
#[derive(Default, Deserialize)]
pub struct StoreSeed {
    #[serde(default)]
    pub sessions: HashMap<OperatorId, String>,
    #[serde(default)]
    pub captions: HashMap<ChatId, String>,
}

#[derive(Default)]
struct StoreState {
    // Raw credentials; only handed out wrapped in `SecretString`.
    sessions: HashMap<OperatorId, String>,
    captions: HashMap<ChatId, String>,
    usage: HashMap<OperatorId, DailyUsage>,
}

#[derive(Debug, Clone, Copy)]
struct DailyUsage {
    day: NaiveDate,
    count: u32,
}

/// Process-local user store.
pub struct MemoryStore {
    daily_limit: Option<u32>,
    state: RwLock<StoreState>,
}

impl MemoryStore {
    /// Create an empty store. `daily_limit = None` never blocks anyone.
    pub fn new(daily_limit: Option<u32>) -> Self {
        Self {
            daily_limit,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Create a store pre-filled from a seed.
    pub fn with_seed(daily_limit: Option<u32>, seed: StoreSeed) -> Self {
        Self {
            daily_limit,
            state: RwLock::new(StoreState {
                sessions: seed.sessions,
                captions: seed.captions,
                usage: HashMap::new(),
            }),
        }
    }

    /// Load a seed file and build a store from it.
    pub async fn from_seed_file(
        daily_limit: Option<u32>,
        path: impl AsRef<Path>,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let seed: StoreSeed = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            sessions = seed.sessions.len(),
            captions = seed.captions.len(),
            "Loaded user store seed"
        );
        Ok(Self::with_seed(daily_limit, seed))
    }

    pub async fn set_session(&self, operator: OperatorId, credential: impl Into<String>) {
        self.state
            .write()
            .await
            .sessions
            .insert(operator, credential.into());
    }

    pub async fn set_caption(&self, destination: ChatId, caption: impl Into<String>) {
        self.state
            .write()
            .await
            .captions
            .insert(destination, caption.into());
    }

    /// Successful items recorded for an operator today.
    pub async fn usage_today(&self, operator: OperatorId) -> u32 {
        self.usage_on(operator, today()).await
    }

    async fn usage_on(&self, operator: OperatorId, day: NaiveDate) -> u32 {
        self.state
            .read()
            .await
            .usage
            .get(&operator)
            .filter(|u| u.day == day)
            .map(|u| u.count)
            .unwrap_or(0)
    }

    async fn record_on(&self, operator: OperatorId, day: NaiveDate) {
        let mut state = self.state.write().await;
        let entry = state
            .usage
            .entry(operator)
            .or_insert(DailyUsage { day, count: 0 });
        if entry.day != day {
            *entry = DailyUsage { day, count: 0 };
        }
        entry.count += 1;
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_session(&self, operator: OperatorId) -> Result<Option<SecretString>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .sessions
            .get(&operator)
            .map(|raw| SecretString::from(raw.clone())))
    }

    async fn get_caption(&self, destination: ChatId) -> Result<Option<String>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .captions
            .get(&destination)
            .filter(|c| !c.is_empty())
            .cloned())
    }

    async fn check_limit(&self, operator: OperatorId) -> Result<bool, StoreError> {
        let Some(limit) = self.daily_limit else {
            return Ok(false);
        };
        Ok(self.usage_today(operator).await >= limit)
    }

    async fn add_traffic(&self, operator: OperatorId) -> Result<(), StoreError> {
        self.record_on(operator, today()).await;
        Ok(())
    }
}
