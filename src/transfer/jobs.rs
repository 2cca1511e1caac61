//! Job registry: one in-flight transfer per operator, each with a cancel flag.
//!
//! A transfer holds a [`JobGuard`] for its whole run. Dropping the guard
//! removes the registry entry, so the flag can never outlive the job and
//! silently cancel a later batch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::channels::OperatorId;

#[derive(Debug)]
struct JobEntry {
    id: Uuid,
    cancel: Arc<AtomicBool>,
    started_at: DateTime<Utc>,
}

/// Process-wide map of running transfers keyed by operator.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<OperatorId, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<OperatorId, JobEntry>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a job for `operator`. Returns `None` if one is already running.
    pub fn register(self: &Arc<Self>, operator: OperatorId) -> Option<JobGuard> {
        let mut jobs = self.lock();
        if jobs.contains_key(&operator) {
            return None;
        }
        let id = Uuid::new_v4();
        let cancel = Arc::new(AtomicBool::new(false));
        jobs.insert(
            operator,
            JobEntry {
                id,
                cancel: Arc::clone(&cancel),
                started_at: Utc::now(),
            },
        );
        Some(JobGuard {
            registry: Arc::clone(self),
            operator,
            id,
            cancel,
        })
    }

    /// Whether a transfer is running for `operator`.
    pub fn is_active(&self, operator: OperatorId) -> bool {
        self.lock().contains_key(&operator)
    }

    /// When the operator's current job started, if any.
    pub fn started_at(&self, operator: OperatorId) -> Option<DateTime<Utc>> {
        self.lock().get(&operator).map(|j| j.started_at)
    }

    /// Raise the cancel flag of the operator's job. Returns `false` if none runs.
    pub fn cancel(&self, operator: OperatorId) -> bool {
        match self.lock().get(&operator) {
            Some(job) => {
                job.cancel.store(true, Ordering::SeqCst);
                tracing::info!(operator_id = operator, job_id = %job.id, "Transfer cancellation requested");
                true
            }
            None => false,
        }
    }

    fn release(&self, operator: OperatorId, id: Uuid) {
        let mut jobs = self.lock();
        if jobs.get(&operator).is_some_and(|j| j.id == id) {
            jobs.remove(&operator);
        }
    }
}

/// Ownership token of a running transfer.
#[derive(Debug)]
pub struct JobGuard {
    registry: Arc<JobRegistry>,
    operator: OperatorId,
    id: Uuid,
    cancel: Arc<AtomicBool>,
}

impl JobGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn operator(&self) -> OperatorId {
        self.operator
    }

    /// Polled between items.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.registry.release(self.operator, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_job_per_operator() {
        let registry = JobRegistry::new();
        let first = registry.register(1).unwrap();
        assert!(registry.register(1).is_none());
        // Different operators never collide
        let other = registry.register(2).unwrap();
        assert_ne!(first.id(), other.id());
    }

    #[test]
    fn drop_clears_entry_and_flag() {
        let registry = JobRegistry::new();
        let job = registry.register(1).unwrap();
        assert!(registry.cancel(1));
        assert!(job.is_cancelled());
        drop(job);

        assert!(!registry.is_active(1));
        assert!(!registry.cancel(1));
        let next = registry.register(1).unwrap();
        assert!(!next.is_cancelled());
    }

    #[test]
    fn cancel_without_job_is_noop() {
        let registry = JobRegistry::new();
        assert!(!registry.cancel(9));
        assert!(!registry.is_active(9));
        assert!(registry.started_at(9).is_none());
    }

    #[test]
    fn cancel_only_touches_its_operator() {
        let registry = JobRegistry::new();
        let a = registry.register(1).unwrap();
        let b = registry.register(2).unwrap();
        registry.cancel(1);
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
        assert_eq!(a.operator(), 1);
    }
}
