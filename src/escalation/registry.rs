//! Central registry for live escalations.
//!
//! [`EscalationRegistry`] is the single source of truth for every escalation
//! the workflow manager has accepted. It wraps a `HashMap` behind
//! `Arc<Mutex<..>>` for thread-safe access from the execution handler, the
//! progress tracker, and status-query callers.
//!
//! **Concurrency model:** `Arc<Mutex<HashMap>>` is chosen over `DashMap` to
//! avoid an extra dependency. Contention is negligible -- exactly one writer
//! (the owning execution task) mutates a given entry, and readers take short
//! lock-and-clone snapshots.
//!
//! **Cancellation model:** Each entry holds a [`CancellationToken`] created
//! as a child of the registry's root token. `cancel` flips the status under
//! the lock *and* cancels the token, so the owning execution task observes
//! the signal at its next phase boundary or worker dispatch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::types::{
    CancelAck, Escalation, EscalationId, EscalationStatus, EscalationSummary, StatusSnapshot,
};
use crate::error::EscalationError;

/// Internal entry stored in the registry. Not exposed publicly -- callers see
/// [`StatusSnapshot`] / [`Escalation`] clones via the query methods.
struct Entry {
    escalation: Escalation,
    cancel_token: CancellationToken,
    /// JoinHandle for the spawned execution task, retained for join/shutdown.
    join_handle: Option<JoinHandle<()>>,
}

/// Concurrency-safe keyed store of escalations.
///
/// Designed to be cloned freely; all state is behind `Arc`.
#[derive(Clone)]
pub struct EscalationRegistry {
    entries: Arc<Mutex<HashMap<EscalationId, Entry>>>,
    root_cancel_token: CancellationToken,
}

impl EscalationRegistry {
    pub fn new(root_cancel_token: CancellationToken) -> Self {
        EscalationRegistry {
            entries: Arc::new(Mutex::new(HashMap::new())),
            root_cancel_token,
        }
    }

    /// Create a cancellation token for a new escalation, as a child of the
    /// root token so shutdown cascades.
    pub fn child_token(&self) -> CancellationToken {
        self.root_cancel_token.child_token()
    }

    /// Register a newly created escalation. IDs are UUID v4, so collisions
    /// do not occur in practice; a duplicate insert is logged and replaced.
    pub fn insert(&self, escalation: Escalation, cancel_token: CancellationToken) {
        let mut entries = self.entries.lock().unwrap();
        let id = escalation.id.clone();
        if entries
            .insert(
                id.clone(),
                Entry {
                    escalation,
                    cancel_token,
                    join_handle: None,
                },
            )
            .is_some()
        {
            tracing::error!(escalation_id = %id, "duplicate escalation id replaced in registry");
        }
    }

    /// Attach the JoinHandle of the escalation's execution task.
    pub fn set_join_handle(&self, id: &str, handle: JoinHandle<()>) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(id) {
            entry.join_handle = Some(handle);
        }
    }

    /// Take (remove) the JoinHandle, for callers that want to await the run.
    pub fn take_join_handle(&self, id: &str) -> Option<JoinHandle<()>> {
        let mut entries = self.entries.lock().unwrap();
        entries.get_mut(id).and_then(|e| e.join_handle.take())
    }

    /// Run a closure against the live record under the lock. Returns `None`
    /// if the escalation is not registered. This is the single mutation
    /// doorway; only the progress tracker and `cancel` go through it.
    pub(crate) fn update<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Escalation) -> R,
    ) -> Option<R> {
        let mut entries = self.entries.lock().unwrap();
        entries.get_mut(id).map(|e| f(&mut e.escalation))
    }

    /// Full clone of the current record. Returns `None` if not found.
    pub fn snapshot(&self, id: &str) -> Option<Escalation> {
        let entries = self.entries.lock().unwrap();
        entries.get(id).map(|e| e.escalation.clone())
    }

    /// Status-query view of the current record.
    pub fn status(&self, id: &str) -> Option<StatusSnapshot> {
        let entries = self.entries.lock().unwrap();
        entries.get(id).map(|e| StatusSnapshot::of(&e.escalation))
    }

    /// Request cancellation of a running escalation.
    ///
    /// Fails with `InvalidState` if the escalation is already terminal. On
    /// success the status flips to `Cancelled`, `cancelled_at` is stamped,
    /// and the escalation's token is cancelled so the owning execution task
    /// stops at its next checkpoint. This is a request, not a guarantee: an
    /// in-flight crew invocation is abandoned, not interrupted.
    pub fn cancel(&self, id: &str) -> Result<CancelAck, EscalationError> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| EscalationError::NotFound(id.to_string()))?;

        if entry.escalation.status.is_terminal() {
            return Err(EscalationError::InvalidState {
                id: id.to_string(),
                status: entry.escalation.status.as_str().to_string(),
            });
        }

        let now = Utc::now();
        let frozen_progress = entry.escalation.progress;
        entry.escalation.status = EscalationStatus::Cancelled;
        entry.escalation.cancelled_at = Some(now);
        entry.escalation.updated_at = now;
        entry.cancel_token.cancel();

        Ok(CancelAck {
            id: id.to_string(),
            message: format!("Escalation cancelled at {frozen_progress}% progress"),
        })
    }

    /// Summaries of all escalations belonging to a flow, ordered by
    /// `started_at` descending.
    pub fn list_for_flow(&self, flow_id: &str) -> Vec<EscalationSummary> {
        let entries = self.entries.lock().unwrap();
        let mut summaries: Vec<EscalationSummary> = entries
            .values()
            .filter(|e| e.escalation.context.flow_id.as_deref() == Some(flow_id))
            .map(|e| EscalationSummary::of(&e.escalation))
            .collect();
        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        summaries
    }

    /// Sweep terminal escalations older than `max_age`. Returns how many
    /// entries were removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::zero());
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, e| {
            e.escalation
                .terminal_at()
                .is_none_or(|at| at > cutoff)
        });
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, "swept terminal escalations past retention");
        }
        removed
    }

    /// Shut down: cancel the root token (cascades to all escalations), then
    /// await all execution tasks with a per-handle timeout of 5 seconds.
    pub async fn shutdown(&self) {
        self.root_cancel_token.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut entries = self.entries.lock().unwrap();
            entries
                .values_mut()
                .filter_map(|e| e.join_handle.take())
                .collect()
        };

        for handle in handles {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}
