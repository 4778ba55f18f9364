//! User confirmation flow for action execution.
//!
//! Actions the policy marks as confirmation-required come back from the
//! router unexecuted. The caller parks them here until the user approves
//! or dismisses them; an approved entry is re-submitted through
//! [`Router::approve`](crate::router::Router::approve).

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use keel_core::types::Params;

/// An action waiting for the user's decision.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConfirmation {
    pub id: Uuid,
    pub action: String,
    pub params: Params,
    /// Human-readable description shown in the prompt.
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// FIFO queue of pending confirmations.
#[derive(Debug, Default)]
pub struct ConfirmationGate {
    pending: Mutex<VecDeque<PendingConfirmation>>,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the queue half-updated,
    // so a poisoned lock is still safe to use.
    fn queue(&self) -> MutexGuard<'_, VecDeque<PendingConfirmation>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a confirmation request and return its id.
    pub fn request(&self, action: &str, params: Params, description: String) -> Uuid {
        let id = Uuid::new_v4();
        self.queue().push_back(PendingConfirmation {
            id,
            action: action.to_string(),
            params,
            description,
            created_at: Utc::now(),
        });
        tracing::info!(%id, action, "Confirmation requested");
        id
    }

    /// Approve a pending confirmation, removing and returning it.
    ///
    /// Returns `None` if no confirmation exists for the given id.
    pub fn approve(&self, id: Uuid) -> Option<PendingConfirmation> {
        let mut pending = self.queue();
        let pos = pending.iter().position(|p| p.id == id)?;
        pending.remove(pos)
    }

    /// Dismiss a pending confirmation. Returns `true` if it was found.
    pub fn dismiss(&self, id: Uuid) -> bool {
        let mut pending = self.queue();
        match pending.iter().position(|p| p.id == id) {
            Some(pos) => {
                pending.remove(pos);
                tracing::info!(%id, "Confirmation dismissed");
                true
            }
            None => false,
        }
    }

    /// Snapshot of everything still waiting, oldest first.
    pub fn pending(&self) -> Vec<PendingConfirmation> {
        self.queue().iter().cloned().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.queue().len()
    }

    /// Drop confirmations at least `max_age` old. Returns how many were dropped.
    pub fn expire_older_than(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut pending = self.queue();
        let before = pending.len();
        pending.retain(|p| p.created_at > cutoff);
        let expired = before - pending.len();
        if expired > 0 {
            tracing::info!(expired, "Stale confirmations expired");
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path_params(path: &str) -> Params {
        let mut params = Params::new();
        params.insert("path".into(), json!(path));
        params
    }

    #[test]
    fn test_request_and_approve() {
        let gate = ConfirmationGate::new();
        let id = gate.request("file_delete", path_params("/tmp/a"), "Delete /tmp/a".to_string());
        assert_eq!(gate.pending_count(), 1);

        let confirmed = gate.approve(id).unwrap();
        assert_eq!(confirmed.id, id);
        assert_eq!(confirmed.action, "file_delete");
        assert_eq!(confirmed.params, path_params("/tmp/a"));
        assert_eq!(confirmed.description, "Delete /tmp/a");
        assert_eq!(gate.pending_count(), 0);
    }

    #[test]
    fn test_approve_nonexistent_returns_none() {
        let gate = ConfirmationGate::new();
        assert!(gate.approve(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_request_and_dismiss() {
        let gate = ConfirmationGate::new();
        let id = gate.request("email_send", Params::new(), "Send email".to_string());
        assert!(gate.dismiss(id));
        assert!(!gate.dismiss(id));
        assert_eq!(gate.pending_count(), 0);
    }

    #[test]
    fn test_multiple_confirmations() {
        let gate = ConfirmationGate::new();
        let id1 = gate.request("file_delete", Params::new(), "D1".to_string());
        let id2 = gate.request("file_move", Params::new(), "M1".to_string());
        let id3 = gate.request("email_send", Params::new(), "E1".to_string());

        let order: Vec<Uuid> = gate.pending().iter().map(|p| p.id).collect();
        assert_eq!(order, vec![id1, id2, id3]);

        assert_eq!(gate.approve(id2).unwrap().action, "file_move");
        assert!(gate.dismiss(id1));
        assert_eq!(gate.approve(id3).unwrap().action, "email_send");
        assert_eq!(gate.pending_count(), 0);
    }

    #[test]
    fn test_double_approve_returns_none() {
        let gate = ConfirmationGate::new();
        let id = gate.request("file_delete", Params::new(), "D".to_string());
        assert!(gate.approve(id).is_some());
        assert!(gate.approve(id).is_none());
    }

    #[test]
    fn test_expire_older_than() {
        let gate = ConfirmationGate::new();
        gate.request("file_delete", Params::new(), "D".to_string());
        gate.request("file_move", Params::new(), "M".to_string());

        assert_eq!(gate.expire_older_than(Duration::hours(1)), 0);
        assert_eq!(gate.pending_count(), 2);

        assert_eq!(gate.expire_older_than(Duration::zero()), 2);
        assert_eq!(gate.pending_count(), 0);
    }
}
