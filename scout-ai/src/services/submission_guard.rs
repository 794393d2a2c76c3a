//! Per-subject submission guard
//!
//! At most one classification may be in flight per subject label. A second
//! submission for the same subject is rejected instead of queued; the slot
//! is released when the returned permit is dropped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Set of subjects currently being classified
#[derive(Debug, Clone, Default)]
pub struct SubmissionGuard {
    active: Arc<Mutex<HashSet<String>>>,
}

/// Held while a subject is being classified
#[derive(Debug)]
pub struct SubmissionPermit {
    active: Arc<Mutex<HashSet<String>>>,
    subject: String,
}

impl SubmissionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `subject`; None if it is already taken
    pub fn try_acquire(&self, subject: &str) -> Option<SubmissionPermit> {
        let mut active = lock(&self.active);
        if !active.insert(subject.to_string()) {
            return None;
        }

        Some(SubmissionPermit {
            active: Arc::clone(&self.active),
            subject: subject.to_string(),
        })
    }

    pub fn is_active(&self, subject: &str) -> bool {
        lock(&self.active).contains(subject)
    }
}

impl Drop for SubmissionPermit {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.subject);
    }
}

// The set stays consistent even if a holder panicked
fn lock(active: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
