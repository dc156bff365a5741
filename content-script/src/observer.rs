//! Mutation batch handling for the conversation root.
//!
//! The runtime feeds every observer notification through [`classify_batch`]
//! and parks the resulting timer in a [`DebounceSlot`]. Replacing the slot's
//! handle drops, and so cancels, the previous timer: a burst of batches ends
//! in exactly one reconciliation.

use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchVerdict {
    /// Nothing was added; removals and attribute churn are ignored
    Ignore,
    Schedule,
    /// Too many records in one notification, dropped entirely
    Overload,
}

/// `records` is the number of mutation records in the notification,
/// `added_nodes` the total of nodes they added.
pub fn classify_batch(records: usize, added_nodes: usize, config: &EngineConfig) -> BatchVerdict {
    if records > config.max_mutation_records {
        log::warn!(
            "Too many mutations ({records} > {}), skipping batch",
            config.max_mutation_records
        );
        return BatchVerdict::Overload;
    }
    if added_nodes == 0 {
        BatchVerdict::Ignore
    } else {
        BatchVerdict::Schedule
    }
}

/// Holds at most one timer handle. A fired handle stays parked until the
/// next batch replaces it, so no closure is dropped while it runs.
#[derive(Debug)]
pub struct DebounceSlot<T> {
    pending: Option<T>,
}

impl<T> Default for DebounceSlot<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T> DebounceSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `handle`, dropping the one it replaces
    pub fn replace(&mut self, handle: T) {
        self.pending = Some(handle);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
