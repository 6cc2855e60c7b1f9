//! Bounded roll history, newest first

use std::collections::VecDeque;

use uuid::Uuid;

use crate::broadcast::RollEvent;

/// Default number of entries retained
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub event: RollEvent,
    /// Rolled by this session rather than received from another participant
    pub local: bool,
}

#[derive(Debug, Clone)]
pub struct RollHistory {
    entries: VecDeque<HistoryEntry>,
    limit: usize,
}

impl RollHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit),
            limit,
        }
    }

    /// Record an entry, dropping the oldest beyond the limit
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.limit);
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.entries.iter().any(|e| e.event.id == id)
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for RollHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}
