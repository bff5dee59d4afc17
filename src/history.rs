// Author: Lukas Bower
// Purpose: Provide the bounded back/forward ring used for view navigation.

//! Bounded view history with browser-style back/forward semantics.

use std::collections::VecDeque;

use log::debug;

/// Bounded history of visited views.
///
/// Stepping moves a cursor and remembers the destination as a pending echo:
/// the manager reports the resulting focus change as an ordinary event, and
/// that echo must not be recorded as a new step. The first genuinely new
/// record after stepping back discards everything ahead of the cursor.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    entries: VecDeque<String>,
    capacity: usize,
    cursor: usize,
    pending_echo: Option<String>,
    discard_forward: bool,
}

impl HistoryRing {
    /// Construct a ring holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            cursor: 0,
            pending_echo: None,
            discard_forward: false,
        }
    }

    /// Return the configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry under the cursor.
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.entries.get(self.cursor).map(String::as_str)
    }

    /// Retained entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Record a visit to `id`.
    ///
    /// Empty identifiers and wmii's `NULL` placeholder are ignored.
    pub fn record(&mut self, id: &str) {
        let id = id.trim();
        if id.is_empty() || id == "NULL" {
            return;
        }
        if let Some(echo) = self.pending_echo.take() {
            if echo == id {
                self.discard_forward = true;
                debug!("history: focus echo {id}");
                return;
            }
        }
        let at_end = self.cursor + 1 >= self.entries.len();
        if !self.entries.is_empty() && (self.discard_forward || !at_end) {
            self.entries.truncate(self.cursor + 1);
        }
        self.discard_forward = false;
        self.entries.push_back(id.to_owned());
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.cursor = self.entries.len() - 1;
        debug!("history: recorded {id} at {}", self.cursor);
    }

    /// Move the cursor by `delta` and return the new current entry.
    ///
    /// Returns `None` without moving when the step would leave the ring.
    pub fn step(&mut self, delta: isize) -> Option<String> {
        if self.entries.is_empty() || delta == 0 {
            return None;
        }
        let target = self.cursor.checked_add_signed(delta)?;
        if target >= self.entries.len() {
            return None;
        }
        self.cursor = target;
        let id = self.entries[target].clone();
        self.pending_echo = Some(id.clone());
        debug!("history: step {delta} to {id}");
        Some(id)
    }
}
