use crate::config::DEFAULT_HISTORY_CAPACITY;
use std::collections::VecDeque;

/// Direction of a history navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards older entries (up arrow).
    Back,
    /// Towards newer entries and finally the blank line (down arrow).
    Forward,
}

/// Fixed-capacity log of submitted lines with a browsing cursor.
///
/// The cursor ranges over `0..=len()`, where `len()` stands for the line that
/// hasn't been submitted yet.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
    cursor: usize,
}

impl History {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            cursor: 0,
        }
    }

    /// Appends `line`, evicting the oldest entry when full. Empty lines are ignored.
    ///
    /// The cursor is reset to the blank line either way.
    pub fn record(&mut self, line: &str) {
        if !line.is_empty() && self.capacity > 0 {
            if self.entries.len() == self.capacity {
                self.entries.pop_front();
            }
            self.entries.push_back(line.to_string());
        }
        self.cursor = self.entries.len();
    }

    /// Moves the cursor one step and returns the line under it.
    ///
    /// Moving past the newest entry yields `""`. Returns `None` when nothing has
    /// been recorded yet.
    pub fn navigate(&mut self, direction: Direction) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        self.cursor = match direction {
            Direction::Back => self.cursor.saturating_sub(1),
            Direction::Forward => (self.cursor + 1).min(self.entries.len()),
        };
        Some(self.entries.get(self.cursor).map_or("", String::as_str))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Stored lines, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(String::as_str)
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}
