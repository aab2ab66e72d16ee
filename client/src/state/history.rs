//! Append-only conversation log.
//!
//! Entries are immutable once appended. The log is the context source for
//! every outbound prompt and the pairing source for feedback.

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;

use frames::{MessageEntry, Sender};

#[derive(Clone, Debug, Default)]
pub struct HistoryStore {
    entries: Vec<MessageEntry>,
}

impl HistoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one committed entry. Returns its index.
    pub fn append(&mut self, entry: MessageEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// The last `limit` entries in order, or all of them for `None`.
    #[must_use]
    pub fn snapshot(&self, limit: Option<usize>) -> &[MessageEntry] {
        match limit {
            Some(limit) => &self.entries[self.entries.len().saturating_sub(limit)..],
            None => &self.entries,
        }
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&MessageEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&MessageEntry> {
        self.entries.last()
    }

    /// Text of the closest user question before `index`.
    #[must_use]
    pub fn prior_user_text(&self, index: usize) -> Option<&str> {
        let end = index.min(self.entries.len());
        self.entries[..end]
            .iter()
            .rev()
            .find(|entry| entry.is_text_from(Sender::User))
            .map(|entry| entry.text.as_str())
    }

    /// Index of the most recent bot answer.
    #[must_use]
    pub fn last_bot_index(&self) -> Option<usize> {
        self.entries.iter().rposition(|entry| entry.is_text_from(Sender::Bot))
    }
}
