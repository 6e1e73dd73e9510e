//! message_log.rs - bounded diagnostic log of recent raw messages
//!
//! Newest-first ring discipline: entries are prepended and the oldest are
//! silently dropped once the capacity of 100 is exceeded. Readers get a
//! point-in-time copy, not a stream.

use crate::domain::MessageLogEntry;
use std::collections::VecDeque;

pub const MESSAGE_LOG_CAPACITY: usize = 100;

#[derive(Debug, Default)]
pub struct MessageLog {
    entries: VecDeque<MessageLogEntry>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// prepend an entry, dropping the oldest beyond capacity
    pub fn append(&mut self, entry: MessageLogEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(MESSAGE_LOG_CAPACITY);
    }

    /// point-in-time copy of the current contents, newest first
    pub fn snapshot(&self) -> Vec<MessageLogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(n: usize) -> MessageLogEntry {
        MessageLogEntry {
            id: n.to_string(),
            topic: format!("topic/{}", n),
            payload: format!("payload {}", n),
            size: 9,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut log = MessageLog::new();
        for n in 0..150 {
            log.append(entry(n));
        }
        assert_eq!(log.len(), MESSAGE_LOG_CAPACITY);
        // newest first; the oldest 50 are gone
        let snapshot = log.snapshot();
        assert_eq!(snapshot[0].id, "149");
        assert_eq!(snapshot.last().unwrap().id, "50");
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut log = MessageLog::new();
        log.append(entry(1));
        let snapshot = log.snapshot();
        log.append(entry(2));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn clear_empties_the_log() {
        let mut log = MessageLog::new();
        log.append(entry(1));
        log.clear();
        assert!(log.is_empty());
    }
}
