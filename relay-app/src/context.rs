//! Process-wide rolling conversation window.
//!
//! One buffer is shared by every sender. All access goes through a single
//! mutex; it is only held for the duration of an append or a snapshot, never
//! across an await point.

use relay_llm::ChatMessage;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            content: content.into(),
        }
    }

    pub fn to_chat_message(&self) -> ChatMessage {
        match self.speaker {
            Speaker::User => ChatMessage::user(self.content.clone()),
            Speaker::Assistant => ChatMessage::assistant(self.content.clone()),
        }
    }
}

#[derive(Debug)]
pub struct ContextBuffer {
    capacity: usize,
    turns: Mutex<VecDeque<ConversationTurn>>,
}

impl ContextBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            turns: Mutex::new(VecDeque::with_capacity(capacity + 1)),
        }
    }

    /// Append at the tail, evicting the oldest turns beyond capacity.
    pub fn append(&self, turn: ConversationTurn) {
        let mut turns = self.lock();
        turns.push_back(turn);
        while turns.len() > self.capacity {
            turns.pop_front();
        }
    }

    /// Ordered copy of the current window, oldest first.
    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A panic while holding the lock cannot leave the deque half-updated, so
    // a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<ConversationTurn>> {
        self.turns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn keeps_most_recent_turns_in_arrival_order() {
        let buffer = ContextBuffer::new(5);
        for i in 0..12 {
            let turn = if i % 2 == 0 {
                ConversationTurn::user(format!("u{i}"))
            } else {
                ConversationTurn::assistant(format!("a{i}"))
            };
            buffer.append(turn);
            assert!(buffer.len() <= 5);
        }

        let contents: Vec<String> = buffer.snapshot().into_iter().map(|t| t.content).collect();
        assert_eq!(contents, vec!["a7", "u8", "a9", "u10", "a11"]);
    }

    #[test]
    fn snapshot_is_detached_from_later_appends() {
        let buffer = ContextBuffer::new(2);
        buffer.append(ConversationTurn::user("first"));
        let before = buffer.snapshot();
        buffer.append(ConversationTurn::assistant("second"));
        buffer.append(ConversationTurn::user("third"));

        assert_eq!(before, vec![ConversationTurn::user("first")]);
        assert_eq!(
            buffer.snapshot(),
            vec![
                ConversationTurn::assistant("second"),
                ConversationTurn::user("third"),
            ]
        );
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let buffer = ContextBuffer::new(0);
        buffer.append(ConversationTurn::user("a"));
        buffer.append(ConversationTurn::user("b"));
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.snapshot(), vec![ConversationTurn::user("b")]);
    }

    #[test]
    fn turns_map_to_chat_roles() {
        assert_eq!(
            ConversationTurn::user("hi").to_chat_message(),
            ChatMessage::user("hi")
        );
        assert_eq!(
            ConversationTurn::assistant("yo").to_chat_message(),
            ChatMessage::assistant("yo")
        );
    }

    #[test]
    fn concurrent_appends_never_exceed_capacity() {
        let buffer = Arc::new(ContextBuffer::new(5));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        buffer.append(ConversationTurn::user(format!("{t}-{i}")));
                        assert!(buffer.len() <= 5);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread");
        }
        assert_eq!(buffer.len(), 5);
    }
}
