//! FIFO queue of author ids awaiting a profile visit.

use std::collections::{HashSet, VecDeque};

/// Author visit queue with idempotent membership
///
/// An id is accepted at most once for the lifetime of the queue, so an author
/// that was already visited is never queued again.
#[derive(Debug, Default)]
pub struct AuthorQueue {
    pending: VecDeque<String>,
    seen: HashSet<String>,
}

impl AuthorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an author id; returns `false` if it was already known
    pub fn enqueue(&mut self, author_id: &str) -> bool {
        if !self.seen.insert(author_id.to_string()) {
            return false;
        }
        self.pending.push_back(author_id.to_string());
        true
    }

    /// Take the next author to visit
    pub fn pop(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    /// Number of authors still waiting
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether the id was ever queued
    pub fn contains(&self, author_id: &str) -> bool {
        self.seen.contains(author_id)
    }

    /// Total ids ever accepted
    pub fn total_seen(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_is_idempotent() {
        let mut queue = AuthorQueue::new();
        assert!(queue.enqueue("a1"));
        assert!(!queue.enqueue("a1"));
        assert!(queue.enqueue("a2"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_visited_author_is_not_requeued() {
        let mut queue = AuthorQueue::new();
        queue.enqueue("a1");
        assert_eq!(queue.pop().as_deref(), Some("a1"));
        assert!(!queue.enqueue("a1"));
        assert!(queue.is_empty());
        assert!(queue.contains("a1"));
        assert_eq!(queue.total_seen(), 1);
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = AuthorQueue::new();
        for id in ["x", "y", "z"] {
            queue.enqueue(id);
        }
        let drained: Vec<String> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(drained, vec!["x", "y", "z"]);
    }
}
