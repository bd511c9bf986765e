//! Progress barrier (C14): k-of-n completion gate.
//!
//! Grounded on CM2020 sender/receiver's `m_progress->reset(n, callback)` /
//! `m_progress->mark(tag)` usage — a barrier is reset once per round
//! (matrix-send phase, then OPRF phase) and each column or chunk handler
//! calls `mark` exactly once as it finishes. `mark` is idempotent per tag
//! so a retried network callback can never double-count.

use std::collections::HashSet;
use std::sync::Mutex;

/// `-1` (stored as `None` target) means "unbounded": the barrier never
/// fires on its own and must be driven externally via `force_complete`.
pub struct ProgressBarrier {
    inner: Mutex<Inner>,
}

struct Inner {
    target: Option<u64>,
    marked: HashSet<u64>,
    completed: bool,
}

impl ProgressBarrier {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                target: Some(0),
                marked: HashSet::new(),
                completed: true,
            }),
        }
    }

    /// Rearms the barrier for a new round. `target < 0` arms it unbounded.
    pub fn reset(&self, target: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.target = if target < 0 { None } else { Some(target as u64) };
        inner.marked.clear();
        inner.completed = false;
    }

    /// Marks `tag` done; returns `true` exactly once, the call that makes
    /// the barrier transition to completed. Repeat calls with the same or
    /// a different tag after completion return `false`.
    pub fn mark(&self, tag: u64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.completed {
            return false;
        }
        if !inner.marked.insert(tag) {
            return false;
        }
        match inner.target {
            Some(target) if inner.marked.len() as u64 >= target => {
                inner.completed = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.inner.lock().unwrap().completed
    }

    pub fn marked_count(&self) -> usize {
        self.inner.lock().unwrap().marked.len()
    }

    /// Unbounded barriers never self-complete; the round driver calls this
    /// once it knows no further marks are coming.
    pub fn force_complete(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.completed {
            return false;
        }
        inner.completed = true;
        true
    }
}

impl Default for ProgressBarrier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_exactly_once_at_kth_mark() {
        let barrier = ProgressBarrier::new();
        barrier.reset(3);
        assert!(!barrier.mark(0));
        assert!(!barrier.mark(1));
        assert!(barrier.mark(2));
        assert!(barrier.is_completed());
    }

    #[test]
    fn duplicate_tag_does_not_double_count() {
        let barrier = ProgressBarrier::new();
        barrier.reset(2);
        assert!(!barrier.mark(5));
        assert!(!barrier.mark(5));
        assert!(!barrier.is_completed());
        assert!(barrier.mark(6));
        assert!(barrier.is_completed());
    }

    #[test]
    fn unbounded_barrier_requires_force_complete() {
        let barrier = ProgressBarrier::new();
        barrier.reset(-1);
        for i in 0..50 {
            assert!(!barrier.mark(i));
        }
        assert!(!barrier.is_completed());
        assert!(barrier.force_complete());
        assert!(barrier.is_completed());
    }
}
