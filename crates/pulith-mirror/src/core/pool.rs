//! Shared mirror list and cursor.
//!
//! Every operation takes the lock for the in-memory list work only. Nothing here
//! touches the network, so a slow mirror never blocks other callers' pool access.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::data::{ActionPolicy, MirrorDescriptor};

#[derive(Debug, Default)]
struct PoolState {
    mirrors: Vec<MirrorDescriptor>,
    next:    usize,
}

impl PoolState {
    /// Wrap the cursor back to 0 once it runs off the end.
    fn clamp(&mut self) {
        if self.next >= self.mirrors.len() {
            self.next = 0;
        }
    }
}

/// Point-in-time copy of the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub mirrors: Vec<MirrorDescriptor>,
    pub next:    usize,
}

/// Master mirror list shared by every call of a group.
///
/// Invariant: the cursor is a valid index into the list, or 0 when the list is empty.
#[derive(Debug, Default)]
pub struct MirrorPool {
    state: Mutex<PoolState>,
}

impl MirrorPool {
    /// Create a pool from an already ordered list.
    pub fn new(mirrors: Vec<MirrorDescriptor>, next: usize) -> Self {
        let mut state = PoolState { mirrors, next };
        state.clamp();
        Self {
            state: Mutex::new(state),
        }
    }

    // Every mutation leaves the state valid, so a panic elsewhere while holding the
    // lock cannot leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, PoolState> { self.state.lock().unwrap_or_else(PoisonError::into_inner) }

    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.lock();
        trace!(len = state.mirrors.len(), next = state.next, "pool snapshot");
        PoolSnapshot {
            mirrors: state.mirrors.clone(),
            next:    state.next,
        }
    }

    pub fn len(&self) -> usize { self.lock().mirrors.len() }

    pub fn is_empty(&self) -> bool { self.lock().mirrors.is_empty() }

    pub fn cursor(&self) -> usize { self.lock().next }

    /// Record a failed attempt against `failed` in the master list.
    ///
    /// The mirror is looked up again by value: if a concurrent call already removed
    /// it, the master state is left alone. When the same descriptor appears more
    /// than once, the first occurrence is the one affected.
    pub fn apply_failure_outcome(&self, failed: &MirrorDescriptor, policy: &ActionPolicy) {
        let mut state = self.lock();
        let Some(index) = state.mirrors.iter().position(|m| m == failed) else {
            trace!(url = %failed.url, "failed mirror already gone from pool");
            return;
        };

        if policy.remove_master {
            state.mirrors.remove(index);
        } else if state.next == index && policy.advance_master {
            state.next += 1;
        }
        state.clamp();

        trace!(
            mirrors = ?state.mirrors.iter().map(|m| m.url.as_str()).collect::<Vec<_>>(),
            next = state.next,
            "master pool updated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(urls: &[&str], next: usize) -> MirrorPool {
        MirrorPool::new(urls.iter().map(|u| MirrorDescriptor::new(*u)).collect(), next)
    }

    fn urls(pool: &MirrorPool) -> Vec<String> { pool.snapshot().mirrors.into_iter().map(|m| m.url).collect() }

    #[test]
    fn test_new_clamps_cursor() {
        assert_eq!(pool(&["a", "b"], 5).cursor(), 0);
        assert_eq!(pool(&[], 3).cursor(), 0);
    }

    #[test]
    fn test_default_policy_advances_master_cursor() {
        let p = pool(&["a", "b", "c"], 0);
        p.apply_failure_outcome(&MirrorDescriptor::new("a"), &ActionPolicy::default());
        assert_eq!(p.cursor(), 1);
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn test_advance_only_when_cursor_on_failed_mirror() {
        let p = pool(&["a", "b", "c"], 0);
        p.apply_failure_outcome(&MirrorDescriptor::new("b"), &ActionPolicy::default());
        assert_eq!(p.cursor(), 0);
    }

    #[test]
    fn test_advance_wraps() {
        let p = pool(&["a", "b"], 1);
        p.apply_failure_outcome(&MirrorDescriptor::new("b"), &ActionPolicy::default());
        assert_eq!(p.cursor(), 0);
    }

    #[test]
    fn test_remove_master() {
        let p = pool(&["a", "b", "c"], 2);
        let policy = ActionPolicy {
            remove_master: true,
            ..ActionPolicy::default()
        };
        p.apply_failure_outcome(&MirrorDescriptor::new("c"), &policy);
        assert_eq!(urls(&p), vec!["a", "b"]);
        assert_eq!(p.cursor(), 0);
    }

    #[test]
    fn test_remove_before_cursor_rewraps() {
        let p = pool(&["a", "b", "c"], 2);
        let policy = ActionPolicy {
            remove_master: true,
            ..ActionPolicy::default()
        };
        p.apply_failure_outcome(&MirrorDescriptor::new("a"), &policy);
        assert_eq!(urls(&p), vec!["b", "c"]);
        assert_eq!(p.cursor(), 0);
    }

    #[test]
    fn test_missing_mirror_is_ignored() {
        let p = pool(&["a", "b"], 1);
        let policy = ActionPolicy {
            remove_master: true,
            ..ActionPolicy::default()
        };
        p.apply_failure_outcome(&MirrorDescriptor::new("zzz"), &policy);
        assert_eq!(urls(&p), vec!["a", "b"]);
        assert_eq!(p.cursor(), 1);
    }

    #[test]
    fn test_double_removal_is_idempotent() {
        let p = pool(&["a", "b", "c"], 0);
        let policy = ActionPolicy {
            remove_master: true,
            ..ActionPolicy::default()
        };
        p.apply_failure_outcome(&MirrorDescriptor::new("b"), &policy);
        p.apply_failure_outcome(&MirrorDescriptor::new("b"), &policy);
        assert_eq!(urls(&p), vec!["a", "c"]);
    }

    #[test]
    fn test_remove_last_mirror_empties_pool() {
        let p = pool(&["a"], 0);
        let policy = ActionPolicy {
            remove_master: true,
            ..ActionPolicy::default()
        };
        p.apply_failure_outcome(&MirrorDescriptor::new("a"), &policy);
        assert!(p.is_empty());
        assert_eq!(p.cursor(), 0);
    }
}
