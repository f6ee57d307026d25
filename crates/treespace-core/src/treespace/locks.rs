//! Subtree locks for the mutation path
//!
//! Two mutations conflict when one path is a prefix of the other. A
//! conflicting `acquire` waits; disjoint ones proceed side by side.

use std::sync::{Condvar, Mutex, PoisonError};

use crate::path::DataPath;

#[derive(Debug, Default)]
struct Held {
    next_ticket: u64,
    paths: Vec<(u64, DataPath)>,
}

/// Table of subtrees currently being mutated
#[derive(Debug, Default)]
pub struct PathLocks {
    held: Mutex<Held>,
    released: Condvar,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no held path overlaps `path`, then hold it
    pub fn acquire(&self, path: &DataPath) -> PathGuard<'_> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.paths.iter().any(|(_, p)| p.overlaps(path)) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        let ticket = held.next_ticket;
        held.next_ticket += 1;
        held.paths.push((ticket, path.clone()));
        PathGuard { locks: self, ticket }
    }

    /// Number of subtrees currently held
    pub fn held(&self) -> usize {
        self.held.lock().unwrap_or_else(PoisonError::into_inner).paths.len()
    }
}

/// Held subtree; released on drop
#[derive(Debug)]
pub struct PathGuard<'a> {
    locks: &'a PathLocks,
    ticket: u64,
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.paths.retain(|(ticket, _)| *ticket != self.ticket);
        drop(held);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_disjoint_paths_held_together() {
        let locks = PathLocks::new();
        let a = locks.acquire(&DataPath::root().child("a"));
        let b = locks.acquire(&DataPath::root().child("b"));
        assert_eq!(locks.held(), 2);
        drop(a);
        drop(b);
        assert_eq!(locks.held(), 0);
    }

    #[test]
    fn test_overlapping_path_waits_for_release() {
        let locks = Arc::new(PathLocks::new());
        let parent = locks.acquire(&DataPath::root().child("system"));
        let entered = Arc::new(AtomicBool::new(false));

        let waiter = {
            let locks = Arc::clone(&locks);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                let _g = locks.acquire(&DataPath::root().child("system").child("hostname"));
                entered.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!entered.load(Ordering::SeqCst));
        drop(parent);
        waiter.join().unwrap();
        assert!(entered.load(Ordering::SeqCst));
        assert_eq!(locks.held(), 0);
    }
}
