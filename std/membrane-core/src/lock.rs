//!
//! Runtime Lock
//!
//! The single token guarding a runtime's heap and error state. Exactly one
//! thread owns it at a time; the owner is recorded so that misuse (acquiring
//! twice on one thread, releasing from a thread that does not own it) is
//! reported instead of deadlocking or silently passing.
//!
//! The lock is a mutex-protected owner slot plus a condition variable that
//! waiting threads park on. `acquire` is uninterruptible: there is no timeout
//! and no cancellation.
//!

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use thiserror::Error;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("runtime lock is already held by the current thread")]
    AlreadyHeld,

    #[error("runtime lock is not held by the current thread")]
    NotHeld,

    /// The thread gave the lock up in a scoped release and must take it back
    /// through the region's token.
    #[error("runtime lock was given up by a scoped release on the current thread")]
    InReleasedRegion,
}

/// Lock state as seen from the calling thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Held,
    Released,
}

/// Counters for diagnostics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LockStats {
    pub acquisitions: u64,
    pub contended: u64,
    pub releases: u64,
}

pub struct RuntimeLock {
    owner: Mutex<Option<ThreadId>>,
    available: Condvar,
    acquisitions: AtomicU64,
    contended: AtomicU64,
    releases: AtomicU64,
}

impl RuntimeLock {
    pub fn new() -> Self {
        Self {
            owner: Mutex::new(None),
            available: Condvar::new(),
            acquisitions: AtomicU64::new(0),
            contended: AtomicU64::new(0),
            releases: AtomicU64::new(0),
        }
    }

    fn owner(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the calling thread owns the lock.
    pub fn acquire(&self) -> Result<(), LockError> {
        let me = thread::current().id();
        let mut owner = self.owner();
        if *owner == Some(me) {
            return Err(LockError::AlreadyHeld);
        }

        if owner.is_some() {
            self.contended.fetch_add(1, Ordering::Relaxed);
            trace!(thread = ?me, "waiting for runtime lock");
            while owner.is_some() {
                owner = self
                    .available
                    .wait(owner)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }

        *owner = Some(me);
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        trace!(thread = ?me, "runtime lock acquired");
        Ok(())
    }

    /// Give up the lock. Wakes one waiter, whichever the scheduler picks.
    pub fn release(&self) -> Result<(), LockError> {
        let me = thread::current().id();
        let mut owner = self.owner();
        if *owner != Some(me) {
            return Err(LockError::NotHeld);
        }
        *owner = None;
        drop(owner);

        self.releases.fetch_add(1, Ordering::Relaxed);
        self.available.notify_one();
        trace!(thread = ?me, "runtime lock released");
        Ok(())
    }

    /// State of the lock from the point of view of the calling thread
    pub fn state(&self) -> LockState {
        if *self.owner() == Some(thread::current().id()) {
            LockState::Held
        } else {
            LockState::Released
        }
    }

    /// Whether any thread currently owns the lock
    pub fn is_locked(&self) -> bool {
        self.owner().is_some()
    }

    pub fn stats(&self) -> LockStats {
        LockStats {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
        }
    }
}

impl Default for RuntimeLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_acquire_release() {
        let lock = RuntimeLock::new();
        assert_eq!(lock.state(), LockState::Released);

        lock.acquire().unwrap();
        assert_eq!(lock.state(), LockState::Held);
        assert!(lock.is_locked());

        lock.release().unwrap();
        assert_eq!(lock.state(), LockState::Released);
        assert!(!lock.is_locked());

        let stats = lock.stats();
        assert_eq!(stats.acquisitions, 1);
        assert_eq!(stats.releases, 1);
    }

    #[test]
    fn test_double_acquire_is_misuse() {
        let lock = RuntimeLock::new();
        lock.acquire().unwrap();
        assert_eq!(lock.acquire(), Err(LockError::AlreadyHeld));
        lock.release().unwrap();
    }

    #[test]
    fn test_nested_release_is_misuse() {
        let lock = RuntimeLock::new();
        lock.acquire().unwrap();
        lock.release().unwrap();
        assert_eq!(lock.release(), Err(LockError::NotHeld));
    }

    #[test]
    fn test_release_from_other_thread_is_misuse() {
        let lock = Arc::new(RuntimeLock::new());
        lock.acquire().unwrap();

        let other = Arc::clone(&lock);
        let result = thread::spawn(move || other.release()).join().unwrap();
        assert_eq!(result, Err(LockError::NotHeld));
        assert_eq!(lock.state(), LockState::Held);

        lock.release().unwrap();
    }

    #[test]
    fn test_waiter_blocks_until_release() {
        let lock = Arc::new(RuntimeLock::new());
        lock.acquire().unwrap();

        let (tx, rx) = mpsc::channel();
        let other = Arc::clone(&lock);
        let handle = thread::spawn(move || {
            other.acquire().unwrap();
            tx.send(()).unwrap();
            other.release().unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        lock.release().unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();

        assert_eq!(lock.stats().acquisitions, 2);
    }
}
