//! A many-readers / single-writer lock that owns the data it protects.
//!
//! [`ReadWriteLock`] is built from a [`Mutex`] guarding the lock bookkeeping (active reader
//! count, writer flag, number of queued writers) and two [`Condvar`]s: one that readers park on
//! and one that writers park on. The protected value lives in an [`UnsafeCell`] and can only be
//! reached through a [`ReadGuard`] (shared access) or a [`WriteGuard`] (exclusive access).
//! Dropping a guard releases the lock.
//!
//! Writers are preferred: once a writer is queued, newly arriving readers wait behind it, so a
//! steady stream of readers cannot starve writers.
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;

/// bookkeeping shared by all users of a [`ReadWriteLock`]
#[derive(Debug, Default)]
struct LockState {
    // number of readers currently holding the lock
    readers: usize,
    // true while a writer holds the lock
    writer: bool,
    // number of writers blocked in acquire_write
    waiting_writers: usize,
}

impl LockState {
    fn can_read(&self) -> bool {
        !self.writer && self.waiting_writers == 0
    }

    fn can_write(&self) -> bool {
        !self.writer && self.readers == 0
    }
}

/// A reader/writer lock around a value of type `T`.
///
/// At any instant either any number of [`ReadGuard`]s exist and no [`WriteGuard`], or exactly
/// one [`WriteGuard`] exists and no [`ReadGuard`]s.
pub struct ReadWriteLock<T> {
    state: Mutex<LockState>,
    readers_cv: Condvar,
    writers_cv: Condvar,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is mediated by `state`: shared references are only handed out while
// `readers > 0 && !writer`, and the unique reference only while `writer && readers == 0`.
unsafe impl<T: Send> Send for ReadWriteLock<T> {}
unsafe impl<T: Send + Sync> Sync for ReadWriteLock<T> {}

impl<T> ReadWriteLock<T> {
    /// creates a new, unlocked, `ReadWriteLock` protecting `data`
    pub fn new(data: T) -> Self {
        ReadWriteLock {
            state: Mutex::new(LockState::default()),
            readers_cv: Condvar::new(),
            writers_cv: Condvar::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Blocks until no writer holds the lock or is queued for it, then registers the caller
    /// as a reader.
    pub fn acquire_read(&self) -> ReadGuard<'_, T> {
        let state = self.lock_state();
        let mut state = self
            .readers_cv
            .wait_while(state, |s| !s.can_read())
            .unwrap_or_else(PoisonError::into_inner);
        state.readers += 1;
        trace!(readers = state.readers, "read lock acquired");
        ReadGuard { lock: self }
    }

    /// Like [`acquire_read`](Self::acquire_read) but gives up after `timeout`, returning `None`.
    pub fn try_acquire_read_for(&self, timeout: Duration) -> Option<ReadGuard<'_, T>> {
        let state = self.lock_state();
        let (mut state, result) = self
            .readers_cv
            .wait_timeout_while(state, timeout, |s| !s.can_read())
            .unwrap_or_else(PoisonError::into_inner);
        if result.timed_out() && !state.can_read() {
            return None;
        }
        state.readers += 1;
        Some(ReadGuard { lock: self })
    }

    /// Blocks until there are no active readers and no other writer, then marks the caller as
    /// the active writer.
    pub fn acquire_write(&self) -> WriteGuard<'_, T> {
        let mut state = self.lock_state();
        state.waiting_writers += 1;
        let mut state = self
            .writers_cv
            .wait_while(state, |s| !s.can_write())
            .unwrap_or_else(PoisonError::into_inner);
        state.waiting_writers -= 1;
        state.writer = true;
        trace!("write lock acquired");
        WriteGuard { lock: self }
    }

    /// Like [`acquire_write`](Self::acquire_write) but gives up after `timeout`, returning
    /// `None`.
    pub fn try_acquire_write_for(&self, timeout: Duration) -> Option<WriteGuard<'_, T>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock_state();
        state.waiting_writers += 1;
        while !state.can_write() {
            let now = Instant::now();
            if now >= deadline {
                state.waiting_writers -= 1;
                // readers may have been held back only by this writer
                if state.waiting_writers == 0 && !state.writer {
                    self.readers_cv.notify_all();
                }
                return None;
            }
            state = self
                .writers_cv
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        state.waiting_writers -= 1;
        state.writer = true;
        Some(WriteGuard { lock: self })
    }

    /// the number of readers currently holding the lock
    pub fn readers(&self) -> usize {
        self.lock_state().readers
    }

    /// true while a writer holds the lock
    pub fn is_write_locked(&self) -> bool {
        self.lock_state().writer
    }

    /// the number of writers currently blocked waiting for the lock
    pub fn waiting_writers(&self) -> usize {
        self.lock_state().waiting_writers
    }

    /// consumes the lock, returning the protected value
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    fn release_read(&self) {
        let mut state = self.lock_state();
        state.readers -= 1;
        trace!(readers = state.readers, "read lock released");
        if state.readers == 0 {
            self.writers_cv.notify_one();
        }
    }

    fn release_write(&self) {
        let mut state = self.lock_state();
        state.writer = false;
        trace!("write lock released");
        if state.waiting_writers > 0 {
            self.writers_cv.notify_one();
        } else {
            self.readers_cv.notify_all();
        }
    }

    // the bookkeeping mutex is never held across user code, so a poisoned state is still
    // consistent
    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Default> Default for ReadWriteLock<T> {
    fn default() -> Self {
        ReadWriteLock::new(T::default())
    }
}

impl<T> fmt::Debug for ReadWriteLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("ReadWriteLock")
            .field("readers", &state.readers)
            .field("writer", &state.writer)
            .field("waiting_writers", &state.waiting_writers)
            .finish()
    }
}

/// Shared access to the value inside a [`ReadWriteLock`]. The read lock is released on drop.
#[must_use = "the read lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a, T> {
    lock: &'a ReadWriteLock<T>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: this guard is registered as a reader, so no writer can hold the lock
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

/// Exclusive access to the value inside a [`ReadWriteLock`]. The write lock is released on drop.
#[must_use = "the write lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a, T> {
    lock: &'a ReadWriteLock<T>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: this guard is the only writer and there are no readers
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: this guard is the only writer and there are no readers
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}
