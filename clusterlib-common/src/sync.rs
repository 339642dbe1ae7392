//! Re-entrant locking.
//!
//! `std::sync::Mutex` is not recursive, but the holder model (a client
//! thread may acquire a distributed lock it already holds without
//! deadlocking itself, tracked via a per-thread refcount) needs that
//! behavior. `ReentrantMutex` replaces the original's recursive
//! `pthread_mutex_t` with a holder-id + refcount table guarding a plain
//! `UnsafeCell`: only the recorded holder thread ever gets a guard, so
//! access to the cell is never concurrent.
use std::cell::UnsafeCell;
use std::sync::{Condvar, Mutex};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

struct Control {
    holder: Option<ThreadId>,
    depth: u32,
}

/// A mutex that the same OS thread may lock more than once without
/// blocking on itself.
pub struct ReentrantMutex<T> {
    control: Mutex<Control>,
    released: Condvar,
    value: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for ReentrantMutex<T> {}
unsafe impl<T: Send> Sync for ReentrantMutex<T> {}

/// RAII guard. Unlocks (decrementing the holder's depth) on drop; only
/// the outermost guard actually releases the holder slot.
pub struct ReentrantGuard<'a, T> {
    lock: &'a ReentrantMutex<T>,
}

impl<T> ReentrantMutex<T> {
    pub fn new(value: T) -> Self {
        ReentrantMutex {
            control: Mutex::new(Control {
                holder: None,
                depth: 0,
            }),
            released: Condvar::new(),
            value: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> ReentrantGuard<'_, T> {
        let me = std::thread::current().id();
        let mut guard = self.control.lock().unwrap();
        loop {
            match guard.holder {
                Some(holder) if holder == me => break,
                None => {
                    guard.holder = Some(me);
                    break;
                }
                Some(_) => {
                    guard = self.released.wait(guard).unwrap();
                }
            }
        }
        guard.depth += 1;
        ReentrantGuard { lock: self }
    }

    /// Like `lock`, but gives up and returns `None` after `timeout` if
    /// the lock is held by another thread the whole time.
    pub fn try_lock_for(&self, timeout: Duration) -> Option<ReentrantGuard<'_, T>> {
        let me = std::thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut guard = self.control.lock().unwrap();
        loop {
            match guard.holder {
                Some(holder) if holder == me => break,
                None => {
                    guard.holder = Some(me);
                    break;
                }
                Some(_) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    let (g, timed_out) =
                        self.released.wait_timeout(guard, deadline - now).unwrap();
                    guard = g;
                    if timed_out.timed_out() && guard.holder.is_some() {
                        return None;
                    }
                }
            }
        }
        guard.depth += 1;
        Some(ReentrantGuard { lock: self })
    }

    /// True if the calling thread already holds this lock (any depth).
    pub fn held_by_current(&self) -> bool {
        let guard = self.control.lock().unwrap();
        guard.holder == Some(std::thread::current().id())
    }
}

impl<'a, T> std::ops::Deref for ReentrantGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // Sound because only the recorded holder thread ever owns a
        // guard, and `lock`/`try_lock_for` never hand one out to a
        // second thread while `depth > 0`.
        unsafe { &*self.lock.value.get() }
    }
}

#[allow(clippy::mut_from_ref)]
impl<'a, T> ReentrantGuard<'a, T> {
    /// Mutable access. Same soundness argument as `Deref`: exclusive
    /// because only one thread is ever recorded as holder at a time.
    pub fn get_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<'a, T> Drop for ReentrantGuard<'a, T> {
    fn drop(&mut self) {
        let mut guard = self.lock.control.lock().unwrap();
        guard.depth -= 1;
        if guard.depth == 0 {
            guard.holder = None;
            drop(guard);
            self.lock.released.notify_one();
        }
    }
}
