//! Advisory database locks.
//!
//! Each lock is a three-state lock (unlocked, shared, exclusive) mirroring
//! SQLite's locking model: shared acquisition is blocked by an exclusive
//! holder, exclusive acquisition is blocked by any holder. Waiting honours
//! both a deadline and the caller's context.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::context::Context;
use crate::error::Error;

// Condvar waits are sliced so cancellation is observed promptly.
const WAIT_SLICE: Duration = Duration::from_millis(25);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Shared,
    Exclusive,
}

impl LockState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockState::Unlocked => "unlocked",
            LockState::Shared => "shared",
            LockState::Exclusive => "exclusive",
        }
    }
}

#[derive(Default, Debug)]
struct LockInner {
    shared: usize,
    exclusive: bool,
}

#[derive(Debug)]
pub struct TriLock {
    name: &'static str,
    inner: Mutex<LockInner>,
    cond: Condvar,
}

impl TriLock {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            inner: Mutex::new(LockInner::default()),
            cond: Condvar::new(),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> LockState {
        let inner = lock_inner(&self.inner);
        if inner.exclusive {
            LockState::Exclusive
        } else if inner.shared > 0 {
            LockState::Shared
        } else {
            LockState::Unlocked
        }
    }

    pub fn lock_shared(
        self: &Arc<Self>,
        ctx: &Context,
        timeout: Duration,
    ) -> Result<LockGuard, Error> {
        self.acquire(ctx, timeout, false)
    }

    pub fn lock_exclusive(
        self: &Arc<Self>,
        ctx: &Context,
        timeout: Duration,
    ) -> Result<LockGuard, Error> {
        self.acquire(ctx, timeout, true)
    }

    fn acquire(
        self: &Arc<Self>,
        ctx: &Context,
        timeout: Duration,
        exclusive: bool,
    ) -> Result<LockGuard, Error> {
        let deadline = Instant::now() + timeout;
        let mut inner = lock_inner(&self.inner);
        loop {
            let available = if exclusive {
                !inner.exclusive && inner.shared == 0
            } else {
                !inner.exclusive
            };
            if available {
                if exclusive {
                    inner.exclusive = true;
                } else {
                    inner.shared += 1;
                }
                return Ok(LockGuard {
                    lock: Arc::clone(self),
                    exclusive,
                });
            }

            if let Some(err) = ctx.err() {
                return Err(err);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::LockTimeout {
                    name: self.name,
                    timeout,
                });
            }

            let wait = (deadline - now).min(WAIT_SLICE);
            let (guard, _) = self
                .cond
                .wait_timeout(inner, wait)
                .unwrap_or_else(|err| err.into_inner());
            inner = guard;
        }
    }

    fn release(&self, exclusive: bool) {
        let mut inner = lock_inner(&self.inner);
        if exclusive {
            inner.exclusive = false;
        } else {
            inner.shared = inner.shared.saturating_sub(1);
        }
        drop(inner);
        self.cond.notify_all();
    }
}

fn lock_inner(mutex: &Mutex<LockInner>) -> MutexGuard<'_, LockInner> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}

/// Holds one lock in one mode; released on drop.
#[derive(Debug)]
pub struct LockGuard {
    lock: Arc<TriLock>,
    exclusive: bool,
}

impl LockGuard {
    pub fn name(&self) -> &'static str {
        self.lock.name()
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.lock.release(self.exclusive);
    }
}

/// A bundle of guards acquired together; all are released when the set is
/// dropped, in reverse acquisition order.
pub struct GuardSet {
    guards: Vec<LockGuard>,
}

impl GuardSet {
    pub fn new(guards: Vec<LockGuard>) -> Self {
        Self { guards }
    }

    /// Explicit release, for call sites where the drop point matters.
    pub fn unlock(self) {}
}

impl Drop for GuardSet {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

/// The full lock table for one database.
pub struct DbLocks {
    pub pending: Arc<TriLock>,
    pub shared: Arc<TriLock>,
    pub reserved: Arc<TriLock>,
    pub write: Arc<TriLock>,
    pub ckpt: Arc<TriLock>,
    pub recover: Arc<TriLock>,
    pub read0: Arc<TriLock>,
    pub read1: Arc<TriLock>,
    pub read2: Arc<TriLock>,
    pub read3: Arc<TriLock>,
    pub read4: Arc<TriLock>,
    pub dms: Arc<TriLock>,
}

impl DbLocks {
    pub fn new() -> Self {
        Self {
            pending: TriLock::new("pending"),
            shared: TriLock::new("shared"),
            reserved: TriLock::new("reserved"),
            write: TriLock::new("write"),
            ckpt: TriLock::new("ckpt"),
            recover: TriLock::new("recover"),
            read0: TriLock::new("read0"),
            read1: TriLock::new("read1"),
            read2: TriLock::new("read2"),
            read3: TriLock::new("read3"),
            read4: TriLock::new("read4"),
            dms: TriLock::new("dms"),
        }
    }
}

impl Default for DbLocks {
    fn default() -> Self {
        Self::new()
    }
}
