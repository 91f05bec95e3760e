//! Cancellation contexts.
//!
//! Cancellation is signalled by channel disconnection: dropping the sender
//! side of a channel wakes every cloned receiver at once. A [`Context`] wraps
//! such a receiver together with the cancellation cause; [`PrimaryCtx`]
//! layers the primary-status channel on top so primary-only work is cut off
//! the moment leadership is lost.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

use crate::error::Error;

type CauseFn = fn() -> Error;

struct Shared {
    cause: OnceLock<CauseFn>,
}

/// A cloneable cancellation token.
#[derive(Clone)]
pub struct Context {
    rx: Receiver<()>,
    shared: Arc<Shared>,
}

/// The owning half of a [`Context`]. Dropping it without calling
/// [`CancelHandle::cancel`] cancels the context with a store-closed cause.
pub struct CancelHandle {
    tx: Option<Sender<()>>,
    shared: Arc<Shared>,
}

impl Context {
    /// Returns a root context and the handle that cancels it.
    pub fn background() -> (Context, CancelHandle) {
        let (tx, rx) = channel::unbounded();
        let shared = Arc::new(Shared {
            cause: OnceLock::new(),
        });
        (
            Context {
                rx,
                shared: Arc::clone(&shared),
            },
            CancelHandle {
                tx: Some(tx),
                shared,
            },
        )
    }

    /// Returns the cancellation cause, or `None` while the context is live.
    pub fn err(&self) -> Option<Error> {
        if self.is_canceled() {
            Some(self.shared.cause.get().map_or(Error::StoreClosed, |f| f()))
        } else {
            None
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Receiver for use in `select!` loops; disconnects on cancellation.
    pub fn done_rx(&self) -> &Receiver<()> {
        &self.rx
    }

    /// Sleeps for `dur` or until the context is canceled, whichever comes
    /// first. Returns false if the sleep was cut short.
    pub fn sleep(&self, dur: Duration) -> bool {
        if self.is_canceled() {
            return false;
        }
        crossbeam::select! {
            recv(self.rx) -> _ => false,
            recv(channel::after(dur)) -> _ => true,
        }
    }
}

impl CancelHandle {
    /// Cancels the context with the store-closed cause.
    pub fn cancel(&mut self) {
        self.cancel_with(|| Error::StoreClosed);
    }

    pub(crate) fn cancel_with(&mut self, cause: CauseFn) {
        let _ = self.shared.cause.set(cause);
        self.tx.take();
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.cancel();
        }
    }
}

/// A context that is additionally done once the node loses primary status.
///
/// The primary channel is recreated at every leadership transition; a
/// `PrimaryCtx` holds the receiver that was current when it was created, so
/// it observes exactly the transition out of that term.
pub struct PrimaryCtx {
    parent: Context,
    primary_rx: Receiver<()>,
}

impl PrimaryCtx {
    pub(crate) fn new(parent: Context, primary_rx: Receiver<()>) -> Self {
        Self { parent, primary_rx }
    }

    /// `Error::LeaseExpired` once primary status is lost, otherwise the
    /// parent's cause. Leadership loss is checked first so it wins when both
    /// have fired.
    pub fn err(&self) -> Option<Error> {
        if matches!(self.primary_rx.try_recv(), Err(TryRecvError::Disconnected)) {
            Some(Error::LeaseExpired)
        } else {
            self.parent.err()
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Blocks until the context is done, returning the cause.
    pub fn wait(&self) -> Error {
        crossbeam::select! {
            recv(self.primary_rx) -> _ => {}
            recv(self.parent.done_rx()) -> _ => {}
        }
        self.err().unwrap_or(Error::LeaseExpired)
    }
}
