//! Change subscriptions.
//!
//! Subscribers are deliberately not event channels: a slow consumer must
//! never stall the apply path. Each subscriber carries a set of dirty
//! database names plus a single-slot wake-up channel; marking is O(1) per
//! subscriber and arbitrary bursts coalesce into one wake-up per drain.

use std::collections::HashSet;
use std::sync::Mutex;

use crossbeam::channel::{self, Receiver, Sender};

/// Subscribes to database changes on a store. Obtained from
/// `Store::subscribe`; detach with `Store::unsubscribe`.
pub struct Subscriber {
    id: u64,
    notify_tx: Sender<()>,
    notify_rx: Receiver<()>,
    dirty: Mutex<HashSet<String>>,
}

impl Subscriber {
    pub(crate) fn new(id: u64) -> Self {
        let (notify_tx, notify_rx) = channel::bounded(1);
        Self {
            id,
            notify_tx,
            notify_rx,
            dirty: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Receives a value whenever the dirty set transitions or grows. At most
    /// one notification is buffered; consumers drain with [`dirty_set`].
    ///
    /// [`dirty_set`]: Subscriber::dirty_set
    pub fn notify_rx(&self) -> &Receiver<()> {
        &self.notify_rx
    }

    /// Marks a database as changed and posts a wake-up if the slot is free.
    pub fn mark_dirty(&self, name: &str) {
        let mut dirty = self.dirty.lock().unwrap_or_else(|err| err.into_inner());
        dirty.insert(name.to_string());

        // Non-blocking: a pending notification already covers this change.
        let _ = self.notify_tx.try_send(());
    }

    /// Returns the set of databases changed since the previous call and
    /// clears it.
    pub fn dirty_set(&self) -> HashSet<String> {
        let mut dirty = self.dirty.lock().unwrap_or_else(|err| err.into_inner());
        std::mem::take(&mut *dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn mark_dirty_sets_and_notifies() {
        let sub = Subscriber::new(1);
        sub.mark_dirty("a.db");

        assert!(sub.notify_rx().try_recv().is_ok());
        assert_eq!(sub.dirty_set(), HashSet::from(["a.db".to_string()]));
        assert!(sub.dirty_set().is_empty());
    }

    #[test]
    fn bursts_coalesce_into_one_wakeup() {
        let sub = Subscriber::new(1);
        for _ in 0..100 {
            sub.mark_dirty("a.db");
        }

        assert!(sub.notify_rx().try_recv().is_ok());
        assert!(sub.notify_rx().try_recv().is_err());
        assert_eq!(sub.dirty_set(), HashSet::from(["a.db".to_string()]));
    }

    #[test]
    fn concurrent_marks_are_observed() {
        let sub = Arc::new(Subscriber::new(1));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sub = Arc::clone(&sub);
                thread::spawn(move || {
                    for _ in 0..50 {
                        sub.mark_dirty("x.db");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(sub.notify_rx().try_recv().is_ok());
        assert_eq!(sub.dirty_set(), HashSet::from(["x.db".to_string()]));
        assert!(sub.dirty_set().is_empty());
    }
}
