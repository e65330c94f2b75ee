//! Reactive value holder shared between a board model and the sessions viewing it.
//!
//! A [`Reactive`] keeps its value behind an `Arc`, so readers get a cheap
//! immutable snapshot and never observe a partially applied write. Every
//! `set`/`update` bumps a version and notifies subscribers exactly once.
//! Subscribers that fall behind only see the latest version (views are
//! re-rendered from current state, not from a change log).

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// A versioned, immutable view of a reactive value
#[derive(Debug)]
pub struct Snapshot<T> {
    pub version: u64,
    pub value: Arc<T>,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            value: Arc::clone(&self.value),
        }
    }
}

/// Thread-safe value holder that notifies subscribers on change
pub struct Reactive<T> {
    tx: watch::Sender<Snapshot<T>>,
}

impl<T> Reactive<T> {
    pub fn new(value: T) -> Self {
        let (tx, _) = watch::channel(Snapshot {
            version: 0,
            value: Arc::new(value),
        });
        Self { tx }
    }

    /// Returns the current value
    pub fn get(&self) -> Arc<T> {
        Arc::clone(&self.tx.borrow().value)
    }

    /// Returns the current value together with its version
    pub fn snapshot(&self) -> Snapshot<T> {
        self.tx.borrow().clone()
    }

    pub fn version(&self) -> u64 {
        self.tx.borrow().version
    }

    /// Replaces the value and notifies subscribers once
    pub fn set(&self, value: T) {
        self.tx.send_modify(|snapshot| {
            snapshot.version += 1;
            snapshot.value = Arc::new(value);
        });
    }

    /// Derives the next value from the current one and notifies subscribers once.
    ///
    /// Concurrent updates are applied one after another; `f` always sees
    /// the result of the previous update.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        self.tx.send_modify(|snapshot| {
            let next = f(&snapshot.value);
            snapshot.version += 1;
            snapshot.value = Arc::new(next);
        });
    }

    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: fmt::Debug> fmt::Debug for Reactive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.tx.borrow();
        f.debug_struct("Reactive")
            .field("version", &snapshot.version)
            .field("value", &snapshot.value)
            .finish()
    }
}

/// A session's handle on a [`Reactive`] value
pub struct Subscription<T> {
    rx: watch::Receiver<Snapshot<T>>,
}

impl<T> Subscription<T> {
    /// Waits for the next change and returns the new value.
    ///
    /// Returns `None` once the owning container has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<T>> {
        self.rx.changed().await.ok()?;
        Some(Arc::clone(&self.rx.borrow_and_update().value))
    }

    /// True if the value changed since this subscription last looked
    pub fn is_dirty(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Reads the current value and marks it as seen
    pub fn current(&mut self) -> Snapshot<T> {
        self.rx.borrow_and_update().clone()
    }
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}
