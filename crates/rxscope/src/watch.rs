#![forbid(unsafe_code)]

//! Version-tracked cell for values a binding reacts to, such as the bound
//! stream reference.
//!
//! # Design
//!
//! [`Watched<V>`] keeps its value in shared, reference-counted storage
//! (`Rc<RefCell<..>>`). When the value changes (by `PartialEq`) every live
//! watcher is called in registration order. Watchers are held as `Weak`
//! callbacks; the strong side lives in the [`WatchGuard`] returned by
//! [`Watched::watch`].
//!
//! # Failure Modes
//!
//! - **Re-entrant set**: a watcher may call `set()` on the same cell. The
//!   nested change is delivered after the current round, once per change.
//! - **Guard leak**: guards kept forever keep their callbacks alive. Dead
//!   entries are pruned lazily on the next change.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

type WatcherRc<V> = Rc<dyn Fn(&V)>;
type WatcherWeak<V> = Weak<dyn Fn(&V)>;

struct WatchedInner<V> {
    value: V,
    version: u64,
    watchers: Vec<WatcherWeak<V>>,
    /// Values set while watchers were running, delivered in order.
    backlog: VecDeque<V>,
}

/// A shared, version-tracked value with change notification.
///
/// Cloning creates a new handle to the same value and watchers.
pub struct Watched<V> {
    inner: Rc<RefCell<WatchedInner<V>>>,
    notifying: Rc<Cell<bool>>,
}

impl<V> Clone for Watched<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            notifying: Rc::clone(&self.notifying),
        }
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for Watched<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Watched")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("watcher_count", &inner.watchers.len())
            .finish()
    }
}

impl<V: Clone + PartialEq + 'static> Watched<V> {
    #[must_use]
    pub fn new(value: V) -> Self {
        Self {
            inner: Rc::new(RefCell::new(WatchedInner {
                value,
                version: 0,
                watchers: Vec::new(),
                backlog: VecDeque::new(),
            })),
            notifying: Rc::new(Cell::new(false)),
        }
    }

    #[must_use]
    pub fn get(&self) -> V {
        self.inner.borrow().value.clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&V) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Replace the value. Equal values are a no-op: no version bump, no
    /// watcher calls.
    pub fn set(&self, value: V) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return;
            }
            inner.value = value.clone();
            inner.version += 1;
            inner.backlog.push_back(value);
        }
        self.notify();
    }

    /// Call `callback` with every new value until the guard is dropped.
    pub fn watch(&self, callback: impl Fn(&V) + 'static) -> WatchGuard {
        let strong: WatcherRc<V> = Rc::new(callback);
        self.inner.borrow_mut().watchers.push(Rc::downgrade(&strong));
        WatchGuard {
            _guard: Box::new(strong),
        }
    }

    /// Number of value-changing `set` calls so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Registered watchers, including dead ones not yet pruned.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.inner.borrow().watchers.len()
    }

    fn notify(&self) {
        if self.notifying.replace(true) {
            // The outer round picks the backlog up.
            return;
        }
        loop {
            let next = self.inner.borrow_mut().backlog.pop_front();
            let Some(value) = next else {
                break;
            };
            let callbacks: Vec<WatcherRc<V>> = {
                let mut inner = self.inner.borrow_mut();
                inner.watchers.retain(|w| w.strong_count() > 0);
                inner.watchers.iter().filter_map(Weak::upgrade).collect()
            };
            for cb in &callbacks {
                cb(&value);
            }
        }
        self.notifying.set(false);
    }
}

/// RAII guard for a watcher. Dropping it stops further calls.
pub struct WatchGuard {
    _guard: Box<dyn std::any::Any>,
}

impl std::fmt::Debug for WatchGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchGuard").finish_non_exhaustive()
    }
}
