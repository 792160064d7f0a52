#![forbid(unsafe_code)]

//! Scope capability set and the reference host scope.
//!
//! [`BatchApply`] is all the batched subscribe operator needs: a way to run a
//! task (or just request a flush) at the host's next update pass.
//! [`StateScope`] adds what a controller needs on top: slot access inside
//! the batched task, and a destroy lifecycle.
//!
//! [`ViewScope`] implements both. Scopes form a tree; every scope of a tree
//! shares one FIFO queue, so a single [`ViewScope::flush`] applies all pending
//! work in scheduling order, like one render pass.
//!
//! # Invariants
//!
//! 1. Tasks run in the order they were scheduled, never inside `apply_*`.
//! 2. A task scheduled against a scope that is destroyed before the flush is
//!    a no-op (checked when the flush runs it).
//! 3. `destroy()` fires `on_destroy` callbacks exactly once and cascades to
//!    children.
//! 4. A flush that keeps scheduling work stops after `flush_ttl` passes.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::config::ScopeConfig;
use crate::error::{Result, RxScopeError};
use crate::state::{NotificationState, Slots};

/// Deferred work without access to the container.
pub type BatchTask = Box<dyn FnOnce()>;

/// Deferred work that receives the scope's slot map.
pub type SlotMutator<T, E> = Box<dyn FnOnce(&mut Slots<T, E>)>;

/// The host's deferred-update primitive.
pub trait BatchApply {
    /// Schedule `task` for the next update pass. `None` still requests a
    /// pass, so the host re-renders.
    fn apply_async(&self, task: Option<BatchTask>);
}

/// A state container with batched slot mutation and a destroy lifecycle.
pub trait StateScope<T, E>: BatchApply {
    /// Schedule `mutator` against this scope's slots for the next pass.
    fn apply_with_slots(&self, mutator: SlotMutator<T, E>);

    /// Register a one-shot teardown callback.
    fn on_destroy(&self, callback: Box<dyn FnOnce()>);

    fn is_destroyed(&self) -> bool;

    /// Tear the scope down. Idempotent.
    fn destroy(&self);
}

/// Queue shared by every scope of a tree.
struct FlushQueue {
    config: ScopeConfig,
    tasks: RefCell<VecDeque<BatchTask>>,
    scheduled: Cell<u64>,
    version: Cell<u64>,
    flushing: Cell<bool>,
}

impl FlushQueue {
    fn new(config: ScopeConfig) -> Self {
        // A flush always gets at least one pass.
        let config = ScopeConfig {
            flush_ttl: config.flush_ttl.max(1),
        };
        Self {
            config,
            tasks: RefCell::new(VecDeque::new()),
            scheduled: Cell::new(0),
            version: Cell::new(0),
            flushing: Cell::new(false),
        }
    }

    fn push(&self, task: BatchTask) {
        self.tasks.borrow_mut().push_back(task);
        self.scheduled.set(self.scheduled.get() + 1);
    }

    fn flush(&self) -> Result<usize> {
        // A task flushing again would only see its own batch's tail.
        if self.flushing.replace(true) {
            return Ok(0);
        }
        let result = self.drain();
        self.flushing.set(false);
        result
    }

    fn drain(&self) -> Result<usize> {
        let ttl = self.config.flush_ttl;
        let mut applied = 0;
        let mut passes = 0;
        loop {
            let batch = std::mem::take(&mut *self.tasks.borrow_mut());
            if batch.is_empty() {
                break;
            }
            passes += 1;
            if passes > ttl {
                self.tasks.borrow_mut().clear();
                tracing::error!(ttl, applied, "rxscope flush did not settle");
                return Err(RxScopeError::FlushOverflow { ttl });
            }
            for task in batch {
                task();
                applied += 1;
            }
        }
        if applied > 0 {
            self.version.set(self.version.get() + 1);
        }
        Ok(applied)
    }
}

/// Reference host scope: a node in a tree of slot containers sharing one
/// flush queue.
pub struct ViewScope<T, E> {
    this: Weak<ViewScope<T, E>>,
    parent: Option<Weak<ViewScope<T, E>>>,
    children: RefCell<Vec<Weak<ViewScope<T, E>>>>,
    queue: Rc<FlushQueue>,
    slots: RefCell<Slots<T, E>>,
    destroy_listeners: RefCell<Vec<Box<dyn FnOnce()>>>,
    destroyed: Cell<bool>,
}

impl<T, E> std::fmt::Debug for ViewScope<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewScope")
            .field("slot_count", &self.slots.borrow().len())
            .field("child_count", &self.children.borrow().len())
            .field("pending", &self.queue.tasks.borrow().len())
            .field("version", &self.queue.version.get())
            .field("destroyed", &self.destroyed.get())
            .finish()
    }
}

impl<T: 'static, E: 'static> ViewScope<T, E> {
    /// A new root scope with default settings.
    #[must_use]
    pub fn root() -> Rc<Self> {
        Self::with_config(ScopeConfig::default())
    }

    /// A new root scope.
    #[must_use]
    pub fn with_config(config: ScopeConfig) -> Rc<Self> {
        Self::build(None, Rc::new(FlushQueue::new(config)), false)
    }

    /// A new child of `parent`, sharing its flush queue. A child of a
    /// destroyed scope starts out destroyed.
    #[must_use]
    pub fn child(parent: &Rc<Self>) -> Rc<Self> {
        let child = Self::build(
            Some(Rc::downgrade(parent)),
            Rc::clone(&parent.queue),
            parent.destroyed.get(),
        );
        let mut children = parent.children.borrow_mut();
        children.retain(|w| w.strong_count() > 0);
        children.push(Rc::downgrade(&child));
        child
    }

    fn build(parent: Option<Weak<Self>>, queue: Rc<FlushQueue>, destroyed: bool) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            parent,
            children: RefCell::new(Vec::new()),
            queue,
            slots: RefCell::new(Slots::new()),
            destroy_listeners: RefCell::new(Vec::new()),
            destroyed: Cell::new(destroyed),
        })
    }

    /// Run every pending task of this scope's tree, in scheduling order.
    ///
    /// Returns the number of tasks run. Called from inside a task it does
    /// nothing and returns `Ok(0)`.
    ///
    /// # Errors
    ///
    /// [`RxScopeError::FlushOverflow`] when tasks keep scheduling new tasks for
    /// more than `flush_ttl` passes. The remaining work is discarded.
    pub fn flush(&self) -> Result<usize> {
        self.queue.flush()
    }

    /// Number of tasks waiting for the next flush, tree-wide.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.tasks.borrow().len()
    }

    /// Total number of accepted `apply_*` calls, tree-wide.
    #[must_use]
    pub fn scheduled_count(&self) -> u64 {
        self.queue.scheduled.get()
    }

    /// Bumped once per flush that ran at least one task. Useful for
    /// dirty-checking in render loops.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.queue.version.get()
    }

    #[must_use]
    pub fn config(&self) -> ScopeConfig {
        self.queue.config
    }

    /// Access this scope's own slots.
    pub fn with_slots<R>(&self, f: impl FnOnce(&Slots<T, E>) -> R) -> R {
        f(&self.slots.borrow())
    }

    #[must_use]
    pub fn parent(&self) -> Option<Rc<Self>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Number of live children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

impl<T: Clone + 'static, E: Clone + 'static> ViewScope<T, E> {
    /// Snapshot of this scope's own slot.
    #[must_use]
    pub fn slot(&self, label: &str) -> Option<NotificationState<T, E>> {
        self.slots.borrow().get(label).cloned()
    }

    /// Snapshot of the nearest slot named `label`, searching ancestors.
    #[must_use]
    pub fn lookup(&self, label: &str) -> Option<NotificationState<T, E>> {
        if let Some(state) = self.slot(label) {
            return Some(state);
        }
        self.parent().and_then(|parent| parent.lookup(label))
    }
}

impl<T: 'static, E: 'static> BatchApply for ViewScope<T, E> {
    fn apply_async(&self, task: Option<BatchTask>) {
        if self.destroyed.get() {
            tracing::trace!("apply on destroyed scope ignored");
            return;
        }
        let this = self.this.clone();
        self.queue.push(Box::new(move || {
            let alive = this.upgrade().is_some_and(|scope| !scope.destroyed.get());
            if let (true, Some(task)) = (alive, task) {
                task();
            }
        }));
    }
}

impl<T: 'static, E: 'static> StateScope<T, E> for ViewScope<T, E> {
    fn apply_with_slots(&self, mutator: SlotMutator<T, E>) {
        if self.destroyed.get() {
            tracing::trace!("apply on destroyed scope ignored");
            return;
        }
        let this = self.this.clone();
        self.queue.push(Box::new(move || {
            let Some(scope) = this.upgrade() else {
                return;
            };
            if scope.destroyed.get() {
                return;
            }
            mutator(&mut scope.slots.borrow_mut());
        }));
    }

    fn on_destroy(&self, callback: Box<dyn FnOnce()>) {
        if self.destroyed.get() {
            callback();
            return;
        }
        self.destroy_listeners.borrow_mut().push(callback);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.destroy();
        }
        let listeners = std::mem::take(&mut *self.destroy_listeners.borrow_mut());
        tracing::debug!(listeners = listeners.len(), "scope destroyed");
        for listener in listeners {
            listener();
        }
    }
}
