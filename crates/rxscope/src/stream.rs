#![forbid(unsafe_code)]

//! Stream capability set: observers, subscriptions, and two minimal sources.
//!
//! The binding layer only needs [`Stream::subscribe`] and
//! [`Subscription::unsubscribe`]. [`Subject`] (hot, multicast) and
//! [`Sequence`] (cold, synchronous) exist so hosts and tests have something
//! to bind without pulling in a full Rx implementation.
//!
//! # Invariants
//!
//! 1. After `unsubscribe()` returns, the observer is never called again.
//! 2. `unsubscribe()` is idempotent.
//! 3. Observers are notified in registration order.
//! 4. A terminal notification (`error` or `complete`) is delivered at most
//!    once per observer and closes its subscription.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

type NextFn<T> = Rc<dyn Fn(&T)>;
type ErrorFn<E> = Rc<dyn Fn(&E)>;
type CompleteFn = Rc<dyn Fn()>;

/// A set of optional notification handlers.
pub struct Observer<T, E> {
    next: Option<NextFn<T>>,
    error: Option<ErrorFn<E>>,
    complete: Option<CompleteFn>,
}

impl<T, E> Default for Observer<T, E> {
    fn default() -> Self {
        Self {
            next: None,
            error: None,
            complete: None,
        }
    }
}

impl<T, E> Clone for Observer<T, E> {
    fn clone(&self) -> Self {
        Self {
            next: self.next.clone(),
            error: self.error.clone(),
            complete: self.complete.clone(),
        }
    }
}

impl<T, E> std::fmt::Debug for Observer<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("next", &self.next.is_some())
            .field("error", &self.error.is_some())
            .field("complete", &self.complete.is_some())
            .finish()
    }
}

impl<T, E> Observer<T, E> {
    /// An observer with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An observer with only a `next` handler.
    pub fn from_next(f: impl Fn(&T) + 'static) -> Self {
        Self::new().on_next(f)
    }

    #[must_use]
    pub fn on_next(mut self, f: impl Fn(&T) + 'static) -> Self {
        self.next = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&E) + 'static) -> Self {
        self.error = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_complete(mut self, f: impl Fn() + 'static) -> Self {
        self.complete = Some(Rc::new(f));
        self
    }

    pub(crate) fn next_handler(&self) -> Option<NextFn<T>> {
        self.next.clone()
    }

    pub(crate) fn error_handler(&self) -> Option<ErrorFn<E>> {
        self.error.clone()
    }

    pub(crate) fn complete_handler(&self) -> Option<CompleteFn> {
        self.complete.clone()
    }

    /// Deliver a value, if a `next` handler is present.
    pub fn next(&self, value: &T) {
        if let Some(f) = &self.next {
            f(value);
        }
    }

    /// Deliver an error, if an `error` handler is present.
    pub fn error(&self, err: &E) {
        if let Some(f) = &self.error {
            f(err);
        }
    }

    /// Deliver completion, if a `complete` handler is present.
    pub fn complete(&self) {
        if let Some(f) = &self.complete {
            f();
        }
    }
}

/// Anything that can be turned into an [`Observer`].
///
/// Implemented for observers, `Option<Observer>` (`None` is an empty
/// observer), `()` (empty observer), and plain `Fn(&T)` closures, which
/// become the `next` handler.
pub trait IntoObserver<T, E> {
    fn into_observer(self) -> Observer<T, E>;
}

impl<T, E> IntoObserver<T, E> for Observer<T, E> {
    fn into_observer(self) -> Observer<T, E> {
        self
    }
}

impl<T, E> IntoObserver<T, E> for Option<Observer<T, E>> {
    fn into_observer(self) -> Observer<T, E> {
        self.unwrap_or_default()
    }
}

impl<T, E> IntoObserver<T, E> for () {
    fn into_observer(self) -> Observer<T, E> {
        Observer::new()
    }
}

impl<T, E, F> IntoObserver<T, E> for F
where
    F: Fn(&T) + 'static,
{
    fn into_observer(self) -> Observer<T, E> {
        Observer::from_next(self)
    }
}

/// Handle to a live subscription.
pub trait Subscription {
    /// Stop delivery. Calling this more than once has no further effect.
    fn unsubscribe(&self);

    /// Whether delivery has stopped (unsubscribed or terminated).
    fn is_closed(&self) -> bool;
}

/// A push-based source of values.
pub trait Stream<T, E> {
    fn subscribe(&self, observer: Observer<T, E>) -> Box<dyn Subscription>;
}

impl<T, E, S: Stream<T, E> + ?Sized> Stream<T, E> for Rc<S> {
    fn subscribe(&self, observer: Observer<T, E>) -> Box<dyn Subscription> {
        (**self).subscribe(observer)
    }
}

// ---------------------------------------------------------------------------
// Subject: hot multicast source
// ---------------------------------------------------------------------------

/// One registered observer plus its closed flag.
struct Registration<T, E> {
    id: u64,
    observer: Observer<T, E>,
    closed: Rc<Cell<bool>>,
}

struct SubjectInner<T, E> {
    registrations: Vec<Rc<Registration<T, E>>>,
    next_id: u64,
    stopped: bool,
}

/// A hot source: values pushed with [`Subject::next`] go to every current
/// observer. Late subscribers see nothing that was emitted before them.
///
/// Cloning shares the same observer list.
pub struct Subject<T, E> {
    inner: Rc<RefCell<SubjectInner<T, E>>>,
}

impl<T, E> Clone for Subject<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T, E> Default for Subject<T, E> {
    fn default() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SubjectInner {
                registrations: Vec::new(),
                next_id: 0,
                stopped: false,
            })),
        }
    }
}

impl<T, E> std::fmt::Debug for Subject<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Subject")
            .field("observer_count", &inner.registrations.len())
            .field("stopped", &inner.stopped)
            .finish()
    }
}

impl<T: 'static, E: 'static> Subject<T, E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of observers still registered.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.borrow().registrations.len()
    }

    /// Whether `error` or `complete` has been emitted.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.borrow().stopped
    }

    /// Push a value to every live observer.
    pub fn next(&self, value: T) {
        // Snapshot so handlers may subscribe or unsubscribe re-entrantly.
        let live: Vec<Rc<Registration<T, E>>> = {
            let inner = self.inner.borrow();
            if inner.stopped {
                return;
            }
            inner.registrations.clone()
        };
        for reg in &live {
            if !reg.closed.get() {
                reg.observer.next(&value);
            }
        }
    }

    /// Terminate with an error; every observer is released afterwards.
    pub fn error(&self, err: E) {
        for reg in self.stop() {
            if !reg.closed.replace(true) {
                reg.observer.error(&err);
            }
        }
    }

    /// Terminate normally; every observer is released afterwards.
    pub fn complete(&self) {
        for reg in self.stop() {
            if !reg.closed.replace(true) {
                reg.observer.complete();
            }
        }
    }

    fn stop(&self) -> Vec<Rc<Registration<T, E>>> {
        let mut inner = self.inner.borrow_mut();
        if inner.stopped {
            return Vec::new();
        }
        inner.stopped = true;
        std::mem::take(&mut inner.registrations)
    }
}

impl<T: 'static, E: 'static> Stream<T, E> for Subject<T, E> {
    fn subscribe(&self, observer: Observer<T, E>) -> Box<dyn Subscription> {
        let closed = Rc::new(Cell::new(false));
        let mut inner = self.inner.borrow_mut();
        if inner.stopped {
            closed.set(true);
            return Box::new(SubjectSubscription::<T, E> {
                source: Weak::new(),
                id: 0,
                closed,
            });
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.registrations.push(Rc::new(Registration {
            id,
            observer,
            closed: Rc::clone(&closed),
        }));
        Box::new(SubjectSubscription {
            source: Rc::downgrade(&self.inner),
            id,
            closed,
        })
    }
}

struct SubjectSubscription<T, E> {
    source: Weak<RefCell<SubjectInner<T, E>>>,
    id: u64,
    closed: Rc<Cell<bool>>,
}

impl<T, E> Subscription for SubjectSubscription<T, E> {
    fn unsubscribe(&self) {
        if self.closed.replace(true) {
            return;
        }
        if let Some(inner) = self.source.upgrade() {
            inner
                .borrow_mut()
                .registrations
                .retain(|reg| reg.id != self.id);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

// ---------------------------------------------------------------------------
// Sequence: cold synchronous source
// ---------------------------------------------------------------------------

/// How a [`Sequence`] ends after its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination<E> {
    /// Stays open forever.
    Never,
    Complete,
    Error(E),
}

/// A cold source replaying a fixed list of values synchronously on each
/// subscribe, followed by its [`Termination`].
#[derive(Debug, Clone)]
pub struct Sequence<T, E> {
    values: Vec<T>,
    termination: Termination<E>,
}

impl<T: Clone, E: Clone> Sequence<T, E> {
    /// Emits `values` and stays open.
    pub fn of(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            values: values.into_iter().collect(),
            termination: Termination::Never,
        }
    }

    /// Emits nothing and stays open.
    #[must_use]
    pub fn never() -> Self {
        Self::of(Vec::new())
    }

    #[must_use]
    pub fn then_complete(mut self) -> Self {
        self.termination = Termination::Complete;
        self
    }

    #[must_use]
    pub fn then_error(mut self, err: E) -> Self {
        self.termination = Termination::Error(err);
        self
    }
}

impl<T: Clone, E: Clone> Stream<T, E> for Sequence<T, E> {
    fn subscribe(&self, observer: Observer<T, E>) -> Box<dyn Subscription> {
        let closed = Rc::new(Cell::new(false));
        for value in &self.values {
            observer.next(value);
        }
        match &self.termination {
            Termination::Never => {}
            Termination::Complete => {
                closed.set(true);
                observer.complete();
            }
            Termination::Error(err) => {
                closed.set(true);
                observer.error(err);
            }
        }
        Box::new(SequenceSubscription { closed })
    }
}

struct SequenceSubscription {
    closed: Rc<Cell<bool>>,
}

impl Subscription for SequenceSubscription {
    fn unsubscribe(&self) {
        self.closed.set(true);
    }

    fn is_closed(&self) -> bool {
        self.closed.get()
    }
}
