#![forbid(unsafe_code)]

//! Subscription controller: one stream, one slot, one live subscription.
//!
//! # State machine
//!
//! ```text
//!            bind(stream)                 bind(other) / unsubscribe()
//! Unbound ───────────────▶ Bound ───────────────────────────────▶ Unbound
//!    │                       │
//!    └──────── destroy() ────┴──────────▶ Destroyed (terminal)
//! ```
//!
//! # Invariants
//!
//! 1. At most one live subscription per controller. The previous one is
//!    unsubscribed before the next `subscribe` call.
//! 2. Slot writes only happen inside the owning scope's batched apply.
//! 3. Notifications from a drained subscription are dropped.
//! 4. Batched writes re-check, when they run, that the controller is still
//!    alive; writes scheduled before `destroy()` never land.
//! 5. `destroy()` is idempotent and unsubscribes at most once.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use crate::binding::SourceRef;
use crate::config::ControllerConfig;
use crate::error::{ErrorReporter, Result, RxScopeError, TracingReporter};
use crate::scope::StateScope;
use crate::state::SlotWrite;
use crate::stream::{Observer, Subscription};

/// Lifecycle state of a [`SubscriptionController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No live subscription. The initial state, and the state after an
    /// unsubscribe or a rejected reference.
    Unbound,
    /// Subscribed to the current stream.
    Bound,
    /// Torn down. Further binds are ignored.
    Destroyed,
}

/// Binds a stream to a named slot of its owning scope.
pub struct SubscriptionController<T, E> {
    label: Rc<str>,
    scope: Option<Rc<dyn StateScope<T, E>>>,
    reporter: Rc<dyn ErrorReporter>,
    subscription: Option<Box<dyn Subscription>>,
    /// Bumped whenever a subscription is drained.
    epoch: Rc<Cell<u64>>,
    alive: Rc<Cell<bool>>,
    state: ControllerState,
}

impl<T, E> std::fmt::Debug for SubscriptionController<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionController")
            .field("label", &self.label)
            .field("state", &self.state)
            .field("epoch", &self.epoch.get())
            .finish()
    }
}

impl<T: Clone + 'static, E: Clone + 'static> SubscriptionController<T, E> {
    /// A controller writing into `scope`, reporting through `tracing`.
    pub fn new(scope: Rc<dyn StateScope<T, E>>, config: &ControllerConfig) -> Self {
        Self {
            label: Rc::from(config.resolved_label()),
            scope: Some(scope),
            reporter: Rc::new(TracingReporter),
            subscription: None,
            epoch: Rc::new(Cell::new(0)),
            alive: Rc::new(Cell::new(true)),
            state: ControllerState::Unbound,
        }
    }

    /// Replace the error reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Rc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Name of the slot this controller writes.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Whether a subscription is live.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.state == ControllerState::Bound
    }

    /// React to a new value of the bound reference, including the first.
    pub fn on_source_reference(&mut self, next: SourceRef<T, E>) {
        self.bind(next);
    }

    /// Drain the current subscription, then subscribe to `source`.
    ///
    /// An empty reference is reported through the controller's
    /// [`ErrorReporter`]; the slot stays empty and nothing is subscribed.
    pub fn bind(&mut self, source: SourceRef<T, E>) {
        if let Err(err) = self.try_bind(source) {
            self.reporter.report(&err);
        }
    }

    fn try_bind(&mut self, source: SourceRef<T, E>) -> Result<()> {
        if self.state == ControllerState::Destroyed {
            tracing::debug!(label = %self.label, "bind on destroyed controller ignored");
            return Ok(());
        }
        self.unsubscribe();

        let Some(stream) = source.stream() else {
            return Err(RxScopeError::NotAStream {
                label: self.label.to_string(),
            });
        };

        tracing::debug!(label = %self.label, epoch = self.epoch.get(), "subscribing");
        let observer = self.projecting_observer();
        // Mark bound first: a synchronous terminal notification during
        // subscribe is still delivered through the same path.
        self.state = ControllerState::Bound;
        self.subscription = Some(stream.subscribe(observer));
        Ok(())
    }

    /// Drain the current subscription and schedule a slot reset. No-op when
    /// nothing is bound.
    pub fn unsubscribe(&mut self) {
        if self.drain() {
            self.schedule(SlotWrite::Reset);
        }
    }

    /// Tear down: drain the subscription, release the scope, and stop every
    /// pending write. Safe to call repeatedly or when never bound.
    pub fn destroy(&mut self) {
        if self.state == ControllerState::Destroyed {
            return;
        }
        self.alive.set(false);
        self.drain();
        self.scope = None;
        self.state = ControllerState::Destroyed;
        tracing::debug!(label = %self.label, "controller destroyed");
    }

    /// Unsubscribe without touching the slot. Returns whether a subscription
    /// was live.
    fn drain(&mut self) -> bool {
        let Some(subscription) = self.subscription.take() else {
            return false;
        };
        self.epoch.set(self.epoch.get() + 1);
        subscription.unsubscribe();
        if self.state == ControllerState::Bound {
            self.state = ControllerState::Unbound;
        }
        tracing::debug!(label = %self.label, "unsubscribed");
        true
    }

    fn schedule(&self, write: SlotWrite<T, E>) {
        if let Some(scope) = &self.scope {
            schedule_write(&Rc::downgrade(scope), &self.alive, &self.label, write);
        }
    }

    fn projecting_observer(&self) -> Observer<T, E> {
        let Some(scope) = &self.scope else {
            return Observer::new();
        };
        let sink = Rc::new(Projection {
            scope: Rc::downgrade(scope),
            alive: Rc::clone(&self.alive),
            label: Rc::clone(&self.label),
            epoch: Rc::clone(&self.epoch),
            subscribed_at: self.epoch.get(),
        });
        let (on_next, on_error, on_complete) = (Rc::clone(&sink), Rc::clone(&sink), sink);
        Observer::new()
            .on_next(move |value: &T| on_next.write(SlotWrite::Next(value.clone())))
            .on_error(move |err: &E| on_error.write(SlotWrite::Error(err.clone())))
            .on_complete(move || on_complete.write(SlotWrite::Complete))
    }
}

impl<T, E> Drop for SubscriptionController<T, E> {
    fn drop(&mut self) {
        self.alive.set(false);
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

/// What a subscription's observer needs to project into the slot.
struct Projection<T, E> {
    scope: Weak<dyn StateScope<T, E>>,
    alive: Rc<Cell<bool>>,
    label: Rc<str>,
    epoch: Rc<Cell<u64>>,
    subscribed_at: u64,
}

impl<T: Clone + 'static, E: Clone + 'static> Projection<T, E> {
    fn write(&self, write: SlotWrite<T, E>) {
        if self.epoch.get() != self.subscribed_at || !self.alive.get() {
            tracing::trace!(label = %self.label, "late notification dropped");
            return;
        }
        schedule_write(&self.scope, &self.alive, &self.label, write);
    }
}

fn schedule_write<T: Clone + 'static, E: Clone + 'static>(
    scope: &Weak<dyn StateScope<T, E>>,
    alive: &Rc<Cell<bool>>,
    label: &Rc<str>,
    write: SlotWrite<T, E>,
) {
    let Some(scope) = scope.upgrade() else {
        return;
    };
    let alive = Rc::clone(alive);
    let label = Rc::clone(label);
    scope.apply_with_slots(Box::new(move |slots| {
        if !alive.get() {
            tracing::trace!(label = %label, "write after destroy dropped");
            return;
        }
        slots.project(&label, write);
    }));
}
