#![forbid(unsafe_code)]

//! Binding adapters: the two ways a view attaches a stream to a slot.
//!
//! - [`WatchBinding`]: attribute style. The bound reference lives in a
//!   [`SourceCell`]; every reassignment re-binds, and the owning scope's
//!   destroy notification tears the controller down.
//! - [`ComponentBinding`]: structural style. The host pushes explicit
//!   [`Changes`] and a destroy hook; the binding owns its transcluded scope.
//!
//! Both are thin: every decision lives in
//! [`SubscriptionController::on_source_reference`].
//!
//! # Usage
//!
//! ```ignore
//! use std::rc::Rc;
//! use rxscope::{ControllerConfig, SourceCell, SourceRef, Subject, ViewScope, WatchBinding};
//!
//! let scope = ViewScope::<u64, String>::root();
//! let time = Subject::new();
//! let src = SourceCell::new(SourceRef::new(Rc::new(time.clone())));
//! let _binding = WatchBinding::new(scope.clone(), &src, &ControllerConfig::with_label("now"));
//!
//! time.next(42);
//! scope.flush()?;
//! assert_eq!(scope.slot("now").and_then(|s| s.next), Some(42));
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::ControllerConfig;
use crate::controller::{ControllerState, SubscriptionController};
use crate::error::ErrorReporter;
use crate::scope::StateScope;
use crate::stream::Stream;
use crate::watch::{WatchGuard, Watched};

// ---------------------------------------------------------------------------
// SourceRef: the bound reference
// ---------------------------------------------------------------------------

/// The value of a binding's `src` input: a stream, or nothing.
///
/// Two references are equal when they point at the same stream.
pub struct SourceRef<T, E>(Option<Rc<dyn Stream<T, E>>>);

impl<T, E> SourceRef<T, E> {
    /// The empty reference.
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    /// The bound stream, if any.
    #[must_use]
    pub fn stream(&self) -> Option<&Rc<dyn Stream<T, E>>> {
        self.0.as_ref()
    }

    /// Whether the reference is empty.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }
}

impl<T: 'static, E: 'static> SourceRef<T, E> {
    /// A reference to `stream`.
    pub fn new<S: Stream<T, E> + 'static>(stream: Rc<S>) -> Self {
        let stream: Rc<dyn Stream<T, E>> = stream;
        Self(Some(stream))
    }
}

impl<T, E> From<Rc<dyn Stream<T, E>>> for SourceRef<T, E> {
    fn from(stream: Rc<dyn Stream<T, E>>) -> Self {
        Self(Some(stream))
    }
}

impl<T, E> Default for SourceRef<T, E> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T, E> Clone for SourceRef<T, E> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T, E> PartialEq for SourceRef<T, E> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b)),
            _ => false,
        }
    }
}

impl<T, E> Eq for SourceRef<T, E> {}

impl<T, E> std::fmt::Debug for SourceRef<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            None => f.write_str("SourceRef(None)"),
            Some(stream) => write!(f, "SourceRef({:p})", Rc::as_ptr(stream)),
        }
    }
}

/// Reactive `src` input for [`WatchBinding`].
pub type SourceCell<T, E> = Watched<SourceRef<T, E>>;

// ---------------------------------------------------------------------------
// WatchBinding: attribute style
// ---------------------------------------------------------------------------

/// Attribute-style binding: follows a [`SourceCell`] and lives as long as
/// the owning scope.
///
/// Dropping the binding destroys its controller.
pub struct WatchBinding<T, E> {
    controller: Rc<RefCell<SubscriptionController<T, E>>>,
    _watch: WatchGuard,
}

impl<T: Clone + 'static, E: Clone + 'static> WatchBinding<T, E> {
    /// Bind `src` into `scope`, starting with the cell's current value.
    pub fn new(
        scope: Rc<dyn StateScope<T, E>>,
        src: &SourceCell<T, E>,
        config: &ControllerConfig,
    ) -> Self {
        let controller = SubscriptionController::new(Rc::clone(&scope), config);
        Self::attach(scope, src, controller)
    }

    /// Like [`WatchBinding::new`], reporting through `reporter`.
    pub fn with_reporter(
        scope: Rc<dyn StateScope<T, E>>,
        src: &SourceCell<T, E>,
        config: &ControllerConfig,
        reporter: Rc<dyn ErrorReporter>,
    ) -> Self {
        let controller =
            SubscriptionController::new(Rc::clone(&scope), config).with_reporter(reporter);
        Self::attach(scope, src, controller)
    }

    fn attach(
        scope: Rc<dyn StateScope<T, E>>,
        src: &SourceCell<T, E>,
        controller: SubscriptionController<T, E>,
    ) -> Self {
        let controller = Rc::new(RefCell::new(controller));
        controller.borrow_mut().on_source_reference(src.get());

        let weak = Rc::downgrade(&controller);
        let watch = src.watch(move |next: &SourceRef<T, E>| {
            if let Some(controller) = weak.upgrade() {
                controller.borrow_mut().on_source_reference(next.clone());
            }
        });

        let weak = Rc::downgrade(&controller);
        scope.on_destroy(Box::new(move || {
            if let Some(controller) = weak.upgrade() {
                controller.borrow_mut().destroy();
            }
        }));

        Self {
            controller,
            _watch: watch,
        }
    }

    /// Lifecycle state of the underlying controller.
    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.controller.borrow().state()
    }

    /// Name of the slot being written.
    #[must_use]
    pub fn label(&self) -> String {
        self.controller.borrow().label().to_string()
    }

    /// Tear down now instead of waiting for the scope.
    pub fn destroy(&self) {
        self.controller.borrow_mut().destroy();
    }
}

impl<T, E> std::fmt::Debug for WatchBinding<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchBinding")
            .field("controller", &self.controller)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ComponentBinding: structural style
// ---------------------------------------------------------------------------

/// One changed input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceChange<T, E> {
    /// The new reference.
    pub current: SourceRef<T, E>,
    /// The reference before this round. Empty on the first change.
    pub previous: SourceRef<T, E>,
    pub first_change: bool,
}

impl<T, E> SourceChange<T, E> {
    /// The initial assignment.
    #[must_use]
    pub fn first(current: SourceRef<T, E>) -> Self {
        Self {
            current,
            previous: SourceRef::none(),
            first_change: true,
        }
    }

    /// A reassignment from `previous` to `current`.
    #[must_use]
    pub fn update(previous: SourceRef<T, E>, current: SourceRef<T, E>) -> Self {
        Self {
            current,
            previous,
            first_change: false,
        }
    }
}

/// The inputs changed in one host change-detection round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changes<T, E> {
    /// Set when `src` changed.
    pub src: Option<SourceChange<T, E>>,
}

impl<T, E> Default for Changes<T, E> {
    fn default() -> Self {
        Self { src: None }
    }
}

impl<T, E> Changes<T, E> {
    /// A round in which `src` changed.
    #[must_use]
    pub fn src(change: SourceChange<T, E>) -> Self {
        Self { src: Some(change) }
    }
}

/// Structural binding driven by explicit change notifications. Owns the
/// scope its content renders in and destroys it on teardown.
pub struct ComponentBinding<T, E> {
    controller: SubscriptionController<T, E>,
    scope: Rc<dyn StateScope<T, E>>,
}

impl<T: Clone + 'static, E: Clone + 'static> ComponentBinding<T, E> {
    /// Bind into `scope`, which the binding now owns.
    pub fn new(scope: Rc<dyn StateScope<T, E>>, config: &ControllerConfig) -> Self {
        Self {
            controller: SubscriptionController::new(Rc::clone(&scope), config),
            scope,
        }
    }

    /// Report rejected references through `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Rc<dyn ErrorReporter>) -> Self {
        self.controller = self.controller.with_reporter(reporter);
        self
    }

    /// Apply a change set. Rounds that did not touch `src` are ignored.
    pub fn on_changes(&mut self, changes: &Changes<T, E>) {
        let Some(change) = &changes.src else {
            return;
        };
        self.controller.on_source_reference(change.current.clone());
    }

    /// Destroy the controller, then the owned scope. Idempotent.
    pub fn on_destroy(&mut self) {
        self.controller.destroy();
        self.scope.destroy();
    }

    /// The controller driven by this binding.
    #[must_use]
    pub fn controller(&self) -> &SubscriptionController<T, E> {
        &self.controller
    }
}

impl<T, E> std::fmt::Debug for ComponentBinding<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentBinding")
            .field("controller", &self.controller)
            .field("scope_destroyed", &self.scope.is_destroyed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
