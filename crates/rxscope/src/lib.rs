#![forbid(unsafe_code)]

//! Lifecycle-safe binding of push streams to view-model slots.
//!
//! This crate provides:
//! - [`SubscriptionController`]: binds one stream to one named slot of a
//!   scope, writing every notification as a [`NotificationState`] inside the
//!   scope's batched apply, and tearing down with the scope.
//! - [`WatchBinding`] / [`ComponentBinding`]: the attribute-style and
//!   structural-style adapters that drive a controller.
//! - [`BatchedSubscribe`]: a subscribe variant whose handlers run inside a
//!   scope's batched apply.
//! - [`ViewScope`]: a reference host scope tree with one shared flush queue.
//!
//! # Architecture
//!
//! Everything is single-threaded and shared through `Rc`. Controllers never
//! write slots directly: they schedule a mutator on their [`StateScope`], and
//! the host applies it on its next update pass. Late notifications and
//! writes scheduled before teardown are dropped when they reach the
//! controller or the flush, whichever comes first.

pub mod binding;
pub mod config;
pub mod controller;
pub mod error;
pub mod operator;
pub mod scope;
pub mod state;
pub mod stream;
pub mod watch;

pub use binding::{
    Changes, ComponentBinding, SourceCell, SourceChange, SourceRef, WatchBinding,
};
pub use config::{ControllerConfig, DEFAULT_FLUSH_TTL, DEFAULT_LABEL, ScopeConfig};
pub use controller::{ControllerState, SubscriptionController};
pub use error::{ErrorReporter, Result, RxScopeError, TracingReporter};
pub use operator::{BatchContext, BatchedSubscribe, batched_subscribe};
pub use scope::{BatchApply, BatchTask, SlotMutator, StateScope, ViewScope};
pub use state::{NotificationState, SlotWrite, Slots};
pub use stream::{
    IntoObserver, Observer, Sequence, Stream, Subject, Subscription, Termination,
};
pub use watch::{WatchGuard, Watched};
