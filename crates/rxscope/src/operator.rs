#![forbid(unsafe_code)]

//! Scope-batched subscribe: every notification is delivered inside the
//! host's batched-apply call instead of synchronously.
//!
//! A handler that is absent still requests an update pass
//! (`apply_async(None)`), so an empty observer can be used just to keep a
//! view fresh.
//!
//! ```ignore
//! let ctx = BatchContext::new(Some(scope.clone()));
//! let _sub = ticks.subscribe_batched(|n: &u64| println!("tick {n}"), &ctx)?;
//! scope.flush()?;
//! ```

use std::rc::Rc;

use crate::error::{Result, RxScopeError};
use crate::scope::BatchApply;
use crate::stream::{IntoObserver, Observer, Stream, Subscription};

/// Subscribe `observer` to `stream`, routing every notification through
/// `applier`. Returns the stream's own subscription.
pub fn batched_subscribe<T, E, S>(
    stream: &S,
    observer: impl IntoObserver<T, E>,
    applier: Rc<dyn BatchApply>,
) -> Box<dyn Subscription>
where
    T: Clone + 'static,
    E: Clone + 'static,
    S: Stream<T, E> + ?Sized,
{
    let observer = observer.into_observer();
    let (next, error, complete) = (
        observer.next_handler(),
        observer.error_handler(),
        observer.complete_handler(),
    );
    let (on_next, on_error, on_complete) = (Rc::clone(&applier), Rc::clone(&applier), applier);

    let wrapped = Observer::new()
        .on_next(move |value: &T| match &next {
            Some(handler) => {
                let (handler, value) = (Rc::clone(handler), value.clone());
                on_next.apply_async(Some(Box::new(move || handler(&value))));
            }
            None => on_next.apply_async(None),
        })
        .on_error(move |err: &E| match &error {
            Some(handler) => {
                let (handler, err) = (Rc::clone(handler), err.clone());
                on_error.apply_async(Some(Box::new(move || handler(&err))));
            }
            None => on_error.apply_async(None),
        })
        .on_complete(move || match &complete {
            Some(handler) => {
                let handler = Rc::clone(handler);
                on_complete.apply_async(Some(Box::new(move || handler())));
            }
            None => on_complete.apply_async(None),
        });

    stream.subscribe(wrapped)
}

/// Carries the scope batched subscriptions fall back to.
#[derive(Clone, Default)]
pub struct BatchContext {
    default_scope: Option<Rc<dyn BatchApply>>,
}

impl std::fmt::Debug for BatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchContext")
            .field("has_default_scope", &self.default_scope.is_some())
            .finish()
    }
}

impl BatchContext {
    /// A context falling back to `default_scope`, which may be absent.
    #[must_use]
    pub fn new(default_scope: Option<Rc<dyn BatchApply>>) -> Self {
        Self { default_scope }
    }

    /// Replace the default scope.
    pub fn set_default_scope(&mut self, scope: Option<Rc<dyn BatchApply>>) {
        self.default_scope = scope;
    }

    /// The scope used when a subscribe names none.
    #[must_use]
    pub fn default_scope(&self) -> Option<&Rc<dyn BatchApply>> {
        self.default_scope.as_ref()
    }

    /// Batched subscribe against `scope`, or the default scope when `None`.
    ///
    /// # Errors
    ///
    /// [`RxScopeError::NoScope`] when neither is available. Nothing is
    /// subscribed in that case.
    pub fn subscribe<T, E, S>(
        &self,
        stream: &S,
        observer: impl IntoObserver<T, E>,
        scope: Option<Rc<dyn BatchApply>>,
    ) -> Result<Box<dyn Subscription>>
    where
        T: Clone + 'static,
        E: Clone + 'static,
        S: Stream<T, E> + ?Sized,
    {
        let Some(scope) = scope.or_else(|| self.default_scope.clone()) else {
            tracing::warn!("batched subscribe without a scope");
            return Err(RxScopeError::NoScope);
        };
        Ok(batched_subscribe(stream, observer, scope))
    }
}

/// Batched subscribe as a method on every stream.
pub trait BatchedSubscribe<T, E>: Stream<T, E> {
    /// Subscribe against `ctx`'s default scope.
    ///
    /// # Errors
    ///
    /// [`RxScopeError::NoScope`] when `ctx` has no default scope.
    fn subscribe_batched(
        &self,
        observer: impl IntoObserver<T, E>,
        ctx: &BatchContext,
    ) -> Result<Box<dyn Subscription>>;

    /// Subscribe against an explicit scope.
    fn subscribe_batched_in(
        &self,
        observer: impl IntoObserver<T, E>,
        scope: Rc<dyn BatchApply>,
    ) -> Box<dyn Subscription>;
}

impl<T, E, S> BatchedSubscribe<T, E> for S
where
    T: Clone + 'static,
    E: Clone + 'static,
    S: Stream<T, E> + ?Sized,
{
    fn subscribe_batched(
        &self,
        observer: impl IntoObserver<T, E>,
        ctx: &BatchContext,
    ) -> Result<Box<dyn Subscription>> {
        ctx.subscribe(self, observer, None)
    }

    fn subscribe_batched_in(
        &self,
        observer: impl IntoObserver<T, E>,
        scope: Rc<dyn BatchApply>,
    ) -> Box<dyn Subscription> {
        batched_subscribe(self, observer, scope)
    }
}
