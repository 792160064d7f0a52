//! End-to-end binding lifecycle through the public API: bind, emit, flush,
//! rebind, tear down.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use rxscope::{
    BatchApply, BatchContext, BatchTask, BatchedSubscribe, Changes, ComponentBinding,
    ControllerConfig, ControllerState, ErrorReporter, NotificationState, Observer, RxScopeError,
    Sequence, SourceCell, SourceChange, SourceRef, StateScope, Stream, Subject, Subscription,
    ViewScope, WatchBinding,
};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

type State = NotificationState<i32, String>;

/// Stream counting subscribe and unsubscribe calls.
#[derive(Clone, Default)]
struct Counted {
    subject: Subject<i32, String>,
    subscribes: Rc<Cell<usize>>,
    unsubscribes: Rc<Cell<usize>>,
}

struct CountedSubscription {
    inner: Box<dyn Subscription>,
    unsubscribes: Rc<Cell<usize>>,
    done: Cell<bool>,
}

impl Subscription for CountedSubscription {
    fn unsubscribe(&self) {
        if !self.done.replace(true) {
            self.unsubscribes.set(self.unsubscribes.get() + 1);
        }
        self.inner.unsubscribe();
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl Stream<i32, String> for Counted {
    fn subscribe(&self, observer: Observer<i32, String>) -> Box<dyn Subscription> {
        self.subscribes.set(self.subscribes.get() + 1);
        Box::new(CountedSubscription {
            inner: self.subject.subscribe(observer),
            unsubscribes: Rc::clone(&self.unsubscribes),
            done: Cell::new(false),
        })
    }
}

#[derive(Default)]
struct Reports(RefCell<Vec<RxScopeError>>);

impl ErrorReporter for Reports {
    fn report(&self, error: &RxScopeError) {
        self.0.borrow_mut().push(error.clone());
    }
}

fn bind_cell(
    scope: &Rc<ViewScope<i32, String>>,
    initial: SourceRef<i32, String>,
) -> (SourceCell<i32, String>, WatchBinding<i32, String>) {
    let src = SourceCell::new(initial);
    let binding = WatchBinding::new(scope.clone(), &src, &ControllerConfig::default());
    (src, binding)
}

#[test]
fn emits_then_idle_leaves_history() {
    let scope = ViewScope::root();
    let (_src, _binding) = bind_cell(&scope, SourceRef::new(Rc::new(Sequence::of([1, 2]))));

    assert_eq!(scope.pending(), 2);
    assert_eq!(scope.flush(), Ok(2));
    assert_eq!(
        scope.slot("$rx"),
        Some(State {
            next: Some(2),
            prev: Some(1),
            ..State::default()
        })
    );
    assert_eq!(scope.scheduled_count(), 2);
}

#[test]
fn completion_keeps_last_value() {
    let scope = ViewScope::root();
    let (_src, _binding) = bind_cell(
        &scope,
        SourceRef::new(Rc::new(Sequence::of([1]).then_complete())),
    );
    scope.flush().unwrap();

    let state = scope.slot("$rx").unwrap();
    assert_eq!((state.next, state.prev, state.complete), (Some(1), Some(1), true));
    assert_eq!(state.error, None);
}

#[test]
fn error_replaces_value() {
    let scope = ViewScope::root();
    let (_src, _binding) = bind_cell(
        &scope,
        SourceRef::new(Rc::new(Sequence::of([1]).then_error("E".to_string()))),
    );
    scope.flush().unwrap();

    assert_eq!(
        scope.slot("$rx"),
        Some(State {
            error: Some("E".into()),
            prev: Some(1),
            ..State::default()
        })
    );
}

#[test]
fn rebinding_switches_streams_in_order() {
    let scope = ViewScope::root();
    let a = Counted::default();
    let b = Counted::default();
    let (src, _binding) = bind_cell(&scope, SourceRef::new(Rc::new(a.clone())));

    a.subject.next(1);
    src.set(SourceRef::new(Rc::new(b.clone())));
    assert_eq!((a.subscribes.get(), a.unsubscribes.get()), (1, 1));
    assert_eq!((b.subscribes.get(), b.unsubscribes.get()), (1, 0));

    a.subject.next(99);
    b.subject.next(2);
    scope.flush().unwrap();

    // next(1), reset, next(2): the stale 99 never lands.
    assert_eq!(scope.scheduled_count(), 3);
    let state = scope.slot("$rx").unwrap();
    assert_eq!(state.next, Some(2));
    assert_eq!(state.prev, None);
}

#[test]
fn scope_destroy_stops_everything() {
    let scope = ViewScope::root();
    let a = Counted::default();
    let (src, binding) = bind_cell(&scope, SourceRef::new(Rc::new(a.clone())));

    a.subject.next(1);
    scope.flush().unwrap();
    a.subject.next(2);
    scope.destroy();
    scope.destroy();

    assert_eq!(a.unsubscribes.get(), 1);
    assert_eq!(binding.state(), ControllerState::Destroyed);
    a.subject.next(3);
    scope.flush().unwrap();
    assert_eq!(scope.slot("$rx").and_then(|s| s.next), Some(1));

    src.set(SourceRef::none());
    drop(binding);
    assert_eq!(a.unsubscribes.get(), 1);
}

#[test]
fn empty_reference_reports_without_subscribing() {
    let scope = ViewScope::root();
    let reports = Rc::new(Reports::default());
    let src = SourceCell::new(SourceRef::none());
    let _binding = WatchBinding::with_reporter(
        scope.clone(),
        &src,
        &ControllerConfig::with_label("now"),
        reports.clone(),
    );

    scope.flush().unwrap();
    assert_eq!(
        *reports.0.borrow(),
        vec![RxScopeError::NotAStream {
            label: "now".into()
        }]
    );
    assert_eq!(scope.slot("now"), None);

    // A later valid reference recovers.
    let late = Counted::default();
    src.set(SourceRef::new(Rc::new(late.clone())));
    late.subject.next(4);
    scope.flush().unwrap();
    assert_eq!(late.subscribes.get(), 1);
    assert_eq!(scope.slot("now").and_then(|s| s.next), Some(4));
}

#[test]
fn operator_closure_and_empty_observer() {
    let scope = ViewScope::<i32, String>::root();
    let ctx = BatchContext::new(Some(scope.clone()));
    let subject = Subject::<i32, String>::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);

    let closure = subject
        .subscribe_batched(move |v: &i32| s.borrow_mut().push(*v), &ctx)
        .unwrap();
    let empty = subject.subscribe_batched((), &ctx).unwrap();

    subject.next(1);
    subject.next(2);
    assert!(seen.borrow().is_empty());
    assert_eq!(scope.pending(), 4);

    scope.flush().unwrap();
    assert_eq!(*seen.borrow(), vec![1, 2]);

    closure.unsubscribe();
    closure.unsubscribe();
    empty.unsubscribe();
    assert_eq!(subject.observer_count(), 0);
}

#[test]
fn operator_on_custom_applier() {
    #[derive(Default)]
    struct Immediate(Cell<usize>);

    impl BatchApply for Immediate {
        fn apply_async(&self, task: Option<BatchTask>) {
            self.0.set(self.0.get() + 1);
            if let Some(task) = task {
                task();
            }
        }
    }

    let applier = Rc::new(Immediate::default());
    let hits = Rc::new(Cell::new(0));
    let h = Rc::clone(&hits);
    Sequence::<i32, String>::of([1, 2, 3])
        .then_complete()
        .subscribe_batched_in(move |_: &i32| h.set(h.get() + 1), applier.clone());

    assert_eq!(hits.get(), 3);
    assert_eq!(applier.0.get(), 4);
}

#[test]
fn component_binding_with_transcluded_scope() {
    let page = ViewScope::<i32, String>::root();
    let content = ViewScope::child(&page);
    let a = Counted::default();
    let b = Counted::default();
    let mut binding = ComponentBinding::new(content.clone(), &ControllerConfig::default());

    binding.on_changes(&Changes::src(SourceChange::first(SourceRef::new(Rc::new(
        a.clone(),
    )))));
    a.subject.next(1);
    binding.on_changes(&Changes::default());
    binding.on_changes(&Changes::src(SourceChange::update(
        SourceRef::new(Rc::new(a.clone())),
        SourceRef::new(Rc::new(b.clone())),
    )));
    b.subject.next(2);
    page.flush().unwrap();

    assert_eq!(content.slot("$rx").and_then(|s| s.next), Some(2));
    assert_eq!(page.slot("$rx"), None);

    binding.on_destroy();
    assert!(content.is_destroyed());
    assert_eq!((a.unsubscribes.get(), b.unsubscribes.get()), (1, 1));
}

#[test]
fn nested_scopes_see_outer_slots() {
    let outer = ViewScope::<i32, String>::root();
    let inner = ViewScope::child(&outer);
    let now = Subject::new();
    let before = Subject::new();
    let now_src = SourceCell::new(SourceRef::new(Rc::new(now.clone())));
    let before_src = SourceCell::new(SourceRef::new(Rc::new(before.clone())));
    let _now = WatchBinding::new(outer.clone(), &now_src, &ControllerConfig::with_label("now"));
    let _before = WatchBinding::new(
        inner.clone(),
        &before_src,
        &ControllerConfig::with_label("before"),
    );

    for tick in 1..=3 {
        now.next(tick * 10);
        before.next(tick);
        outer.flush().unwrap();
    }

    let now_state = inner.lookup("now").unwrap();
    assert_eq!((now_state.next, now_state.prev), (Some(30), Some(20)));
    assert_eq!(inner.lookup("before").and_then(|s| s.next), Some(3));
    assert_eq!(outer.version(), 3);

    inner.destroy();
    assert_eq!(before.observer_count(), 0);
    assert_eq!(now.observer_count(), 1);
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct MessageCapture(Arc<Mutex<Vec<String>>>);

struct MessageVisitor<'a>(&'a mut String);

impl Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{value:?}"));
        }
    }
}

impl<S: Subscriber> Layer<S> for MessageCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        event.record(&mut MessageVisitor(&mut message));
        self.0.lock().expect("capture lock").push(message);
    }
}

#[test]
fn lifecycle_is_traced() {
    let capture = MessageCapture::default();
    let subscriber = tracing_subscriber::registry().with(capture.clone());

    tracing::subscriber::with_default(subscriber, || {
        let scope = ViewScope::<i32, String>::root();
        let subject = Subject::new();
        let (src, _binding) = bind_cell(&scope, SourceRef::new(Rc::new(subject.clone())));
        src.set(SourceRef::none());
        scope.destroy();
    });

    let messages = capture.0.lock().expect("capture lock");
    for expected in [
        "subscribing",
        "unsubscribed",
        "rxscope binding rejected",
        "controller destroyed",
    ] {
        assert!(
            messages.iter().any(|m| m == expected),
            "missing {expected:?} in {messages:?}"
        );
    }
}
