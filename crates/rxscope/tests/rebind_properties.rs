//! Property tests: arbitrary rebind / emit / flush sequences against a
//! reference model of the slot.

use std::rc::Rc;

use proptest::prelude::*;
use rxscope::{
    ControllerConfig, ControllerState, ErrorReporter, RxScopeError, SlotWrite, Slots, SourceCell,
    SourceRef, StateScope, Stream, Subject, ViewScope, WatchBinding,
};

const STREAMS: usize = 3;

#[derive(Debug, Clone)]
enum Op {
    /// Point `src` at stream `i`, or at nothing.
    Bind(Option<usize>),
    Emit(usize, i32),
    Flush,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => proptest::option::of(0..STREAMS).prop_map(Op::Bind),
        5 => (0..STREAMS, any::<i32>()).prop_map(|(i, v)| Op::Emit(i, v)),
        2 => Just(Op::Flush),
    ]
}

struct Silent;

impl ErrorReporter for Silent {
    fn report(&self, _error: &RxScopeError) {}
}

struct Harness {
    scope: Rc<ViewScope<i32, String>>,
    subjects: Vec<Subject<i32, String>>,
    refs: Vec<SourceRef<i32, String>>,
    src: SourceCell<i32, String>,
    binding: WatchBinding<i32, String>,
}

impl Harness {
    fn new() -> Self {
        let scope = ViewScope::root();
        let subjects: Vec<Subject<i32, String>> = (0..STREAMS).map(|_| Subject::new()).collect();
        let refs = subjects
            .iter()
            .map(|s| {
                let stream: Rc<dyn Stream<i32, String>> = Rc::new(s.clone());
                SourceRef::from(stream)
            })
            .collect();
        let src = SourceCell::new(SourceRef::none());
        let binding = WatchBinding::with_reporter(
            scope.clone(),
            &src,
            &ControllerConfig::default(),
            Rc::new(Silent),
        );
        Self {
            scope,
            subjects,
            refs,
            src,
            binding,
        }
    }

    fn live_observers(&self) -> usize {
        self.subjects.iter().map(Subject::observer_count).sum()
    }
}

/// What the slot should look like, driven by the same ops.
#[derive(Default)]
struct Model {
    bound: Option<usize>,
    pending: Vec<SlotWrite<i32, String>>,
    slots: Slots<i32, String>,
}

impl Model {
    fn apply(&mut self, op: &Op) {
        match *op {
            Op::Bind(target) => {
                if target == self.bound {
                    return;
                }
                if self.bound.is_some() {
                    self.pending.push(SlotWrite::Reset);
                }
                self.bound = target;
            }
            Op::Emit(i, v) => {
                if self.bound == Some(i) {
                    self.pending.push(SlotWrite::Next(v));
                }
            }
            Op::Flush => {
                for write in self.pending.drain(..) {
                    self.slots.project("$rx", write);
                }
            }
        }
    }
}

proptest! {
    #[test]
    fn slot_tracks_only_the_bound_stream(ops in proptest::collection::vec(op_strategy(), 0..64)) {
        let h = Harness::new();
        let mut model = Model::default();

        for op in &ops {
            match *op {
                Op::Bind(Some(i)) => h.src.set(h.refs[i].clone()),
                Op::Bind(None) => h.src.set(SourceRef::none()),
                Op::Emit(i, v) => h.subjects[i].next(v),
                Op::Flush => {
                    prop_assert!(h.scope.flush().is_ok());
                }
            }
            model.apply(op);

            prop_assert!(h.live_observers() <= 1);
            prop_assert_eq!(h.binding.state() == ControllerState::Bound, model.bound.is_some());
        }

        prop_assert!(h.scope.flush().is_ok());
        model.apply(&Op::Flush);
        prop_assert_eq!(h.scope.slot("$rx"), model.slots.get("$rx").cloned());
    }

    #[test]
    fn nothing_lands_after_destroy(ops in proptest::collection::vec(op_strategy(), 0..32)) {
        let h = Harness::new();
        for op in &ops {
            match *op {
                Op::Bind(Some(i)) => h.src.set(h.refs[i].clone()),
                Op::Bind(None) => h.src.set(SourceRef::none()),
                Op::Emit(i, v) => h.subjects[i].next(v),
                Op::Flush => {
                    prop_assert!(h.scope.flush().is_ok());
                }
            }
        }
        prop_assert!(h.scope.flush().is_ok());
        let before = h.scope.slot("$rx");

        h.scope.destroy();
        prop_assert_eq!(h.live_observers(), 0);
        prop_assert_eq!(h.binding.state(), ControllerState::Destroyed);

        for (i, subject) in h.subjects.iter().enumerate() {
            subject.next(i as i32);
            h.src.set(h.refs[i].clone());
        }
        prop_assert!(h.scope.flush().is_ok());
        prop_assert_eq!(h.live_observers(), 0);
        prop_assert_eq!(h.scope.slot("$rx"), before);
    }
}
