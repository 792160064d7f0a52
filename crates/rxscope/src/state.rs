#![forbid(unsafe_code)]

//! Notification state and its projection into named slots.
//!
//! Every write stamps `prev` with the `next` value held immediately before the
//! write. `error` replaces the slot (dropping `next`), `complete` patches it
//! (keeping `next`), and a reset leaves only the history.
//!
//! | before            | write       | after                              |
//! |-------------------|-------------|------------------------------------|
//! | `{}`              | `Next(1)`   | `{next: 1}`                        |
//! | `{next: 1}`       | `Next(2)`   | `{next: 2, prev: 1}`               |
//! | `{next: 1}`       | `Complete`  | `{next: 1, prev: 1, complete}`     |
//! | `{next: 1}`       | `Error(e)`  | `{error: e, prev: 1}`              |
//! | `{next: 3}`       | `Reset`     | `{prev: 3}`                        |

use std::collections::HashMap;

/// The value written to a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationState<T, E> {
    /// Last emitted value.
    pub next: Option<T>,
    /// Error the stream terminated with.
    pub error: Option<E>,
    /// Set once the stream completed.
    pub complete: bool,
    /// `next` as it was just before the latest write.
    pub prev: Option<T>,
}

impl<T, E> Default for NotificationState<T, E> {
    fn default() -> Self {
        Self {
            next: None,
            error: None,
            complete: false,
            prev: None,
        }
    }
}

impl<T, E> NotificationState<T, E> {
    /// No `next`, `error` or `complete`. History does not count.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.next.is_none() && self.error.is_none() && !self.complete
    }

    /// Whether the stream has ended, one way or the other.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.error.is_some() || self.complete
    }
}

/// One projected notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotWrite<T, E> {
    Next(T),
    Error(E),
    Complete,
    /// Clear `next`/`error`/`complete` after an unsubscribe.
    Reset,
}

impl<T: Clone, E: Clone> SlotWrite<T, E> {
    /// Compute the slot state following `current`.
    #[must_use]
    pub fn apply(self, current: Option<&NotificationState<T, E>>) -> NotificationState<T, E> {
        let prev = current.and_then(|state| state.next.clone());
        match self {
            SlotWrite::Next(value) => NotificationState {
                next: Some(value),
                prev,
                ..NotificationState::default()
            },
            SlotWrite::Error(err) => NotificationState {
                error: Some(err),
                prev,
                ..NotificationState::default()
            },
            SlotWrite::Complete => {
                let mut patched = current.cloned().unwrap_or_default();
                patched.complete = true;
                patched.prev = prev;
                patched
            }
            SlotWrite::Reset => NotificationState {
                prev,
                ..NotificationState::default()
            },
        }
    }
}

/// The slot map of one scope: the container mutators operate on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slots<T, E> {
    entries: HashMap<String, NotificationState<T, E>>,
}

impl<T, E> Default for Slots<T, E> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T, E> Slots<T, E> {
    /// An empty slot map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The state held under `label`, if that slot was ever written.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&NotificationState<T, E>> {
        self.entries.get(label)
    }

    /// Overwrite the slot named `label`. No history is recorded.
    pub fn insert(&mut self, label: impl Into<String>, state: NotificationState<T, E>) {
        self.entries.insert(label.into(), state);
    }

    /// Drop the slot named `label`, returning its last state.
    pub fn remove(&mut self, label: &str) -> Option<NotificationState<T, E>> {
        self.entries.remove(label)
    }

    /// Whether a slot named `label` exists.
    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.entries.contains_key(label)
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no slot has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Slot labels, in no particular order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl<T: Clone, E: Clone> Slots<T, E> {
    /// Project `write` into the slot named `label`.
    pub fn project(&mut self, label: &str, write: SlotWrite<T, E>) {
        let next = write.apply(self.entries.get(label));
        self.entries.insert(label.to_string(), next);
    }
}
