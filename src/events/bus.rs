//! Event bus - synchronous publish/subscribe for session state changes.
//!
//! The session publishes every externally visible state change here instead
//! of calling its observers directly, so views and the persistence-agnostic
//! map layer can react without the session knowing about them.
//!
//! Delivery contract: subscribers of an event's kind are called once per
//! publish, in registration order, on the publishing thread. The
//! registration list is snapshotted when a publish begins, so a callback
//! that subscribes or unsubscribes mid-delivery never affects the round in
//! progress.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::types::{QuizEvent, QuizEventKind};

type SubscriberCallback = dyn FnMut(&QuizEvent);

/// Handle returned by [`EventBus::subscribe`], used to remove that
/// registration again. Each subscribe call yields a distinct handle, even
/// for the same callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    kind: QuizEventKind,
    id: u64,
}

struct Registration {
    id: u64,
    callback: Rc<RefCell<SubscriberCallback>>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<QuizEventKind, Vec<Registration>>,
}

/// Single-threaded publish/subscribe hub.
///
/// Cloning produces another handle to the same registry, which is what lets
/// a subscriber re-enter the bus from inside its own callback.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one event kind.
    pub fn subscribe(
        &self,
        kind: QuizEventKind,
        callback: impl FnMut(&QuizEvent) + 'static,
    ) -> Subscription {
        let mut registry = self.inner.borrow_mut();
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .subscribers
            .entry(kind)
            .or_default()
            .push(Registration {
                id,
                callback: Rc::new(RefCell::new(callback)),
            });
        Subscription { kind, id }
    }

    /// Remove a registration. No-op if the handle was already removed.
    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut registry = self.inner.borrow_mut();
        if let Some(registrations) = registry.subscribers.get_mut(&subscription.kind) {
            registrations.retain(|registration| registration.id != subscription.id);
        }
    }

    /// Deliver an event to every subscriber registered for its kind at the
    /// moment this call starts.
    ///
    /// A callback that is still running (this publish is nested inside it)
    /// is skipped rather than re-entered.
    pub fn publish(&self, event: &QuizEvent) {
        let snapshot: Vec<Rc<RefCell<SubscriberCallback>>> = {
            let registry = self.inner.borrow();
            match registry.subscribers.get(&event.kind()) {
                Some(registrations) => registrations
                    .iter()
                    .map(|registration| Rc::clone(&registration.callback))
                    .collect(),
                None => return,
            }
        };
        for callback in snapshot {
            if let Ok(mut callback) = callback.try_borrow_mut() {
                (*callback)(event);
            }
        }
    }

    /// Drop all registrations. Used on teardown.
    pub fn clear_subscriptions(&self) {
        self.inner.borrow_mut().subscribers.clear();
    }

    /// Number of live registrations for one event kind.
    pub fn subscriber_count(&self, kind: QuizEventKind) -> usize {
        self.inner
            .borrow()
            .subscribers
            .get(&kind)
            .map_or(0, Vec::len)
    }
}
