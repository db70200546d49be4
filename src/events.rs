//! Event bus
//!
//! Synchronous multicast of typed events to registered subscribers.
//! Handlers are invoked in registration order from the dispatch worker that
//! produced the event; `subscribe` returns a handle that can be used to
//! remove the handler again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::{Candle, Trade};

/// Handle identifying one registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered set of callbacks for one event type.
pub struct CallbackSet<T> {
    handlers: RwLock<Vec<(u64, Callback<T>)>>,
    next_id: AtomicU64,
}

impl<T> Default for CallbackSet<T> {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> CallbackSet<T> {
    /// Register a callback. Callbacks run in registration order.
    pub fn subscribe<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.write().push((id, Arc::new(handler)));
        HandlerId(id)
    }

    /// Remove a previously registered callback. Returns whether it existed.
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id.0);
        handlers.len() != before
    }

    /// Invoke every callback synchronously, in registration order.
    ///
    /// The handler list is snapshotted first so a callback may subscribe or
    /// unsubscribe without deadlocking.
    pub fn emit(&self, event: &T) {
        let snapshot: Vec<Callback<T>> =
            self.handlers.read().iter().map(|(_, h)| Arc::clone(h)).collect();
        for handler in snapshot {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Multicast buses for the typed streaming events.
#[derive(Default)]
pub struct EventBus {
    pub trades: CallbackSet<Trade>,
    pub candles: CallbackSet<Candle>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn handlers_run_in_registration_order() {
        let set: CallbackSet<u32> = CallbackSet::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            set.subscribe(move |v: &u32| seen.lock().push((tag, *v)));
        }

        set.emit(&7);
        assert_eq!(
            *seen.lock(),
            vec![("first", 7), ("second", 7), ("third", 7)]
        );
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let set: CallbackSet<u32> = CallbackSet::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = Arc::clone(&seen);
        let keep = set.subscribe(move |v: &u32| s1.lock().push(("keep", *v)));
        let s2 = Arc::clone(&seen);
        let drop_me = set.subscribe(move |v: &u32| s2.lock().push(("drop", *v)));

        assert!(set.unsubscribe(drop_me));
        assert!(!set.unsubscribe(drop_me));
        set.emit(&1);

        assert_eq!(*seen.lock(), vec![("keep", 1)]);
        assert!(set.unsubscribe(keep));
        assert!(set.is_empty());
    }

    #[test]
    fn handler_may_unsubscribe_itself_during_emit() {
        let set = Arc::new(CallbackSet::<u32>::default());
        let count = Arc::new(Mutex::new(0));

        let set2 = Arc::clone(&set);
        let count2 = Arc::clone(&count);
        let id = Arc::new(Mutex::new(None));
        let id2 = Arc::clone(&id);
        let handle = set.subscribe(move |_: &u32| {
            *count2.lock() += 1;
            if let Some(id) = *id2.lock() {
                set2.unsubscribe(id);
            }
        });
        *id.lock() = Some(handle);

        set.emit(&0);
        set.emit(&0);
        assert_eq!(*count.lock(), 1);
    }
}
