//! Subscriber registry for inbound messages and session events.
//!
//! Handlers run synchronously, in subscription order, on the thread that
//! dispatches. Dispatch works on a snapshot of the handler list, so a handler
//! may unsubscribe itself (or anyone else) without disturbing the current
//! round; the change applies from the next dispatch on.

use std::sync::{Arc, Mutex, PoisonError, Weak};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    handlers: Vec<(u64, Handler<T>)>,
}

/// Fan-out of values of type `T` to registered handlers.
pub struct Dispatcher<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Dispatcher<T> {
    /// Create a dispatcher with no handlers.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    /// Register a handler. It stays registered until the returned
    /// [`Subscription`] is unsubscribed.
    pub fn subscribe<F>(&self, handler: F) -> Subscription<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.push((id, Arc::new(handler)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `value` to every handler registered when the call starts.
    ///
    /// Returns how many handlers ran.
    pub fn dispatch(&self, value: &T) -> usize {
        let handlers: Vec<Handler<T>> = {
            let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        for handler in &handlers {
            handler(value);
        }
        handlers.len()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Dispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.len())
            .finish()
    }
}

/// Handle for one registered handler.
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`].
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription<T> {
    id: u64,
    registry: Weak<Mutex<Registry<T>>>,
}

impl<T> Subscription<T> {
    /// Remove the handler. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.remove()
    }

    /// Remove the handler through a shared reference, for use from inside a
    /// handler that captured its own subscription.
    pub fn remove(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        let before = registry.handlers.len();
        registry.handlers.retain(|(id, _)| *id != self.id);
        registry.handlers.len() != before
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn handlers_run_in_subscription_order() {
        let dispatcher = Dispatcher::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        let _a = dispatcher.subscribe(move |v| first.lock().unwrap().push(("first", *v)));
        let second = Arc::clone(&seen);
        let _b = dispatcher.subscribe(move |v| second.lock().unwrap().push(("second", *v)));

        assert_eq!(dispatcher.dispatch(&7), 2);
        assert_eq!(*seen.lock().unwrap(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn unsubscribed_handler_stops_receiving() {
        let dispatcher = Dispatcher::<u32>::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        let sub = dispatcher.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.dispatch(&1);
        assert!(sub.unsubscribe());
        dispatcher.dispatch(&2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn unsubscribe_during_dispatch_is_safe() {
        let dispatcher = Dispatcher::<u32>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Subscription<u32>>>> = Arc::new(Mutex::new(None));

        let c = Arc::clone(&count);
        let own = Arc::clone(&slot);
        let sub = dispatcher.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = own.lock().unwrap().take() {
                sub.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(sub);

        let after = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&after);
        let _other = dispatcher.subscribe(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });

        // The self-removing handler still finishes the round it is in, and the
        // handler after it still runs.
        assert_eq!(dispatcher.dispatch(&1), 2);
        assert_eq!(dispatcher.dispatch(&2), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(after.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_after_dispatcher_dropped() {
        let dispatcher = Dispatcher::<u32>::new();
        let sub = dispatcher.subscribe(|_| {});
        drop(dispatcher);
        assert!(!sub.unsubscribe());
    }

    #[test]
    fn unsubscribe_twice_via_remove() {
        let dispatcher = Dispatcher::<u32>::new();
        let sub = dispatcher.subscribe(|_| {});
        assert!(sub.remove());
        assert!(!sub.remove());
        assert_eq!(dispatcher.len(), 0);
    }
}
