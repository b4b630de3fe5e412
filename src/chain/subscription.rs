use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Set of callbacks interested in one kind of connector event.
pub(crate) struct Listeners<T> {
    next_id: AtomicU64,
    handlers: Mutex<BTreeMap<u64, Handler<T>>>,
}

impl<T: 'static> Listeners<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            handlers: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn subscribe(self: &Arc<Self>, handler: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, Arc::new(handler));

        let listeners = Arc::downgrade(self);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(listeners) = listeners.upgrade() {
                    listeners.lock().remove(&id);
                }
            })),
        }
    }

    /// Call every handler in subscription order. The lock is released first
    /// so a handler may unsubscribe itself.
    pub fn notify(&self, value: &T) {
        let handlers: Vec<Handler<T>> = self.lock().values().cloned().collect();
        for handler in handlers {
            handler(value);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Handler<T>>> {
        // handlers run outside the lock
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle returned by the connector's `on_*` methods.
///
/// Dropping the handle leaves the handler registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn notify_reaches_all_handlers() {
        let listeners = Arc::new(Listeners::<u64>::new());
        let seen = Arc::new(AtomicUsize::new(0));

        let a = {
            let seen = seen.clone();
            listeners.subscribe(move |v| {
                seen.fetch_add(*v as usize, Ordering::SeqCst);
            })
        };
        let b = {
            let seen = seen.clone();
            listeners.subscribe(move |v| {
                seen.fetch_add(*v as usize, Ordering::SeqCst);
            })
        };

        listeners.notify(&5);
        assert_eq!(seen.load(Ordering::SeqCst), 10);

        a.unsubscribe();
        listeners.notify(&5);
        assert_eq!(seen.load(Ordering::SeqCst), 15);
        assert_eq!(listeners.len(), 1);

        b.unsubscribe();
        assert_eq!(listeners.len(), 0);
    }

    #[test]
    fn unsubscribe_after_listeners_dropped_is_noop() {
        let listeners = Arc::new(Listeners::<()>::new());
        let sub = listeners.subscribe(|_| {});
        drop(listeners);
        sub.unsubscribe();
    }
}
