//! In-process event bus the host uses to announce state changes

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Fired after the current user has been (re)fetched
pub const USER_FETCH: &str = "user_fetch";
/// Fired after an instance has been (re)fetched
pub const INSTANCE_FETCH: &str = "instance_fetch";
/// Fired when the current session changes
pub const SESSION_CURRENT_CHANGED: &str = "session_current_changed";

/// An emitted event
#[derive(Debug, Clone, Default)]
pub struct EventData {
    pub name: String,
}

impl EventData {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

pub type EventHandler = Arc<dyn Fn(&EventData) + Send + Sync>;

/// Opaque handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

/// Publish/subscribe surface of the host
pub trait EventBus: Send + Sync {
    fn subscribe(&self, event: &str, handler: EventHandler) -> SubscriptionHandle;

    /// Returns false when the handle was not (or no longer) registered
    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool;
}

struct Subscription {
    event: String,
    handler: EventHandler,
}

/// Event bus living in the current process
#[derive(Default)]
pub struct LocalEventBus {
    next_id: AtomicU64,
    subscriptions: Mutex<HashMap<SubscriptionHandle, Subscription>>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke every handler subscribed to `data.name`, returns how many ran
    pub fn emit(&self, data: EventData) -> usize {
        // Handlers run outside the lock so they may subscribe or unsubscribe
        let handlers: Vec<EventHandler> = {
            let subscriptions = self.subscriptions.lock().unwrap();
            subscriptions
                .values()
                .filter(|s| s.event == data.name)
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };

        tracing::trace!("Emitting {} to {} handler(s)", data.name, handlers.len());
        for handler in &handlers {
            handler(&data);
        }
        handlers.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }
}

impl EventBus for LocalEventBus {
    fn subscribe(&self, event: &str, handler: EventHandler) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.lock().unwrap().insert(
            handle,
            Subscription {
                event: event.to_string(),
                handler,
            },
        );
        handle
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.subscriptions.lock().unwrap().remove(&handle).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, EventHandler) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let handler: EventHandler = Arc::new(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (count, handler)
    }

    #[test]
    fn emit_reaches_only_matching_subscribers() {
        let bus = LocalEventBus::new();
        let (users, on_user) = counter();
        let (sessions, on_session) = counter();
        bus.subscribe(USER_FETCH, on_user);
        bus.subscribe(SESSION_CURRENT_CHANGED, on_session);

        assert_eq!(bus.emit(EventData::new(USER_FETCH)), 1);
        assert_eq!(bus.emit(EventData::new(USER_FETCH)), 1);
        assert_eq!(bus.emit(EventData::new(INSTANCE_FETCH)), 0);

        assert_eq!(users.load(Ordering::SeqCst), 2);
        assert_eq!(sessions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_is_reported_once() {
        let bus = LocalEventBus::new();
        let (count, handler) = counter();
        let handle = bus.subscribe(USER_FETCH, handler);

        assert!(bus.unsubscribe(handle));
        assert!(!bus.unsubscribe(handle));
        assert_eq!(bus.subscription_count(), 0);

        bus.emit(EventData::new(USER_FETCH));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handler_may_unsubscribe_itself() {
        let bus = Arc::new(LocalEventBus::new());
        let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

        let bus_inner = Arc::clone(&bus);
        let slot_inner = Arc::clone(&slot);
        let handle = bus.subscribe(
            USER_FETCH,
            Arc::new(move |_| {
                if let Some(handle) = slot_inner.lock().unwrap().take() {
                    bus_inner.unsubscribe(handle);
                }
            }),
        );
        *slot.lock().unwrap() = Some(handle);

        assert_eq!(bus.emit(EventData::new(USER_FETCH)), 1);
        assert_eq!(bus.emit(EventData::new(USER_FETCH)), 0);
    }
}
