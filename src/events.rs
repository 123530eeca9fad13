use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    LeadsChanged,
    ClientsChanged,
    ClientDeleted,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LeadsChanged => "leads-changed",
            Self::ClientsChanged => "clients-changed",
            Self::ClientDeleted => "client-deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    LeadsChanged,
    ClientsChanged,
    ClientDeleted { client_id: i64 },
}

impl Event {
    pub fn channel(&self) -> Channel {
        match self {
            Self::LeadsChanged => Channel::LeadsChanged,
            Self::ClientsChanged => Channel::ClientsChanged,
            Self::ClientDeleted { .. } => Channel::ClientDeleted,
        }
    }
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Registration {
    id: u64,
    channel: Channel,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    registrations: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
}

/// Session-scoped synchronous pub/sub channel. Handlers are delivered in
/// subscription order and must be idempotent-safe: rapid user actions can
/// publish the same channel several times in a row.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, channel: Channel, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let mut registrations = self
            .registry
            .registrations
            .lock()
            .expect("event bus registrations lock");
        registrations.push(Registration {
            id,
            channel,
            handler: Arc::new(handler),
        });
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn publish(&self, event: Event) {
        // Snapshot the matching handlers before delivering, so a handler can
        // subscribe, unsubscribe, or publish again without deadlocking.
        let handlers: Vec<Handler> = {
            let registrations = self
                .registry
                .registrations
                .lock()
                .expect("event bus registrations lock");
            registrations
                .iter()
                .filter(|registration| registration.channel == event.channel())
                .map(|registration| registration.handler.clone())
                .collect()
        };

        tracing::debug!(
            channel = event.channel().as_str(),
            subscribers = handlers.len(),
            "publishing event"
        );
        for handler in &handlers {
            handler(&event);
        }
    }
}

/// Disposer returned by [`EventBus::subscribe`]. Dropping it without calling
/// [`Subscription::unsubscribe`] leaves the handler installed for the life of
/// the bus, matching the session-scoped listener model.
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Ok(mut registrations) = registry.registrations.lock() {
                registrations.retain(|registration| registration.id != self.id);
            }
        }
    }
}
