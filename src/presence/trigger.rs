//! Decides when a presence recomputation is needed

use std::sync::Arc;

use tokio::sync::watch;

use crate::host::events::{INSTANCE_FETCH, SESSION_CURRENT_CHANGED, USER_FETCH};
use crate::host::{EventBus, EventData, SubscriptionHandle};

/// Host events that invalidate the displayed presence
pub const TRIGGER_EVENTS: [&str; 3] = [USER_FETCH, INSTANCE_FETCH, SESSION_CURRENT_CHANGED];

/// Single-slot request queue.
///
/// Each request bumps a generation counter; the worker only observes that the
/// counter moved, so any number of requests made while a recomputation is in
/// flight collapse into one follow-up recomputation.
#[derive(Clone)]
pub struct UpdateTrigger {
    requests: Arc<watch::Sender<u64>>,
}

impl UpdateTrigger {
    pub fn new() -> (Self, watch::Receiver<u64>) {
        let (tx, rx) = watch::channel(0);
        (
            Self {
                requests: Arc::new(tx),
            },
            rx,
        )
    }

    pub fn request(&self) {
        self.requests.send_modify(|generation| {
            *generation = generation.wrapping_add(1);
        });
    }

    /// Subscribe to every event in [`TRIGGER_EVENTS`]
    pub fn subscribe_host_events(&self, bus: &dyn EventBus) -> Vec<SubscriptionHandle> {
        TRIGGER_EVENTS
            .iter()
            .map(|event| {
                let trigger = self.clone();
                bus.subscribe(
                    event,
                    Arc::new(move |data: &EventData| {
                        tracing::trace!("Presence update requested by {}", data.name);
                        trigger.request();
                    }),
                )
            })
            .collect()
    }
}
