//! Presence service that only writes payloads to the log

use std::collections::VecDeque;
use std::sync::Mutex;

use super::traits::{PresencePayload, PresenceService, ServiceError, ServiceEvent, ServiceUser};

/// Dry-run backend: connects instantly and logs every payload as JSON
#[derive(Default)]
pub struct LogPresence {
    queued: Mutex<VecDeque<ServiceEvent>>,
}

impl LogPresence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresenceService for LogPresence {
    fn name(&self) -> &'static str {
        "Log"
    }

    fn initialize(&self, application_id: &str) -> Result<(), ServiceError> {
        tracing::info!("Log presence standing in for application {}", application_id);
        self.queued.lock().unwrap().push_back(ServiceEvent::Ready {
            user: ServiceUser {
                id: "0".to_string(),
                username: "local".to_string(),
                discriminator: None,
            },
        });
        Ok(())
    }

    fn poll_events(&self) -> Vec<ServiceEvent> {
        self.queued.lock().unwrap().drain(..).collect()
    }

    fn update_presence(&self, payload: &PresencePayload) {
        match serde_json::to_string(payload) {
            Ok(json) => tracing::info!("Presence: {}", json),
            Err(e) => tracing::warn!("Failed to serialize presence: {}", e),
        }
    }

    fn clear_presence(&self) {
        tracing::info!("Presence cleared");
    }

    fn shutdown(&self) {
        self.clear_presence();
        self.queued.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_is_queued_once_per_initialize() {
        let service = LogPresence::new();
        assert!(service.poll_events().is_empty());

        service.initialize("1234").unwrap();
        let events = service.poll_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ServiceEvent::Ready { .. }));
        assert!(service.poll_events().is_empty());
    }
}
