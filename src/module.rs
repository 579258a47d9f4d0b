//! Lifecycle hooks the host calls on the presence client

use std::sync::Arc;

use crate::host::HostContext;
use crate::presence::{ManagerOptions, PresenceManager, PresenceService, PresenceStatus};

/// A module driven by the host's main loop
pub trait MainModule {
    /// Called once when the host has finished loading
    fn on_initialize_main(&mut self, host: HostContext);

    /// Called on every host tick; must not block
    fn on_update_main(&mut self);

    /// Called once before the host unloads the module
    fn on_dispose_main(&mut self);
}

/// Reports host state to a presence service
pub struct PresenceModule {
    service: Arc<dyn PresenceService>,
    options: ManagerOptions,
    manager: Option<PresenceManager>,
}

impl PresenceModule {
    pub fn new(service: Arc<dyn PresenceService>, options: ManagerOptions) -> Self {
        Self {
            service,
            options,
            manager: None,
        }
    }

    pub fn status(&self) -> Option<PresenceStatus> {
        self.manager.as_ref().map(PresenceManager::status)
    }
}

impl MainModule for PresenceModule {
    fn on_initialize_main(&mut self, host: HostContext) {
        if let Some(mut previous) = self.manager.take() {
            tracing::warn!("Presence module initialized twice, restarting");
            previous.shutdown();
        }

        tracing::debug!("Initializing presence module with {:?}", host);
        let mut manager =
            PresenceManager::new(Arc::clone(&self.service), host, self.options.clone());
        manager.start();
        self.manager = Some(manager);
    }

    fn on_update_main(&mut self) {
        if let Some(manager) = &self.manager {
            manager.pump_callbacks();
        }
    }

    fn on_dispose_main(&mut self) {
        // Dropping the manager also releases the host context
        if let Some(mut manager) = self.manager.take() {
            manager.shutdown();
        }
    }
}
