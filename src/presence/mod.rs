mod format;
mod log_service;
mod manager;
mod snapshot;
mod status;
mod traits;
mod trigger;

pub use format::{format_presence, unix_now, PresenceText};
pub use log_service::LogPresence;
pub use manager::{ManagerOptions, PresenceManager, PresenceStatus, ReconnectPolicy, UpdateOutcome};
pub use snapshot::gather;
pub use status::{HttpInstanceDirectory, InstanceStatus};
pub use traits::{
    ConnectionState, PresencePayload, PresenceService, ServiceError, ServiceEvent, ServiceUser,
    StateSnapshot,
};
pub use trigger::{UpdateTrigger, TRIGGER_EVENTS};
