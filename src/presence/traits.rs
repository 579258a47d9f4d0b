use std::fmt;

use serde::{Deserialize, Serialize};

use crate::host::{InstanceSnapshot, SessionSnapshot, UserSnapshot};

/// Connection to the external presence service as tracked by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not started, or shut down
    Uninitialized,
    /// Registered with the service, waiting for the handshake
    Initialized,
    /// Handshake completed, payloads may be sent
    Ready,
    /// The service dropped the connection
    Disconnected,
}

impl ConnectionState {
    pub fn is_ready(self) -> bool {
        self == ConnectionState::Ready
    }
}

/// A user reported by the presence service itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUser {
    pub id: String,
    pub username: String,
    pub discriminator: Option<String>,
}

impl fmt::Display for ServiceUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.discriminator.as_deref() {
            None | Some("") | Some("0") => write!(f, "{}", self.username),
            Some(discriminator) => write!(f, "{}#{}", self.username, discriminator),
        }
    }
}

/// Callback notifications queued by the presence service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    Ready { user: ServiceUser },
    Disconnected { code: i32, message: String },
    Error { code: i32, message: String },
    JoinRequest { secret: String },
    SpectateRequest { secret: String },
    FriendRequest { user: ServiceUser },
}

/// Everything one payload is computed from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSnapshot {
    pub user: Option<UserSnapshot>,
    pub session: Option<SessionSnapshot>,
    pub instance: Option<InstanceSnapshot>,
}

/// The status blob shown by the presence service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePayload {
    pub details: String,
    pub state: String,
    pub large_image_key: String,
    pub large_image_text: String,
    pub small_image_key: String,
    /// Seconds since the Unix epoch
    pub start_timestamp: i64,
    pub party_size: u32,
    pub party_max: u32,
    pub party_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid application id '{0}'")]
    InvalidApplicationId(String),
    #[error("presence service unavailable: {0}")]
    Unavailable(String),
}

/// Trait for presence services (Discord, logging, test doubles)
pub trait PresenceService: Send + Sync {
    /// Returns the name of this presence service (for logging)
    fn name(&self) -> &'static str;

    /// Register with the service; the handshake completes later via a
    /// [`ServiceEvent::Ready`] returned from [`poll_events`](Self::poll_events)
    fn initialize(&self, application_id: &str) -> Result<(), ServiceError>;

    /// Drain already-queued callback notifications without blocking
    fn poll_events(&self) -> Vec<ServiceEvent>;

    /// Replace the displayed presence
    fn update_presence(&self, payload: &PresencePayload);

    /// Clear all presence data
    fn clear_presence(&self);

    /// Tear down the connection
    fn shutdown(&self);
}
