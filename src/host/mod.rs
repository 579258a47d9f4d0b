//! Capabilities the host game exposes to the presence client

pub mod events;
pub mod state;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use events::{EventBus, EventData, EventHandler, LocalEventBus, SubscriptionHandle};
pub use state::HostState;

/// The signed-in user as seen by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub display_name: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

impl UserSnapshot {
    pub fn new(display_name: impl Into<String>, thumbnail_url: Option<String>) -> Self {
        Self {
            display_name: display_name.into(),
            thumbnail_url: thumbnail_url.filter(|url| !url.trim().is_empty()),
        }
    }

    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank identifiers never resolve to an instance
    pub fn is_valid(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A session the user is taking part in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub instance: Option<InstanceId>,
}

/// Occupancy of a running instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub id: InstanceId,
    pub capacity: u32,
    pub player_count: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("instance {0} not found")]
    NotFound(InstanceId),
    #[error("invalid instance id '{0}'")]
    InvalidId(InstanceId),
    #[error("instance request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("instance lookup failed: {0}")]
    Other(String),
}

pub trait UserDirectory: Send + Sync {
    fn current(&self) -> Option<UserSnapshot>;
}

pub trait SessionDirectory: Send + Sync {
    fn current(&self) -> Option<SessionId>;

    fn try_get(&self, id: &SessionId) -> Option<SessionSnapshot>;
}

/// Instance lookups may hit the network, so they are asynchronous
#[async_trait::async_trait]
pub trait InstanceDirectory: Send + Sync {
    async fn fetch(&self, id: &InstanceId) -> Result<InstanceSnapshot, FetchError>;
}

/// Handle to the host passed explicitly into the presence client.
///
/// Any directory may be missing when the corresponding host module is not
/// installed; lookups against a missing directory resolve to "absent".
#[derive(Clone)]
pub struct HostContext {
    pub users: Option<Arc<dyn UserDirectory>>,
    pub sessions: Option<Arc<dyn SessionDirectory>>,
    pub instances: Option<Arc<dyn InstanceDirectory>>,
    pub events: Arc<dyn EventBus>,
}

impl HostContext {
    pub fn new(events: Arc<dyn EventBus>) -> Self {
        Self {
            users: None,
            sessions: None,
            instances: None,
            events,
        }
    }

    pub fn with_users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionDirectory>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_instances(mut self, instances: Arc<dyn InstanceDirectory>) -> Self {
        self.instances = Some(instances);
        self
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("users", &self.users.is_some())
            .field("sessions", &self.sessions.is_some())
            .field("instances", &self.instances.is_some())
            .finish_non_exhaustive()
    }
}
