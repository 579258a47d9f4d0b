//! In-memory host state fed by the game through the control server

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::events::{self, EventData, LocalEventBus};
use super::{
    FetchError, InstanceDirectory, InstanceId, InstanceSnapshot, SessionDirectory, SessionId,
    SessionSnapshot, UserDirectory, UserSnapshot,
};

#[derive(Default)]
struct Inner {
    user: Option<UserSnapshot>,
    session: Option<(SessionId, SessionSnapshot)>,
    instances: HashMap<InstanceId, InstanceSnapshot>,
}

/// Stores what the game last reported and announces every change on the bus
pub struct HostState {
    inner: Mutex<Inner>,
    events: Arc<LocalEventBus>,
}

impl HostState {
    pub fn new(events: Arc<LocalEventBus>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            events,
        }
    }

    pub fn events(&self) -> &Arc<LocalEventBus> {
        &self.events
    }

    /// Replace the signed-in user; `None` means logged out
    pub fn set_user(&self, user: Option<UserSnapshot>) {
        tracing::debug!(
            "User changed: {}",
            user.as_ref().map_or("<none>", |u| u.display_name.as_str())
        );
        self.inner.lock().unwrap().user = user;
        self.events.emit(EventData::new(events::USER_FETCH));
    }

    /// Make `session` current under `id`; `None` leaves the session.
    ///
    /// Only the current session is kept, along with the instance it points at.
    pub fn set_session(&self, session: Option<(SessionId, SessionSnapshot)>) {
        {
            let mut inner = self.inner.lock().unwrap();
            match &session {
                Some((id, _)) => tracing::debug!("Current session is now {}", id),
                None => tracing::debug!("Left current session"),
            }

            let keep = session.as_ref().and_then(|(_, s)| s.instance.clone());
            inner
                .instances
                .retain(|id, _| keep.as_ref() == Some(id));
            inner.session = session;
        }
        self.events
            .emit(EventData::new(events::SESSION_CURRENT_CHANGED));
    }

    /// Record fresh occupancy for an instance
    pub fn put_instance(&self, instance: InstanceSnapshot) {
        tracing::debug!(
            "Instance {} has {}/{} players",
            instance.id,
            instance.player_count,
            instance.capacity
        );
        self.inner
            .lock()
            .unwrap()
            .instances
            .insert(instance.id.clone(), instance);
        self.events
            .emit(EventData::new(events::INSTANCE_FETCH));
    }

    pub fn current_session(&self) -> Option<(SessionId, SessionSnapshot)> {
        self.inner.lock().unwrap().session.clone()
    }
}

impl UserDirectory for HostState {
    fn current(&self) -> Option<UserSnapshot> {
        self.inner.lock().unwrap().user.clone()
    }
}

impl SessionDirectory for HostState {
    fn current(&self) -> Option<SessionId> {
        self.inner
            .lock()
            .unwrap()
            .session
            .as_ref()
            .map(|(id, _)| id.clone())
    }

    fn try_get(&self, id: &SessionId) -> Option<SessionSnapshot> {
        match &self.inner.lock().unwrap().session {
            Some((current, snapshot)) if current == id => Some(snapshot.clone()),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
impl InstanceDirectory for HostState {
    async fn fetch(&self, id: &InstanceId) -> Result<InstanceSnapshot, FetchError> {
        if !id.is_valid() {
            return Err(FetchError::InvalidId(id.clone()));
        }

        self.inner
            .lock()
            .unwrap()
            .instances
            .get(id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(id.clone()))
    }
}
