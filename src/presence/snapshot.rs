//! Gathers user, session and instance state from the host

use std::time::Duration;

use crate::host::{HostContext, InstanceSnapshot, SessionSnapshot, UserSnapshot};

use super::traits::StateSnapshot;

fn current_user(host: &HostContext) -> Option<UserSnapshot> {
    host.users.as_ref()?.current()
}

fn current_session(host: &HostContext) -> Option<SessionSnapshot> {
    let sessions = host.sessions.as_ref()?;
    let id = sessions.current()?;
    sessions.try_get(&id)
}

async fn fetch_instance(
    host: &HostContext,
    session: Option<&SessionSnapshot>,
    fetch_timeout: Duration,
) -> Option<InstanceSnapshot> {
    let id = session?.instance.as_ref().filter(|id| id.is_valid())?;
    let instances = host.instances.as_ref()?;

    match tokio::time::timeout(fetch_timeout, instances.fetch(id)).await {
        Ok(Ok(instance)) => Some(instance),
        Ok(Err(e)) => {
            tracing::debug!("Failed to fetch instance {}: {}", id, e);
            None
        }
        Err(_) => {
            tracing::debug!("Fetching instance {} timed out after {:?}", id, fetch_timeout);
            None
        }
    }
}

/// Read the current state; the instance lookup is the only suspension point
pub async fn gather(host: &HostContext, fetch_timeout: Duration) -> StateSnapshot {
    let user = current_user(host);
    let session = current_session(host);
    let instance = fetch_instance(host, session.as_ref(), fetch_timeout).await;

    StateSnapshot {
        user,
        session,
        instance,
    }
}
