//! Owns the connection to a presence service and pushes presence updates

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::host::{HostContext, SubscriptionHandle};

use super::format::{format_presence, unix_now, PresenceText};
use super::snapshot;
use super::traits::{ConnectionState, PresencePayload, PresenceService, ServiceEvent};
use super::trigger::UpdateTrigger;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// What happens when the service becomes ready again after a disconnect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Accept the service's own reconnection and resume updates
    #[default]
    Resume,
    /// Stay disconnected until the manager is shut down and started again
    Restart,
}

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub application_id: String,
    pub text: PresenceText,
    /// Upper bound for a single instance lookup
    pub fetch_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ManagerOptions {
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            text: PresenceText::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Result of one presence recomputation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Sent(PresencePayload),
    NotReady,
}

/// Read-only view of the manager for status reporting
#[derive(Clone)]
pub struct PresenceStatus {
    state: watch::Receiver<ConnectionState>,
    last_payload: Arc<Mutex<Option<PresencePayload>>>,
}

impl PresenceStatus {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn last_payload(&self) -> Option<PresencePayload> {
        self.last_payload.lock().unwrap().clone()
    }
}

/// State shared between the manager and its update worker
struct Shared {
    service: Arc<dyn PresenceService>,
    host: HostContext,
    text: PresenceText,
    fetch_timeout: Duration,
    state: watch::Sender<ConnectionState>,
    last_payload: Arc<Mutex<Option<PresencePayload>>>,
    /// Held for the whole of one recomputation
    refreshing: tokio::sync::Mutex<()>,
}

impl Shared {
    fn is_ready(&self) -> bool {
        self.state.borrow().is_ready()
    }

    async fn refresh(&self) -> UpdateOutcome {
        let _refreshing = self.refreshing.lock().await;
        if !self.is_ready() {
            tracing::trace!("Skipping presence update, {} not ready", self.service.name());
            return UpdateOutcome::NotReady;
        }

        let snapshot = snapshot::gather(&self.host, self.fetch_timeout).await;

        // Shutdown clears the last payload under this lock
        let mut last_payload = self.last_payload.lock().unwrap();
        if !self.is_ready() {
            tracing::debug!(
                "Dropping presence update, {} disconnected meanwhile",
                self.service.name()
            );
            return UpdateOutcome::NotReady;
        }

        tracing::debug!(
            "Updating presence for user '{}' in session '{}'",
            snapshot
                .user
                .as_ref()
                .map_or("Not logged", |u| u.display_name.as_str()),
            snapshot
                .session
                .as_ref()
                .and_then(|s| s.title.as_deref())
                .unwrap_or("No session")
        );

        let payload = format_presence(&snapshot, &self.text, unix_now());
        self.service.update_presence(&payload);
        *last_payload = Some(payload.clone());
        UpdateOutcome::Sent(payload)
    }
}

/// Runs recomputations one after another until the trigger goes away
async fn run_updates(shared: Arc<Shared>, mut requests: watch::Receiver<u64>) {
    while requests.changed().await.is_ok() {
        requests.borrow_and_update();
        shared.refresh().await;
    }
    tracing::debug!("Presence update worker stopped");
}

/// Manages the lifecycle of one presence service connection
pub struct PresenceManager {
    shared: Arc<Shared>,
    application_id: String,
    reconnect: ReconnectPolicy,
    trigger: Option<UpdateTrigger>,
    subscriptions: Vec<SubscriptionHandle>,
    worker: Option<JoinHandle<()>>,
}

impl PresenceManager {
    pub fn new(
        service: Arc<dyn PresenceService>,
        host: HostContext,
        options: ManagerOptions,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Uninitialized);
        Self {
            shared: Arc::new(Shared {
                service,
                host,
                text: options.text,
                fetch_timeout: options.fetch_timeout,
                state,
                last_payload: Arc::new(Mutex::new(None)),
                refreshing: tokio::sync::Mutex::new(()),
            }),
            application_id: options.application_id,
            reconnect: options.reconnect,
            trigger: None,
            subscriptions: Vec::new(),
            worker: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn status(&self) -> PresenceStatus {
        PresenceStatus {
            state: self.shared.state.subscribe(),
            last_payload: Arc::clone(&self.shared.last_payload),
        }
    }

    pub fn last_payload(&self) -> Option<PresencePayload> {
        self.shared.last_payload.lock().unwrap().clone()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.shared.state.send_replace(state);
        if previous != state {
            tracing::debug!("Presence connection {:?} -> {:?}", previous, state);
        }
    }

    /// Register with the presence service and start listening for host events.
    ///
    /// Registration failures are logged and leave the manager waiting for a
    /// handshake that may never come; they are not reported to the caller.
    pub fn start(&mut self) {
        if self.state() != ConnectionState::Uninitialized {
            tracing::warn!("Presence manager already started");
            return;
        }

        let service = self.shared.service.name();
        match self.shared.service.initialize(&self.application_id) {
            Ok(()) => tracing::info!("{} presence initialized", service),
            Err(e) => tracing::warn!("Failed to initialize {} presence: {}", service, e),
        }
        self.set_state(ConnectionState::Initialized);

        let (trigger, requests) = UpdateTrigger::new();
        self.subscriptions = trigger.subscribe_host_events(self.shared.host.events.as_ref());

        self.worker = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Some(runtime.spawn(run_updates(Arc::clone(&self.shared), requests))),
            Err(_) => {
                tracing::error!("No async runtime available, presence updates disabled");
                None
            }
        };
        self.trigger = Some(trigger);
    }

    /// Deliver queued service callbacks; call once per host tick
    pub fn pump_callbacks(&self) {
        if self.state() == ConnectionState::Uninitialized {
            return;
        }

        for event in self.shared.service.poll_events() {
            self.handle_event(event);
        }
    }

    /// Single dispatch point for service callbacks
    pub fn handle_event(&self, event: ServiceEvent) {
        let service = self.shared.service.name();
        let state = self.state();

        if state == ConnectionState::Uninitialized {
            tracing::debug!("Ignoring {} event while not started: {:?}", service, event);
            return;
        }

        match event {
            ServiceEvent::Ready { user } => {
                if state == ConnectionState::Disconnected
                    && self.reconnect == ReconnectPolicy::Restart
                {
                    tracing::info!(
                        "{} reconnected as {}, waiting for restart before resuming",
                        service,
                        user
                    );
                    return;
                }

                tracing::info!("Connected to {} as {} ({})", service, user, user.id);
                self.set_state(ConnectionState::Ready);
                self.request_update();
            }
            ServiceEvent::Disconnected { code, message } => {
                tracing::warn!("Disconnected from {} {}: {}", service, code, message);
                self.set_state(ConnectionState::Disconnected);
            }
            ServiceEvent::Error { code, message } => {
                tracing::error!("{} error {}: {}", service, code, message);
            }
            ServiceEvent::JoinRequest { secret } => {
                tracing::debug!("Join request from {}", secret);
            }
            ServiceEvent::SpectateRequest { secret } => {
                tracing::debug!("Spectate request from {}", secret);
            }
            ServiceEvent::FriendRequest { user } => {
                tracing::debug!("Friend request from {} ({})", user, user.id);
            }
        }
    }

    /// Schedule a recomputation on the update worker
    pub fn request_update(&self) {
        match &self.trigger {
            Some(trigger) => trigger.request(),
            None => tracing::trace!("Presence update requested before start"),
        }
    }

    /// Recompute and send now, after any recomputation already in flight
    pub async fn refresh_now(&self) -> UpdateOutcome {
        self.shared.refresh().await
    }

    /// Disconnect from the service and drop all host subscriptions
    pub fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        self.trigger = None;

        for handle in self.subscriptions.drain(..) {
            if !self.shared.host.events.unsubscribe(handle) {
                tracing::debug!("Subscription {:?} was already gone", handle);
            }
        }

        let previous = {
            let mut last_payload = self.shared.last_payload.lock().unwrap();
            *last_payload = None;
            self.shared.state.send_replace(ConnectionState::Uninitialized)
        };

        if previous != ConnectionState::Uninitialized {
            tracing::debug!("Presence connection {:?} -> Uninitialized", previous);
            self.shared.service.shutdown();
            tracing::info!("{} presence shut down", self.shared.service.name());
        }
    }
}

impl Drop for PresenceManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
