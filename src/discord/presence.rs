//! Discord Rich Presence integration using discord-sdk

use std::num::NonZeroU32;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use discord_sdk::{
    activity::{events::ActivityEvent, ActivityBuilder, Assets, PartyPrivacy},
    registration::{Application, LaunchCommand},
    user::User,
    wheel::{UserState, Wheel},
    Discord, Subscriptions,
};
use tokio::sync::{broadcast, mpsc};

use crate::presence::{PresencePayload, PresenceService, ServiceError, ServiceEvent, ServiceUser};

/// Time after which a missing handshake is worth a warning
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

enum Command {
    Update(Box<PresencePayload>),
    Clear,
}

/// Discord presence service.
///
/// The connection lives on a background task; callbacks from Discord are
/// queued as [`ServiceEvent`]s until the manager polls them.
pub struct DiscordPresence {
    events_tx: mpsc::UnboundedSender<ServiceEvent>,
    events_rx: Mutex<mpsc::UnboundedReceiver<ServiceEvent>>,
    commands: Mutex<Option<mpsc::UnboundedSender<Command>>>,
}

impl DiscordPresence {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            events_tx,
            events_rx: Mutex::new(events_rx),
            commands: Mutex::new(None),
        }
    }

    fn send(&self, command: Command) {
        match self.commands.lock().unwrap().as_ref() {
            Some(commands) => {
                let _ = commands.send(command);
            }
            None => tracing::trace!("Discord not initialized, dropping presence command"),
        }
    }

    /// Background task that maintains the Discord connection and processes presence updates
    async fn run_discord_task(
        app_id: i64,
        mut commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::UnboundedSender<ServiceEvent>,
    ) {
        let errors = events.clone();
        let (wheel, handler) = Wheel::new(Box::new(move |err| {
            let _ = errors.send(ServiceEvent::Error {
                code: 0,
                message: format!("{:?}", err),
            });
        }));

        let mut user_spoke = wheel.user();
        let mut activity_spoke = wheel.activity();

        let discord = match Discord::new(app_id, Subscriptions::ACTIVITY, Box::new(handler)) {
            Ok(d) => d,
            Err(e) => {
                let _ = events.send(ServiceEvent::Disconnected {
                    code: 0,
                    message: format!("Discord not available: {:?}", e),
                });
                return;
            }
        };

        tracing::info!("Discord connecting...");

        let handshake = tokio::time::sleep(HANDSHAKE_TIMEOUT);
        tokio::pin!(handshake);
        let mut awaiting_handshake = true;

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let result = match command {
                        Some(Command::Update(payload)) => {
                            discord.update_activity(build_activity(&payload)).await
                        }
                        Some(Command::Clear) => discord.clear_activity().await,
                        None => break,
                    };

                    if let Err(e) = result {
                        tracing::debug!("Failed to update Discord activity: {:?}", e);
                    }
                }
                changed = user_spoke.0.changed() => {
                    if changed.is_err() {
                        tracing::warn!("Discord connection closed");
                        break;
                    }

                    let event = match &*user_spoke.0.borrow() {
                        UserState::Connected(user) => ServiceEvent::Ready {
                            user: service_user(user),
                        },
                        UserState::Disconnected(err) => ServiceEvent::Disconnected {
                            code: 0,
                            message: format!("{:?}", err),
                        },
                    };
                    awaiting_handshake = false;
                    let _ = events.send(event);
                }
                activity = activity_spoke.0.recv() => {
                    let event = match activity {
                        Ok(ActivityEvent::Join(join)) => ServiceEvent::JoinRequest {
                            secret: join.secret,
                        },
                        Ok(ActivityEvent::Spectate(spectate)) => ServiceEvent::SpectateRequest {
                            secret: spectate.secret,
                        },
                        Ok(ActivityEvent::JoinRequest(request)) => ServiceEvent::FriendRequest {
                            user: service_user(&request.user),
                        },
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!("Skipped {} Discord activity events", skipped);
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };
                    let _ = events.send(event);
                }
                _ = &mut handshake, if awaiting_handshake => {
                    awaiting_handshake = false;
                    tracing::warn!("Discord handshake timed out");
                }
            }
        }

        discord.disconnect().await;
        tracing::info!("Discord Rich Presence disconnected");
    }
}

impl Default for DiscordPresence {
    fn default() -> Self {
        Self::new()
    }
}

fn service_user(user: &User) -> ServiceUser {
    ServiceUser {
        id: user.id.to_string(),
        username: user.username.clone(),
        discriminator: user.discriminator.map(|d| d.to_string()),
    }
}

/// Register this executable so Discord can launch it from invites
fn register(app_id: i64) {
    let path = match std::env::current_exe() {
        Ok(path) => path,
        Err(e) => {
            tracing::debug!("Skipping Discord app registration: {}", e);
            return;
        }
    };

    if let Err(e) = discord_sdk::registration::register_app(Application {
        id: app_id,
        name: None,
        command: LaunchCommand::Bin {
            path,
            args: Vec::new(),
        },
    }) {
        tracing::warn!("Failed to register Discord app: {:?}", e);
    }
}

fn build_activity(payload: &PresencePayload) -> ActivityBuilder {
    let mut assets = Assets::default().large(
        payload.large_image_key.as_str(),
        Some(payload.large_image_text.as_str()),
    );
    if !payload.small_image_key.is_empty() {
        assets = assets.small(payload.small_image_key.as_str(), None::<&str>);
    }

    let started = UNIX_EPOCH + Duration::from_secs(payload.start_timestamp.max(0) as u64);
    let mut activity = ActivityBuilder::new()
        .details(payload.details.as_str())
        .state(payload.state.as_str())
        .start_timestamp(started)
        .assets(assets);

    if let Some(party_id) = &payload.party_id {
        activity = activity.party(
            party_id.as_str(),
            NonZeroU32::new(payload.party_size),
            NonZeroU32::new(payload.party_max),
            PartyPrivacy::Private,
        );
    }

    activity
}

impl PresenceService for DiscordPresence {
    fn name(&self) -> &'static str {
        "Discord"
    }

    fn initialize(&self, application_id: &str) -> Result<(), ServiceError> {
        let app_id: i64 = application_id
            .trim()
            .parse()
            .map_err(|_| ServiceError::InvalidApplicationId(application_id.to_string()))?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;

        let mut commands = self.commands.lock().unwrap();
        if commands.is_some() {
            tracing::debug!("Discord already initialized");
            return Ok(());
        }

        register(app_id);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        runtime.spawn(Self::run_discord_task(
            app_id,
            command_rx,
            self.events_tx.clone(),
        ));
        *commands = Some(command_tx);
        Ok(())
    }

    fn poll_events(&self) -> Vec<ServiceEvent> {
        let mut events_rx = self.events_rx.lock().unwrap();
        let mut events = Vec::new();
        while let Ok(event) = events_rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn update_presence(&self, payload: &PresencePayload) {
        self.send(Command::Update(Box::new(payload.clone())));
    }

    fn clear_presence(&self) {
        self.send(Command::Clear);
    }

    fn shutdown(&self) {
        self.clear_presence();
        // Dropping the sender ends the background task, which then disconnects
        self.commands.lock().unwrap().take();
        self.poll_events();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_numeric_application_id() {
        let discord = DiscordPresence::new();
        assert!(matches!(
            discord.initialize("not-an-id"),
            Err(ServiceError::InvalidApplicationId(_))
        ));
    }

    #[test]
    fn commands_before_initialize_are_dropped() {
        let discord = DiscordPresence::new();
        discord.clear_presence();
        discord.shutdown();
        assert!(discord.poll_events().is_empty());
    }
}
