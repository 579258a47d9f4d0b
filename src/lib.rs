pub mod control_server;
pub mod discord;
pub mod host;
pub mod logging;
pub mod module;
pub mod presence;
pub mod settings;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use control_server::{ControlServer, ControlServerError};
use host::{HostContext, HostState, InstanceDirectory, LocalEventBus};
use module::{MainModule, PresenceModule};
use presence::{HttpInstanceDirectory, LogPresence, PresenceService};
use settings::{default_settings_path, load_settings, save_settings, Backend, Settings};

/// Report game state to Discord Rich Presence
#[derive(Debug, Parser)]
#[command(name = "game-presence", version, about)]
pub struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Presence backend, overrides the settings file
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Control server port, overrides the settings file
    #[arg(long)]
    pub port: Option<u16>,

    /// Discord application id, overrides the settings file
    #[arg(long)]
    pub application_id: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long)]
    pub log_filter: Option<String>,

    /// Log file directory (defaults to the user data directory)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Write the effective settings back to the settings file
    #[arg(long)]
    pub save: bool,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(backend) = self.backend {
            settings.backend = backend;
        }
        if let Some(port) = self.port {
            settings.control_port = port;
        }
        if let Some(application_id) = &self.application_id {
            settings.application_id = application_id.clone();
        }
    }
}

fn presence_service(backend: Backend) -> Arc<dyn PresenceService> {
    match backend {
        #[cfg(feature = "discord")]
        Backend::Discord => Arc::new(discord::DiscordPresence::new()),
        #[cfg(not(feature = "discord"))]
        Backend::Discord => {
            tracing::warn!("Built without Discord support, falling back to log presence");
            Arc::new(LogPresence::new())
        }
        Backend::Log => Arc::new(LogPresence::new()),
    }
}

fn instance_directory(settings: &Settings, host_state: &Arc<HostState>) -> Arc<dyn InstanceDirectory> {
    if let Some(url) = &settings.instance_status_url {
        match HttpInstanceDirectory::new(url) {
            Ok(directory) => {
                tracing::info!("Fetching instance status from {}", url);
                return Arc::new(directory);
            }
            Err(e) => tracing::error!("Invalid instance status URL '{}': {}", url, e),
        }
    }
    host_state.clone()
}

async fn serve(settings: Settings) -> Result<(), ControlServerError> {
    let events = Arc::new(LocalEventBus::new());
    let host_state = Arc::new(HostState::new(Arc::clone(&events)));

    let context = HostContext::new(events)
        .with_users(host_state.clone())
        .with_sessions(host_state.clone())
        .with_instances(instance_directory(&settings, &host_state));

    let mut module = PresenceModule::new(
        presence_service(settings.backend),
        settings.manager_options(),
    );
    module.on_initialize_main(context);

    let Some(status) = module.status() else {
        module.on_dispose_main();
        return Ok(());
    };

    let mut control_server = match ControlServer::start(settings.control_port, host_state, status) {
        Ok(server) => server,
        Err(e) => {
            module.on_dispose_main();
            return Err(e);
        }
    };
    tracing::info!(
        "Game can report state to http://127.0.0.1:{}",
        control_server.port
    );

    let mut ticks = tokio::time::interval(settings.tick_interval());
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticks.tick() => module.on_update_main(),
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for shutdown signal: {}", e);
                }
                break;
            }
        }
    }

    tracing::info!("Shutting down");
    module.on_dispose_main();
    control_server.stop();
    Ok(())
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let _guard = logging::init_logging(cli.log_dir.clone(), cli.log_filter.as_deref());

    let settings_path = match cli.config.clone().map_or_else(default_settings_path, Ok) {
        Ok(path) => path,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut settings = match load_settings(&settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    cli.apply(&mut settings);

    if cli.save {
        match save_settings(&settings_path, &settings) {
            Ok(()) => tracing::info!("Saved settings to {}", settings_path.display()),
            Err(e) => {
                tracing::error!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    if settings.backend == Backend::Discord && settings.application_id.trim().is_empty() {
        tracing::error!("An application_id is required for the Discord backend");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(settings)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from([
            "game-presence",
            "--backend",
            "log",
            "--port",
            "4711",
            "--application-id",
            "1353926096487190618",
        ]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);

        assert_eq!(settings.backend, Backend::Log);
        assert_eq!(settings.control_port, 4711);
        assert_eq!(settings.application_id, "1353926096487190618");
        assert!(!cli.save);
    }

    #[test]
    fn save_and_log_dir_flags_parse() {
        let cli = Cli::parse_from(["game-presence", "--save", "--log-dir", "/tmp/presence-logs"]);
        assert!(cli.save);
        assert_eq!(cli.log_dir, Some(PathBuf::from("/tmp/presence-logs")));
    }

    #[test]
    fn cli_without_flags_keeps_settings() {
        let cli = Cli::parse_from(["game-presence"]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings, Settings::default());
    }
}
