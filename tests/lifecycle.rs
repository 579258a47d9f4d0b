use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use game_presence::control_server::ControlServer;
use game_presence::host::{HostContext, HostState, LocalEventBus};
use game_presence::module::{MainModule, PresenceModule};
use game_presence::presence::{
    ConnectionState, LogPresence, ManagerOptions, PresencePayload, PresenceService, ServiceError,
    ServiceEvent, ServiceUser,
};

/// Presence service double recording every payload it is asked to show
#[derive(Default)]
struct RecordingService {
    queued: Mutex<VecDeque<ServiceEvent>>,
    sent: Mutex<Vec<PresencePayload>>,
}

impl RecordingService {
    fn push(&self, event: ServiceEvent) {
        self.queued.lock().unwrap().push_back(event);
    }

    fn sent(&self) -> Vec<PresencePayload> {
        self.sent.lock().unwrap().clone()
    }
}

impl PresenceService for RecordingService {
    fn name(&self) -> &'static str {
        "Recording"
    }

    fn initialize(&self, _application_id: &str) -> Result<(), ServiceError> {
        Ok(())
    }

    fn poll_events(&self) -> Vec<ServiceEvent> {
        self.queued.lock().unwrap().drain(..).collect()
    }

    fn update_presence(&self, payload: &PresencePayload) {
        self.sent.lock().unwrap().push(payload.clone());
    }

    fn clear_presence(&self) {}

    fn shutdown(&self) {}
}

fn host() -> (Arc<LocalEventBus>, Arc<HostState>, HostContext) {
    let bus = Arc::new(LocalEventBus::new());
    let state = Arc::new(HostState::new(bus.clone()));
    let context = HostContext::new(bus.clone())
        .with_users(state.clone())
        .with_sessions(state.clone())
        .with_instances(state.clone());
    (bus, state, context)
}

async fn eventually<T>(mut check: impl FnMut() -> Option<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(value) = check() {
                return value;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time")
}

#[tokio::test]
async fn nothing_is_sent_until_the_service_is_ready() {
    let service = Arc::new(RecordingService::default());
    let (_, state, context) = host();
    let mut module = PresenceModule::new(service.clone(), ManagerOptions::new("1234"));
    module.on_initialize_main(context);

    state.set_user(None);
    module.on_update_main();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(service.sent().is_empty());

    service.push(ServiceEvent::Ready {
        user: ServiceUser {
            id: "1".into(),
            username: "alice".into(),
            discriminator: None,
        },
    });
    module.on_update_main();

    let payload = eventually(|| service.sent().into_iter().next()).await;
    assert_eq!(payload.state, "In Menu");
    assert_eq!(payload.large_image_text, "Not logged");
    assert_eq!((payload.party_size, payload.party_max), (0, 0));
    assert_eq!(payload.party_id, None);

    module.on_dispose_main();
}

#[tokio::test]
async fn game_reports_flow_through_the_control_server() {
    let (bus, state, context) = host();
    let mut module = PresenceModule::new(Arc::new(LogPresence::new()), ManagerOptions::new("1234"));
    module.on_initialize_main(context);
    let status = module.status().unwrap();

    let mut server = ControlServer::start(0, state, status.clone()).unwrap();
    let base = format!("http://127.0.0.1:{}", server.port);

    module.on_update_main();
    assert_eq!(status.state(), ConnectionState::Ready);

    let client = reqwest::Client::new();
    for (path, body) in [
        ("/instance", r#"{"id":"abc123","capacity":10,"players":4}"#),
        ("/user", r#"{"display_name":"Alice#0"}"#),
        ("/session", r#"{"id":"s1","title":"Arena Match","instance":"abc123"}"#),
    ] {
        let response = client
            .post(format!("{}{}", base, path))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "{} rejected", path);
    }

    let payload = eventually(|| {
        status
            .last_payload()
            .filter(|p| p.party_id.is_some() && p.large_image_text == "Alice#0")
    })
    .await;
    assert_eq!(payload.state, "Arena Match");
    assert_eq!(payload.party_size, 4);
    assert_eq!(payload.party_max, 10);
    assert_eq!(payload.party_id.as_deref(), Some("abc123"));

    let report: serde_json::Value = client
        .get(format!("{}/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["connection"], "ready");
    assert_eq!(report["session"]["id"], "s1");

    module.on_dispose_main();
    module.on_dispose_main();
    assert_eq!(status.state(), ConnectionState::Uninitialized);
    assert_eq!(bus.subscription_count(), 0);

    server.stop();
}
