//! Local HTTP endpoint through which the running game reports its state

use std::sync::Arc;
use std::thread;

use serde::Deserialize;
use tiny_http::{Method, Response, Server};
use url::Url;

use crate::host::{HostState, InstanceId, SessionId, SessionSnapshot, UserSnapshot};
use crate::presence::{InstanceStatus, PresenceStatus};

#[derive(Debug, thiserror::Error)]
pub enum ControlServerError {
    #[error("failed to start control server: {0}")]
    Bind(String),
    #[error("failed to get control server address")]
    NoAddress,
}

/// CORS headers to allow cross-origin requests from the game's embedded browser
fn cors_headers() -> Vec<tiny_http::Header> {
    [
        (&b"Access-Control-Allow-Origin"[..], &b"*"[..]),
        (&b"Access-Control-Allow-Methods"[..], &b"GET, POST, OPTIONS"[..]),
        (&b"Access-Control-Allow-Headers"[..], &b"Content-Type"[..]),
    ]
    .into_iter()
    .filter_map(|(name, value)| tiny_http::Header::from_bytes(name, value).ok())
    .collect()
}

/// Helper to create a JSON response with CORS headers
fn json_response(status: u16, body: serde_json::Value) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut response = Response::from_string(body.to_string()).with_status_code(status);

    if let Ok(content_type) =
        tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
    {
        response.add_header(content_type);
    }
    for header in cors_headers() {
        response.add_header(header);
    }

    response
}

/// Helper to create an empty response for OPTIONS preflight requests
fn preflight_response() -> Response<std::io::Empty> {
    let mut response = Response::empty(204);
    for header in cors_headers() {
        response.add_header(header);
    }
    response
}

#[derive(Debug, Deserialize)]
struct SessionReport {
    id: SessionId,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    instance: Option<InstanceId>,
}

fn bad_request(e: impl std::fmt::Display) -> (u16, serde_json::Value) {
    (400, serde_json::json!({"error": e.to_string()}))
}

/// Empty bodies count as `null`
fn parse_body<T: serde::de::DeserializeOwned>(body: &str) -> serde_json::Result<T> {
    let body = body.trim();
    serde_json::from_str(if body.is_empty() { "null" } else { body })
}

/// Route one request and return the status code and JSON body to send back
pub fn route(
    method: &Method,
    path: &str,
    body: &str,
    host: &HostState,
    presence: &PresenceStatus,
) -> (u16, serde_json::Value) {
    match (method, path) {
        (Method::Get, "/status") => {
            let session = host.current_session();
            (
                200,
                serde_json::json!({
                    "connection": presence.state(),
                    "presence": presence.last_payload(),
                    "session": session.as_ref().map(|(id, s)| serde_json::json!({
                        "id": id,
                        "title": s.title,
                        "instance": s.instance,
                    })),
                }),
            )
        }
        (Method::Post, "/user") => match parse_body::<Option<UserSnapshot>>(body) {
            Ok(user) => {
                let user = user.map(|u| UserSnapshot::new(u.display_name, u.thumbnail_url));
                host.set_user(user);
                (200, serde_json::json!({"status": "ok"}))
            }
            Err(e) => bad_request(e),
        },
        (Method::Post, "/session") => match parse_body::<Option<SessionReport>>(body) {
            Ok(report) => {
                host.set_session(report.map(|r| {
                    (
                        r.id,
                        SessionSnapshot {
                            title: r.title,
                            instance: r.instance,
                        },
                    )
                }));
                (200, serde_json::json!({"status": "ok"}))
            }
            Err(e) => bad_request(e),
        },
        (Method::Post, "/instance") => match parse_body::<InstanceStatus>(body) {
            Ok(status) => {
                host.put_instance(status.into());
                (200, serde_json::json!({"status": "ok"}))
            }
            Err(e) => bad_request(e),
        },
        (_, "/status" | "/user" | "/session" | "/instance") => (
            405,
            serde_json::json!({"error": "Method not allowed"}),
        ),
        _ => (404, serde_json::json!({"error": "Not found"})),
    }
}

pub struct ControlServer {
    pub port: u16,
    server: Arc<Server>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ControlServer {
    pub fn start(
        port: u16,
        host: Arc<HostState>,
        presence: PresenceStatus,
    ) -> Result<Self, ControlServerError> {
        let server = Server::http(("127.0.0.1", port))
            .map_err(|e| ControlServerError::Bind(e.to_string()))?;

        let port = server
            .server_addr()
            .to_ip()
            .ok_or(ControlServerError::NoAddress)?
            .port();

        tracing::info!("Control server started on port {}", port);

        let server = Arc::new(server);
        let server_clone = Arc::clone(&server);
        let worker = thread::spawn(move || {
            Self::run_server(&server_clone, &host, &presence);
        });

        Ok(Self {
            port,
            server,
            worker: Some(worker),
        })
    }

    fn run_server(server: &Server, host: &HostState, presence: &PresenceStatus) {
        for mut request in server.incoming_requests() {
            // Handle CORS preflight requests
            if request.method() == &Method::Options {
                request.respond(preflight_response()).ok();
                continue;
            }

            let full_url = format!("http://127.0.0.1{}", request.url());
            let url = match Url::parse(&full_url) {
                Ok(url) => url,
                Err(e) => {
                    tracing::error!("Failed to parse control server URL: {}", e);
                    let response = json_response(400, serde_json::json!({"error": e.to_string()}));
                    request.respond(response).ok();
                    continue;
                }
            };

            let mut body = String::new();
            if let Err(e) = request.as_reader().read_to_string(&mut body) {
                tracing::warn!("Failed to read control request body: {}", e);
                let response = json_response(400, serde_json::json!({"error": e.to_string()}));
                request.respond(response).ok();
                continue;
            }

            tracing::debug!("Control server received {:?} {}", request.method(), url.path());

            let (status, response) = route(request.method(), url.path(), &body, host, presence);
            if status >= 400 {
                tracing::debug!("Control request {} rejected: {}", url.path(), response);
            }
            request.respond(json_response(status, response)).ok();
        }
        tracing::debug!("Control server stopped");
    }

    pub fn stop(&mut self) {
        self.server.unblock();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("Control server thread panicked");
            }
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{
        HostContext, InstanceDirectory, LocalEventBus, SessionDirectory, UserDirectory,
    };
    use crate::presence::{ConnectionState, LogPresence, ManagerOptions, PresenceManager};

    fn fixture() -> (Arc<HostState>, PresenceManager) {
        let bus = Arc::new(LocalEventBus::new());
        let host = Arc::new(HostState::new(bus.clone()));
        let manager = PresenceManager::new(
            Arc::new(LogPresence::new()),
            HostContext::new(bus),
            ManagerOptions::new("1234"),
        );
        (host, manager)
    }

    #[test]
    fn user_reports_update_host_state() {
        let (host, manager) = fixture();
        let status = manager.status();

        let (code, _) = route(
            &Method::Post,
            "/user",
            r#"{"display_name":"Alice#0","thumbnail_url":""}"#,
            &host,
            &status,
        );
        assert_eq!(code, 200);
        let user = UserDirectory::current(&*host).unwrap();
        assert_eq!(user.display_name, "Alice#0");
        assert_eq!(user.thumbnail_url, None);

        let (code, _) = route(&Method::Post, "/user", "", &host, &status);
        assert_eq!(code, 200);
        assert!(UserDirectory::current(&*host).is_none());
    }

    #[tokio::test]
    async fn session_and_instance_reports_update_host_state() {
        let (host, manager) = fixture();
        let status = manager.status();

        let (code, _) = route(
            &Method::Post,
            "/session",
            r#"{"id":"s1","title":"Arena Match","instance":"abc123"}"#,
            &host,
            &status,
        );
        assert_eq!(code, 200);
        let id = SessionDirectory::current(&*host).unwrap();
        assert_eq!(host.try_get(&id).unwrap().title.as_deref(), Some("Arena Match"));

        let (code, _) = route(
            &Method::Post,
            "/instance",
            r#"{"id":"abc123","capacity":10,"players":4}"#,
            &host,
            &status,
        );
        assert_eq!(code, 200);
        let instance = host.fetch(&InstanceId::new("abc123")).await.unwrap();
        assert_eq!(instance.player_count, 4);

        let (code, body) = route(&Method::Get, "/status", "", &host, &status);
        assert_eq!(code, 200);
        assert_eq!(body["session"]["title"], "Arena Match");
        assert_eq!(body["connection"], serde_json::json!(ConnectionState::Uninitialized));
        assert!(body["presence"].is_null());

        route(&Method::Post, "/session", "null", &host, &status);
        assert!(SessionDirectory::current(&*host).is_none());
    }

    #[test]
    fn malformed_and_unknown_requests_are_rejected() {
        let (host, manager) = fixture();
        let status = manager.status();

        assert_eq!(route(&Method::Post, "/instance", "{}", &host, &status).0, 400);
        assert_eq!(route(&Method::Post, "/user", "[1,2]", &host, &status).0, 400);
        assert_eq!(route(&Method::Get, "/user", "", &host, &status).0, 405);
        assert_eq!(route(&Method::Get, "/restart", "", &host, &status).0, 404);
    }

    #[test]
    fn server_binds_an_ephemeral_port() {
        let (host, manager) = fixture();
        let mut server = ControlServer::start(0, host, manager.status()).unwrap();
        assert_ne!(server.port, 0);
        server.stop();
        server.stop();
    }
}
