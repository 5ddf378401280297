use std::sync::Arc;

use axum::extract::ws::WebSocket;
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use lectern_ai::FallbackAssistant;
use lectern_core::{PresenceStore, Role, SessionId};
use lectern_store::Database;

use crate::api;
use crate::enrichment::EnrichmentDispatcher;
use crate::groups::{self, GroupRegistry};
use crate::hub::{self, SessionHub};
use crate::lifecycle::QuestionLifecycle;
use crate::moments::MomentService;
use crate::sessions::SessionService;

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9400,
            max_send_queue: 256,
        }
    }
}

/// Shared application state passed to axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub hub: Arc<SessionHub>,
    pub lifecycle: Arc<QuestionLifecycle>,
    pub moments: Arc<MomentService>,
    pub sessions: Arc<SessionService>,
}

/// Build the axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws/session/{session_id}/{role}", get(ws_handler))
        .route("/api/courses", get(api::list_courses))
        .route("/api/courses/{code}/today", get(api::today_session))
        .route(
            "/api/sessions/{session_id}/questions",
            get(api::list_questions).post(api::start_question),
        )
        .route("/api/sessions/{session_id}/feedback", post(api::submit_feedback))
        .route("/api/sessions/{session_id}/important", post(api::mark_important))
        .route("/api/sessions/{session_id}/hard-capture", post(api::hard_capture))
        .route("/api/sessions/{session_id}/end", post(api::end_session))
        .route("/api/sessions/{session_id}/summary", get(api::session_summary))
        .route("/api/questions/{question_id}/capture", post(api::register_capture))
        .route("/api/questions/{question_id}/text", post(api::submit_text))
        .route("/api/questions/{question_id}/answer", post(api::request_answer))
        .route("/api/questions/{question_id}/forward", post(api::forward_question))
        .route("/api/questions/{question_id}/like", post(api::like_question))
        .route("/api/moments/{moment_id}", get(api::get_moment))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle that owns the background
/// tasks; dropping it stops them.
pub async fn start(
    config: ServerConfig,
    db: Database,
    presence: Arc<dyn PresenceStore>,
    assistant: Arc<FallbackAssistant>,
) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(GroupRegistry::new(config.max_send_queue));
    let hub = Arc::new(SessionHub::new(Arc::clone(&registry), presence));

    let _cleanup = groups::start_cleanup_task(registry, std::time::Duration::from_secs(60));

    let (enrichment, _enrichment_worker) =
        EnrichmentDispatcher::start(db.clone(), Arc::clone(&assistant));

    let state = AppState {
        db: db.clone(),
        hub: Arc::clone(&hub),
        lifecycle: Arc::new(QuestionLifecycle::new(
            db.clone(),
            Arc::clone(&hub),
            Arc::clone(&assistant),
        )),
        moments: Arc::new(MomentService::new(db.clone(), Arc::clone(&hub), enrichment)),
        sessions: Arc::new(SessionService::new(db, hub)),
    };

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "lectern hub started");

    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server,
        _enrichment_worker,
        _cleanup,
    })
}

/// Handle returned by `start()`; keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
    _enrichment_worker: tokio::task::JoinHandle<()>,
    _cleanup: tokio::task::JoinHandle<()>,
}

/// WebSocket attach: `(session_id, role)` come from the path. An unknown
/// role is rejected before the upgrade.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((session_id, role)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Response {
    let Ok(role) = role.parse::<Role>() else {
        return (StatusCode::BAD_REQUEST, "role must be teacher or student").into_response();
    };
    let session_id = SessionId::from_raw(session_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, role))
        .into_response()
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: SessionId, role: Role) {
    let (conn_id, rx) = state.hub.attach(session_id, role).await;
    hub::handle_ws_connection(socket, Arc::clone(&state.hub), conn_id, rx).await;
}

/// Health probe: confirms the store answers.
async fn health_handler(State(state): State<AppState>) -> Response {
    let healthy = state
        .db
        .with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(lectern_store::StoreError::from)
        })
        .is_ok();

    if healthy {
        (StatusCode::OK, axum::Json(serde_json::json!({"status": "healthy"}))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(serde_json::json!({"status": "unhealthy"})),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::LocalPresenceStore;
    use lectern_ai::MockAssistant;
    use lectern_store::courses::CourseRepo;

    async fn start_test_server(db: Database, mock: MockAssistant) -> ServerHandle {
        let config = ServerConfig {
            port: 0, // random port
            ..Default::default()
        };
        let assistant = Arc::new(FallbackAssistant::with_defaults(Arc::new(mock)));
        start(config, db, Arc::new(LocalPresenceStore::new()), assistant)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let db = Database::in_memory().unwrap();
        let handle = start_test_server(db, MockAssistant::new()).await;
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn question_commands_round_trip_over_http() {
        let db = Database::in_memory().unwrap();
        CourseRepo::new(db.clone())
            .create("COSE213", "Data Structures", "Prof. Han", "")
            .unwrap();
        let handle = start_test_server(db, MockAssistant::new()).await;
        let base = format!("http://127.0.0.1:{}", handle.port);
        let client = reqwest::Client::new();

        // Join today's session
        let session: serde_json::Value = client
            .get(format!("{base}/api/courses/COSE213/today"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let session_id = session["session_id"].as_str().unwrap().to_string();

        // Start a question intent
        let resp = client
            .post(format!("{base}/api/sessions/{session_id}/questions"))
            .header("x-device-id", "device-a")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let created: serde_json::Value = resp.json().await.unwrap();
        let question_id = created["question_id"].as_i64().unwrap();

        // Submit text from the wrong device: forbidden
        let resp = client
            .post(format!("{base}/api/questions/{question_id}/text"))
            .header("x-device-id", "device-b")
            .json(&serde_json::json!({"original_text": "what is a stack?"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 403);

        // The owner succeeds
        let resp = client
            .post(format!("{base}/api/questions/{question_id}/text"))
            .header("x-device-id", "device-a")
            .json(&serde_json::json!({"original_text": "what is a stack?"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["cleaned_text"], "what is a stack?");

        // Forward, then it shows up in the forwarded-only list
        let resp = client
            .post(format!("{base}/api/questions/{question_id}/forward"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let listed: serde_json::Value = client
            .get(format!(
                "{base}/api/sessions/{session_id}/questions?forwarded_only=true"
            ))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);

        // Like twice from one device: count stays at 1
        for _ in 0..2 {
            let like: serde_json::Value = client
                .post(format!("{base}/api/questions/{question_id}/like"))
                .header("x-device-id", "device-b")
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            assert_eq!(like["like_count"], 1);
        }
    }

    #[tokio::test]
    async fn feedback_rate_limit_surfaces_as_429() {
        let db = Database::in_memory().unwrap();
        CourseRepo::new(db.clone())
            .create("CS101", "Intro", "Prof. Lee", "")
            .unwrap();
        let handle = start_test_server(db, MockAssistant::new()).await;
        let base = format!("http://127.0.0.1:{}", handle.port);
        let client = reqwest::Client::new();

        let session: serde_json::Value = client
            .get(format!("{base}/api/courses/CS101/today"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let session_id = session["session_id"].as_str().unwrap();

        let url = format!("{base}/api/sessions/{session_id}/feedback");
        let first = client
            .post(&url)
            .header("x-device-id", "device-a")
            .json(&serde_json::json!({"feedback_kind": "HARD"}))
            .send()
            .await
            .unwrap();
        assert_eq!(first.status(), 200);

        let second = client
            .post(&url)
            .header("x-device-id", "device-a")
            .json(&serde_json::json!({"feedback_kind": "OK"}))
            .send()
            .await
            .unwrap();
        assert_eq!(second.status(), 429);

        // Bad kind is a 400
        let bad = client
            .post(&url)
            .header("x-device-id", "device-c")
            .json(&serde_json::json!({"feedback_kind": "MEH"}))
            .send()
            .await
            .unwrap();
        assert_eq!(bad.status(), 400);
    }

    #[tokio::test]
    async fn build_router_creates_routes() {
        let db = Database::in_memory().unwrap();
        let registry = Arc::new(GroupRegistry::new(32));
        let hub = Arc::new(SessionHub::new(registry, Arc::new(LocalPresenceStore::new())));
        let assistant = Arc::new(FallbackAssistant::with_defaults(Arc::new(MockAssistant::new())));
        let (enrichment, _worker) = EnrichmentDispatcher::start(db.clone(), Arc::clone(&assistant));

        let state = AppState {
            db: db.clone(),
            hub: Arc::clone(&hub),
            lifecycle: Arc::new(QuestionLifecycle::new(db.clone(), Arc::clone(&hub), assistant)),
            moments: Arc::new(MomentService::new(db.clone(), Arc::clone(&hub), enrichment)),
            sessions: Arc::new(SessionService::new(db, hub)),
        };

        let _router = build_router(state);
    }
}
