//! HTTP surface for the assembly engine
//!
//! Sessions are keyed by conversation thread. Each session is guarded by
//! its own lock so exactly one message is processed to completion at a
//! time per thread, while different threads proceed independently.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::error::EngineError;
use crate::types::{
    Citation, DocSessionState, DocTypeSummary, InboundMessage, SessionPhase, TurnOutcome,
};
use crate::SharedSessionEngine;

type SessionSlot = Arc<Mutex<DocSessionState>>;

#[derive(Clone)]
pub struct AppState {
    pub engine: SharedSessionEngine,
    sessions: Arc<Mutex<HashMap<String, SessionSlot>>>,
}

impl AppState {
    pub fn new(engine: SharedSessionEngine) -> Self {
        Self {
            engine,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn slot(&self, thread_id: &str) -> Option<SessionSlot> {
        self.sessions.lock().await.get(thread_id).cloned()
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub thread_id: String,
    pub doc_type: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Read-only projection of session state for callers.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub thread_id: String,
    pub active: bool,
    pub doc_type: String,
    pub phase: SessionPhase,
    pub title: String,
    pub confidence: f64,
    pub ready_to_generate: bool,
    pub dossier: BTreeMap<String, String>,
    pub pending_question_count: usize,
    pub processed_messages: usize,
    pub assumed_fields: Vec<String>,
}

impl SessionView {
    fn of(state: &DocSessionState) -> Self {
        let pending = match state.definition.question_source {
            crate::types::QuestionSourceKind::Catalog => state.pending_questions.len(),
            crate::types::QuestionSourceKind::Blueprint => state
                .clarifying
                .values()
                .filter(|q| q.status == crate::types::QuestionStatus::Pending)
                .count(),
        };
        Self {
            thread_id: state.thread_id.clone(),
            active: state.active,
            doc_type: state.doc_type.clone(),
            phase: state.phase,
            title: state.title.clone(),
            confidence: state.confidence,
            ready_to_generate: state.ready_to_generate,
            dossier: state.dossier.clone(),
            pending_question_count: pending,
            processed_messages: state.processed_message_ids.len(),
            assumed_fields: state.assumed_fields.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub outcome: TurnOutcome,
    pub session: SessionView,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn engine_error_response(e: EngineError) -> ApiError {
    let status = match &e {
        EngineError::UnknownDocType { .. } => StatusCode::NOT_FOUND,
        EngineError::Render(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            details: None,
        }),
    )
}

fn not_found(thread_id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("no session for thread '{}'", thread_id),
            details: None,
        }),
    )
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "codraft".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List every catalog entry: a read-only projection, no session state.
async fn list_doc_types_handler(State(app): State<AppState>) -> Json<Vec<DocTypeSummary>> {
    Json(app.engine.catalog().list())
}

async fn start_session_handler(
    State(app): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Result<Json<SessionView>, ApiError> {
    info!(
        "Starting session: thread={}, doc_type={}",
        req.thread_id, req.doc_type
    );
    let state = app
        .engine
        .start_session(&req.thread_id, &req.doc_type, req.title)
        .map_err(engine_error_response)?;

    let view = SessionView::of(&state);
    app.sessions
        .lock()
        .await
        .insert(req.thread_id.clone(), Arc::new(Mutex::new(state)));
    Ok(Json(view))
}

async fn get_session_handler(
    State(app): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let slot = app.slot(&thread_id).await.ok_or_else(|| not_found(&thread_id))?;
    let state = slot.lock().await;
    Ok(Json(SessionView::of(&state)))
}

async fn reset_session_handler(
    State(app): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let slot = app
        .sessions
        .lock()
        .await
        .remove(&thread_id)
        .ok_or_else(|| not_found(&thread_id))?;
    let mut state = slot.lock().await;
    app.engine.reset(&mut state);
    Ok(Json(SessionView::of(&state)))
}

/// Merge externally gathered citations into a session's evidence base.
async fn add_citations_handler(
    State(app): State<AppState>,
    Path(thread_id): Path<String>,
    Json(citations): Json<Vec<Citation>>,
) -> Result<Json<SessionView>, ApiError> {
    let slot = app.slot(&thread_id).await.ok_or_else(|| not_found(&thread_id))?;
    let mut state = slot.lock().await;
    app.engine.add_citations(&mut state, citations);
    Ok(Json(SessionView::of(&state)))
}

/// Process one inbound message for a thread. The per-session lock keeps
/// turns strictly sequential for that thread.
async fn message_handler(
    State(app): State<AppState>,
    Path(thread_id): Path<String>,
    Json(message): Json<InboundMessage>,
) -> Result<Json<TurnResponse>, ApiError> {
    let slot = app.slot(&thread_id).await.ok_or_else(|| not_found(&thread_id))?;
    let mut guard = slot.lock().await;

    let state = guard.clone();
    match app.engine.process_turn(state, &message).await {
        Ok((next_state, outcome)) => {
            *guard = next_state;
            Ok(Json(TurnResponse {
                outcome,
                session: SessionView::of(&guard),
            }))
        }
        Err(e) => {
            error!("Turn failed for thread {}: {}", thread_id, e);
            Err(engine_error_response(e))
        }
    }
}

/// Create and configure the HTTP server
pub fn create_router(app: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/doc_types", get(list_doc_types_handler))
        .route("/session", post(start_session_handler))
        .route(
            "/session/:thread_id",
            get(get_session_handler).delete(reset_session_handler),
        )
        .route("/session/:thread_id/citations", post(add_citations_handler))
        .route("/session/:thread_id/message", post(message_handler))
        .with_state(app)
}

/// Run the HTTP server
pub async fn run_server(app: AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    info!("Starting codraft server on {}", addr);

    let router = create_router(app);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
