use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    audit::AuditSink,
    config::BrokerConfig,
    control::ControlHandle,
    registry::SessionRegistry,
    session::Session,
    web::protocol::{ClientMessage, CreateSessionRequest, ServerMessage, SessionInfo},
};
use termgate_rules::RiskAnalyzer;
use termgate_types::{BrokerError, ControlMessage, SessionId};

/// Application state shared across routes
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub control: ControlHandle,
    pub analyzer: Arc<RiskAnalyzer>,
    pub audit: AuditSink,
    pub config: Arc<BrokerConfig>,
}

/// Create router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session API
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route(
            "/api/sessions/:id",
            get(get_session_details).delete(close_session),
        )
        // Admin control channel
        .route("/api/control", post(control_directive))
        // Terminal WebSocket
        .route("/ws/:session_id", get(websocket_handler))
        .with_state(state)
}

/// GET /api/sessions - List all active sessions
async fn list_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut sessions: Vec<SessionInfo> = Vec::new();
    for session in state.registry.list_active().await {
        sessions.push(session.info().await);
    }
    Json(serde_json::json!({ "sessions": sessions }))
}

/// POST /api/sessions - Create a new session
async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = Session::create(
        request.owner,
        request.cols,
        request.rows,
        &state.config,
        Arc::clone(&state.analyzer),
        state.audit.clone(),
        Arc::clone(&state.registry),
    )
    .await?;

    Ok(Json(serde_json::json!({
        "session_id": session.id,
        "created_at": session.created_at.to_rfc3339(),
        "websocket_url": format!("/ws/{}", session.id),
    })))
}

/// GET /api/sessions/:id - Get session details
async fn get_session_details(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionInfo>, AppError> {
    let session = state
        .registry
        .lookup(&id)
        .await
        .ok_or(BrokerError::SessionNotFound(id))?;

    Ok(Json(session.info().await))
}

/// DELETE /api/sessions/:id - Close a session
async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = state
        .registry
        .lookup(&id)
        .await
        .ok_or(BrokerError::SessionNotFound(id))?;
    session.close();

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Session closed",
    })))
}

/// POST /api/control - Submit an administrator directive
async fn control_directive(
    State(state): State<AppState>,
    Json(message): Json<ControlMessage>,
) -> Result<Json<serde_json::Value>, AppError> {
    let report = state.control.submit(message).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "report": report,
    })))
}

#[derive(Debug, Deserialize)]
struct AttachParams {
    /// Client identity; the connection owns the session iff this
    /// matches the session owner.
    #[serde(default)]
    identity: Option<String>,
}

/// GET /ws/:session_id - WebSocket endpoint
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Query(params): Query<AttachParams>,
) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state, session_id, params))
}

/// Handle WebSocket connection
async fn handle_websocket(
    socket: WebSocket,
    state: AppState,
    session_id: SessionId,
    params: AttachParams,
) {
    let client_id = Uuid::new_v4();

    let session = match state.registry.lookup(&session_id).await {
        Some(s) => s,
        None => {
            warn!(%session_id, "websocket attach to unknown session");
            return;
        }
    };

    let identity = params.identity.unwrap_or_else(|| "anonymous".to_string());

    // Channel for sending messages to this client
    let (ws_sender, mut ws_receiver) = mpsc::unbounded_channel();
    session.attach(client_id, &identity, ws_sender).await;

    let info = session.info().await;
    session
        .send_to_client(
            client_id,
            ServerMessage::Attached {
                session_id,
                owner: info.owner,
                created_at: info.created_at,
                cols: info.cols,
                rows: info.rows,
                block_state: info.block_state,
            },
        )
        .await;

    // Split socket
    let (mut ws_sink, mut ws_stream) = socket.split();

    // Pump messages from the fanout channel to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sink.send(WsMessage::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Handle incoming WebSocket messages
    while let Some(Ok(msg)) = ws_stream.next().await {
        if let WsMessage::Text(text) = msg {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(client_id, client_msg, &session).await;
                }
                Err(e) => {
                    debug!(%session_id, error = %e, "unparseable client message");
                }
            }
        }
    }

    // Client disconnected
    session.client_disconnected(client_id).await;
    send_task.abort();
}

/// Handle a message from a client
async fn handle_client_message(client_id: Uuid, message: ClientMessage, session: &Arc<Session>) {
    match message {
        ClientMessage::Input { session_id, data } => {
            if session_id != session.id {
                session
                    .send_to_client(
                        client_id,
                        ServerMessage::Error {
                            message: "input addressed to a different session".to_string(),
                            recoverable: true,
                        },
                    )
                    .await;
                return;
            }
            if let Err(e) = session.handle_input(client_id, data.as_bytes()).await {
                warn!(session_id = %session.id, error = %e, "input delivery failed");
                session
                    .send_to_client(
                        client_id,
                        ServerMessage::Error {
                            message: e.to_string(),
                            recoverable: false,
                        },
                    )
                    .await;
            }
        }
        ClientMessage::Resize {
            session_id,
            cols,
            rows,
        } => {
            if session_id != session.id {
                return;
            }
            if let Err(e) = session.resize(cols, rows).await {
                debug!(session_id = %session.id, error = %e, "resize rejected");
            }
        }
    }
}

/// Error handling
#[derive(Debug)]
pub enum AppError {
    Broker(BrokerError),
}

impl From<BrokerError> for AppError {
    fn from(err: BrokerError) -> Self {
        AppError::Broker(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let AppError::Broker(err) = self;
        let status = match &err {
            BrokerError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            BrokerError::InvalidDirective(_) => StatusCode::BAD_REQUEST,
            BrokerError::ResourceExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "error": err.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
