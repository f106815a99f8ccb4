use super::connection::serve_connection;
use super::server::HubState;
use crate::error::PersistenceError;
use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

/// `{success, data|message}` envelope used by every REST route
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn data(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: None,
        })
    }
}

fn message_response(status: StatusCode, success: bool, message: &str) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success,
            data: None,
            message: Some(message.to_string()),
        }),
    )
        .into_response()
}

fn store_failure(err: &PersistenceError, fallback: &str) -> Response {
    match err {
        PersistenceError::NotFound { .. } => {
            message_response(StatusCode::NOT_FOUND, false, "Message not found")
        }
        other => {
            error!("Message store failure: {}", other);
            message_response(StatusCode::INTERNAL_SERVER_ERROR, false, fallback)
        }
    }
}

/// Upgrade to the event websocket
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<HubState>) -> Response {
    let limit = state.max_message_bytes;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| serve_connection(socket, state))
}

/// All records, newest first
pub async fn list_messages_handler(State(state): State<HubState>) -> Response {
    match state.hub.store().list(None).await {
        Ok(records) => ApiResponse::data(records).into_response(),
        Err(e) => store_failure(&e, "Failed to fetch messages"),
    }
}

pub async fn get_message_handler(
    State(state): State<HubState>,
    Path(id): Path<String>,
) -> Response {
    match state.hub.store().get(&id).await {
        Ok(record) => ApiResponse::data(record).into_response(),
        Err(e) => store_failure(&e, "Failed to fetch message"),
    }
}

pub async fn delete_message_handler(
    State(state): State<HubState>,
    Path(id): Path<String>,
) -> Response {
    match state.hub.store().delete(&id).await {
        Ok(record) => {
            info!("Message {} deleted via API", record.id);
            message_response(StatusCode::OK, true, "Message deleted")
        }
        Err(e) => store_failure(&e, "Failed to delete message"),
    }
}

/// Health check endpoint with live counters
pub async fn health_handler(State(state): State<HubState>) -> impl IntoResponse {
    Json(json!({
        "status": "Server is running",
        "stats": state.hub.stats(),
    }))
}
