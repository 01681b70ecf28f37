use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::{Claims, SendMessageRequest};

use crate::auth::AppState;
use crate::error::ChatError;
use crate::service::blocking;

/// GET /conversations/{partner_id}/messages: the thread, oldest first.
/// Opening a thread marks the partner's messages as read before they are returned.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(partner_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ChatError> {
    let chat = state.chat.clone();
    let messages = blocking(move || chat.open_conversation(claims.sub, partner_id)).await?;
    Ok(Json(messages))
}

/// POST /conversations/{partner_id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    Path(partner_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ChatError> {
    let chat = state.chat.clone();
    let message =
        blocking(move || chat.send_message(claims.sub, partner_id, &req.content)).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /messages/{message_id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ChatError> {
    let chat = state.chat.clone();
    blocking(move || chat.mark_message_read(claims.sub, message_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /messages/{message_id}: admin only.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ChatError> {
    let chat = state.chat.clone();
    blocking(move || chat.delete_message(claims.sub, message_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
