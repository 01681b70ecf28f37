use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use parley_types::api::{Claims, UnreadCountResponse};

use crate::auth::AppState;
use crate::error::ChatError;
use crate::service::blocking;

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    /// Partner to show as a placeholder row if there is no history with them yet.
    /// May be an account id or a designer profile id.
    #[serde(rename = "stubPartnerId")]
    pub stub_partner_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UnreadQuery {
    #[serde(rename = "partnerId")]
    pub partner_id: Option<Uuid>,
}

/// GET /conversations: one row per partner, most recently active first.
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ChatError> {
    let chat = state.chat.clone();
    let conversations =
        blocking(move || chat.get_conversations(claims.sub, query.stub_partner_id)).await?;
    Ok(Json(conversations))
}

/// GET /unread/count: global, or scoped to one partner with `?partnerId=`.
pub async fn unread_count(
    State(state): State<AppState>,
    Query(query): Query<UnreadQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ChatError> {
    let chat = state.chat.clone();
    let count = blocking(move || chat.count_unread(claims.sub, query.partner_id)).await?;
    Ok(Json(UnreadCountResponse { count }))
}
