//! `/api/assistant/chat`

use axum::extract::Extension;
use axum::Json;
use serde::Deserialize;

use crate::domains::assistant::{Assistant, AssistantReply, ChatMessage};
use crate::server::app::AxumAppState;
use crate::server::error::ApiError;
use crate::server::middleware::AuthUser;
use crate::server::routes::ensure_user;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

pub async fn chat(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Json(request): Json<ChatRequest>,
) -> Result<Json<AssistantReply>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message cannot be empty".to_string()));
    }
    ensure_user(&auth, &state.db_pool).await?;

    let assistant = Assistant::new(state.registry.clone(), state.deps.clone());
    let reply = assistant
        .chat(auth.user_id, &request.history, &request.message)
        .await?;
    Ok(Json(reply))
}
