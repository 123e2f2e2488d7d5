use crate::models::chat::{ChatRequest, ChatResponse};
use crate::state::AppState;
use crate::utils::error::ApiError;
use axum::{extract::State, Json};
use std::time::Instant;
use tracing::info;

pub async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let start_time = Instant::now();

    info!(
        "Chat request: session={}, message_len={}",
        request.session_id,
        request.message.len()
    );

    let outcome = state
        .answer_router
        .handle(&request.session_id, &request.message)
        .await?;

    info!(
        "Chat completed in {}ms (origin: {:?})",
        start_time.elapsed().as_millis(),
        outcome.origin
    );

    Ok(Json(ChatResponse {
        response: outcome.response,
        sources: outcome.sources,
    }))
}
