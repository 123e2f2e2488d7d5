use crate::models::chat::{SessionActionResponse, SessionRequest};
use crate::state::AppState;
use crate::utils::error::ApiError;
use axum::{extract::State, Json};
use tracing::info;

/// Clear chat history for a session and mark it inactive.
pub async fn clear_session_handler(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> Result<Json<SessionActionResponse>, ApiError> {
    let session_id = request
        .session_id
        .ok_or_else(|| ApiError::BadRequest("session_id is required".to_string()))?;

    state.session_store.clear(&session_id).await?;
    info!("Session {} cleared", session_id);

    Ok(Json(SessionActionResponse {
        status: "cleared".to_string(),
        session_id,
    }))
}

/// Start a fresh session: history purged, topic forgotten, marked active.
/// A new identifier is generated when the caller does not supply one.
pub async fn new_session_handler(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> Result<Json<SessionActionResponse>, ApiError> {
    let session_id = request
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    state.session_store.ensure(&session_id).await?;
    state.session_store.clear(&session_id).await?;
    state.session_store.activate(&session_id).await?;
    info!("Session {} reset", session_id);

    Ok(Json(SessionActionResponse {
        status: "new_session".to_string(),
        session_id,
    }))
}
