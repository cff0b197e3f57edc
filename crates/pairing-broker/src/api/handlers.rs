//! HTTP request handlers.

use super::types::{CodeQuery, CodeResponse, HealthResponse};
use super::AppState;
use crate::error::BrokerError;
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "online".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        uptime: state.started_at.elapsed().as_secs(),
        active_sessions: state.controller.active_sessions().await,
        sessions: state.controller.session_states().await,
    })
}

/// Issue a pairing code for a phone number.
///
/// Responds once, with the code; delivery of the credential happens later
/// and is never reflected here.
pub async fn request_code(
    State(state): State<AppState>,
    Query(query): Query<CodeQuery>,
) -> Result<Json<CodeResponse>, BrokerError> {
    let number = query
        .number
        .filter(|n| !n.trim().is_empty())
        .ok_or(BrokerError::MissingPhoneNumber)?;

    let code = state.controller.request_pairing(&number).await?;

    Ok(Json(CodeResponse {
        code: code.into_inner(),
    }))
}
