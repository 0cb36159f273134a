//! Read-only REST endpoints for interview status.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::interview::{Interviewer, SessionPhase};
use crate::platform::{ChannelRef, ParticipantId};

/// Shared state for interview routes.
#[derive(Clone)]
pub struct StatusRouteState {
    pub interviewer: Arc<Interviewer>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub tenant: String,
    pub graph_version: Option<u32>,
    pub active_sessions: usize,
    pub participants: Vec<ParticipantId>,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub participant: ParticipantId,
    pub channel: ChannelRef,
    pub phase: SessionPhase,
    pub current_question_id: String,
    pub graph_version: u32,
    pub answered: usize,
    pub started_at: DateTime<Utc>,
}

/// GET /api/interviews/status
async fn get_status(State(state): State<StatusRouteState>) -> impl IntoResponse {
    let interviewer = &state.interviewer;
    let participants = interviewer.store().participants().await;
    Json(StatusResponse {
        tenant: interviewer.tenant().tenant_id.clone(),
        graph_version: interviewer.graph().await.map(|g| g.version),
        active_sessions: participants.len(),
        participants,
    })
}

/// GET /api/interviews/{participant}
///
/// Returns a summary of the participant's session, or 404 if there is none.
async fn get_session(
    State(state): State<StatusRouteState>,
    Path(participant): Path<String>,
) -> impl IntoResponse {
    let participant = ParticipantId::new(participant);
    match state.interviewer.store().get(&participant).await {
        Some(session) => Json(SessionSummary {
            session_id: session.session_id,
            participant: session.participant,
            channel: session.channel,
            phase: session.phase,
            current_question_id: session.current_question_id,
            graph_version: session.graph.version,
            answered: session.answers.len(),
            started_at: session.started_at,
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("No interview for {participant}")})),
        )
            .into_response(),
    }
}

/// Build the interview status routes.
pub fn status_routes(state: StatusRouteState) -> Router {
    Router::new()
        .route("/api/interviews/status", get(get_status))
        .route("/api/interviews/{participant}", get(get_session))
        .with_state(state)
}
