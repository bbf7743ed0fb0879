//! API request handlers

use crate::error::ApiError;
use crate::state::AppState;

use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{
        IntoResponse,
        sse::{self, KeepAlive, Sse},
    },
};
use chrono::Utc;
use futures::stream::{self, Stream};
use racetrack_core::{Event, RegistrationId, TrackingSession, TrackingStats};
use racetrack_tracker::SessionSnapshot;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Events returned by `/api/v1/events` when no limit is given
const DEFAULT_EVENT_LIMIT: usize = 50;

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub api: String,
    pub session_state: String,
    pub capturing: bool,
    pub remote_url: String,
    pub online: bool,
    pub pending_points: usize,
    pub dropped_points: u64,
    pub events_published: u64,
    pub uptime_seconds: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub registration_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session: TrackingSession,
    pub stats: TrackingStats,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub delivered: usize,
    pub remaining: usize,
}

#[derive(Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

// ============================================================================
// HEALTH & STATUS HANDLERS
// ============================================================================

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// System status overview
pub async fn system_status(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.tracker.stats();

    Json(StatusResponse {
        api: "running".into(),
        session_state: state.tracker.state().to_string(),
        capturing: state.tracker.is_capturing(),
        remote_url: state.config.remote_url.clone(),
        online: stats.online,
        pending_points: stats.pending_points,
        dropped_points: stats.dropped_points,
        events_published: state.tracker.events().get_event_count(),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// Prometheus metrics endpoint
pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let body = state
        .metrics
        .export()
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

// ============================================================================
// SESSION HANDLERS
// ============================================================================

/// Current session snapshot
pub async fn get_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.tracker.snapshot())
}

/// Start tracking a registration
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let registration_id = req.registration_id.trim();
    if registration_id.is_empty() {
        return Err(ApiError::bad_request("registrationId must not be empty"));
    }

    let session = state
        .tracker
        .start(&RegistrationId::new(registration_id))
        .await?;
    info!("Session started via API for {}", session.registration_id);

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            session,
            stats: state.tracker.stats(),
        }),
    ))
}

/// Stop the running session
pub async fn stop_session(State(state): State<AppState>) -> Result<Json<SessionResponse>, ApiError> {
    let stats = state.tracker.stats();
    let session = state.tracker.stop().await?;
    info!("Session stopped via API for {}", session.registration_id);

    Ok(Json(SessionResponse { session, stats }))
}

/// Drain the offline queue now
pub async fn sync_now(State(state): State<AppState>) -> Result<Json<SyncResponse>, ApiError> {
    let report = state.tracker.sync_now().await?;

    Ok(Json(SyncResponse {
        delivered: report.delivered,
        remaining: report.remaining,
    }))
}

/// Recent engine events, oldest first
pub async fn recent_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<Event>> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    Json(state.tracker.events().get_recent(limit))
}

/// Live engine events as server-sent events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<sse::Event, Infallible>>> {
    let rx = state.tracker.events().subscribe();

    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => match sse::Event::default().json_data(&event) {
                    Ok(frame) => return Some((Ok(frame), rx)),
                    Err(e) => warn!("Event {} not encoded: {}", event.id, e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
