//! API route definitions

use crate::handlers;
use crate::state::AppState;

use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = if state.config.cors_permissive {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .max_age(Duration::from_secs(3600))
    } else {
        CorsLayer::new()
            .allow_origin(HeaderValue::from_static("http://localhost:8080"))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        // Health & Status
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::system_status))

        // Metrics (Prometheus format)
        .route("/metrics", get(handlers::metrics))

        // Session API
        .route("/api/v1/session", get(handlers::get_session))
        .route("/api/v1/session/start", post(handlers::start_session))
        .route("/api/v1/session/stop", post(handlers::stop_session))

        // Offline queue
        .route("/api/v1/sync", post(handlers::sync_now))

        // Event history
        .route("/api/v1/events", get(handlers::recent_events))
        .route("/api/v1/events/stream", get(handlers::event_stream))

        // Apply middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .with_state(state)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConfig, SimulationSettings};
    use crate::simulation::SimulatedRunner;

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use racetrack_core::{
        Checkpoint, CrossingEvent, Event, Race, Registration, RegistrationId, TelemetryPoint,
    };
    use racetrack_store::StoreClient;
    use racetrack_telemetry::MetricsCollector;
    use racetrack_tracker::{
        MetadataSource, RemoteError, SessionManager, TelemetrySink, TrackerConfig, TrackerDeps,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    /// Race service stand-in that knows one registration and accepts everything
    struct StaticRemote;

    #[async_trait]
    impl MetadataSource for StaticRemote {
        async fn registration(&self, id: &RegistrationId) -> Result<Registration, RemoteError> {
            if id.as_str() != "reg-1" {
                return Err(RemoteError::NotFound(id.to_string()));
            }
            Ok(Registration {
                id: id.clone(),
                race_id: "race-1".into(),
                distance_id: "d-10k".into(),
                bib_number: "12".into(),
                participant_name: None,
            })
        }

        async fn race(&self, race_id: &str) -> Result<Race, RemoteError> {
            Ok(Race {
                id: race_id.into(),
                name: "City 10K".into(),
                gps_frequency_seconds: Some(15),
                distances: Vec::new(),
            })
        }

        async fn checkpoints(&self, _race_id: &str, _distance_id: &str) -> Result<Vec<Checkpoint>, RemoteError> {
            Ok(vec![Checkpoint::new("cp-1", "Finish", 40.42, -3.70)])
        }
    }

    #[async_trait]
    impl TelemetrySink for StaticRemote {
        async fn send_point(&self, _point: &TelemetryPoint) -> Result<(), RemoteError> {
            Ok(())
        }

        async fn send_points(&self, _points: &[TelemetryPoint]) -> Result<(), RemoteError> {
            Ok(())
        }

        async fn send_crossing(&self, _crossing: &CrossingEvent) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    async fn app() -> Router {
        app_with_tracker().await.0
    }

    async fn app_with_tracker() -> (Router, SessionManager) {
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let remote = Arc::new(StaticRemote);
        let deps = TrackerDeps::new(
            Arc::new(SimulatedRunner::new(&SimulationSettings::default())),
            remote.clone(),
            remote,
            Arc::new(StoreClient::in_memory()),
        )
        .with_metrics(metrics.clone());

        let tracker = SessionManager::new(TrackerConfig::default(), deps).await;
        let router = create_router(AppState::new(AgentConfig::default(), tracker.clone(), metrics));
        (router, tracker)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let app = app().await;

        let (_, body) = call(&app, "GET", "/api/v1/session", None).await;
        assert_eq!(body["state"], "IDLE");

        let start = serde_json::json!({ "registrationId": "reg-1" });
        let (status, body) = call(&app, "POST", "/api/v1/session/start", Some(start.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["session"]["intervalSeconds"], 15);

        let (status, _) = call(&app, "POST", "/api/v1/session/start", Some(start)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = call(&app, "GET", "/api/v1/session", None).await;
        assert_eq!(body["state"], "TRACKING");
        assert_eq!(body["checkpoints"][0]["id"], "cp-1");

        let (status, body) = call(&app, "POST", "/api/v1/session/stop", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["registrationId"], "reg-1");

        let (status, _) = call(&app, "POST", "/api/v1/session/stop", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, events) = call(&app, "GET", "/api/v1/events?limit=10", None).await;
        let types: Vec<&str> = events
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|e| e["event_type"].as_str())
            .collect();
        assert!(types.contains(&"SESSION_STARTED"));
        assert!(types.contains(&"SESSION_STOPPED"));
    }

    #[tokio::test]
    async fn test_start_rejects_unknown_and_blank_registrations() {
        let app = app().await;

        let (status, _) = call(
            &app,
            "POST",
            "/api/v1/session/start",
            Some(serde_json::json!({ "registrationId": "reg-404" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/session/start",
            Some(serde_json::json!({ "registrationId": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn test_sync_with_empty_queue() {
        let app = app().await;
        let (status, body) = call(&app, "POST", "/api/v1/sync", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["delivered"], 0);
    }

    #[tokio::test]
    async fn test_metrics_exported() {
        let app = app().await;
        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("racetrack_session_active"));
    }

    #[tokio::test]
    async fn test_event_stream_forwards_published_events() {
        let (app, tracker) = app_with_tracker().await;
        let request = Request::builder()
            .uri("/api/v1/events/stream")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/event-stream"
        );

        tracker.events().publish(Event::connectivity_changed(false));

        let mut body = response.into_body().into_data_stream();
        let chunk = tokio::time::timeout(std::time::Duration::from_secs(2), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.contains("CONNECTIVITY_CHANGED"));
    }
}
