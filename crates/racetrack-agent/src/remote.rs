//! HTTP client for the race service
//!
//! One reusable `reqwest::Client` serves both the metadata reads and the
//! telemetry/timing writes. A background probe turns the service's health
//! endpoint into the reachability signal the tracker listens to.

use racetrack_core::{Checkpoint, CrossingEvent, Race, Registration, RegistrationId, TelemetryPoint};
use racetrack_tracker::{MetadataSource, RemoteError, TelemetrySink};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Race service client
pub struct HttpRemote {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| RemoteError::transport(e.to_string()))?;

        check_status(response)
            .await?
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), RemoteError> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| RemoteError::transport(e.to_string()))?;

        check_status(response).await?;
        Ok(())
    }

    /// True when the health endpoint answers with a success status
    pub async fn is_reachable(&self) -> bool {
        match self.http.get(self.url("health")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Race service unreachable: {}", e);
                false
            }
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let message = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        Err(RemoteError::NotFound(url))
    } else {
        Err(RemoteError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl MetadataSource for HttpRemote {
    async fn registration(&self, id: &RegistrationId) -> Result<Registration, RemoteError> {
        self.get_json(&format!("registrations/{id}")).await
    }

    async fn race(&self, race_id: &str) -> Result<Race, RemoteError> {
        self.get_json(&format!("races/{race_id}")).await
    }

    async fn checkpoints(&self, race_id: &str, distance_id: &str) -> Result<Vec<Checkpoint>, RemoteError> {
        let mut checkpoints: Vec<Checkpoint> = self
            .get_json(&format!("races/{race_id}/distances/{distance_id}/checkpoints"))
            .await?;
        checkpoints.sort_by_key(|c| c.route_order);
        Ok(checkpoints)
    }
}

#[async_trait]
impl TelemetrySink for HttpRemote {
    async fn send_point(&self, point: &TelemetryPoint) -> Result<(), RemoteError> {
        self.post_json("telemetry", point).await
    }

    async fn send_points(&self, points: &[TelemetryPoint]) -> Result<(), RemoteError> {
        self.post_json("telemetry/batch", points).await
    }

    async fn send_crossing(&self, crossing: &CrossingEvent) -> Result<(), RemoteError> {
        self.post_json("timing/readings", crossing).await
    }
}

/// Probe the race service every `interval` and publish reachability.
/// Only changes are published.
pub fn spawn_reachability_probe(
    remote: Arc<HttpRemote>,
    interval: Duration,
    cancel: CancellationToken,
) -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(true);

    tokio::spawn(async move {
        info!("Probing {} every {:?}", remote.base_url(), interval);
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let online = remote.is_reachable().await;
            tx.send_if_modified(|current| {
                let changed = *current != online;
                *current = online;
                changed
            });
        }
        debug!("Reachability probe stopped");
    });

    rx
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Json, Path};
    use axum::routing::{get, post};
    use axum::Router;
    use parking_lot::Mutex;

    /// Serve `router` on an ephemeral port and return its base URL
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api/v1")
    }

    fn remote(base: &str) -> HttpRemote {
        HttpRemote::new(base, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_metadata_reads() {
        let router = Router::new()
            .route(
                "/api/v1/registrations/{id}",
                get(|Path(id): Path<String>| async move {
                    Json(serde_json::json!({
                        "id": id,
                        "raceId": "race-1",
                        "distanceId": "d-10k",
                        "bibNumber": "101"
                    }))
                }),
            )
            .route(
                "/api/v1/races/{race}/distances/{distance}/checkpoints",
                get(|| async {
                    Json(serde_json::json!([
                        {"id": "cp-2", "name": "Turn", "latitude": 40.42, "longitude": -3.71, "routeOrder": 2},
                        {"id": "cp-1", "name": "Bridge", "latitude": 40.41, "longitude": -3.70, "routeOrder": 1}
                    ]))
                }),
            );
        let base = serve(router).await;
        let remote = remote(&base);

        let registration = remote.registration(&RegistrationId::new("reg-3")).await.unwrap();
        assert_eq!(registration.id.as_str(), "reg-3");
        assert_eq!(registration.bib_number, "101");

        let checkpoints = remote.checkpoints("race-1", "d-10k").await.unwrap();
        let order: Vec<&str> = checkpoints.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["cp-1", "cp-2"]);
        assert_eq!(checkpoints[0].radius_meters, 50.0);
    }

    #[tokio::test]
    async fn test_missing_resource_maps_to_not_found() {
        let base = serve(Router::new()).await;
        let result = remote(&base).race("race-404").await;
        assert!(matches!(result, Err(RemoteError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_batch_is_posted_in_order() {
        let received = Arc::new(Mutex::new(Vec::<serde_json::Value>::new()));
        let sink = received.clone();
        let router = Router::new().route(
            "/api/v1/telemetry/batch",
            post(move |Json(body): Json<Vec<serde_json::Value>>| {
                let sink = sink.clone();
                async move {
                    sink.lock().extend(body);
                }
            }),
        );
        let base = serve(router).await;

        let point = |lat: f64| TelemetryPoint {
            race_id: "race-1".into(),
            registration_id: RegistrationId::new("reg-3"),
            latitude: lat,
            longitude: -3.7,
            altitude: None,
            accuracy: None,
            speed: None,
            battery_level: Some(64),
            timestamp: chrono::Utc::now(),
        };
        remote(&base)
            .send_points(&[point(40.1), point(40.2)])
            .await
            .unwrap();

        let received = received.lock();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0]["latitude"], 40.1);
        assert_eq!(received[1]["batteryLevel"], 64);
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let router = Router::new().route(
            "/api/v1/timing/readings",
            post(|| async { (axum::http::StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let base = serve(router).await;

        let crossing = CrossingEvent {
            race_id: "race-1".into(),
            distance_id: "d-10k".into(),
            registration_id: RegistrationId::new("reg-3"),
            bib_number: "101".into(),
            checkpoint_id: "cp-1".into(),
            timing_point_id: None,
            timestamp: chrono::Utc::now(),
            reading_type: "gps_auto".into(),
            note: "GPS auto-detected at 12.0m from checkpoint".into(),
        };
        let result = remote(&base).send_crossing(&crossing).await;
        assert_eq!(
            result,
            Err(RemoteError::Status {
                status: 502,
                message: "upstream down".into()
            })
        );
    }

    #[tokio::test]
    async fn test_reachability_reports_unreachable_service() {
        // Nothing listens on port 9 of the loopback interface
        let remote = Arc::new(remote("http://127.0.0.1:9"));
        let cancel = CancellationToken::new();
        let mut rx = spawn_reachability_probe(remote, Duration::from_millis(20), cancel.clone());

        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|online| !online))
            .await
            .unwrap()
            .unwrap();
        cancel.cancel();
    }
}
