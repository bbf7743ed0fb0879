//! # Racetrack Core
//!
//! Core domain models and types for the race GPS tracking engine.
//! This crate provides the types shared by the tracker, the durable
//! store and the agent binary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod error;
pub mod events;
pub mod geo;

pub use error::{CoreError, CoreResult};
pub use events::*;
pub use geo::*;

/// Geofence radius applied when a checkpoint does not configure one
pub const DEFAULT_GEOFENCE_RADIUS_M: f64 = 50.0;

/// Reading type attached to every automatically detected crossing
pub const READING_TYPE_GPS_AUTO: &str = "gps_auto";

const MS_TO_KMH: f64 = 3.6;

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Unique identifier for a race registration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(pub String);

impl RegistrationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RegistrationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RegistrationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique identifier for a checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(pub String);

impl CheckpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CheckpointId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// POSITION FIXES
// ============================================================================

/// Where a fix entered the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixSource {
    /// Single-shot fix taken while the session starts
    Initial,
    /// Continuous watch stream
    Watch,
    /// Backup polling timer
    Poll,
}

impl fmt::Display for FixSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixSource::Initial => write!(f, "initial"),
            FixSource::Watch => write!(f, "watch"),
            FixSource::Poll => write!(f, "poll"),
        }
    }
}

/// Canonical device position. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    /// Horizontal accuracy in meters
    pub accuracy: Option<f64>,
    /// Ground speed in m/s as reported by the platform
    pub speed: Option<f64>,
    pub source: FixSource,
}

impl PositionFix {
    pub fn new(latitude: f64, longitude: f64, timestamp: DateTime<Utc>, source: FixSource) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            altitude: None,
            accuracy: None,
            speed: None,
            source,
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn with_speed(mut self, speed_ms: f64) -> Self {
        self.speed = Some(speed_ms);
        self
    }

    pub fn position(&self) -> GeoPosition {
        GeoPosition::new(self.latitude, self.longitude, self.altitude.unwrap_or(0.0))
    }

    /// Great-circle distance to another fix in meters
    pub fn distance_to(&self, other: &PositionFix) -> f64 {
        haversine_m(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// Reported speed converted to km/h
    pub fn speed_kmh(&self) -> Option<f64> {
        self.speed.map(|s| s * MS_TO_KMH)
    }
}

/// Coordinates block of a nested platform fix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCoords {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
}

/// Position as handed over by a platform location API.
///
/// Two shapes exist in the field: a nested `coords` object stamped with
/// epoch milliseconds, and a flat record stamped with an RFC 3339 time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawFix {
    Nested {
        coords: RawCoords,
        /// Milliseconds since the Unix epoch
        timestamp: i64,
    },
    Flat {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        altitude: Option<f64>,
        #[serde(default)]
        accuracy: Option<f64>,
        #[serde(default)]
        speed: Option<f64>,
        time: DateTime<Utc>,
    },
}

impl RawFix {
    /// Normalize either platform shape into a [`PositionFix`].
    ///
    /// Non-finite or negative speed and accuracy readings are platform
    /// sentinels for "unknown" and become `None`.
    pub fn normalize(self, source: FixSource) -> CoreResult<PositionFix> {
        let (latitude, longitude, altitude, accuracy, speed, timestamp) = match self {
            RawFix::Nested { coords, timestamp } => {
                let ts = DateTime::<Utc>::from_timestamp_millis(timestamp)
                    .ok_or_else(|| CoreError::invalid_timestamp(timestamp.to_string()))?;
                (
                    coords.latitude,
                    coords.longitude,
                    coords.altitude,
                    coords.accuracy,
                    coords.speed,
                    ts,
                )
            }
            RawFix::Flat {
                latitude,
                longitude,
                altitude,
                accuracy,
                speed,
                time,
            } => (latitude, longitude, altitude, accuracy, speed, time),
        };

        if !GeoPosition::from_degrees(latitude, longitude).is_valid() {
            return Err(CoreError::invalid_position(latitude, longitude));
        }

        Ok(PositionFix {
            timestamp,
            latitude,
            longitude,
            altitude: altitude.filter(|a| a.is_finite()),
            accuracy: non_negative(accuracy),
            speed: non_negative(speed),
            source,
        })
    }
}

fn non_negative(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

// ============================================================================
// RACE METADATA
// ============================================================================

/// A race as published by the metadata service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Race {
    pub id: String,
    pub name: String,
    /// Default GPS sampling frequency in seconds
    #[serde(default)]
    pub gps_frequency_seconds: Option<u32>,
    #[serde(default)]
    pub distances: Vec<RaceDistance>,
}

impl Race {
    /// Sampling frequency configured for a distance, falling back to the race default
    pub fn base_frequency_for(&self, distance_id: &str) -> Option<u32> {
        self.distances
            .iter()
            .find(|d| d.id == distance_id)
            .and_then(|d| d.gps_frequency_seconds)
            .or(self.gps_frequency_seconds)
    }

    pub fn distance(&self, distance_id: &str) -> CoreResult<&RaceDistance> {
        self.distances
            .iter()
            .find(|d| d.id == distance_id)
            .ok_or_else(|| CoreError::DistanceNotFound {
                race_id: self.id.clone(),
                distance_id: distance_id.to_string(),
            })
    }
}

/// One distance (course) of a race
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceDistance {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub gps_frequency_seconds: Option<u32>,
}

/// A participant's registration in a race distance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: RegistrationId,
    pub race_id: String,
    pub distance_id: String,
    pub bib_number: String,
    #[serde(default)]
    pub participant_name: Option<String>,
}

fn default_radius() -> f64 {
    DEFAULT_GEOFENCE_RADIUS_M
}

/// A geofenced control point on the route
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_radius")]
    pub radius_meters: f64,
    #[serde(default)]
    pub route_order: u32,
    #[serde(default)]
    pub distance_from_start_km: Option<f64>,
    #[serde(default)]
    pub timing_point_id: Option<String>,
}

impl Checkpoint {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            id: CheckpointId::new(id),
            name: name.into(),
            latitude: lat,
            longitude: lng,
            radius_meters: DEFAULT_GEOFENCE_RADIUS_M,
            route_order: 0,
            distance_from_start_km: None,
            timing_point_id: None,
        }
    }

    pub fn with_radius(mut self, radius_meters: f64) -> Self {
        self.radius_meters = radius_meters;
        self
    }

    pub fn with_route_order(mut self, order: u32) -> Self {
        self.route_order = order;
        self
    }

    pub fn with_timing_point(mut self, timing_point_id: impl Into<String>) -> Self {
        self.timing_point_id = Some(timing_point_id.into());
        self
    }

    pub fn position(&self) -> GeoPosition {
        GeoPosition::from_degrees(self.latitude, self.longitude)
    }

    pub fn geofence(&self) -> GeoCircle {
        GeoCircle::new(self.position(), self.radius_meters)
    }
}

/// Straight-line route length through the checkpoints in route order, in meters
pub fn route_distance_m(checkpoints: &[Checkpoint]) -> f64 {
    let mut ordered: Vec<&Checkpoint> = checkpoints.iter().collect();
    ordered.sort_by_key(|c| c.route_order);

    ordered
        .windows(2)
        .map(|w| w[0].position().distance_to(&w[1].position()))
        .sum()
}

// ============================================================================
// SESSION MODELS
// ============================================================================

/// Durable record of an active tracking session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSession {
    pub registration_id: RegistrationId,
    pub race_id: String,
    pub distance_id: String,
    pub start_time: DateTime<Utc>,
    pub active: bool,
    pub interval_seconds: u32,
    pub conservation_mode: bool,
}

impl TrackingSession {
    pub fn new(registration: &Registration, start_time: DateTime<Utc>, interval_seconds: u32) -> Self {
        Self {
            registration_id: registration.id.clone(),
            race_id: registration.race_id.clone(),
            distance_id: registration.distance_id.clone(),
            start_time,
            active: true,
            interval_seconds,
            conservation_mode: false,
        }
    }

    /// Whole seconds elapsed since the session started, never negative
    pub fn elapsed_seconds_at(&self, now: DateTime<Utc>) -> u64 {
        now.signed_duration_since(self.start_time)
            .num_seconds()
            .max(0) as u64
    }
}

/// One telemetry sample, as sent to the sink and as held in the offline queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPoint {
    pub race_id: String,
    pub registration_id: RegistrationId,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub battery_level: Option<u8>,
    pub timestamp: DateTime<Utc>,
}

/// A telemetry point waiting in the offline queue
pub type QueuedPoint = TelemetryPoint;

impl TelemetryPoint {
    pub fn from_fix(session: &TrackingSession, fix: &PositionFix, battery_level: Option<u8>) -> Self {
        Self {
            race_id: session.race_id.clone(),
            registration_id: session.registration_id.clone(),
            latitude: fix.latitude,
            longitude: fix.longitude,
            altitude: fix.altitude,
            accuracy: fix.accuracy,
            speed: fix.speed,
            battery_level,
            timestamp: fix.timestamp,
        }
    }
}

/// Assertion that a participant passed a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossingEvent {
    pub race_id: String,
    pub distance_id: String,
    pub registration_id: RegistrationId,
    pub bib_number: String,
    pub checkpoint_id: CheckpointId,
    pub timing_point_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub reading_type: String,
    pub note: String,
}

impl CrossingEvent {
    /// Build an automatically detected crossing stamped with the fix time
    pub fn gps_auto(
        registration: &Registration,
        checkpoint: &Checkpoint,
        timestamp: DateTime<Utc>,
        distance_m: f64,
    ) -> Self {
        Self {
            race_id: registration.race_id.clone(),
            distance_id: registration.distance_id.clone(),
            registration_id: registration.id.clone(),
            bib_number: registration.bib_number.clone(),
            checkpoint_id: checkpoint.id.clone(),
            timing_point_id: checkpoint.timing_point_id.clone(),
            timestamp,
            reading_type: READING_TYPE_GPS_AUTO.to_string(),
            note: format!("GPS auto-detected at {:.1}m from checkpoint", distance_m),
        }
    }
}

/// Display aggregate derived from the running session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStats {
    pub points_delivered: u64,
    pub distance_m: f64,
    pub speed_kmh: f64,
    pub elapsed_seconds: u64,
    pub last_sync: Option<DateTime<Utc>>,
    pub pending_points: usize,
    pub dropped_points: u64,
    pub online: bool,
    pub conservation_mode: bool,
    pub checkpoints_visited: usize,
    pub checkpoints_total: usize,
}

impl TrackingStats {
    pub fn distance_km(&self) -> f64 {
        self.distance_m / 1000.0
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> Registration {
        Registration {
            id: RegistrationId::new("reg-1"),
            race_id: "race-1".into(),
            distance_id: "dist-42k".into(),
            bib_number: "1234".into(),
            participant_name: Some("A. Runner".into()),
        }
    }

    #[test]
    fn test_nested_fix_normalization() {
        let raw: RawFix = serde_json::from_str(
            r#"{"coords":{"latitude":40.0,"longitude":-3.0,"altitude":650.0,"accuracy":5.0,"speed":3.0},"timestamp":1700000000000}"#,
        )
        .unwrap();

        let fix = raw.normalize(FixSource::Watch).unwrap();
        assert_eq!(fix.latitude, 40.0);
        assert_eq!(fix.altitude, Some(650.0));
        assert_eq!(fix.timestamp.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(fix.source, FixSource::Watch);
    }

    #[test]
    fn test_flat_fix_normalization() {
        let raw: RawFix = serde_json::from_str(
            r#"{"latitude":40.0,"longitude":-3.0,"speed":-1.0,"time":"2024-05-01T08:00:00Z"}"#,
        )
        .unwrap();

        let fix = raw.normalize(FixSource::Poll).unwrap();
        assert_eq!(fix.longitude, -3.0);
        assert_eq!(fix.speed, None);
        assert_eq!(fix.source, FixSource::Poll);
    }

    #[test]
    fn test_invalid_fix_rejected() {
        let raw = RawFix::Flat {
            latitude: 120.0,
            longitude: 0.0,
            altitude: None,
            accuracy: None,
            speed: None,
            time: Utc::now(),
        };
        assert!(matches!(
            raw.normalize(FixSource::Watch),
            Err(CoreError::InvalidPosition { .. })
        ));
    }

    #[test]
    fn test_speed_conversion() {
        let fix = PositionFix::new(40.0, -3.0, Utc::now(), FixSource::Watch).with_speed(2.5);
        assert!((fix.speed_kmh().unwrap() - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_checkpoint_default_radius() {
        let cp: Checkpoint = serde_json::from_str(
            r#"{"id":"cp-1","name":"Km 10","latitude":40.0,"longitude":-3.0,"routeOrder":1}"#,
        )
        .unwrap();
        assert_eq!(cp.radius_meters, DEFAULT_GEOFENCE_RADIUS_M);
        assert_eq!(cp.route_order, 1);
    }

    #[test]
    fn test_base_frequency_falls_back_to_race() {
        let race = Race {
            id: "race-1".into(),
            name: "Trail".into(),
            gps_frequency_seconds: Some(30),
            distances: vec![
                RaceDistance { id: "d1".into(), name: "42K".into(), gps_frequency_seconds: Some(15) },
                RaceDistance { id: "d2".into(), name: "21K".into(), gps_frequency_seconds: None },
            ],
        };
        assert_eq!(race.base_frequency_for("d1"), Some(15));
        assert_eq!(race.base_frequency_for("d2"), Some(30));
        assert!(race.distance("d3").is_err());
    }

    #[test]
    fn test_crossing_event_wire_format() {
        let cp = Checkpoint::new("cp-1", "Summit", 40.0, -3.0).with_timing_point("tp-9");
        let event = CrossingEvent::gps_auto(&registration(), &cp, Utc::now(), 12.34);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["readingType"], "gps_auto");
        assert_eq!(json["bibNumber"], "1234");
        assert_eq!(json["timingPointId"], "tp-9");
        assert_eq!(json["note"], "GPS auto-detected at 12.3m from checkpoint");
    }

    #[test]
    fn test_elapsed_never_negative() {
        let now = Utc::now();
        let session = TrackingSession::new(&registration(), now + chrono::Duration::seconds(30), 10);
        assert_eq!(session.elapsed_seconds_at(now), 0);

        let session = TrackingSession::new(&registration(), now - chrono::Duration::seconds(90), 10);
        assert_eq!(session.elapsed_seconds_at(now), 90);
    }

    #[test]
    fn test_route_distance() {
        let a = Checkpoint::new("a", "Start", 40.0, -3.0).with_route_order(0);
        let b = Checkpoint::new("b", "Finish", 40.01, -3.0).with_route_order(1);
        let d = route_distance_m(&[b, a]);
        assert!(d > 1100.0 && d < 1120.0);
    }
}
