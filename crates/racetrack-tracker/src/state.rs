//! Session state and snapshots

use racetrack_core::{Checkpoint, PositionFix, TrackingSession, TrackingStats};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the session manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Tracking,
    Stopping,
}

impl SessionState {
    /// States in which a session record is held in memory
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Tracking)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Tracking => write!(f, "tracking"),
            SessionState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Complete view of the tracker for display surfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session: Option<TrackingSession>,
    /// False for a restored session that only keeps its timer running
    pub capturing: bool,
    pub interval_seconds: Option<u32>,
    pub battery_level: Option<u8>,
    pub last_fix: Option<FixSnapshot>,
    pub checkpoints: Vec<CheckpointSnapshot>,
    /// Straight-line length through the checkpoints, in meters
    pub route_distance_m: f64,
    pub stats: TrackingStats,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Most recent position
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixSnapshot {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub source: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&PositionFix> for FixSnapshot {
    fn from(fix: &PositionFix) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            accuracy: fix.accuracy,
            source: fix.source.to_string(),
            timestamp: fix.timestamp,
        }
    }
}

/// Checkpoint with its visit flag
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSnapshot {
    pub id: String,
    pub name: String,
    pub route_order: u32,
    pub radius_meters: f64,
    pub visited: bool,
}

impl CheckpointSnapshot {
    pub fn new(checkpoint: &Checkpoint, visited: bool) -> Self {
        Self {
            id: checkpoint.id.to_string(),
            name: checkpoint.name.clone(),
            route_order: checkpoint.route_order,
            radius_meters: checkpoint.radius_meters,
            visited,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Tracking.to_string(), "tracking");
        assert!(SessionState::Starting.is_active());
        assert!(!SessionState::Stopping.is_active());
    }

    #[test]
    fn test_state_wire_format() {
        let json = serde_json::to_string(&SessionState::Idle).unwrap();
        assert_eq!(json, "\"IDLE\"");
    }

    #[test]
    fn test_checkpoint_snapshot() {
        let cp = Checkpoint::new("cp-3", "Ridge", 40.0, -3.0).with_route_order(3);
        let snap = CheckpointSnapshot::new(&cp, true);
        assert_eq!(snap.id, "cp-3");
        assert_eq!(snap.route_order, 3);
        assert!(snap.visited);
    }
}
