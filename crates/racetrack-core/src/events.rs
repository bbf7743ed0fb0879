//! Event types for the race tracking engine
//!
//! These events carry every user-facing notification the engine raises
//! (permission problems, low battery, connectivity, checkpoint crossings)
//! and are published on the tracker's event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CrossingEvent, RegistrationId};

/// Event envelope for all engine events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(event_type: EventType, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            payload,
        }
    }

    pub fn session_started(registration_id: RegistrationId, start_time: DateTime<Utc>) -> Self {
        Self::new(
            EventType::SessionStarted,
            EventPayload::Session(SessionEvent {
                registration_id,
                start_time,
            }),
        )
    }

    pub fn session_stopped(registration_id: RegistrationId, start_time: DateTime<Utc>) -> Self {
        Self::new(
            EventType::SessionStopped,
            EventPayload::Session(SessionEvent {
                registration_id,
                start_time,
            }),
        )
    }

    pub fn session_restored(registration_id: RegistrationId, start_time: DateTime<Utc>) -> Self {
        Self::new(
            EventType::SessionRestored,
            EventPayload::Session(SessionEvent {
                registration_id,
                start_time,
            }),
        )
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(
            EventType::PermissionDenied,
            EventPayload::Notice(NoticeEvent {
                message: message.into(),
            }),
        )
    }

    pub fn low_battery(level: u8, interval_seconds: u32) -> Self {
        Self::new(
            EventType::LowBattery,
            EventPayload::Battery(BatteryEvent {
                level,
                interval_seconds,
            }),
        )
    }

    pub fn connectivity_changed(online: bool) -> Self {
        Self::new(
            EventType::ConnectivityChanged,
            EventPayload::Connectivity(ConnectivityEvent { online }),
        )
    }

    pub fn pending_points_changed(pending: usize, dropped: u64) -> Self {
        Self::new(
            EventType::PendingPointsChanged,
            EventPayload::Queue(QueueEvent { pending, dropped }),
        )
    }

    pub fn checkpoint_crossed(crossing: CrossingEvent, checkpoint_name: String, distance_m: f64) -> Self {
        Self::new(
            EventType::CheckpointCrossed,
            EventPayload::Crossing(CrossingNotice {
                crossing,
                checkpoint_name,
                distance_m,
                error: None,
            }),
        )
    }

    pub fn crossing_delivery_failed(crossing: CrossingEvent, checkpoint_name: String, error: String) -> Self {
        Self::new(
            EventType::CrossingDeliveryFailed,
            EventPayload::Crossing(CrossingNotice {
                crossing,
                checkpoint_name,
                distance_m: 0.0,
                error: Some(error),
            }),
        )
    }

    pub fn sync_completed(delivered: usize, pending: usize) -> Self {
        Self::new(
            EventType::SyncCompleted,
            EventPayload::Sync(SyncEvent {
                delivered,
                pending,
                error: None,
            }),
        )
    }

    pub fn sync_failed(pending: usize, error: impl Into<String>) -> Self {
        Self::new(
            EventType::SyncFailed,
            EventPayload::Sync(SyncEvent {
                delivered: 0,
                pending,
                error: Some(error.into()),
            }),
        )
    }
}

/// Type of event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // Session lifecycle
    SessionStarted,
    SessionStopped,
    SessionRestored,
    PermissionDenied,

    // Resources
    LowBattery,
    ConnectivityChanged,

    // Delivery
    PendingPointsChanged,
    SyncCompleted,
    SyncFailed,

    // Geofencing
    CheckpointCrossed,
    CrossingDeliveryFailed,
}

/// Event payload variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    Session(SessionEvent),
    Notice(NoticeEvent),
    Battery(BatteryEvent),
    Connectivity(ConnectivityEvent),
    Queue(QueueEvent),
    Crossing(CrossingNotice),
    Sync(SyncEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub registration_id: RegistrationId,
    pub start_time: DateTime<Utc>,
}

/// Free-form user-facing message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeEvent {
    pub message: String,
}

/// Low-battery advisory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryEvent {
    pub level: u8,
    /// Sampling interval now in force
    pub interval_seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityEvent {
    pub online: bool,
}

/// Offline queue counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    pub pending: usize,
    pub dropped: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossingNotice {
    pub crossing: CrossingEvent,
    pub checkpoint_name: String,
    pub distance_m: f64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    pub delivered: usize,
    pub pending: usize,
    pub error: Option<String>,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = Event::low_battery(15, 60);
        assert_eq!(event.event_type, EventType::LowBattery);
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::sync_failed(3, "connection refused");

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.event_type, EventType::SyncFailed);
        match deserialized.payload {
            EventPayload::Sync(sync) => {
                assert_eq!(sync.pending, 3);
                assert_eq!(sync.error.as_deref(), Some("connection refused"));
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
