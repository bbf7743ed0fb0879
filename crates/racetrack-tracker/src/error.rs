//! Error types for the tracking engine

use racetrack_core::CoreError;
use racetrack_store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a remote collaborator (metadata service or sink)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote rejected request with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl RemoteError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// Tracking engine errors
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Location permission denied: {0}")]
    PermissionDenied(String),

    #[error("No position fix within {0:?}")]
    FixTimeout(Duration),

    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("Telemetry delivery failed: {0}")]
    TelemetryDelivery(RemoteError),

    #[error("Crossing delivery failed: {0}")]
    CrossingDelivery(RemoteError),

    #[error("Offline queue sync failed: {0}")]
    SyncDrain(RemoteError),

    #[error("A queue sync is already in progress")]
    SyncInProgress,

    #[error("Metadata unavailable: {0}")]
    Metadata(RemoteError),

    #[error("Invalid fix: {0}")]
    InvalidFix(#[from] CoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Cannot {action} while {state}")]
    InvalidState { state: String, action: String },

    #[error("Platform capability failed: {0}")]
    Platform(String),
}

impl TrackingError {
    pub fn invalid_state(state: impl std::fmt::Display, action: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.to_string(),
            action: action.into(),
        }
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform(msg.into())
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            TrackingError::PermissionDenied(_) => "permission_denied",
            TrackingError::FixTimeout(_) => "timeout",
            TrackingError::LocationUnavailable(_) => "unavailable",
            TrackingError::TelemetryDelivery(_) => "telemetry_delivery",
            TrackingError::CrossingDelivery(_) => "crossing_delivery",
            TrackingError::SyncDrain(_) => "sync_drain",
            TrackingError::SyncInProgress => "sync_in_progress",
            TrackingError::Metadata(_) => "metadata",
            TrackingError::InvalidFix(_) => "invalid_fix",
            TrackingError::Storage(_) => "storage",
            TrackingError::InvalidState { .. } => "invalid_state",
            TrackingError::Platform(_) => "platform",
        }
    }
}

pub type TrackingResult<T> = Result<T, TrackingError>;
