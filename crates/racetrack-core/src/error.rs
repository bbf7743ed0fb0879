//! Error types for the race tracking domain

use thiserror::Error;

/// Core error type for domain model validation
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("Distance {distance_id} not found in race {race_id}")]
    DistanceNotFound { race_id: String, distance_id: String },

    #[error("Invalid position: latitude={lat}, longitude={lng}")]
    InvalidPosition { lat: f64, lng: f64 },

    #[error("Invalid fix timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid battery level: {0}")]
    InvalidBatteryLevel(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn checkpoint_not_found(id: impl Into<String>) -> Self {
        Self::CheckpointNotFound(id.into())
    }

    pub fn invalid_position(lat: f64, lng: f64) -> Self {
        Self::InvalidPosition { lat, lng }
    }

    pub fn invalid_timestamp(raw: impl Into<String>) -> Self {
        Self::InvalidTimestamp(raw.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
