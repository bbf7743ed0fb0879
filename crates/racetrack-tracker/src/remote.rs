//! Remote collaborators: the race metadata service and the telemetry sink

use crate::error::RemoteError;
use racetrack_core::{Checkpoint, CrossingEvent, Race, Registration, RegistrationId, TelemetryPoint};

use async_trait::async_trait;

/// Write-only, append-style sink for telemetry and crossing events.
/// Duplicate records are tolerated by the receiving side.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn send_point(&self, point: &TelemetryPoint) -> Result<(), RemoteError>;

    /// Deliver a batch in order; the batch is accepted or rejected as a whole
    async fn send_points(&self, points: &[TelemetryPoint]) -> Result<(), RemoteError>;

    async fn send_crossing(&self, crossing: &CrossingEvent) -> Result<(), RemoteError>;
}

/// Read-only race metadata, fetched once per session start
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn registration(&self, id: &RegistrationId) -> Result<Registration, RemoteError>;

    async fn race(&self, race_id: &str) -> Result<Race, RemoteError>;

    /// Checkpoints of one distance, ordered by route order
    async fn checkpoints(&self, race_id: &str, distance_id: &str) -> Result<Vec<Checkpoint>, RemoteError>;
}
