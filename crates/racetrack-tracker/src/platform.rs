//! Optional device capabilities.
//!
//! Each capability may be missing on a given platform; the session
//! manager checks for it at runtime and carries on without it.

use crate::error::TrackingResult;
use racetrack_core::Checkpoint;

use async_trait::async_trait;

/// Battery level reporting
#[async_trait]
pub trait BatteryMonitor: Send + Sync {
    /// Current level in percent, `None` when the platform cannot tell
    async fn level(&self) -> Option<u8>;
}

/// Keeps the device awake while a session is tracking
#[async_trait]
pub trait WakeLock: Send + Sync {
    async fn acquire(&self) -> TrackingResult<()>;

    async fn release(&self) -> TrackingResult<()>;
}

/// Haptic or audio cue played when a checkpoint is crossed
#[async_trait]
pub trait Feedback: Send + Sync {
    async fn checkpoint_crossed(&self, checkpoint: &Checkpoint) -> TrackingResult<()>;
}
