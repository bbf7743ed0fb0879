//! # Racetrack Tracker - Session Orchestration
//!
//! Central coordination for participant GPS tracking during a race.
//! Combines the location source, battery-aware sampling, checkpoint
//! geofencing and offline-tolerant delivery into one session engine.
//!
//! ## Features
//! - Watch stream plus backup poll feeding a single fix pipeline
//! - Automatic checkpoint crossings, at most one per checkpoint
//! - Durable FIFO queue for telemetry produced while offline
//! - Conservation sampling under low battery
//! - Session restore after a restart

pub mod error;
pub mod events;
pub mod frequency;
pub mod geofence;
pub mod location;
pub mod platform;
pub mod recorder;
pub mod remote;
pub mod session;
pub mod state;
pub mod sync;

pub use error::{RemoteError, TrackingError, TrackingResult};
pub use events::EventBus;
pub use location::{Accuracy, LocationAdapter, LocationProvider, WatchHandle};
pub use platform::{BatteryMonitor, Feedback, WakeLock};
pub use remote::{MetadataSource, TelemetrySink};
pub use session::SessionManager;
pub use state::{SessionSnapshot, SessionState};
pub use sync::{DeliveryOutcome, SyncManager, SyncReport};

use racetrack_store::StoreClient;
use racetrack_telemetry::MetricsCollector;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Tracking engine configuration
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Sampling interval when the race does not configure one
    pub default_frequency: Duration,
    /// Battery percentage below which conservation mode applies
    pub low_battery_threshold: u8,
    /// Sampling interval in conservation mode
    pub conservation_interval: Duration,
    /// Upper bound on a single-shot fix request
    pub fix_timeout: Duration,
    pub accuracy: Accuracy,
    /// Period of the elapsed-time ticker
    pub tick_interval: Duration,
    /// Offline queue bound; `None` keeps every point
    pub max_queued_points: Option<usize>,
    /// Resume capture, not just the timer, when restoring a session
    pub resume_capture_on_restore: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            default_frequency: Duration::from_secs(10),
            low_battery_threshold: 20,
            conservation_interval: Duration::from_secs(60),
            fix_timeout: Duration::from_secs(10),
            accuracy: Accuracy::High,
            tick_interval: Duration::from_secs(1),
            max_queued_points: None,
            resume_capture_on_restore: false,
        }
    }
}

/// Collaborators of the session manager. Platform capabilities are
/// optional and degrade gracefully when missing.
pub struct TrackerDeps {
    pub location: Arc<dyn LocationProvider>,
    pub metadata: Arc<dyn MetadataSource>,
    pub sink: Arc<dyn TelemetrySink>,
    pub store: Arc<StoreClient>,
    pub battery: Option<Arc<dyn BatteryMonitor>>,
    pub wake_lock: Option<Arc<dyn WakeLock>>,
    pub feedback: Option<Arc<dyn Feedback>>,
    /// Reachability signal; without one the engine assumes it is online
    pub network: Option<watch::Receiver<bool>>,
    pub metrics: Option<Arc<MetricsCollector>>,
    pub events: EventBus,
}

impl TrackerDeps {
    pub fn new(
        location: Arc<dyn LocationProvider>,
        metadata: Arc<dyn MetadataSource>,
        sink: Arc<dyn TelemetrySink>,
        store: Arc<StoreClient>,
    ) -> Self {
        Self {
            location,
            metadata,
            sink,
            store,
            battery: None,
            wake_lock: None,
            feedback: None,
            network: None,
            metrics: None,
            events: EventBus::default(),
        }
    }

    pub fn with_battery(mut self, battery: Arc<dyn BatteryMonitor>) -> Self {
        self.battery = Some(battery);
        self
    }

    pub fn with_wake_lock(mut self, wake_lock: Arc<dyn WakeLock>) -> Self {
        self.wake_lock = Some(wake_lock);
        self
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn Feedback>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn with_network(mut self, network: watch::Receiver<bool>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }
}

// ============================================================================
// TEST FAKES
// ============================================================================


// ============================================================================
// TESTS
// ============================================================================
