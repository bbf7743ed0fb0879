//! # Racetrack Telemetry - Metrics & Observability
//!
//! Prometheus metrics exporter for the race tracking engine.
//! Provides real-time metrics for:
//! - Fix acquisition and location errors
//! - Telemetry delivery and the offline queue
//! - Checkpoint crossings
//! - Battery and sampling mode

use prometheus::{
    Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use tracing::info;

/// Metrics collector for the tracking engine
pub struct MetricsCollector {
    registry: Registry,

    // Fix metrics
    fixes_processed: IntCounterVec,
    location_errors: IntCounterVec,
    distance_meters: Gauge,

    // Delivery metrics
    points_delivered: IntCounter,
    points_queued: IntCounter,
    points_dropped: IntCounter,
    queue_depth: IntGauge,
    syncs_total: IntCounterVec,
    online: IntGauge,

    // Geofence metrics
    crossings_total: IntCounterVec,
    crossing_failures: IntCounter,

    // Resource metrics
    battery_level: Gauge,
    conservation_mode: IntGauge,
    sampling_interval: IntGauge,
    session_active: IntGauge,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let fixes_processed = IntCounterVec::new(
            Opts::new("racetrack_fixes_processed_total", "Position fixes processed"),
            &["source"],
        )?;
        registry.register(Box::new(fixes_processed.clone()))?;

        let location_errors = IntCounterVec::new(
            Opts::new("racetrack_location_errors_total", "Failed location requests"),
            &["kind"],
        )?;
        registry.register(Box::new(location_errors.clone()))?;

        let distance_meters = Gauge::new(
            "racetrack_distance_meters",
            "Cumulative distance of the current session",
        )?;
        registry.register(Box::new(distance_meters.clone()))?;

        let points_delivered = IntCounter::new(
            "racetrack_points_delivered_total",
            "Telemetry points confirmed by the sink",
        )?;
        registry.register(Box::new(points_delivered.clone()))?;

        let points_queued = IntCounter::new(
            "racetrack_points_queued_total",
            "Telemetry points written to the offline queue",
        )?;
        registry.register(Box::new(points_queued.clone()))?;

        let points_dropped = IntCounter::new(
            "racetrack_points_dropped_total",
            "Queued points evicted by the queue bound",
        )?;
        registry.register(Box::new(points_dropped.clone()))?;

        let queue_depth = IntGauge::new(
            "racetrack_queue_depth",
            "Points waiting in the offline queue",
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        let syncs_total = IntCounterVec::new(
            Opts::new("racetrack_syncs_total", "Offline queue drain attempts"),
            &["result"],
        )?;
        registry.register(Box::new(syncs_total.clone()))?;

        let online = IntGauge::new("racetrack_online", "Network reachability")?;
        registry.register(Box::new(online.clone()))?;

        let crossings_total = IntCounterVec::new(
            Opts::new("racetrack_crossings_total", "Checkpoint crossings detected"),
            &["checkpoint"],
        )?;
        registry.register(Box::new(crossings_total.clone()))?;

        let crossing_failures = IntCounter::new(
            "racetrack_crossing_delivery_failures_total",
            "Crossing events the sink did not accept",
        )?;
        registry.register(Box::new(crossing_failures.clone()))?;

        let battery_level = Gauge::new("racetrack_battery_percent", "Device battery level")?;
        registry.register(Box::new(battery_level.clone()))?;

        let conservation_mode = IntGauge::new(
            "racetrack_conservation_mode",
            "Whether low-battery sampling is in force",
        )?;
        registry.register(Box::new(conservation_mode.clone()))?;

        let sampling_interval = IntGauge::new(
            "racetrack_sampling_interval_seconds",
            "Effective backup poll interval",
        )?;
        registry.register(Box::new(sampling_interval.clone()))?;

        let session_active = IntGauge::new(
            "racetrack_session_active",
            "Whether a tracking session is running",
        )?;
        registry.register(Box::new(session_active.clone()))?;

        info!("Metrics collector initialized");

        Ok(Self {
            registry,
            fixes_processed,
            location_errors,
            distance_meters,
            points_delivered,
            points_queued,
            points_dropped,
            queue_depth,
            syncs_total,
            online,
            crossings_total,
            crossing_failures,
            battery_level,
            conservation_mode,
            sampling_interval,
            session_active,
        })
    }

    /// Get Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> prometheus::Result<String> {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    // ========================================================================
    // FIX METRICS
    // ========================================================================

    pub fn record_fix(&self, source: &str) {
        self.fixes_processed.with_label_values(&[source]).inc();
    }

    pub fn record_location_error(&self, kind: &str) {
        self.location_errors.with_label_values(&[kind]).inc();
    }

    pub fn set_distance(&self, meters: f64) {
        self.distance_meters.set(meters);
    }

    // ========================================================================
    // DELIVERY METRICS
    // ========================================================================

    pub fn record_delivered(&self, count: u64) {
        self.points_delivered.inc_by(count);
    }

    pub fn record_queued(&self) {
        self.points_queued.inc();
    }

    pub fn record_dropped(&self, count: u64) {
        self.points_dropped.inc_by(count);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as i64);
    }

    pub fn record_sync(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.syncs_total.with_label_values(&[result]).inc();
    }

    pub fn set_online(&self, online: bool) {
        self.online.set(if online { 1 } else { 0 });
    }

    // ========================================================================
    // GEOFENCE METRICS
    // ========================================================================

    pub fn record_crossing(&self, checkpoint: &str) {
        self.crossings_total.with_label_values(&[checkpoint]).inc();
    }

    pub fn record_crossing_failure(&self) {
        self.crossing_failures.inc();
    }

    // ========================================================================
    // RESOURCE METRICS
    // ========================================================================

    pub fn set_battery(&self, level: u8) {
        self.battery_level.set(level as f64);
    }

    pub fn set_sampling(&self, interval_seconds: u32, conservation: bool) {
        self.sampling_interval.set(interval_seconds as i64);
        self.conservation_mode.set(if conservation { 1 } else { 0 });
    }

    pub fn set_session_active(&self, active: bool) {
        self.session_active.set(if active { 1 } else { 0 });
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create MetricsCollector")
    }
}

// ============================================================================
// TESTS
// ============================================================================
