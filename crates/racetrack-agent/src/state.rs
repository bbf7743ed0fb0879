//! Application state shared by the HTTP handlers

use crate::config::AgentConfig;
use racetrack_telemetry::MetricsCollector;
use racetrack_tracker::SessionManager;

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub config: Arc<AgentConfig>,
    /// Tracking session orchestrator
    pub tracker: SessionManager,
    /// Prometheus registry backing `/metrics`
    pub metrics: Arc<MetricsCollector>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: AgentConfig, tracker: SessionManager, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            config: Arc::new(config),
            tracker,
            metrics,
            started_at: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds()
            .max(0) as u64
    }
}
