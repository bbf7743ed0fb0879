//! Simulated runner
//!
//! Stands in for device GPS and battery when the agent runs on a host
//! without them: a runner moves along the configured route at a constant
//! pace while the battery drains linearly.

use crate::config::SimulationSettings;
use racetrack_core::{GeoPosition, RawCoords, RawFix};
use racetrack_tracker::{Accuracy, BatteryMonitor, LocationProvider, TrackingResult};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Reported horizontal accuracy of simulated fixes, in meters
const SIMULATED_ACCURACY_M: f64 = 6.0;

/// Route geometry with cumulative segment lengths
#[derive(Debug)]
struct Track {
    route: Vec<GeoPosition>,
    cumulative_m: Vec<f64>,
    speed_mps: f64,
    started: DateTime<Utc>,
}

impl Track {
    fn new(route: Vec<GeoPosition>, speed_mps: f64, started: DateTime<Utc>) -> Self {
        let mut cumulative_m = Vec::with_capacity(route.len());
        let mut total = 0.0;
        for (i, point) in route.iter().enumerate() {
            if i > 0 {
                total += route[i - 1].distance_to(point);
            }
            cumulative_m.push(total);
        }

        Self {
            route,
            cumulative_m,
            speed_mps: speed_mps.max(0.0),
            started,
        }
    }

    fn length_m(&self) -> f64 {
        self.cumulative_m.last().copied().unwrap_or(0.0)
    }

    /// Position after covering `distance_m`; the runner waits at the finish
    fn position_at(&self, distance_m: f64) -> GeoPosition {
        let Some(first) = self.route.first() else {
            return GeoPosition::default();
        };
        let distance_m = distance_m.clamp(0.0, self.length_m());

        for i in 1..self.route.len() {
            if distance_m <= self.cumulative_m[i] {
                let segment = self.cumulative_m[i] - self.cumulative_m[i - 1];
                let fraction = if segment > 0.0 {
                    (distance_m - self.cumulative_m[i - 1]) / segment
                } else {
                    0.0
                };
                return self.route[i - 1].interpolate(&self.route[i], fraction);
            }
        }

        self.route.last().copied().unwrap_or(*first)
    }

    fn covered_at(&self, now: DateTime<Utc>) -> f64 {
        let elapsed_s = now.signed_duration_since(self.started).num_milliseconds().max(0) as f64 / 1000.0;
        elapsed_s * self.speed_mps
    }

    fn speed_at(&self, now: DateTime<Utc>) -> f64 {
        if self.covered_at(now) < self.length_m() {
            self.speed_mps
        } else {
            0.0
        }
    }

    /// Single-shot reading in the nested platform shape
    fn nested_fix(&self, now: DateTime<Utc>) -> RawFix {
        let position = self.position_at(self.covered_at(now));
        RawFix::Nested {
            coords: RawCoords {
                latitude: position.latitude,
                longitude: position.longitude,
                altitude: Some(position.altitude),
                accuracy: Some(SIMULATED_ACCURACY_M),
                speed: Some(self.speed_at(now)),
            },
            timestamp: now.timestamp_millis(),
        }
    }

    /// Watch reading in the flat platform shape
    fn flat_fix(&self, now: DateTime<Utc>) -> RawFix {
        let position = self.position_at(self.covered_at(now));
        RawFix::Flat {
            latitude: position.latitude,
            longitude: position.longitude,
            altitude: Some(position.altitude),
            accuracy: Some(SIMULATED_ACCURACY_M),
            speed: Some(self.speed_at(now)),
            time: now,
        }
    }
}

/// Location provider following the configured route
pub struct SimulatedRunner {
    track: Arc<Track>,
    fix_interval: Duration,
}

impl SimulatedRunner {
    pub fn new(settings: &SimulationSettings) -> Self {
        let route = settings
            .route
            .iter()
            .map(|[lat, lng]| GeoPosition::from_degrees(*lat, *lng))
            .filter(GeoPosition::is_valid)
            .collect();

        Self {
            track: Arc::new(Track::new(route, settings.speed_mps, Utc::now())),
            fix_interval: Duration::from_millis(settings.fix_interval_ms.max(100)),
        }
    }

    pub fn route_length_m(&self) -> f64 {
        self.track.length_m()
    }
}

#[async_trait]
impl LocationProvider for SimulatedRunner {
    async fn request_permission(&self) -> TrackingResult<()> {
        Ok(())
    }

    async fn current_position(&self, _accuracy: Accuracy) -> TrackingResult<RawFix> {
        Ok(self.track.nested_fix(Utc::now()))
    }

    fn watch_position(&self, _accuracy: Accuracy) -> TrackingResult<BoxStream<'static, RawFix>> {
        let ticker = tokio::time::interval(self.fix_interval);
        let track = self.track.clone();

        Ok(stream::unfold((ticker, track), |(mut ticker, track)| async move {
            ticker.tick().await;
            let fix = track.flat_fix(Utc::now());
            Some((fix, (ticker, track)))
        })
        .boxed())
    }
}

/// Linearly draining battery
pub struct SimulatedBattery {
    start_level: f64,
    drain_per_min: f64,
    started: Instant,
}

impl SimulatedBattery {
    pub fn new(settings: &SimulationSettings) -> Self {
        Self {
            start_level: settings.battery_start.min(100) as f64,
            drain_per_min: settings.battery_drain_per_min.max(0.0),
            started: Instant::now(),
        }
    }

    fn level_after(&self, elapsed: Duration) -> u8 {
        let drained = elapsed.as_secs_f64() / 60.0 * self.drain_per_min;
        (self.start_level - drained).clamp(0.0, 100.0).round() as u8
    }
}

#[async_trait]
impl BatteryMonitor for SimulatedBattery {
    async fn level(&self) -> Option<u8> {
        Some(self.level_after(self.started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use racetrack_core::FixSource;

    fn straight_track(started: DateTime<Utc>) -> Track {
        let start = GeoPosition::from_degrees(40.0, -3.0);
        Track::new(vec![start, start.destination(1_000.0, 90.0)], 5.0, started)
    }

    #[test]
    fn test_runner_advances_at_pace() {
        let t0 = Utc::now();
        let track = straight_track(t0);
        let start = track.position_at(0.0);

        let after = track.position_at(track.covered_at(t0 + chrono::Duration::seconds(20)));
        assert!((start.distance_to(&after) - 100.0).abs() < 1.0);
    }

    #[test]
    fn test_runner_waits_at_finish() {
        let t0 = Utc::now();
        let track = straight_track(t0);
        let late = t0 + chrono::Duration::hours(1);

        let finish = track.position_at(track.covered_at(late));
        assert!((track.position_at(0.0).distance_to(&finish) - 1_000.0).abs() < 1.0);
        assert_eq!(track.speed_at(late), 0.0);
    }

    #[test]
    fn test_both_shapes_normalize() {
        let track = straight_track(Utc::now());
        let now = Utc::now();

        let nested = track.nested_fix(now).normalize(FixSource::Poll).unwrap();
        let flat = track.flat_fix(now).normalize(FixSource::Watch).unwrap();
        assert!(nested.distance_to(&flat) < 0.01);
        assert_eq!(flat.speed, Some(5.0));
    }

    #[test]
    fn test_battery_drains_linearly() {
        let battery = SimulatedBattery::new(&SimulationSettings {
            battery_start: 50,
            battery_drain_per_min: 2.0,
            ..Default::default()
        });
        assert_eq!(battery.level_after(Duration::ZERO), 50);
        assert_eq!(battery.level_after(Duration::from_secs(300)), 40);
        assert_eq!(battery.level_after(Duration::from_secs(3_600)), 0);
    }

    #[tokio::test]
    async fn test_watch_emits_fixes() {
        let runner = SimulatedRunner::new(&SimulationSettings {
            fix_interval_ms: 100,
            ..Default::default()
        });
        assert!(runner.route_length_m() > 1_000.0);

        let fixes: Vec<RawFix> = runner
            .watch_position(Accuracy::High)
            .unwrap()
            .take(2)
            .collect()
            .await;
        assert_eq!(fixes.len(), 2);
    }
}
