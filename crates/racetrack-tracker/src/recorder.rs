//! Distance and speed accumulation from the fix stream

use racetrack_core::PositionFix;

/// Running telemetry for one session.
///
/// Every fix replaces `last_fix`, including duplicates; a repeated fix
/// contributes a zero-length segment, so watch/poll overlap needs no
/// deduplication.
#[derive(Debug, Default, Clone)]
pub struct TelemetryRecorder {
    last_fix: Option<PositionFix>,
    distance_m: f64,
    speed_kmh: f64,
    fixes: u64,
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fix in; returns the distance it added, in meters
    pub fn record(&mut self, fix: &PositionFix) -> f64 {
        let delta = match &self.last_fix {
            Some(last) => {
                let d = last.distance_to(fix);
                if d.is_finite() { d } else { 0.0 }
            }
            None => 0.0,
        };

        self.distance_m += delta;
        if let Some(kmh) = fix.speed_kmh() {
            self.speed_kmh = kmh;
        }
        self.last_fix = Some(fix.clone());
        self.fixes += 1;

        delta
    }

    pub fn last_fix(&self) -> Option<&PositionFix> {
        self.last_fix.as_ref()
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_kmh
    }

    pub fn fix_count(&self) -> u64 {
        self.fixes
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use racetrack_core::{FixSource, GeoPosition};

    fn fix_at(position: GeoPosition, offset_s: i64) -> PositionFix {
        PositionFix::new(
            position.latitude,
            position.longitude,
            Utc::now() + Duration::seconds(offset_s),
            FixSource::Watch,
        )
    }

    #[test]
    fn test_first_fix_adds_nothing() {
        let mut r = TelemetryRecorder::new();
        assert_eq!(r.record(&fix_at(GeoPosition::from_degrees(40.0, -3.0), 0)), 0.0);
        assert!(r.last_fix().is_some());
        assert_eq!(r.distance_m(), 0.0);
    }

    #[test]
    fn test_hundred_meter_step() {
        let start = GeoPosition::from_degrees(40.0, -3.0);
        let mut r = TelemetryRecorder::new();
        r.record(&fix_at(start, 0));
        r.record(&fix_at(start.destination(100.0, 0.0), 30));

        assert!((r.distance_m() - 100.0).abs() < 0.5);
    }

    #[test]
    fn test_duplicate_fix_is_harmless() {
        let start = GeoPosition::from_degrees(40.0, -3.0);
        let fix = fix_at(start, 0);
        let mut r = TelemetryRecorder::new();
        r.record(&fix);
        r.record(&fix);
        r.record(&fix);

        assert_eq!(r.distance_m(), 0.0);
        assert_eq!(r.fix_count(), 3);
    }

    #[test]
    fn test_distance_never_decreases() {
        let start = GeoPosition::from_degrees(40.0, -3.0);
        let mut r = TelemetryRecorder::new();
        let mut previous = 0.0;

        // Out-of-order and back-tracking fixes included
        let offsets = [0.0, 50.0, 20.0, 20.0, 120.0, 0.0, 75.0];
        for (i, meters) in offsets.iter().enumerate() {
            r.record(&fix_at(start.destination(*meters, 90.0), i as i64));
            assert!(r.distance_m() >= previous);
            previous = r.distance_m();
        }
    }

    #[test]
    fn test_speed_taken_from_fix() {
        let mut r = TelemetryRecorder::new();
        let start = GeoPosition::from_degrees(40.0, -3.0);
        r.record(&fix_at(start, 0).with_speed(3.0));
        assert!((r.speed_kmh() - 10.8).abs() < 1e-9);

        // Fix without speed keeps the last reported value
        r.record(&fix_at(start.destination(500.0, 0.0), 1));
        assert!((r.speed_kmh() - 10.8).abs() < 1e-9);
    }
}
