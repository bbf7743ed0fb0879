//! Battery-aware sampling frequency

use std::time::Duration;

/// Outcome of feeding one battery reading to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyDecision {
    pub interval: Duration,
    pub conservation: bool,
    /// Set only on the reading that crossed below the threshold
    pub advisory: bool,
}

/// Chooses the effective sampling interval from the configured base
/// frequency and the battery level.
///
/// Below the threshold the conservation interval overrides the base one.
/// The advisory is edge-triggered and re-arms once the battery is back at
/// or above the threshold. An unknown level leaves the mode unchanged.
#[derive(Debug, Clone)]
pub struct FrequencyController {
    base: Duration,
    conservation_interval: Duration,
    threshold: u8,
    low: bool,
    last_level: Option<u8>,
}

impl FrequencyController {
    pub fn new(base: Duration, conservation_interval: Duration, threshold: u8) -> Self {
        Self {
            base,
            conservation_interval,
            threshold,
            low: false,
            last_level: None,
        }
    }

    pub fn update(&mut self, level: Option<u8>) -> FrequencyDecision {
        let mut advisory = false;

        if let Some(level) = level {
            let level = level.min(100);
            let is_low = level < self.threshold;
            advisory = is_low && !self.low;
            self.low = is_low;
            self.last_level = Some(level);
        }

        FrequencyDecision {
            interval: self.effective_interval(),
            conservation: self.low,
            advisory,
        }
    }

    pub fn effective_interval(&self) -> Duration {
        if self.low {
            self.conservation_interval
        } else {
            self.base
        }
    }

    pub fn is_conservation(&self) -> bool {
        self.low
    }

    pub fn last_level(&self) -> Option<u8> {
        self.last_level
    }

    pub fn base(&self) -> Duration {
        self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> FrequencyController {
        FrequencyController::new(Duration::from_secs(10), Duration::from_secs(60), 20)
    }

    #[test]
    fn test_base_interval_when_charged() {
        let mut c = controller();
        let d = c.update(Some(80));
        assert_eq!(d.interval, Duration::from_secs(10));
        assert!(!d.conservation);
        assert!(!d.advisory);
    }

    #[test]
    fn test_drop_below_threshold_fires_once() {
        let mut c = controller();
        assert!(!c.update(Some(25)).advisory);

        let d = c.update(Some(15));
        assert_eq!(d.interval, Duration::from_secs(60));
        assert!(d.conservation);
        assert!(d.advisory);

        let advisories = (0..10)
            .map(|i| c.update(Some(14 - i)))
            .filter(|d| d.advisory)
            .count();
        assert_eq!(advisories, 0);
        assert_eq!(c.effective_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_starting_low_uses_conservation_immediately() {
        let mut c = controller();
        let d = c.update(Some(18));
        assert_eq!(d.interval, Duration::from_secs(60));
        assert!(d.advisory);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut c = controller();
        assert!(!c.update(Some(20)).conservation);
        assert!(c.update(Some(19)).conservation);
    }

    #[test]
    fn test_rearms_after_charging() {
        let mut c = controller();
        assert!(c.update(Some(10)).advisory);
        assert!(!c.update(Some(30)).conservation);
        assert!(c.update(Some(19)).advisory);
    }

    #[test]
    fn test_unknown_level_keeps_mode() {
        let mut c = controller();
        c.update(Some(10));
        let d = c.update(None);
        assert!(d.conservation);
        assert!(!d.advisory);
        assert_eq!(c.last_level(), Some(10));

        let mut fresh = controller();
        assert!(!fresh.update(None).conservation);
    }
}
