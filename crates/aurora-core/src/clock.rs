//! Day/night cycle arithmetic and the per-region night-edge detector.
//!
//! Game time is a monotonically increasing tick counter; time of day is its
//! Euclidean remainder over the cycle length. Night is the half-open window
//! `[night_start, dawn)`.

use aurora_config::CycleConfig;
use dashmap::DashMap;

use crate::region::RegionId;

/// Day/night cycle boundaries, in ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DayCycle {
    /// Length of one full cycle.
    pub cycle_length: i64,
    /// First tick of night within a cycle.
    pub night_start: i64,
    /// First tick after night within a cycle.
    pub dawn: i64,
}

impl DayCycle {
    /// Builds the cycle from validated configuration.
    pub fn from_config(config: &CycleConfig) -> Self {
        Self {
            cycle_length: config.cycle_length,
            night_start: config.night_start,
            dawn: config.dawn,
        }
    }

    /// Time of day for an absolute game time.
    pub fn time_of_day(&self, game_time: i64) -> i64 {
        game_time.rem_euclid(self.cycle_length)
    }

    /// Whether the given time of day falls inside the night window.
    pub fn is_night_at(&self, time_of_day: i64) -> bool {
        time_of_day >= self.night_start && time_of_day < self.dawn
    }

    /// Whether `game_time` is at night.
    pub fn is_night(&self, game_time: i64) -> bool {
        self.is_night_at(self.time_of_day(game_time))
    }

    /// Ticks remaining until the next dawn boundary. Zero outside the night
    /// window, since an event may not start then.
    pub fn ticks_until_dawn(&self, game_time: i64) -> i64 {
        let tod = self.time_of_day(game_time);
        if self.is_night_at(tod) {
            self.dawn - tod
        } else {
            0
        }
    }

    /// Whether the threshold into night was crossed between two observed
    /// times of day.
    ///
    /// A plain rising edge is `last < night_start <= current`. If the day
    /// wrapped between the two observations (`current < last`) and we are
    /// already past `night_start`, the threshold was also crossed exactly
    /// once.
    pub fn crossed_into_night(&self, last: i64, current: i64) -> bool {
        let rising = last < self.night_start && self.night_start <= current;
        let wrapped = current < last && current >= self.night_start;
        rising || wrapped
    }
}

impl Default for DayCycle {
    fn default() -> Self {
        Self::from_config(&CycleConfig::default())
    }
}

/// Remembers the last observed time of day per region and reports the
/// night edge once per cycle.
///
/// Records are transient: they are seeded on first observation without
/// reporting an edge.
#[derive(Debug, Default)]
pub struct NightEdgeDetector {
    last_time_of_day: DashMap<RegionId, i64>,
}

impl NightEdgeDetector {
    /// Creates an empty detector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `current` as the latest time of day for `region` and returns
    /// `true` if the night threshold was crossed since the last observation.
    pub fn observe(&self, cycle: &DayCycle, region: RegionId, current: i64) -> bool {
        let mut entry = self.last_time_of_day.entry(region).or_insert(current);
        let last = *entry;
        *entry = current;
        cycle.crossed_into_night(last, current)
    }

    /// Last recorded time of day for `region`, if any.
    pub fn last_observed(&self, region: RegionId) -> Option<i64> {
        self.last_time_of_day.get(&region).map(|v| *v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: RegionId = RegionId(0);

    #[test]
    fn test_time_of_day_wraps() {
        let cycle = DayCycle::default();
        assert_eq!(cycle.time_of_day(24_000 * 3 + 13_500), 13_500);
        assert_eq!(cycle.time_of_day(-1), 23_999);
    }

    #[test]
    fn test_night_window_is_half_open() {
        let cycle = DayCycle::default();
        assert!(!cycle.is_night(12_999));
        assert!(cycle.is_night(13_000));
        assert!(cycle.is_night(22_999));
        assert!(!cycle.is_night(23_000));
    }

    #[test]
    fn test_ticks_until_dawn() {
        let cycle = DayCycle::default();
        assert_eq!(cycle.ticks_until_dawn(20_000), 3_000);
        assert_eq!(cycle.ticks_until_dawn(24_000 + 13_000), 10_000);
        assert_eq!(cycle.ticks_until_dawn(5_000), 0);
    }

    #[test]
    fn test_first_observation_never_fires() {
        let cycle = DayCycle::default();
        let detector = NightEdgeDetector::new();
        assert!(!detector.observe(&cycle, R, 13_000));
        assert_eq!(detector.last_observed(R), Some(13_000));
    }

    #[test]
    fn test_edge_fires_once_per_crossing_at_every_granularity() {
        let cycle = DayCycle::default();
        for step in [1_i64, 7, 20, 333, 1_000, 5_000] {
            let detector = NightEdgeDetector::new();
            let mut fired = 0;
            let mut t = 1_000;
            // Start at morning, run until just before the next night.
            while t < 24_000 + 12_000 {
                if detector.observe(&cycle, R, cycle.time_of_day(t)) {
                    fired += 1;
                }
                t += step;
            }
            assert_eq!(fired, 1, "step {step} fired {fired} times");
        }
    }

    #[test]
    fn test_no_refire_while_level_is_night() {
        let cycle = DayCycle::default();
        let detector = NightEdgeDetector::new();
        detector.observe(&cycle, R, 12_999);
        assert!(detector.observe(&cycle, R, 13_000));
        for tod in 13_001..13_100 {
            assert!(!detector.observe(&cycle, R, tod));
        }
    }

    #[test]
    fn test_wrapped_observation_counts_as_crossing() {
        let cycle = DayCycle::default();
        let detector = NightEdgeDetector::new();
        detector.observe(&cycle, R, 23_500);
        assert!(detector.observe(&cycle, R, 14_000));
    }

    #[test]
    fn test_regions_are_independent() {
        let cycle = DayCycle::default();
        let detector = NightEdgeDetector::new();
        let other = RegionId(1);
        detector.observe(&cycle, R, 12_000);
        detector.observe(&cycle, other, 14_000);
        assert!(detector.observe(&cycle, R, 13_500));
        assert!(!detector.observe(&cycle, other, 14_500));
    }
}
