//! Passive energy collectors that charge only under an active aurora.

use aurora_config::CollectorConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::region::RegionId;
use crate::state::EventStateStore;

/// Visible charge phase of a collector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargePhase {
    /// No charge stored.
    Empty,
    /// Partially charged.
    Filling,
    /// At maximum charge; further ticks do nothing.
    Full,
}

/// Errors raised by [`EnergyAccumulator::consume`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectorError {
    /// A request for zero charge.
    #[error("must consume at least one charge")]
    ZeroAmount,
    /// The collector holds less charge than requested.
    #[error("requested {requested} charge but only {available} stored")]
    Insufficient {
        /// Charge requested.
        requested: u8,
        /// Charge stored.
        available: u8,
    },
}

/// Charge state of one collector, persisted with the owning object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyAccumulator {
    charge_level: u8,
    fill_tick_counter: u32,
}

impl EnergyAccumulator {
    /// An empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// A collector restored with `charge_level` stored.
    pub fn with_charge(charge_level: u8) -> Self {
        Self {
            charge_level,
            fill_tick_counter: 0,
        }
    }

    /// Stored charge, as shown to observers.
    pub fn observable_charge(&self) -> u8 {
        self.charge_level
    }

    /// Ticks accumulated toward the next charge.
    pub fn fill_tick_counter(&self) -> u32 {
        self.fill_tick_counter
    }

    /// Phase for the given capacity.
    pub fn phase(&self, config: &CollectorConfig) -> ChargePhase {
        if self.charge_level == 0 {
            ChargePhase::Empty
        } else if self.charge_level >= config.max_charge {
            ChargePhase::Full
        } else {
            ChargePhase::Filling
        }
    }

    /// Advances the collector by one tick. Returns the new charge level when
    /// it changed.
    pub fn tick(&mut self, config: &CollectorConfig, in_zone: bool, event_active: bool) -> Option<u8> {
        if !in_zone || !event_active || self.charge_level >= config.max_charge {
            return None;
        }
        self.fill_tick_counter += 1;
        if self.fill_tick_counter < config.fill_rate_ticks {
            return None;
        }
        self.fill_tick_counter = 0;
        self.charge_level += 1;
        tracing::trace!("Collector charged to {}/{}", self.charge_level, config.max_charge);
        Some(self.charge_level)
    }

    /// [`tick`](Self::tick), reading the event flag of `region` from `store`.
    pub fn tick_in(
        &mut self,
        config: &CollectorConfig,
        store: &EventStateStore,
        region: RegionId,
        in_zone: bool,
    ) -> Option<u8> {
        self.tick(config, in_zone, store.is_active(region))
    }

    /// Removes `amount` charge. Returns the remaining charge; a request that
    /// would go below zero leaves the collector unchanged.
    pub fn consume(&mut self, amount: u8) -> Result<u8, CollectorError> {
        if amount == 0 {
            return Err(CollectorError::ZeroAmount);
        }
        let remaining =
            self.charge_level
                .checked_sub(amount)
                .ok_or(CollectorError::Insufficient {
                    requested: amount,
                    available: self.charge_level,
                })?;
        self.charge_level = remaining;
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EventState;

    fn config() -> CollectorConfig {
        CollectorConfig {
            max_charge: 4,
            fill_rate_ticks: 10,
        }
    }

    #[test]
    fn test_fills_only_while_active_and_in_zone() {
        let cfg = config();
        let mut collector = EnergyAccumulator::new();
        for _ in 0..100 {
            assert_eq!(collector.tick(&cfg, true, false), None);
            assert_eq!(collector.tick(&cfg, false, true), None);
        }
        assert_eq!(collector.fill_tick_counter(), 0);
        assert_eq!(collector.phase(&cfg), ChargePhase::Empty);
    }

    #[test]
    fn test_publishes_each_level() {
        let cfg = config();
        let mut collector = EnergyAccumulator::new();
        let mut published = Vec::new();
        for _ in 0..100 {
            if let Some(level) = collector.tick(&cfg, true, true) {
                published.push(level);
            }
        }
        assert_eq!(published, vec![1, 2, 3, 4]);
        assert_eq!(collector.phase(&cfg), ChargePhase::Full);
        assert_eq!(collector.fill_tick_counter(), 0);
    }

    #[test]
    fn test_pauses_when_event_ends() {
        let cfg = config();
        let mut collector = EnergyAccumulator::new();
        for _ in 0..5 {
            collector.tick(&cfg, true, true);
        }
        collector.tick(&cfg, true, false);
        assert_eq!(collector.fill_tick_counter(), 5);
        for _ in 0..5 {
            collector.tick(&cfg, true, true);
        }
        assert_eq!(collector.observable_charge(), 1);
        assert_eq!(collector.phase(&cfg), ChargePhase::Filling);
    }

    #[test]
    fn test_tick_in_reads_the_store() {
        let cfg = config();
        let store = EventStateStore::in_memory();
        let region = RegionId(2);
        let mut collector = EnergyAccumulator::new();
        for _ in 0..10 {
            collector.tick_in(&cfg, &store, region, true);
        }
        assert_eq!(collector.observable_charge(), 0);

        store.set(region, EventState::running(13_000, 20_000)).unwrap();
        for _ in 0..10 {
            collector.tick_in(&cfg, &store, region, true);
        }
        assert_eq!(collector.observable_charge(), 1);
    }

    #[test]
    fn test_consume_is_all_or_nothing() {
        let mut collector = EnergyAccumulator::with_charge(3);
        assert_eq!(collector.consume(2), Ok(1));
        assert_eq!(
            collector.consume(2),
            Err(CollectorError::Insufficient {
                requested: 2,
                available: 1
            })
        );
        assert_eq!(collector.observable_charge(), 1);
        assert_eq!(collector.consume(0), Err(CollectorError::ZeroAmount));
        assert_eq!(collector.consume(1), Ok(0));
    }

    #[test]
    fn test_state_persists_through_ron() {
        let cfg = config();
        let mut collector = EnergyAccumulator::with_charge(2);
        for _ in 0..3 {
            collector.tick(&cfg, true, true);
        }
        let text = ron::to_string(&collector).unwrap();
        let restored: EnergyAccumulator = ron::from_str(&text).unwrap();
        assert_eq!(restored, collector);
        assert_eq!(restored.fill_tick_counter(), 3);
    }
}
