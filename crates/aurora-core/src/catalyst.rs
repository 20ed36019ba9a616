//! Catalyst scanning and roll-chance arithmetic.

use aurora_config::EventConfig;

use crate::region::{Observer, RegionId};
use crate::world::WorldQuery;

/// Turns nearby catalyst structures into a bonus on the event chance.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalystCounter {
    base_chance: f64,
    per_catalyst_bonus: f64,
    bonus_cap: f64,
    chance_cap: f64,
    radius: u32,
}

impl CatalystCounter {
    /// Builds the counter from validated configuration.
    pub fn from_config(config: &EventConfig) -> Self {
        Self {
            base_chance: config.base_chance,
            per_catalyst_bonus: config.per_catalyst_bonus,
            bonus_cap: config.bonus_cap,
            chance_cap: config.chance_cap,
            radius: config.catalyst_radius,
        }
    }

    /// Largest catalyst count found around any single observer.
    pub fn count<W: WorldQuery + ?Sized>(
        &self,
        world: &W,
        region: RegionId,
        observers: &[Observer],
    ) -> u32 {
        observers
            .iter()
            .map(|o| world.count_nearby_catalysts(region, o.position, self.radius))
            .max()
            .unwrap_or(0)
    }

    /// `min(count * per_catalyst_bonus, bonus_cap)`.
    pub fn bonus(&self, catalysts: u32) -> f64 {
        (f64::from(catalysts) * self.per_catalyst_bonus).min(self.bonus_cap)
    }

    /// `min(base_chance + bonus, chance_cap)`.
    pub fn chance(&self, catalysts: u32) -> f64 {
        (self.base_chance + self.bonus(catalysts)).min(self.chance_cap)
    }

    /// Whether a uniform draw in `[0, 1)` starts the event.
    pub fn roll_succeeds(&self, catalysts: u32, draw: f64) -> bool {
        draw < self.chance(catalysts)
    }
}
