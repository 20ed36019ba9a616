//! Population-capped wisp spawning and the wisp despawn timer.

use aurora_config::WispConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::region::{BlockPos, Observer, RegionId};
use crate::world::{HostWorld, ObjectKind, WispAppearance};

// ---------------------------------------------------------------------------
// PopulationCapGuard
// ---------------------------------------------------------------------------

/// Bounds live wisps to a fixed number per observer in the region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PopulationCapGuard {
    per_observer_cap: u32,
}

impl PopulationCapGuard {
    /// Creates a guard allowing `per_observer_cap` wisps per observer.
    pub fn new(per_observer_cap: u32) -> Self {
        Self { per_observer_cap }
    }

    /// Maximum live wisps for `observers` observers.
    pub fn cap(&self, observers: usize) -> usize {
        observers.saturating_mul(self.per_observer_cap as usize)
    }

    /// Whether another wisp fits.
    pub fn has_room(&self, live: usize, observers: usize) -> bool {
        live < self.cap(observers)
    }
}

// ---------------------------------------------------------------------------
// WispSpawner
// ---------------------------------------------------------------------------

/// A wisp placed during one spawning pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnedWisp {
    /// Where it was placed.
    pub position: BlockPos,
    /// Cosmetic variance applied to it.
    pub appearance: WispAppearance,
}

/// Interval-driven, population-capped wisp placement around observers.
#[derive(Clone, Debug, PartialEq)]
pub struct WispSpawner {
    interval: u32,
    chance: f64,
    placement_attempts: u32,
    min_distance: i32,
    max_distance: i32,
    guard: PopulationCapGuard,
}

impl WispSpawner {
    /// Builds the spawner from validated configuration.
    pub fn from_config(config: &WispConfig) -> Self {
        Self {
            interval: config.interval.max(1),
            chance: config.chance,
            placement_attempts: config.placement_attempts,
            min_distance: config.min_distance,
            max_distance: config.max_distance,
            guard: PopulationCapGuard::new(config.per_observer_cap),
        }
    }

    /// Whether spawning runs on this tick.
    pub fn is_spawn_tick(&self, game_time: i64) -> bool {
        game_time.rem_euclid(i64::from(self.interval)) == 0
    }

    /// Runs one spawning pass for `qualifying` observers. The cap is derived
    /// from every observer in the region, and the pass stops as soon as it is
    /// reached.
    pub fn spawn_pass<W, R>(
        &self,
        region: RegionId,
        qualifying: &[Observer],
        world: &mut W,
        rng: &mut R,
    ) -> Vec<SpawnedWisp>
    where
        W: HostWorld + ?Sized,
        R: Rng + ?Sized,
    {
        let observers = world.observers_in(region).len();
        let mut live = world.count_live_by_kind(region, ObjectKind::Wisp);
        let mut spawned = Vec::new();

        if !self.guard.has_room(live, observers) {
            tracing::trace!("Wisp cap reached in {region}: {live}/{}", self.guard.cap(observers));
            return spawned;
        }

        for observer in qualifying {
            if !self.guard.has_room(live, observers) {
                break;
            }
            if rng.random::<f64>() >= self.chance {
                continue;
            }
            if let Some(wisp) = self.try_spawn_near(region, observer.position, world, rng) {
                live += 1;
                spawned.push(wisp);
            }
        }

        if !spawned.is_empty() {
            tracing::debug!("Spawned {} wisps in {region} ({live} live)", spawned.len());
        }
        spawned
    }

    fn try_spawn_near<W, R>(
        &self,
        region: RegionId,
        origin: BlockPos,
        world: &mut W,
        rng: &mut R,
    ) -> Option<SpawnedWisp>
    where
        W: HostWorld + ?Sized,
        R: Rng + ?Sized,
    {
        for _ in 0..self.placement_attempts {
            let pos = self.candidate(origin, rng);
            if !world.can_place(region, pos, ObjectKind::Wisp) {
                continue;
            }
            match world.place(region, pos, ObjectKind::Wisp) {
                Ok(handle) => {
                    let appearance = random_appearance(rng);
                    world.set_appearance(region, handle, appearance);
                    return Some(SpawnedWisp {
                        position: pos,
                        appearance,
                    });
                }
                Err(err) => tracing::debug!("Wisp placement at {pos} failed: {err}"),
            }
        }
        None
    }

    /// A position on the ring `[min_distance, max_distance]` around `origin`.
    fn candidate<R: Rng + ?Sized>(&self, origin: BlockPos, rng: &mut R) -> BlockPos {
        let distance = f64::from(rng.random_range(self.min_distance..=self.max_distance));
        let angle = rng.random::<f64>() * std::f64::consts::TAU;
        origin.offset(
            (angle.cos() * distance).round() as i32,
            0,
            (angle.sin() * distance).round() as i32,
        )
    }
}

/// Rolls cosmetic variance for a new wisp.
pub fn random_appearance<R: Rng + ?Sized>(rng: &mut R) -> WispAppearance {
    WispAppearance {
        hue: rng.random_range(0.0..360.0),
        scale: rng.random_range(0.8..1.2),
    }
}

// ---------------------------------------------------------------------------
// ActorLifetime
// ---------------------------------------------------------------------------

/// Result of advancing an [`ActorLifetime`] by one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifetimeStep {
    /// The actor stays.
    Keep,
    /// The actor should be despawned.
    Expire,
}

/// Inactivity timer carried by each wisp.
///
/// Counts ticks spent while the region's event is not active and expires at
/// `despawn_delay`. Claimed wisps never expire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorLifetime {
    inactive_ticks: u32,
    despawn_delay: u32,
    claimed: bool,
}

impl ActorLifetime {
    /// A fresh, unclaimed lifetime.
    pub fn new(despawn_delay: u32) -> Self {
        Self {
            inactive_ticks: 0,
            despawn_delay,
            claimed: false,
        }
    }

    /// Marks the actor as owned by an observer.
    pub fn claim(&mut self) {
        self.claimed = true;
        self.inactive_ticks = 0;
    }

    /// Whether the actor has been claimed.
    pub fn is_claimed(&self) -> bool {
        self.claimed
    }

    /// Ticks spent without an active event.
    pub fn inactive_ticks(&self) -> u32 {
        self.inactive_ticks
    }

    /// Advances the timer by one tick.
    pub fn tick(&mut self, event_active: bool) -> LifetimeStep {
        if self.claimed {
            return LifetimeStep::Keep;
        }
        if event_active {
            self.inactive_ticks = 0;
            return LifetimeStep::Keep;
        }
        self.inactive_ticks = self.inactive_ticks.saturating_add(1);
        if self.inactive_ticks >= self.despawn_delay {
            LifetimeStep::Expire
        } else {
            LifetimeStep::Keep
        }
    }
}
