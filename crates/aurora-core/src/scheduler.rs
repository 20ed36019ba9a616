//! The per-region aurora state machine.
//!
//! ```text
//!   Idle ──night edge, roll succeeds──▶ ArmedForRoll ──state written──▶ Active
//!    ▲                                       │ day                        │
//!    └───────────────────────────────────────┴──────── dawn / expiry ─────┘
//! ```
//!
//! [`AuroraScheduler::tick`] evaluates one region once per game tick. The
//! scheduler holds no reference to the host world; every call receives the
//! world and the random source it should use. All methods take `&self` and
//! every per-region map is concurrent, so separate regions may tick on
//! separate threads.

use std::sync::Arc;

use aurora_config::AuroraConfig;
use dashmap::DashMap;
use rand::Rng;
use thiserror::Error;

use crate::catalyst::CatalystCounter;
use crate::clock::{DayCycle, NightEdgeDetector};
use crate::population::WispSpawner;
use crate::region::{BlockPos, ObserverId, RegionId};
use crate::replication::{ReplicationChannel, Transport};
use crate::spawn::{CleanupReport, DecorationSpawner, SpawnRegistry};
use crate::state::{EventState, EventStateStore, PersistenceError, StateBackend};
use crate::world::{HostWorld, WorldQuery, qualifying_observers};

// ---------------------------------------------------------------------------
// Outcomes and errors
// ---------------------------------------------------------------------------

/// Errors surfaced from scheduler entry points. All are transient; the
/// operation is retried on the next tick.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Reading or writing the event state failed.
    #[error("persistence failed for {region}: {source}")]
    Persistence {
        /// Region whose state was involved.
        region: RegionId,
        /// Underlying backend error.
        #[source]
        source: PersistenceError,
    },
}

impl SchedulerError {
    fn persistence(region: RegionId) -> impl FnOnce(PersistenceError) -> Self {
        move |source| {
            tracing::warn!("Aurora state for {region} unavailable: {source}");
            Self::Persistence { region, source }
        }
    }
}

/// Result of a start request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// The event is now running with the given window.
    Started(EventState),
    /// Refused: it is not night in the region.
    NotNight,
    /// Refused: an event is already running.
    AlreadyActive,
}

/// Result of an end request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndOutcome {
    /// The event ended and its decorations were cleaned up.
    Ended(CleanupReport),
    /// Nothing to do: no event was running.
    NotActive,
}

/// Details of one night-edge roll.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RollOutcome {
    /// Best catalyst count around any qualifying observer.
    pub catalysts: u32,
    /// Final start chance.
    pub chance: f64,
    /// Uniform draw compared against `chance`.
    pub draw: f64,
    /// Whether the draw won.
    pub success: bool,
}

/// What happened during one [`AuroraScheduler::tick`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    /// The night threshold was crossed on this tick.
    pub night_edge: bool,
    /// The roll made at the edge, if any observer qualified.
    pub roll: Option<RollOutcome>,
    /// Window of an event started on this tick.
    pub started: Option<EventState>,
    /// Cleanup of an event ended on this tick.
    pub ended: Option<CleanupReport>,
    /// Decorations placed.
    pub decorations_placed: usize,
    /// Wisps spawned.
    pub wisps_spawned: usize,
    /// Orphaned decorations resolved after their chunk reloaded.
    pub orphans_resolved: usize,
}

// ---------------------------------------------------------------------------
// AuroraScheduler
// ---------------------------------------------------------------------------

/// Decides when the aurora starts and ends in each region and drives the
/// effects of a running event.
pub struct AuroraScheduler {
    cycle: DayCycle,
    min_duration: i64,
    max_duration: i64,
    edges: NightEdgeDetector,
    /// Regions whose roll succeeded but whose start was not persisted yet.
    armed: DashMap<RegionId, i64>,
    store: EventStateStore,
    registry: SpawnRegistry,
    replication: ReplicationChannel,
    transport: Arc<dyn Transport>,
    catalysts: CatalystCounter,
    decorations: DecorationSpawner,
    wisps: WispSpawner,
}

impl AuroraScheduler {
    /// Builds a scheduler from validated configuration.
    pub fn new(
        config: &AuroraConfig,
        backend: Box<dyn StateBackend>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            cycle: DayCycle::from_config(&config.cycle),
            min_duration: config.event.min_duration,
            max_duration: config.event.max_duration,
            edges: NightEdgeDetector::new(),
            armed: DashMap::new(),
            store: EventStateStore::new(backend),
            registry: SpawnRegistry::new(),
            replication: ReplicationChannel::new(),
            transport,
            catalysts: CatalystCounter::from_config(&config.event),
            decorations: DecorationSpawner::from_config(&config.decoration),
            wisps: WispSpawner::from_config(&config.wisp),
        }
    }

    /// The day/night cycle in use.
    pub fn cycle(&self) -> &DayCycle {
        &self.cycle
    }

    /// The event state store.
    pub fn store(&self) -> &EventStateStore {
        &self.store
    }

    /// The decoration registry.
    pub fn registry(&self) -> &SpawnRegistry {
        &self.registry
    }

    /// Observer membership used for replication.
    pub fn replication(&self) -> &ReplicationChannel {
        &self.replication
    }

    /// Evaluates `region` for one tick at `game_time`.
    pub fn tick<W, R>(
        &self,
        region: RegionId,
        game_time: i64,
        world: &mut W,
        rng: &mut R,
    ) -> Result<TickReport, SchedulerError>
    where
        W: HostWorld + ?Sized,
        R: Rng + ?Sized,
    {
        let mut report = TickReport {
            orphans_resolved: self.registry.sweep_orphans(region, world),
            ..TickReport::default()
        };

        // Read before observing the edge so a failed read does not consume it.
        let state = self
            .store
            .get(region)
            .map_err(SchedulerError::persistence(region))?;

        let time_of_day = self.cycle.time_of_day(game_time);
        report.night_edge = self.edges.observe(&self.cycle, region, time_of_day);

        if state.active {
            if self.cycle.is_night_at(time_of_day) && game_time < state.end_tick {
                self.active_tick(region, game_time, world, rng, &mut report);
                return Ok(report);
            }
            if let EndOutcome::Ended(cleanup) = self.end(region, world)? {
                report.ended = Some(cleanup);
            }
            // A coarse step may span dawn and the next night edge; the new
            // night still gets its roll below.
        }

        if report.night_edge {
            report.roll = self.try_roll(region, &*world, rng);
            if report.roll.is_some_and(|roll| roll.success) {
                self.armed.insert(region, game_time);
            }
        }

        if self.armed.contains_key(&region) {
            if !self.cycle.is_night_at(time_of_day) {
                tracing::debug!("Dropping armed start for {region}: night is over");
                self.armed.remove(&region);
            } else if let StartOutcome::Started(started) = self.start(region, game_time, None, rng)? {
                report.started = Some(started);
            }
        }

        Ok(report)
    }

    /// Rolls for an event in `region`. Returns `None` without drawing when no
    /// eligible observer stands in a qualifying zone.
    pub fn try_roll<W, R>(&self, region: RegionId, world: &W, rng: &mut R) -> Option<RollOutcome>
    where
        W: WorldQuery + ?Sized,
        R: Rng + ?Sized,
    {
        let observers = qualifying_observers(world, region);
        if observers.is_empty() {
            tracing::debug!("Night edge in {region}: no qualifying observers, skipping roll");
            return None;
        }
        let catalysts = self.catalysts.count(world, region, &observers);
        let chance = self.catalysts.chance(catalysts);
        let draw = rng.random::<f64>();
        let success = self.catalysts.roll_succeeds(catalysts, draw);
        tracing::debug!(
            "Aurora roll in {region}: catalysts={catalysts} chance={chance:.2} draw={draw:.3} success={success}"
        );
        Some(RollOutcome {
            catalysts,
            chance,
            draw,
            success,
        })
    }

    /// Starts the event in `region` at `game_time`.
    ///
    /// Without an explicit `duration` one is drawn uniformly from the
    /// configured range. Either way the window is clamped to `max_duration`
    /// and to the next dawn.
    pub fn start<R: Rng + ?Sized>(
        &self,
        region: RegionId,
        game_time: i64,
        duration: Option<i64>,
        rng: &mut R,
    ) -> Result<StartOutcome, SchedulerError> {
        if !self.cycle.is_night(game_time) {
            return Ok(StartOutcome::NotNight);
        }
        let current = self
            .store
            .get(region)
            .map_err(SchedulerError::persistence(region))?;
        if current.active {
            self.armed.remove(&region);
            return Ok(StartOutcome::AlreadyActive);
        }

        let requested = match duration {
            Some(ticks) => ticks.clamp(1, self.max_duration),
            None => rng.random_range(self.min_duration..=self.max_duration),
        };
        let duration = requested.min(self.cycle.ticks_until_dawn(game_time));
        let state = EventState::running(game_time, game_time + duration);

        self.store
            .set(region, state)
            .map_err(SchedulerError::persistence(region))?;
        self.armed.remove(&region);
        self.replication
            .broadcast(region, true, self.transport.as_ref());
        tracing::info!(
            "Aurora started in {region} at {game_time}, ends at {} ({duration} ticks)",
            state.end_tick
        );
        Ok(StartOutcome::Started(state))
    }

    /// Operator-initiated start; see [`start`](Self::start).
    pub fn force_start<R: Rng + ?Sized>(
        &self,
        region: RegionId,
        game_time: i64,
        duration: Option<i64>,
        rng: &mut R,
    ) -> Result<StartOutcome, SchedulerError> {
        let outcome = self.start(region, game_time, duration, rng)?;
        tracing::info!("Forced start in {region}: {outcome:?}");
        Ok(outcome)
    }

    /// Ends the event in `region`, removes its decorations, and notifies
    /// observers. Ending an inactive region changes nothing.
    pub fn end<W: HostWorld + ?Sized>(
        &self,
        region: RegionId,
        world: &mut W,
    ) -> Result<EndOutcome, SchedulerError> {
        let current = self
            .store
            .get(region)
            .map_err(SchedulerError::persistence(region))?;
        if !current.active {
            return Ok(EndOutcome::NotActive);
        }

        self.store
            .set(region, EventState::INACTIVE)
            .map_err(SchedulerError::persistence(region))?;
        let cleanup = self.registry.cleanup(region, world);
        self.replication
            .broadcast(region, false, self.transport.as_ref());
        tracing::info!(
            "Aurora ended in {region}: visited {} positions, removed {} decorations ({} stale, {} deferred)",
            cleanup.visited(),
            cleanup.removed,
            cleanup.stale,
            cleanup.deferred.len()
        );
        Ok(EndOutcome::Ended(cleanup))
    }

    /// Operator-initiated end; see [`end`](Self::end).
    pub fn force_end<W: HostWorld + ?Sized>(
        &self,
        region: RegionId,
        world: &mut W,
    ) -> Result<EndOutcome, SchedulerError> {
        self.armed.remove(&region);
        self.end(region, world)
    }

    /// Current state of `region`.
    pub fn query_state(&self, region: RegionId) -> Result<EventState, SchedulerError> {
        self.store
            .get(region)
            .map_err(SchedulerError::persistence(region))
    }

    /// Reports that a tracked decoration was consumed or destroyed by
    /// something other than the scheduler.
    pub fn on_decoration_removed(&self, region: RegionId, pos: BlockPos) -> bool {
        self.registry.untrack(region, pos)
    }

    // -- Replication membership --

    /// An observer connected into `region`.
    pub fn on_join(&self, observer: ObserverId, region: RegionId) -> bool {
        self.replication
            .on_join(observer, region, &self.store, self.transport.as_ref())
    }

    /// An observer respawned into `region`.
    pub fn on_respawn(&self, observer: ObserverId, region: RegionId) -> bool {
        self.replication
            .on_respawn(observer, region, &self.store, self.transport.as_ref())
    }

    /// An observer moved to region `to`.
    pub fn on_region_change(&self, observer: ObserverId, to: RegionId) -> bool {
        self.replication
            .on_region_change(observer, to, &self.store, self.transport.as_ref())
    }

    /// An observer disconnected.
    pub fn on_leave(&self, observer: ObserverId) -> Option<RegionId> {
        self.replication.on_leave(observer)
    }

    /// Re-sends the current flag to one observer.
    pub fn sync_one(&self, observer: ObserverId) -> bool {
        self.replication
            .sync_one(observer, &self.store, self.transport.as_ref())
    }

    // -- Internals --

    fn active_tick<W, R>(
        &self,
        region: RegionId,
        game_time: i64,
        world: &mut W,
        rng: &mut R,
        report: &mut TickReport,
    ) where
        W: HostWorld + ?Sized,
        R: Rng + ?Sized,
    {
        let decorate = self.decorations.is_spawn_tick(game_time);
        let populate = self.wisps.is_spawn_tick(game_time);
        if !decorate && !populate {
            return;
        }

        let observers = qualifying_observers(&*world, region);
        if decorate {
            report.decorations_placed =
                self.decorations
                    .spawn_pass(region, &observers, world, &self.registry, rng);
        }
        if populate {
            report.wisps_spawned = self.wisps.spawn_pass(region, &observers, world, rng).len();
        }
    }
}

impl std::fmt::Debug for AuroraScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuroraScheduler")
            .field("cycle", &self.cycle)
            .field("store", &self.store)
            .field("armed", &self.armed.len())
            .finish_non_exhaustive()
    }
}
