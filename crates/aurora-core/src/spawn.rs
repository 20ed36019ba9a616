//! Decoration spawning and the per-region registry of tracked positions.
//!
//! Every decoration the scheduler places is recorded in [`SpawnRegistry`],
//! so ending an event walks exactly the placed positions once instead of
//! re-scanning the volume around every observer.

use aurora_config::DecorationConfig;
use dashmap::DashMap;
use rand::Rng;
use rustc_hash::FxHashSet;

use crate::region::{BlockPos, Observer, RegionId};
use crate::world::{DecorationKind, HostWorld, ObjectHandle, ObjectKind, WorldQuery};

// ---------------------------------------------------------------------------
// SpawnRegistry
// ---------------------------------------------------------------------------

/// Outcome of one bulk cleanup pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Decorations destroyed.
    pub removed: usize,
    /// Tracked positions that no longer held a decoration.
    pub stale: usize,
    /// Tracked positions in unloaded chunks, moved to the orphan set.
    pub deferred: Vec<BlockPos>,
}

impl CleanupReport {
    /// Total positions visited.
    pub fn visited(&self) -> usize {
        self.removed + self.stale + self.deferred.len()
    }
}

/// Per-region sets of decoration positions placed by the scheduler.
///
/// `tracked` holds decorations of the running event. `orphaned` holds
/// positions whose chunk was unloaded when the event ended; they are removed
/// as soon as the chunk is loaded again.
#[derive(Debug, Default)]
pub struct SpawnRegistry {
    tracked: DashMap<RegionId, FxHashSet<BlockPos>>,
    orphaned: DashMap<RegionId, FxHashSet<BlockPos>>,
}

impl SpawnRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `pos`. Returns `false` if it was already tracked.
    pub fn track(&self, region: RegionId, pos: BlockPos) -> bool {
        self.tracked.entry(region).or_default().insert(pos)
    }

    /// Stops tracking `pos` (consumed or destroyed by someone else).
    /// Returns `true` if the position was tracked or orphaned.
    pub fn untrack(&self, region: RegionId, pos: BlockPos) -> bool {
        let from_tracked = self
            .tracked
            .get_mut(&region)
            .is_some_and(|mut set| set.remove(&pos));
        let from_orphans = self
            .orphaned
            .get_mut(&region)
            .is_some_and(|mut set| set.remove(&pos));
        from_tracked || from_orphans
    }

    /// Whether `pos` is tracked for the running event.
    pub fn is_tracked(&self, region: RegionId, pos: BlockPos) -> bool {
        self.tracked
            .get(&region)
            .is_some_and(|set| set.contains(&pos))
    }

    /// Number of tracked positions in `region`.
    pub fn tracked_count(&self, region: RegionId) -> usize {
        self.tracked.get(&region).map_or(0, |set| set.len())
    }

    /// Number of orphaned positions awaiting a chunk load in `region`.
    pub fn orphan_count(&self, region: RegionId) -> usize {
        self.orphaned.get(&region).map_or(0, |set| set.len())
    }

    /// Snapshot of the tracked positions in `region`.
    pub fn tracked_positions(&self, region: RegionId) -> Vec<BlockPos> {
        self.tracked
            .get(&region)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Removes every tracked decoration in `region` in one pass and leaves
    /// the tracked set empty.
    pub fn cleanup<W: HostWorld + ?Sized>(&self, region: RegionId, world: &mut W) -> CleanupReport {
        let positions = self
            .tracked
            .remove(&region)
            .map(|(_, set)| set)
            .unwrap_or_default();

        let mut report = CleanupReport::default();
        for pos in positions {
            if !world.is_loaded(region, pos) {
                tracing::warn!("Decoration at {pos} in {region} is unloaded, deferring removal");
                report.deferred.push(pos);
                continue;
            }
            match world.object_at(region, pos) {
                Some(kind) if kind.is_decoration() => {
                    if world.destroy(region, ObjectHandle::Block(pos), false) {
                        report.removed += 1;
                    } else {
                        report.stale += 1;
                    }
                }
                _ => report.stale += 1,
            }
        }

        if !report.deferred.is_empty() {
            self.orphaned
                .entry(region)
                .or_default()
                .extend(report.deferred.iter().copied());
        }

        tracing::debug!(
            "Cleanup in {region}: removed={} stale={} deferred={}",
            report.removed,
            report.stale,
            report.deferred.len()
        );
        report
    }

    /// Removes orphaned decorations whose chunk is loaded again. Returns the
    /// number of positions resolved.
    pub fn sweep_orphans<W: HostWorld + ?Sized>(&self, region: RegionId, world: &mut W) -> usize {
        let Some((_, orphans)) = self.orphaned.remove(&region) else {
            return 0;
        };

        let mut pending = FxHashSet::default();
        let mut resolved = 0;
        for pos in orphans {
            if !world.is_loaded(region, pos) {
                pending.insert(pos);
                continue;
            }
            if world.object_at(region, pos).is_some_and(ObjectKind::is_decoration) {
                world.destroy(region, ObjectHandle::Block(pos), false);
            }
            resolved += 1;
        }

        if !pending.is_empty() {
            self.orphaned.entry(region).or_default().extend(pending);
        }
        if resolved > 0 {
            tracing::debug!("Resolved {resolved} orphaned decorations in {region}");
        }
        resolved
    }
}

// ---------------------------------------------------------------------------
// DecorationSpawner
// ---------------------------------------------------------------------------

/// Interval-driven, per-observer decoration placement.
#[derive(Clone, Debug, PartialEq)]
pub struct DecorationSpawner {
    interval: u32,
    chance: f64,
    placement_attempts: u32,
    horizontal_radius: i32,
    vertical_radius: i32,
}

impl DecorationSpawner {
    /// Builds the spawner from validated configuration.
    pub fn from_config(config: &DecorationConfig) -> Self {
        Self {
            interval: config.interval.max(1),
            chance: config.chance,
            placement_attempts: config.placement_attempts,
            horizontal_radius: config.horizontal_radius,
            vertical_radius: config.vertical_radius,
        }
    }

    /// Whether spawning runs on this tick.
    pub fn is_spawn_tick(&self, game_time: i64) -> bool {
        game_time.rem_euclid(i64::from(self.interval)) == 0
    }

    /// Runs one spawning pass over `observers`. Returns the number of
    /// decorations placed (at most one per observer).
    pub fn spawn_pass<W, R>(
        &self,
        region: RegionId,
        observers: &[Observer],
        world: &mut W,
        registry: &SpawnRegistry,
        rng: &mut R,
    ) -> usize
    where
        W: HostWorld + ?Sized,
        R: Rng + ?Sized,
    {
        let mut placed = 0;
        for observer in observers {
            if rng.random::<f64>() >= self.chance {
                continue;
            }
            if let Some(pos) = self.try_spawn_near(region, observer, world, registry, rng) {
                tracing::trace!("Placed decoration at {pos} near {}", observer.id);
                placed += 1;
            }
        }
        placed
    }

    /// Tries up to `placement_attempts` random offsets around `observer` and
    /// places a decoration at the first suitable one.
    pub fn try_spawn_near<W, R>(
        &self,
        region: RegionId,
        observer: &Observer,
        world: &mut W,
        registry: &SpawnRegistry,
        rng: &mut R,
    ) -> Option<BlockPos>
    where
        W: HostWorld + ?Sized,
        R: Rng + ?Sized,
    {
        let kind = ObjectKind::Decoration(
            DecorationKind::ALL[rng.random_range(0..DecorationKind::ALL.len())],
        );
        for _ in 0..self.placement_attempts {
            let pos = observer.position.offset(
                rng.random_range(-self.horizontal_radius..=self.horizontal_radius),
                rng.random_range(-self.vertical_radius..=self.vertical_radius),
                rng.random_range(-self.horizontal_radius..=self.horizontal_radius),
            );
            if !world.can_place(region, pos, kind) {
                continue;
            }
            match world.place(region, pos, kind) {
                Ok(_) => {
                    registry.track(region, pos);
                    return Some(pos);
                }
                Err(err) => tracing::debug!("Decoration placement at {pos} failed: {err}"),
            }
        }
        None
    }
}

/// Whether any tracked position of `region` still holds an object in
/// `world`.
pub fn any_tracked_decoration_left<W: HostWorld + ?Sized>(
    registry: &SpawnRegistry,
    region: RegionId,
    world: &W,
) -> bool {
    registry
        .tracked_positions(region)
        .into_iter()
        .any(|pos| WorldQuery::is_loaded(world, region, pos) && world.object_at(region, pos).is_some())
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::region::ChunkPos;
    use crate::testutil::FakeWorld;
    use crate::world::ObjectLifecycle;

    const R: RegionId = RegionId(0);

    fn always() -> DecorationSpawner {
        DecorationSpawner::from_config(&DecorationConfig {
            chance: 1.0,
            ..DecorationConfig::default()
        })
    }

    fn place_tracked(world: &mut FakeWorld, registry: &SpawnRegistry, pos: BlockPos) {
        world
            .place(R, pos, ObjectKind::Decoration(DecorationKind::Glimmer))
            .unwrap();
        registry.track(R, pos);
    }

    #[test]
    fn test_track_and_untrack() {
        let registry = SpawnRegistry::new();
        let pos = BlockPos::new(1, 64, 1);
        assert!(registry.track(R, pos));
        assert!(!registry.track(R, pos));
        assert!(registry.is_tracked(R, pos));
        assert!(registry.untrack(R, pos));
        assert!(!registry.untrack(R, pos));
        assert_eq!(registry.tracked_count(R), 0);
    }

    #[test]
    fn test_cleanup_removes_everything_and_empties_set() {
        let mut world = FakeWorld::new();
        let registry = SpawnRegistry::new();
        for x in 0..50 {
            place_tracked(&mut world, &registry, BlockPos::new(x, 64, 0));
        }

        let report = registry.cleanup(R, &mut world);
        assert_eq!(report.removed, 50);
        assert_eq!(report.stale, 0);
        assert_eq!(registry.tracked_count(R), 0);
        assert_eq!(world.decoration_count(R), 0);
        assert_eq!(world.effects.len(), 50);
    }

    #[test]
    fn test_cleanup_skips_replaced_blocks() {
        let mut world = FakeWorld::new();
        let registry = SpawnRegistry::new();
        let pos = BlockPos::new(3, 64, 3);
        place_tracked(&mut world, &registry, pos);
        // An observer picked it and built something else there.
        world.decorations.remove(&(R, pos));
        world.foreign_blocks.insert((R, pos));

        let report = registry.cleanup(R, &mut world);
        assert_eq!(report.removed, 0);
        assert_eq!(report.stale, 1);
        assert!(world.foreign_blocks.contains(&(R, pos)));
    }

    #[test]
    fn test_unloaded_positions_become_orphans_then_resolve() {
        let mut world = FakeWorld::new();
        let registry = SpawnRegistry::new();
        let far = BlockPos::new(100, 64, 100);
        let near = BlockPos::new(1, 64, 1);
        place_tracked(&mut world, &registry, far);
        place_tracked(&mut world, &registry, near);
        world.unloaded.insert(far.chunk());

        let report = registry.cleanup(R, &mut world);
        assert_eq!(report.removed, 1);
        assert_eq!(report.deferred, vec![far]);
        assert_eq!(registry.tracked_count(R), 0);
        assert_eq!(registry.orphan_count(R), 1);

        // Still unloaded: nothing happens.
        assert_eq!(registry.sweep_orphans(R, &mut world), 0);
        assert_eq!(registry.orphan_count(R), 1);

        world.unloaded.remove(&ChunkPos { x: 6, z: 6 });
        assert_eq!(registry.sweep_orphans(R, &mut world), 1);
        assert_eq!(registry.orphan_count(R), 0);
        assert!(world.object_at(R, far).is_none());
    }

    #[test]
    fn test_cleanup_only_touches_its_region() {
        let mut world = FakeWorld::new();
        let registry = SpawnRegistry::new();
        let other = RegionId(9);
        place_tracked(&mut world, &registry, BlockPos::new(0, 64, 0));
        world
            .place(other, BlockPos::new(0, 64, 0), ObjectKind::Decoration(DecorationKind::Starshard))
            .unwrap();
        registry.track(other, BlockPos::new(0, 64, 0));

        registry.cleanup(R, &mut world);
        assert_eq!(registry.tracked_count(other), 1);
        assert_eq!(world.decoration_count(other), 1);
    }

    #[test]
    fn test_spawn_places_at_most_one_per_observer() {
        let mut world = FakeWorld::new();
        let registry = SpawnRegistry::new();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let observers = [
            Observer::new(crate::region::ObserverId(1), BlockPos::new(0, 64, 0)),
            Observer::new(crate::region::ObserverId(2), BlockPos::new(200, 64, 0)),
        ];

        let placed = always().spawn_pass(R, &observers, &mut world, &registry, &mut rng);
        assert_eq!(placed, 2);
        assert_eq!(registry.tracked_count(R), 2);
        assert_eq!(world.decoration_count(R), 2);
    }

    #[test]
    fn test_spawn_respects_radius() {
        let mut world = FakeWorld::new();
        let registry = SpawnRegistry::new();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let center = BlockPos::new(50, 64, -50);
        let observer = Observer::new(crate::region::ObserverId(1), center);
        let spawner = always();
        for _ in 0..30 {
            spawner.spawn_pass(R, &[observer], &mut world, &registry, &mut rng);
        }
        for pos in registry.tracked_positions(R) {
            assert!((pos.x - center.x).abs() <= 12);
            assert!((pos.z - center.z).abs() <= 12);
            assert!((pos.y - center.y).abs() <= 4);
        }
    }

    #[test]
    fn test_failed_placement_tracks_nothing() {
        let mut world = FakeWorld::new();
        let registry = SpawnRegistry::new();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let observer = Observer::new(crate::region::ObserverId(1), BlockPos::new(0, 64, 0));
        let spawner = DecorationSpawner::from_config(&DecorationConfig {
            chance: 1.0,
            horizontal_radius: 0,
            vertical_radius: 0,
            ..DecorationConfig::default()
        });
        world.blocked.insert(BlockPos::new(0, 64, 0));

        assert_eq!(spawner.spawn_pass(R, &[observer], &mut world, &registry, &mut rng), 0);
        assert_eq!(registry.tracked_count(R), 0);
    }

    #[test]
    fn test_zero_chance_never_spawns() {
        let mut world = FakeWorld::new();
        let registry = SpawnRegistry::new();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let observer = Observer::new(crate::region::ObserverId(1), BlockPos::new(0, 64, 0));
        let spawner = DecorationSpawner::from_config(&DecorationConfig {
            chance: 0.0,
            ..DecorationConfig::default()
        });
        for _ in 0..100 {
            spawner.spawn_pass(R, &[observer], &mut world, &registry, &mut rng);
        }
        assert_eq!(world.decoration_count(R), 0);
    }

    #[test]
    fn test_spawn_tick_interval() {
        let spawner = always();
        assert!(spawner.is_spawn_tick(0));
        assert!(!spawner.is_spawn_tick(19));
        assert!(spawner.is_spawn_tick(40));
    }

    #[test]
    fn test_any_tracked_decoration_left() {
        let mut world = FakeWorld::new();
        let registry = SpawnRegistry::new();
        place_tracked(&mut world, &registry, BlockPos::new(0, 64, 0));
        assert!(any_tracked_decoration_left(&registry, R, &world));
        registry.cleanup(R, &mut world);
        assert!(!any_tracked_decoration_left(&registry, R, &world));
    }
}
