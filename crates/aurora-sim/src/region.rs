//! One simulated region implementing the host-world interfaces.

use aurora_config::CollectorConfig;
use aurora_core::{
    BlockPos, ChunkPos, CosmeticEffect, DecorationKind, EnergyAccumulator, ObjectHandle,
    ObjectKind, ObjectLifecycle, Observer, ObserverId, PlacementError, RegionId, WispAppearance,
    WorldQuery,
};
use bevy_ecs::prelude::*;
use rand::Rng;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::lifecycle::{
    Appearance, AuroraActive, EffectLog, ExpiredCount, Lifetime, WispBody, init_resources,
    spawn_wisp, wisp_schedule,
};
use crate::terrain::FlatTerrain;

/// Summary of one [`SimRegion::tick_objects`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectTickReport {
    /// Wisps despawned by their lifetime timer.
    pub wisps_expired: usize,
    /// Collectors whose charge rose, with the new level.
    pub charged: Vec<(BlockPos, u8)>,
}

/// A headless region: flat terrain, observers, catalysts, decorations, wisps,
/// and collectors.
pub struct SimRegion {
    id: RegionId,
    terrain: FlatTerrain,
    unloaded: FxHashSet<ChunkPos>,
    observers: FxHashMap<ObserverId, Observer>,
    catalysts: Vec<BlockPos>,
    solid: FxHashSet<BlockPos>,
    decorations: FxHashMap<BlockPos, DecorationKind>,
    collectors: FxHashMap<BlockPos, EnergyAccumulator>,
    ecs: World,
    schedule: Schedule,
    despawn_delay: u32,
}

impl SimRegion {
    /// Creates an empty, fully loaded region.
    pub fn new(id: RegionId, terrain: FlatTerrain, despawn_delay: u32) -> Self {
        let mut ecs = World::new();
        init_resources(&mut ecs);
        Self {
            id,
            terrain,
            unloaded: FxHashSet::default(),
            observers: FxHashMap::default(),
            catalysts: Vec::new(),
            solid: FxHashSet::default(),
            decorations: FxHashMap::default(),
            collectors: FxHashMap::default(),
            ecs,
            schedule: wisp_schedule(),
            despawn_delay,
        }
    }

    /// Region id.
    pub fn id(&self) -> RegionId {
        self.id
    }

    /// Terrain description.
    pub fn terrain(&self) -> &FlatTerrain {
        &self.terrain
    }

    // -- Observers --

    /// Adds or replaces an observer.
    pub fn add_observer(&mut self, observer: Observer) {
        self.observers.insert(observer.id, observer);
    }

    /// Removes an observer, returning its last snapshot.
    pub fn remove_observer(&mut self, id: ObserverId) -> Option<Observer> {
        self.observers.remove(&id)
    }

    /// Moves an observer to `position`. Returns `false` if unknown.
    pub fn move_observer(&mut self, id: ObserverId, position: BlockPos) -> bool {
        match self.observers.get_mut(&id) {
            Some(observer) => {
                observer.position = position;
                true
            }
            None => false,
        }
    }

    /// Snapshot of an observer.
    pub fn observer(&self, id: ObserverId) -> Option<Observer> {
        self.observers.get(&id).copied()
    }

    /// Moves every observer by up to `max_step` blocks along X and Z, staying
    /// on the surface.
    pub fn wander<R: Rng + ?Sized>(&mut self, max_step: i32, rng: &mut R) {
        for observer in self.observers.values_mut() {
            let dx = rng.random_range(-max_step..=max_step);
            let dz = rng.random_range(-max_step..=max_step);
            let moved = observer.position.offset(dx, 0, dz);
            observer.position = self.terrain.spawn_point(moved.x, moved.z);
        }
    }

    // -- World editing --

    /// Marks the chunk column `chunk` as loaded or unloaded.
    pub fn set_chunk_loaded(&mut self, chunk: ChunkPos, loaded: bool) {
        if loaded {
            self.unloaded.remove(&chunk);
        } else {
            self.unloaded.insert(chunk);
        }
    }

    /// Builds a catalyst structure at `pos`.
    pub fn add_catalyst(&mut self, pos: BlockPos) {
        self.catalysts.push(pos);
        self.solid.insert(pos);
    }

    /// Places an ordinary solid block at `pos`.
    pub fn place_block(&mut self, pos: BlockPos) {
        self.solid.insert(pos);
    }

    /// Installs an empty collector at `pos`.
    pub fn add_collector(&mut self, pos: BlockPos) {
        self.collectors.insert(pos, EnergyAccumulator::new());
        self.solid.insert(pos);
    }

    /// Collector at `pos`.
    pub fn collector(&self, pos: BlockPos) -> Option<&EnergyAccumulator> {
        self.collectors.get(&pos)
    }

    /// Mutable collector at `pos`.
    pub fn collector_mut(&mut self, pos: BlockPos) -> Option<&mut EnergyAccumulator> {
        self.collectors.get_mut(&pos)
    }

    /// An observer picks up the decoration at `pos`. The caller must report
    /// the removal to the scheduler.
    pub fn harvest_decoration(&mut self, pos: BlockPos) -> Option<DecorationKind> {
        self.decorations.remove(&pos)
    }

    /// Decoration positions, unordered.
    pub fn decoration_positions(&self) -> Vec<BlockPos> {
        self.decorations.keys().copied().collect()
    }

    /// Number of decorations present.
    pub fn decoration_count(&self) -> usize {
        self.decorations.len()
    }

    // -- Wisps --

    /// Live wisp entities with their position.
    pub fn wisps(&mut self) -> Vec<(Entity, BlockPos)> {
        let mut query = self.ecs.query::<(Entity, &WispBody)>();
        query
            .iter(&self.ecs)
            .map(|(entity, body)| (entity, body.position))
            .collect()
    }

    /// Appearance of a wisp.
    pub fn wisp_appearance(&self, entity: Entity) -> Option<WispAppearance> {
        self.ecs.get::<Appearance>(entity).map(|a| a.0)
    }

    /// An observer claims a wisp; it will no longer expire.
    pub fn claim_wisp(&mut self, entity: Entity) -> bool {
        match self.ecs.get_mut::<Lifetime>(entity) {
            Some(mut lifetime) => {
                lifetime.0.claim();
                true
            }
            None => false,
        }
    }

    /// Total wisps expired so far.
    pub fn wisps_expired(&self) -> usize {
        self.ecs.resource::<ExpiredCount>().0
    }

    // -- Per tick --

    /// Advances wisp timers and collectors for one tick.
    pub fn tick_objects(&mut self, event_active: bool, collectors: &CollectorConfig) -> ObjectTickReport {
        let expired_before = self.wisps_expired();
        self.ecs.resource_mut::<AuroraActive>().0 = event_active;
        self.schedule.run(&mut self.ecs);

        let mut charged = Vec::new();
        for (&pos, collector) in self.collectors.iter_mut() {
            let in_zone = self.terrain.is_cold(pos) && !self.unloaded.contains(&pos.chunk());
            if let Some(level) = collector.tick(collectors, in_zone, event_active) {
                charged.push((pos, level));
            }
        }

        ObjectTickReport {
            wisps_expired: self.wisps_expired() - expired_before,
            charged,
        }
    }

    /// Cosmetic effects played so far.
    pub fn effects(&self) -> &[CosmeticEffect] {
        &self.ecs.resource::<EffectLog>().0
    }

    /// Takes the effect log, leaving it empty.
    pub fn drain_effects(&mut self) -> Vec<CosmeticEffect> {
        std::mem::take(&mut self.ecs.resource_mut::<EffectLog>().0)
    }

    fn wisp_at(&mut self, pos: BlockPos) -> bool {
        self.wisps().iter().any(|&(_, p)| p == pos)
    }

    fn occupied(&self, pos: BlockPos) -> bool {
        self.solid.contains(&pos) || self.decorations.contains_key(&pos)
    }

    fn is_chunk_loaded(&self, pos: BlockPos) -> bool {
        !self.unloaded.contains(&pos.chunk())
    }

    fn log_effect(&mut self, effect: CosmeticEffect) {
        self.ecs.resource_mut::<EffectLog>().0.push(effect);
    }
}

impl std::fmt::Debug for SimRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimRegion")
            .field("id", &self.id)
            .field("observers", &self.observers.len())
            .field("decorations", &self.decorations.len())
            .field("collectors", &self.collectors.len())
            .finish_non_exhaustive()
    }
}

impl WorldQuery for SimRegion {
    fn is_qualifying_zone(&self, _region: RegionId, pos: BlockPos) -> bool {
        self.terrain.is_cold(pos) && self.terrain.is_air(pos)
    }

    fn is_loaded(&self, _region: RegionId, pos: BlockPos) -> bool {
        self.is_chunk_loaded(pos)
    }

    fn observers_in(&self, _region: RegionId) -> Vec<Observer> {
        let mut observers: Vec<Observer> = self.observers.values().copied().collect();
        observers.sort_by_key(|o| o.id);
        observers
    }

    fn count_nearby_catalysts(&self, _region: RegionId, pos: BlockPos, radius: u32) -> u32 {
        let r2 = i64::from(radius) * i64::from(radius);
        self.catalysts
            .iter()
            .filter(|c| c.horizontal_distance_sq(pos) <= r2)
            .count() as u32
    }

    fn can_place(&self, _region: RegionId, pos: BlockPos, kind: ObjectKind) -> bool {
        if !self.is_chunk_loaded(pos) || self.occupied(pos) {
            return false;
        }
        match kind {
            ObjectKind::Decoration(_) => self.terrain.is_surface_slot(pos),
            ObjectKind::Wisp => self.terrain.is_air(pos),
        }
    }
}

impl ObjectLifecycle for SimRegion {
    fn place(
        &mut self,
        region: RegionId,
        pos: BlockPos,
        kind: ObjectKind,
    ) -> Result<ObjectHandle, PlacementError> {
        if !self.is_chunk_loaded(pos) {
            return Err(PlacementError::Unloaded(pos));
        }
        if !self.can_place(region, pos, kind) {
            return Err(PlacementError::Blocked(pos));
        }
        match kind {
            ObjectKind::Decoration(decoration) => {
                self.decorations.insert(pos, decoration);
                Ok(ObjectHandle::Block(pos))
            }
            ObjectKind::Wisp => {
                if self.wisp_at(pos) {
                    return Err(PlacementError::Blocked(pos));
                }
                let entity = spawn_wisp(&mut self.ecs, pos, self.despawn_delay);
                Ok(ObjectHandle::Actor(entity.to_bits()))
            }
        }
    }

    fn object_at(&self, _region: RegionId, pos: BlockPos) -> Option<ObjectKind> {
        self.decorations
            .get(&pos)
            .map(|&decoration| ObjectKind::Decoration(decoration))
    }

    fn destroy(&mut self, _region: RegionId, handle: ObjectHandle, _drop_loot: bool) -> bool {
        match handle {
            ObjectHandle::Block(pos) => {
                if self.decorations.remove(&pos).is_none() {
                    return false;
                }
                self.log_effect(CosmeticEffect::Dissolve(pos));
                true
            }
            ObjectHandle::Actor(bits) => {
                let Ok(entity) = Entity::try_from_bits(bits) else {
                    return false;
                };
                let Some(position) = self.ecs.get::<WispBody>(entity).map(|b| b.position) else {
                    return false;
                };
                self.ecs.despawn(entity);
                self.log_effect(CosmeticEffect::Fade(position));
                true
            }
        }
    }

    fn count_live_by_kind(&self, _region: RegionId, kind: ObjectKind) -> usize {
        match kind {
            ObjectKind::Decoration(decoration) => self
                .decorations
                .values()
                .filter(|&&d| d == decoration)
                .count(),
            ObjectKind::Wisp => self
                .ecs
                .iter_entities()
                .filter(|e| e.contains::<WispBody>())
                .count(),
        }
    }

    fn set_appearance(&mut self, _region: RegionId, handle: ObjectHandle, appearance: WispAppearance) {
        if let ObjectHandle::Actor(bits) = handle
            && let Ok(entity) = Entity::try_from_bits(bits)
            && let Some(mut current) = self.ecs.get_mut::<Appearance>(entity)
        {
            current.0 = appearance;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: RegionId = RegionId(0);

    fn region() -> SimRegion {
        SimRegion::new(R, FlatTerrain::default(), 10)
    }

    #[test]
    fn test_decorations_need_the_surface_slot() {
        let mut sim = region();
        let kind = ObjectKind::Decoration(DecorationKind::Frostbloom);
        assert!(sim.can_place(R, BlockPos::new(0, 65, 0), kind));
        assert!(!sim.can_place(R, BlockPos::new(0, 66, 0), kind));
        assert!(!sim.can_place(R, BlockPos::new(0, 64, 0), kind));

        sim.place(R, BlockPos::new(0, 65, 0), kind).unwrap();
        assert_eq!(
            sim.place(R, BlockPos::new(0, 65, 0), kind),
            Err(PlacementError::Blocked(BlockPos::new(0, 65, 0)))
        );
    }

    #[test]
    fn test_unloaded_chunk_refuses_placement() {
        let mut sim = region();
        let pos = BlockPos::new(40, 65, 40);
        sim.set_chunk_loaded(pos.chunk(), false);
        assert_eq!(
            sim.place(R, pos, ObjectKind::Wisp),
            Err(PlacementError::Unloaded(pos))
        );
        assert!(!sim.is_loaded(R, pos));
    }

    #[test]
    fn test_qualifying_zone_is_cold_open_air() {
        let sim = SimRegion::new(R, FlatTerrain::new(64, 0..100), 10);
        assert!(sim.is_qualifying_zone(R, BlockPos::new(5, 65, 0)));
        assert!(!sim.is_qualifying_zone(R, BlockPos::new(-5, 65, 0)));
        assert!(!sim.is_qualifying_zone(R, BlockPos::new(5, 60, 0)));
    }

    #[test]
    fn test_wisp_handles_round_trip_through_ecs() {
        let mut sim = region();
        let pos = BlockPos::new(3, 66, 3);
        let handle = sim.place(R, pos, ObjectKind::Wisp).unwrap();
        let appearance = WispAppearance {
            hue: 42.0,
            scale: 1.1,
        };
        sim.set_appearance(R, handle, appearance);
        assert_eq!(sim.count_live_by_kind(R, ObjectKind::Wisp), 1);
        let (entity, _) = sim.wisps()[0];
        assert_eq!(sim.wisp_appearance(entity), Some(appearance));

        assert!(sim.destroy(R, handle, false));
        assert!(!sim.destroy(R, handle, false));
        assert_eq!(sim.count_live_by_kind(R, ObjectKind::Wisp), 0);
        assert_eq!(sim.effects(), &[CosmeticEffect::Fade(pos)]);
    }

    #[test]
    fn test_tick_objects_expires_and_charges() {
        let mut sim = region();
        let collectors = CollectorConfig {
            max_charge: 2,
            fill_rate_ticks: 5,
        };
        let collector_pos = BlockPos::new(8, 65, 8);
        sim.add_collector(collector_pos);
        sim.place(R, BlockPos::new(0, 70, 0), ObjectKind::Wisp).unwrap();

        let mut levels = Vec::new();
        for _ in 0..20 {
            levels.extend(sim.tick_objects(true, &collectors).charged);
        }
        assert_eq!(levels, vec![(collector_pos, 1), (collector_pos, 2)]);
        assert_eq!(sim.count_live_by_kind(R, ObjectKind::Wisp), 1);

        let mut expired = 0;
        for _ in 0..10 {
            expired += sim.tick_objects(false, &collectors).wisps_expired;
        }
        assert_eq!(expired, 1);
        assert_eq!(sim.wisps_expired(), 1);
    }

    #[test]
    fn test_wander_stays_on_surface() {
        use rand::SeedableRng;
        let mut sim = region();
        sim.add_observer(Observer::new(ObserverId(1), sim.terrain().spawn_point(0, 0)));
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        for _ in 0..20 {
            sim.wander(3, &mut rng);
        }
        let observer = sim.observer(ObserverId(1)).unwrap();
        assert!(sim.terrain().is_surface_slot(observer.position));
    }
}
