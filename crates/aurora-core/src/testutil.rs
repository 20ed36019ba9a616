//! Shared fixtures for unit tests: an in-memory host world and a backend
//! whose writes can be switched off.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::region::{BlockPos, ChunkPos, Observer, ObserverId, RegionId};
use crate::replication::Transport;
use crate::state::{EventState, MemoryBackend, PersistenceError, StateBackend};
use crate::world::{
    CosmeticEffect, DecorationKind, ObjectHandle, ObjectKind, ObjectLifecycle, PlacementError,
    WorldQuery,
};

#[derive(Default)]
pub(crate) struct FakeWorld {
    pub(crate) observers: Vec<(RegionId, Observer)>,
    /// Qualifying zone is everything with `x < warm_from`.
    pub(crate) warm_from: i32,
    pub(crate) unloaded: FxHashSet<ChunkPos>,
    pub(crate) catalysts: Vec<BlockPos>,
    pub(crate) blocked: FxHashSet<BlockPos>,
    pub(crate) decorations: FxHashMap<(RegionId, BlockPos), DecorationKind>,
    pub(crate) foreign_blocks: FxHashSet<(RegionId, BlockPos)>,
    pub(crate) wisps: FxHashMap<u64, (RegionId, BlockPos)>,
    pub(crate) next_actor: u64,
    pub(crate) effects: Vec<CosmeticEffect>,
}

impl FakeWorld {
    pub(crate) fn new() -> Self {
        Self {
            warm_from: i32::MAX,
            ..Self::default()
        }
    }

    pub(crate) fn add_observer(&mut self, region: RegionId, id: u64, pos: BlockPos) {
        self.observers
            .push((region, Observer::new(ObserverId(id), pos)));
    }

    pub(crate) fn decoration_count(&self, region: RegionId) -> usize {
        self.decorations.keys().filter(|(r, _)| *r == region).count()
    }

    pub(crate) fn wisp_count(&self, region: RegionId) -> usize {
        self.wisps.values().filter(|(r, _)| *r == region).count()
    }

    fn occupied(&self, region: RegionId, pos: BlockPos) -> bool {
        self.decorations.contains_key(&(region, pos))
            || self.foreign_blocks.contains(&(region, pos))
            || self.wisps.values().any(|&(r, p)| r == region && p == pos)
    }
}

impl WorldQuery for FakeWorld {
    fn is_qualifying_zone(&self, _region: RegionId, pos: BlockPos) -> bool {
        pos.x < self.warm_from
    }

    fn is_loaded(&self, _region: RegionId, pos: BlockPos) -> bool {
        !self.unloaded.contains(&pos.chunk())
    }

    fn observers_in(&self, region: RegionId) -> Vec<Observer> {
        self.observers
            .iter()
            .filter(|(r, _)| *r == region)
            .map(|(_, o)| *o)
            .collect()
    }

    fn count_nearby_catalysts(&self, _region: RegionId, pos: BlockPos, radius: u32) -> u32 {
        let r2 = i64::from(radius) * i64::from(radius);
        self.catalysts
            .iter()
            .filter(|c| c.horizontal_distance_sq(pos) <= r2)
            .count() as u32
    }

    fn can_place(&self, region: RegionId, pos: BlockPos, _kind: ObjectKind) -> bool {
        self.is_loaded(region, pos) && !self.blocked.contains(&pos) && !self.occupied(region, pos)
    }
}

impl ObjectLifecycle for FakeWorld {
    fn place(
        &mut self,
        region: RegionId,
        pos: BlockPos,
        kind: ObjectKind,
    ) -> Result<ObjectHandle, PlacementError> {
        if !self.can_place(region, pos, kind) {
            return Err(PlacementError::Blocked(pos));
        }
        match kind {
            ObjectKind::Decoration(d) => {
                self.decorations.insert((region, pos), d);
                Ok(ObjectHandle::Block(pos))
            }
            ObjectKind::Wisp => {
                self.next_actor += 1;
                self.wisps.insert(self.next_actor, (region, pos));
                Ok(ObjectHandle::Actor(self.next_actor))
            }
        }
    }

    fn object_at(&self, region: RegionId, pos: BlockPos) -> Option<ObjectKind> {
        self.decorations
            .get(&(region, pos))
            .map(|d| ObjectKind::Decoration(*d))
    }

    fn destroy(&mut self, region: RegionId, handle: ObjectHandle, _drop_loot: bool) -> bool {
        match handle {
            ObjectHandle::Block(pos) => {
                let removed = self.decorations.remove(&(region, pos)).is_some();
                if removed {
                    self.effects.push(CosmeticEffect::Dissolve(pos));
                }
                removed
            }
            ObjectHandle::Actor(id) => match self.wisps.remove(&id) {
                Some((_, pos)) => {
                    self.effects.push(CosmeticEffect::Fade(pos));
                    true
                }
                None => false,
            },
        }
    }

    fn count_live_by_kind(&self, region: RegionId, kind: ObjectKind) -> usize {
        match kind {
            ObjectKind::Wisp => self.wisp_count(region),
            ObjectKind::Decoration(d) => self
                .decorations
                .iter()
                .filter(|((r, _), k)| *r == region && **k == d)
                .count(),
        }
    }
}

/// Backend whose writes fail while `broken` is set.
#[derive(Default)]
pub(crate) struct FlakyBackend {
    pub(crate) inner: MemoryBackend,
    pub(crate) broken: AtomicBool,
}

impl StateBackend for FlakyBackend {
    fn load(&self, region: RegionId) -> Result<Option<EventState>, PersistenceError> {
        self.inner.load(region)
    }

    fn save(&self, region: RegionId, state: &EventState) -> Result<(), PersistenceError> {
        if self.broken.load(Ordering::Relaxed) {
            return Err(PersistenceError::Unavailable("disk full".into()));
        }
        self.inner.save(region, state)
    }
}

impl StateBackend for std::sync::Arc<FlakyBackend> {
    fn load(&self, region: RegionId) -> Result<Option<EventState>, PersistenceError> {
        self.as_ref().load(region)
    }

    fn save(&self, region: RegionId, state: &EventState) -> Result<(), PersistenceError> {
        self.as_ref().save(region, state)
    }
}

/// Transport that records every send.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    log: Mutex<Vec<(ObserverId, bool)>>,
}

impl RecordingTransport {
    pub(crate) fn sent(&self) -> Vec<(ObserverId, bool)> {
        self.log.lock().unwrap().clone()
    }

    pub(crate) fn clear(&self) {
        self.log.lock().unwrap().clear();
    }
}

impl Transport for RecordingTransport {
    fn send(&self, observer: ObserverId, active: bool) -> bool {
        self.log.lock().unwrap().push((observer, active));
        true
    }
}

/// Rng replaying scripted `[0, 1)` draws for `random::<f64>()`, then zeros.
pub(crate) struct ScriptedRng {
    draws: std::collections::VecDeque<f64>,
}

impl ScriptedRng {
    pub(crate) fn new(draws: &[f64]) -> Self {
        Self {
            draws: draws.iter().copied().collect(),
        }
    }
}

impl rand::RngCore for ScriptedRng {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        // `random::<f64>()` keeps the top 53 bits.
        let draw = self.draws.pop_front().unwrap_or(0.0);
        ((draw * (1u64 << 53) as f64) as u64) << 11
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        rand::rand_core::impls::fill_bytes_via_next(self, dst);
    }
}
