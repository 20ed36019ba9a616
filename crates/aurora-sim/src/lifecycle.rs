//! Wisp entities: components, the aging system, and deferred despawn.
//!
//! Each tick [`age_wisps`] advances every wisp's [`Lifetime`] and queues the
//! expired ones in [`DespawnQueue`]; [`flush_despawn_queue`] then removes
//! them outside the query and logs a fade effect for each.

use aurora_core::{ActorLifetime, BlockPos, CosmeticEffect, LifetimeStep, WispAppearance};
use bevy_ecs::prelude::*;

// ---------------------------------------------------------------------------
// Components and resources
// ---------------------------------------------------------------------------

/// Position of a wisp.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq)]
pub struct WispBody {
    /// Block the wisp hovers in.
    pub position: BlockPos,
}

/// Despawn timer of a wisp.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lifetime(pub ActorLifetime);

/// Cosmetic variance rolled at spawn.
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct Appearance(pub WispAppearance);

/// Whether the owning region's aurora is active this tick.
#[derive(Resource, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AuroraActive(pub bool);

/// Cosmetic effects played this session, oldest first.
#[derive(Resource, Debug, Default)]
pub struct EffectLog(pub Vec<CosmeticEffect>);

/// Deferred despawn queue filled while iterating wisps.
#[derive(Resource, Debug, Default)]
pub struct DespawnQueue {
    pending: Vec<(Entity, BlockPos)>,
}

impl DespawnQueue {
    /// Queues `entity` for despawn. Duplicate entries are harmless.
    pub fn enqueue(&mut self, entity: Entity, position: BlockPos) {
        self.pending.push((entity, position));
    }

    /// Despawns every queued entity and records a fade effect for each one
    /// actually removed. Returns the number removed.
    pub fn flush(&mut self, world: &mut World, effects: &mut Vec<CosmeticEffect>) -> usize {
        let mut removed = 0;
        for (entity, position) in self.pending.drain(..) {
            if world.despawn(entity) {
                effects.push(CosmeticEffect::Fade(position));
                removed += 1;
            }
        }
        removed
    }

    /// Number of queued entities.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Total wisps expired since the region was created.
#[derive(Resource, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExpiredCount(pub usize);

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Advances each wisp's timer and queues the expired ones.
pub fn age_wisps(
    active: Res<AuroraActive>,
    mut queue: ResMut<DespawnQueue>,
    mut wisps: Query<(Entity, &WispBody, &mut Lifetime)>,
) {
    for (entity, body, mut lifetime) in &mut wisps {
        if lifetime.0.tick(active.0) == LifetimeStep::Expire {
            queue.enqueue(entity, body.position);
        }
    }
}

/// Applies queued despawns. Exclusive, so it runs after all queries.
pub fn flush_despawn_queue(world: &mut World) {
    world.resource_scope(|world, mut queue: Mut<DespawnQueue>| {
        world.resource_scope(|world, mut log: Mut<EffectLog>| {
            let removed = queue.flush(world, &mut log.0);
            if removed > 0 {
                tracing::debug!("Expired {removed} wisps");
                world.resource_mut::<ExpiredCount>().0 += removed;
            }
        });
    });
}

/// Inserts the resources the wisp systems expect.
pub fn init_resources(world: &mut World) {
    world.init_resource::<AuroraActive>();
    world.init_resource::<DespawnQueue>();
    world.init_resource::<EffectLog>();
    world.init_resource::<ExpiredCount>();
}

/// Schedule running [`age_wisps`] then [`flush_despawn_queue`].
pub fn wisp_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems((age_wisps, flush_despawn_queue).chain());
    schedule
}

/// Spawns an unclaimed wisp.
pub fn spawn_wisp(world: &mut World, position: BlockPos, despawn_delay: u32) -> Entity {
    world
        .spawn((
            WispBody { position },
            Lifetime(ActorLifetime::new(despawn_delay)),
            Appearance(WispAppearance::default()),
        ))
        .id()
}
