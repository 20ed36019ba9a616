//! Host-world collaborator interfaces.
//!
//! The scheduler never owns blocks or entities. It asks the host through
//! [`WorldQuery`] (spatial predicates and observers) and mutates it through
//! [`ObjectLifecycle`] (placing and destroying managed objects). Managed
//! objects form a closed set described by [`ObjectKind`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::region::{BlockPos, Observer, RegionId};

// ---------------------------------------------------------------------------
// Object kinds
// ---------------------------------------------------------------------------

/// Decorations placed while the event is active and removed when it ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecorationKind {
    /// Low glowing flower on snow or grass.
    Frostbloom,
    /// Thin crystal spike on stone or ice.
    Starshard,
    /// Faint light patch on any solid surface.
    Glimmer,
}

impl DecorationKind {
    /// Every decoration kind, in spawn-table order.
    pub const ALL: [DecorationKind; 3] = [Self::Frostbloom, Self::Starshard, Self::Glimmer];
}

/// Every kind of object the scheduler manages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// A static ephemeral decoration occupying one block.
    Decoration(DecorationKind),
    /// A mobile light actor.
    Wisp,
}

impl ObjectKind {
    /// Returns `true` for any decoration variant.
    pub fn is_decoration(self) -> bool {
        matches!(self, Self::Decoration(_))
    }
}

/// Handle returned by the host for a placed object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectHandle {
    /// Block-bound object, addressed by its position.
    Block(BlockPos),
    /// Entity-bound object, addressed by the host's entity id.
    Actor(u64),
}

/// Reasons the host may refuse a placement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    /// The target chunk is not loaded.
    #[error("position {0} is not loaded")]
    Unloaded(BlockPos),
    /// The target is occupied or the surface is unsuitable.
    #[error("position {0} is blocked")]
    Blocked(BlockPos),
    /// The host rejected the placement for its own reasons.
    #[error("host refused placement: {0}")]
    Refused(String),
}

/// Per-wisp cosmetic variance, rolled at spawn time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WispAppearance {
    /// Hue in degrees, `[0, 360)`.
    pub hue: f32,
    /// Uniform scale factor around 1.0.
    pub scale: f32,
}

impl Default for WispAppearance {
    fn default() -> Self {
        Self {
            hue: 160.0,
            scale: 1.0,
        }
    }
}

/// A cosmetic effect the host plays when a managed object is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CosmeticEffect {
    /// Sparkle burst where a decoration dissolved.
    Dissolve(BlockPos),
    /// Fade-out puff where a wisp expired.
    Fade(BlockPos),
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Read-only spatial queries against the host world.
pub trait WorldQuery {
    /// Whether `pos` lies in a zone where event effects apply (e.g. a cold
    /// biome with open sky).
    fn is_qualifying_zone(&self, region: RegionId, pos: BlockPos) -> bool;

    /// Whether the chunk containing `pos` is currently loaded.
    fn is_loaded(&self, region: RegionId, pos: BlockPos) -> bool;

    /// All observers currently in `region`.
    fn observers_in(&self, region: RegionId) -> Vec<Observer>;

    /// Number of catalyst structures within `radius` blocks of `pos`.
    fn count_nearby_catalysts(&self, region: RegionId, pos: BlockPos, radius: u32) -> u32;

    /// Whether an object of `kind` may be placed at `pos`: suitable surface
    /// material below and free space at the position.
    fn can_place(&self, region: RegionId, pos: BlockPos, kind: ObjectKind) -> bool;
}

/// Creation and removal of managed objects in the host world.
pub trait ObjectLifecycle {
    /// Creates an object of `kind` at `pos`.
    fn place(
        &mut self,
        region: RegionId,
        pos: BlockPos,
        kind: ObjectKind,
    ) -> Result<ObjectHandle, PlacementError>;

    /// The managed block object currently at `pos`, if any.
    fn object_at(&self, region: RegionId, pos: BlockPos) -> Option<ObjectKind>;

    /// Removes the object behind `handle`, playing its cosmetic effect.
    /// Returns `false` if nothing was there.
    fn destroy(&mut self, region: RegionId, handle: ObjectHandle, drop_loot: bool) -> bool;

    /// Number of live objects of `kind` in `region`.
    fn count_live_by_kind(&self, region: RegionId, kind: ObjectKind) -> usize;

    /// Applies cosmetic variance to a freshly spawned actor. Hosts without a
    /// presentation layer can ignore it.
    fn set_appearance(&mut self, _region: RegionId, _handle: ObjectHandle, _appearance: WispAppearance) {}
}

/// Convenience bound for hosts implementing both collaborator traits.
pub trait HostWorld: WorldQuery + ObjectLifecycle {}

impl<T: WorldQuery + ObjectLifecycle> HostWorld for T {}

/// Observers of `region` that are eligible and standing in a qualifying zone.
pub fn qualifying_observers<W: WorldQuery + ?Sized>(world: &W, region: RegionId) -> Vec<Observer> {
    world
        .observers_in(region)
        .into_iter()
        .filter(|o| o.eligible && world.is_qualifying_zone(region, o.position))
        .collect()
}
