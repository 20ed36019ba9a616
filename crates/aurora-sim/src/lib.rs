//! Headless reference host for the aurora scheduler.
//!
//! [`SimRegion`] implements [`aurora_core::WorldQuery`] and
//! [`aurora_core::ObjectLifecycle`] over flat terrain, keeps wisps as
//! `bevy_ecs` entities, and advances wisp lifetimes and energy collectors
//! once per tick.

pub mod lifecycle;
pub mod region;
pub mod scenario;
pub mod terrain;

pub use lifecycle::{Appearance, DespawnQueue, Lifetime, WispBody};
pub use region::{ObjectTickReport, SimRegion};
pub use scenario::{Scenario, observer_ids, populate};
pub use terrain::FlatTerrain;
