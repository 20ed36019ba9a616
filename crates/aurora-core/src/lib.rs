//! Aurora environmental-event scheduler: per-region night-edge rolls,
//! persisted event state, tracked decoration and wisp spawning, energy
//! collectors, and replication of the event flag to observers.

pub mod admin;
pub mod catalyst;
pub mod clock;
pub mod collector;
pub mod population;
pub mod region;
pub mod replication;
pub mod scheduler;
pub mod spawn;
pub mod state;
pub mod world;

#[cfg(test)]
mod testutil;

pub use admin::{AdminCommand, AdminParseError, AdminResponse, RegionDirectory};
pub use catalyst::CatalystCounter;
pub use clock::{DayCycle, NightEdgeDetector};
pub use collector::{ChargePhase, CollectorError, EnergyAccumulator};
pub use population::{
    ActorLifetime, LifetimeStep, PopulationCapGuard, SpawnedWisp, WispSpawner, random_appearance,
};
pub use region::{BlockPos, ChunkPos, Observer, ObserverId, RegionId};
pub use replication::{
    AuroraPacket, ChannelTransport, ObserverView, PacketError, ReplicationChannel, Transport,
};
pub use scheduler::{
    AuroraScheduler, EndOutcome, RollOutcome, SchedulerError, StartOutcome, TickReport,
};
pub use spawn::{CleanupReport, DecorationSpawner, SpawnRegistry, any_tracked_decoration_left};
pub use state::{
    EventState, EventStateStore, MemoryBackend, PersistenceError, RonDirBackend, StateBackend,
};
pub use world::{
    CosmeticEffect, DecorationKind, HostWorld, ObjectHandle, ObjectKind, ObjectLifecycle,
    PlacementError, WispAppearance, WorldQuery, qualifying_observers,
};
