//! Ready-made regions for the server host and integration tests.

use aurora_core::{BlockPos, Observer, ObserverId, RegionId};
use rand::Rng;

use crate::region::SimRegion;
use crate::terrain::FlatTerrain;

/// Parameters for [`populate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scenario {
    /// Observers to place.
    pub observers: u32,
    /// Id of the first observer; the rest follow consecutively.
    pub first_observer: u64,
    /// Catalyst structures to build near the origin.
    pub catalysts: u32,
    /// Collectors to install near the origin.
    pub collectors: u32,
    /// Half-width of the square observers are scattered in.
    pub spread: i32,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            observers: 2,
            first_observer: 1,
            catalysts: 1,
            collectors: 1,
            spread: 48,
        }
    }
}

/// Builds a region on default terrain and fills it per `scenario`.
pub fn populate<R: Rng + ?Sized>(
    id: RegionId,
    despawn_delay: u32,
    scenario: &Scenario,
    rng: &mut R,
) -> SimRegion {
    let terrain = FlatTerrain::default();
    let mut region = SimRegion::new(id, terrain.clone(), despawn_delay);

    for i in 0..scenario.observers {
        let pos = terrain.spawn_point(
            rng.random_range(-scenario.spread..=scenario.spread),
            rng.random_range(-scenario.spread..=scenario.spread),
        );
        region.add_observer(Observer::new(
            ObserverId(scenario.first_observer + u64::from(i)),
            pos,
        ));
    }
    for i in 0..scenario.catalysts as i32 {
        region.add_catalyst(BlockPos::new(4 * i, terrain.surface_y, -4));
    }
    for i in 0..scenario.collectors as i32 {
        region.add_collector(terrain.spawn_point(4 * i, 4));
    }

    tracing::debug!("Populated {id}: {scenario:?}");
    region
}

/// Observer ids [`populate`] assigns for `scenario`.
pub fn observer_ids(scenario: &Scenario) -> impl Iterator<Item = ObserverId> + '_ {
    (0..u64::from(scenario.observers)).map(move |i| ObserverId(scenario.first_observer + i))
}
