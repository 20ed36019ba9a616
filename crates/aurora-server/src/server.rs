//! Server state: the scheduler, simulated regions, and connected observers.

use std::sync::Arc;

use aurora_config::AuroraConfig;
use aurora_core::{
    AdminCommand, AdminResponse, AuroraScheduler, ChannelTransport, MemoryBackend, ObjectKind,
    ObjectLifecycle, ObserverId, ObserverView, RegionDirectory, RegionId, RonDirBackend,
    StateBackend, TickReport, Transport,
};
use aurora_sim::{ObjectTickReport, Scenario, SimRegion, observer_ids, populate};
use crossbeam_channel::Receiver;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

/// Observers move this often, in ticks.
const WANDER_INTERVAL: i64 = 20;

/// Observer ids are allocated in blocks of this size per region.
const OBSERVER_ID_STRIDE: u64 = 1_000;

/// Client side of one simulated observer connection.
struct ObserverClient {
    id: ObserverId,
    inbox: Receiver<Vec<u8>>,
    view: ObserverView,
}

/// Running totals for the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Ticks run.
    pub ticks: u64,
    /// Events started.
    pub events_started: u64,
    /// Events ended.
    pub events_ended: u64,
    /// Ticks that failed with a persistence error.
    pub persistence_errors: u64,
    /// Collector charge increments.
    pub charges: u64,
    /// Cosmetic effects played.
    pub effects: u64,
}

/// Headless aurora server.
pub struct Server {
    config: AuroraConfig,
    scheduler: AuroraScheduler,
    transport: Arc<ChannelTransport>,
    directory: RegionDirectory,
    regions: Vec<SimRegion>,
    rngs: Vec<ChaCha8Rng>,
    clients: Vec<ObserverClient>,
    game_time: i64,
    stats: ServerStats,
}

impl Server {
    /// Builds the scheduler and every configured region.
    pub fn new(config: AuroraConfig) -> Self {
        let backend: Box<dyn StateBackend> = match &config.server.state_dir {
            Some(dir) => {
                info!("Persisting aurora state under {}", dir.display());
                Box::new(RonDirBackend::new(dir))
            }
            None => {
                info!("No state directory configured, aurora state is kept in memory");
                Box::new(MemoryBackend::new())
            }
        };
        let transport = Arc::new(ChannelTransport::default());
        let scheduler = AuroraScheduler::new(
            &config,
            backend,
            Arc::clone(&transport) as Arc<dyn Transport>,
        );

        let seed = config.server.seed.unwrap_or_else(|| rand::rng().random());
        info!("Session seed: {seed}");
        let mut seed_rng = ChaCha8Rng::seed_from_u64(seed);

        let directory = RegionDirectory::from_names(config.server.regions.iter().cloned());
        let mut regions = Vec::with_capacity(directory.len());
        let mut rngs = Vec::with_capacity(directory.len());
        let mut clients = Vec::new();
        for (id, name) in directory.iter() {
            let scenario = Scenario {
                observers: config.server.observers_per_region,
                first_observer: u64::from(id.0) * OBSERVER_ID_STRIDE + 1,
                ..Scenario::default()
            };
            regions.push(populate(id, config.wisp.despawn_delay, &scenario, &mut seed_rng));
            rngs.push(ChaCha8Rng::seed_from_u64(seed_rng.random()));
            for observer in observer_ids(&scenario) {
                let inbox = transport.connect(observer);
                scheduler.on_join(observer, id);
                clients.push(ObserverClient {
                    id: observer,
                    inbox,
                    view: ObserverView::new(),
                });
            }
            info!("Region '{name}' ({id}) ready with {} observers", scenario.observers);
        }

        Self {
            game_time: config.server.start_time,
            config,
            scheduler,
            transport,
            directory,
            regions,
            rngs,
            clients,
            stats: ServerStats::default(),
        }
    }

    /// Current game time.
    pub fn game_time(&self) -> i64 {
        self.game_time
    }

    #[cfg(test)]
    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    #[cfg(test)]
    pub fn scheduler(&self) -> &AuroraScheduler {
        &self.scheduler
    }

    /// Whether observer `id` currently sees the aurora.
    #[cfg(test)]
    pub fn observer_sees_aurora(&self, id: ObserverId) -> Option<bool> {
        self.clients
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.view.is_active())
    }

    /// Runs one game tick across all regions concurrently.
    pub fn step(&mut self) {
        let game_time = self.game_time;
        let scheduler = &self.scheduler;
        let collectors = &self.config.collector;

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .regions
                .iter_mut()
                .zip(self.rngs.iter_mut())
                .filter_map(|(region, rng)| {
                    let id = region.id();
                    let spawned = std::thread::Builder::new()
                        .name(format!("{id}"))
                        .spawn_scoped(scope, move || {
                            if game_time % WANDER_INTERVAL == 0 {
                                region.wander(2, rng);
                            }
                            let report = scheduler.tick(id, game_time, region, rng);
                            let active = scheduler.store().is_active(id);
                            let objects = region.tick_objects(active, collectors);
                            let effects = region.drain_effects().len();
                            (id, report, objects, effects)
                        });
                    match spawned {
                        Ok(handle) => Some(handle),
                        Err(err) => {
                            warn!("Failed to spawn worker for {id}: {err}");
                            None
                        }
                    }
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|handle| {
                    let name = handle.thread().name().unwrap_or("region").to_string();
                    match handle.join() {
                        Ok(result) => Some(result),
                        Err(_) => {
                            warn!("Worker for {name} panicked at tick {game_time}, skipping its results");
                            None
                        }
                    }
                })
                .collect()
        });

        for (id, report, objects, effects) in results {
            self.stats.effects += effects as u64;
            match report {
                Ok(report) => self.record(id, &report, &objects),
                Err(err) => {
                    self.stats.persistence_errors += 1;
                    warn!("Tick {game_time} failed for {id}: {err}");
                }
            }
        }

        for client in &mut self.clients {
            if client.view.drain(&client.inbox) > 0 {
                debug!(
                    "{} now sees aurora={}",
                    client.id,
                    client.view.is_active()
                );
            }
        }

        self.game_time += 1;
        self.stats.ticks += 1;
    }

    /// Parses and runs one admin command line, returning the reply.
    pub fn handle_admin(&mut self, line: &str) -> String {
        let command = match AdminCommand::parse(line) {
            Ok(command) => command,
            Err(err) => return format!("error: {err}"),
        };
        let Some(id) = self.directory.resolve(command.region()) else {
            return AdminResponse::UnknownRegion(command.region().to_string()).to_string();
        };
        let index = id.0 as usize;
        let (Some(region), Some(rng)) = (self.regions.get_mut(index), self.rngs.get_mut(index)) else {
            return AdminResponse::UnknownRegion(command.region().to_string()).to_string();
        };

        let response = command.execute(&self.scheduler, id, self.game_time, region, rng);
        info!("Admin '{}' -> {response}", line.trim());
        response.to_string()
    }

    /// Logs one line per region describing its current state.
    pub fn log_summary(&self) {
        for (id, name) in self.directory.iter() {
            let Some(region) = self.regions.get(id.0 as usize) else {
                continue;
            };
            let active = self.scheduler.store().is_active(id);
            info!(
                "{name}: aurora={active} decorations={} wisps={} tracked={} orphans={}",
                region.decoration_count(),
                region.count_live_by_kind(id, ObjectKind::Wisp),
                self.scheduler.registry().tracked_count(id),
                self.scheduler.registry().orphan_count(id),
            );
        }
        info!(
            "Session ended at game time {}: {} ticks, {} started, {} ended, {} persistence errors, {} charges, {} effects, {} connections",
            self.game_time(),
            self.stats.ticks,
            self.stats.events_started,
            self.stats.events_ended,
            self.stats.persistence_errors,
            self.stats.charges,
            self.stats.effects,
            self.transport.connected(),
        );
    }

    fn record(&mut self, id: RegionId, report: &TickReport, objects: &ObjectTickReport) {
        if report.started.is_some() {
            self.stats.events_started += 1;
        }
        if report.ended.is_some() {
            self.stats.events_ended += 1;
        }
        self.stats.charges += objects.charged.len() as u64;
        if report.decorations_placed + report.wisps_spawned > 0 {
            debug!(
                "{id} @ {}: +{} decorations, +{} wisps",
                self.game_time, report.decorations_placed, report.wisps_spawned
            );
        }
        if objects.wisps_expired > 0 {
            debug!("{id}: {} wisps faded", objects.wisps_expired);
        }
    }
}
