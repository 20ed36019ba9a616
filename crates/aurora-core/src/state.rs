//! Persisted per-region event state.
//!
//! [`EventStateStore`] is the single source of truth for "is the aurora
//! active in region R". Reads are served from a concurrent in-memory view;
//! writes go to a [`StateBackend`] first and only update the view once the
//! backend accepted them, so a failed write leaves the previous state in
//! place and the scheduler simply retries on the next tick.

use std::path::PathBuf;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::region::RegionId;

// ---------------------------------------------------------------------------
// EventState
// ---------------------------------------------------------------------------

/// Event window for one region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventState {
    /// Whether the event is running.
    pub active: bool,
    /// Game time at which the event started (0 when inactive).
    pub start_tick: i64,
    /// Game time at which the event expires (0 when inactive).
    pub end_tick: i64,
}

impl EventState {
    /// The canonical inactive value.
    pub const INACTIVE: EventState = EventState {
        active: false,
        start_tick: 0,
        end_tick: 0,
    };

    /// An active window `[start_tick, end_tick)`.
    pub fn running(start_tick: i64, end_tick: i64) -> Self {
        Self {
            active: true,
            start_tick,
            end_tick,
        }
    }

    /// Whether the value satisfies the state invariants.
    pub fn is_canonical(&self) -> bool {
        if self.active {
            self.end_tick > self.start_tick
        } else {
            self.start_tick == 0 && self.end_tick == 0
        }
    }

    /// Ticks left before expiry at `game_time` (0 when inactive or expired).
    pub fn remaining(&self, game_time: i64) -> i64 {
        if self.active {
            (self.end_tick - game_time).max(0)
        } else {
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence backends
// ---------------------------------------------------------------------------

/// Errors raised by a persistence backend. Always recoverable.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Filesystem failure.
    #[error("state i/o failed for {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Stored data could not be parsed.
    #[error("state file {path} is corrupt: {source}")]
    Corrupt {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: ron::error::SpannedError,
    },
    /// State could not be serialized.
    #[error("failed to serialize state: {0}")]
    Serialize(#[source] ron::Error),
    /// The backend is temporarily unavailable.
    #[error("state backend unavailable: {0}")]
    Unavailable(String),
}

/// Durable get/set of [`EventState`] per region, owned by the host.
pub trait StateBackend: Send + Sync {
    /// Loads the stored state, or `None` if the region was never written.
    fn load(&self, region: RegionId) -> Result<Option<EventState>, PersistenceError>;

    /// Durably stores `state` for `region`.
    fn save(&self, region: RegionId, state: &EventState) -> Result<(), PersistenceError>;
}

/// In-memory backend for tests and hosts without durable storage.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    states: DashMap<RegionId, EventState>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateBackend for MemoryBackend {
    fn load(&self, region: RegionId) -> Result<Option<EventState>, PersistenceError> {
        Ok(self.states.get(&region).map(|s| *s))
    }

    fn save(&self, region: RegionId, state: &EventState) -> Result<(), PersistenceError> {
        self.states.insert(region, *state);
        Ok(())
    }
}

/// Stores one `aurora_<region>.ron` file per region in a directory.
#[derive(Debug, Clone)]
pub struct RonDirBackend {
    dir: PathBuf,
}

impl RonDirBackend {
    /// Creates a backend rooted at `dir`. The directory is created on the
    /// first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, region: RegionId) -> PathBuf {
        self.dir.join(format!("aurora_{}.ron", region.0))
    }
}

impl StateBackend for RonDirBackend {
    fn load(&self, region: RegionId) -> Result<Option<EventState>, PersistenceError> {
        let path = self.path_for(region);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|source| PersistenceError::Io {
            path: path.clone(),
            source,
        })?;
        let state = ron::from_str(&contents)
            .map_err(|source| PersistenceError::Corrupt { path, source })?;
        Ok(Some(state))
    }

    fn save(&self, region: RegionId, state: &EventState) -> Result<(), PersistenceError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| PersistenceError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path_for(region);
        let serialized = ron::to_string(state).map_err(PersistenceError::Serialize)?;
        std::fs::write(&path, serialized).map_err(|source| PersistenceError::Io { path, source })
    }
}

// ---------------------------------------------------------------------------
// EventStateStore
// ---------------------------------------------------------------------------

/// Concurrent per-region view over a [`StateBackend`].
pub struct EventStateStore {
    cache: DashMap<RegionId, EventState>,
    backend: Box<dyn StateBackend>,
}

impl EventStateStore {
    /// Creates a store over `backend`.
    pub fn new(backend: Box<dyn StateBackend>) -> Self {
        Self {
            cache: DashMap::new(),
            backend,
        }
    }

    /// Creates a store backed by memory only.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::new()))
    }

    /// Current state of `region`. The first access loads from the backend
    /// and falls back to the inactive default. Non-canonical or unparsable
    /// stored values are normalized to inactive and overwritten by the next
    /// [`set`](Self::set).
    pub fn get(&self, region: RegionId) -> Result<EventState, PersistenceError> {
        if let Some(state) = self.cache.get(&region) {
            return Ok(*state);
        }
        let loaded = match self.backend.load(region) {
            Ok(Some(state)) if state.is_canonical() => state,
            Ok(Some(state)) => {
                tracing::warn!("Discarding malformed stored state for {region}: {state:?}");
                EventState::INACTIVE
            }
            Ok(None) => EventState::INACTIVE,
            Err(err @ PersistenceError::Corrupt { .. }) => {
                tracing::warn!("Discarding unreadable stored state for {region}: {err}");
                EventState::INACTIVE
            }
            Err(err) => return Err(err),
        };
        Ok(*self.cache.entry(region).or_insert(loaded))
    }

    /// Persists `state` for `region`; the in-memory view changes only if the
    /// backend write succeeded.
    pub fn set(&self, region: RegionId, state: EventState) -> Result<(), PersistenceError> {
        self.backend.save(region, &state)?;
        self.cache.insert(region, state);
        Ok(())
    }

    /// Whether the event is active in `region`. An unreadable entry reads as
    /// inactive for this tick.
    pub fn is_active(&self, region: RegionId) -> bool {
        match self.get(region) {
            Ok(state) => state.active,
            Err(err) => {
                tracing::debug!("Treating {region} as inactive: {err}");
                false
            }
        }
    }

    /// Regions with a cached entry.
    pub fn known_regions(&self) -> Vec<RegionId> {
        self.cache.iter().map(|e| *e.key()).collect()
    }
}

impl std::fmt::Debug for EventStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStateStore")
            .field("regions", &self.cache.len())
            .finish()
    }
}
