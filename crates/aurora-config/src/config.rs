//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level aurora configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuroraConfig {
    /// Day/night cycle boundaries.
    pub cycle: CycleConfig,
    /// Event roll and duration settings.
    pub event: EventConfig,
    /// Ephemeral decoration spawning.
    pub decoration: DecorationConfig,
    /// Wisp (mobile actor) spawning and despawn.
    pub wisp: WispConfig,
    /// Energy collector fill behaviour.
    pub collector: CollectorConfig,
    /// Headless server host settings.
    pub server: ServerConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Day/night cycle configuration, in ticks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CycleConfig {
    /// Length of one full day/night cycle.
    pub cycle_length: i64,
    /// Time of day at which night begins (the roll edge).
    pub night_start: i64,
    /// Time of day at which night ends. Events never run past it.
    pub dawn: i64,
}

/// Event roll and duration configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventConfig {
    /// Chance of an event starting at the night edge with no catalysts.
    pub base_chance: f64,
    /// Bonus added per catalyst found near an observer.
    pub per_catalyst_bonus: f64,
    /// Upper bound on the total catalyst bonus.
    pub bonus_cap: f64,
    /// Upper bound on the final chance.
    pub chance_cap: f64,
    /// Radius (blocks) scanned for catalysts around each observer.
    pub catalyst_radius: u32,
    /// Minimum event duration in ticks.
    pub min_duration: i64,
    /// Maximum event duration in ticks.
    pub max_duration: i64,
}

/// Decoration spawning configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DecorationConfig {
    /// Attempt spawning every N ticks.
    pub interval: u32,
    /// Per-observer chance of spawning on an interval tick.
    pub chance: f64,
    /// Placement tries per successful roll.
    pub placement_attempts: u32,
    /// Horizontal offset range around the observer.
    pub horizontal_radius: i32,
    /// Vertical offset range around the observer.
    pub vertical_radius: i32,
}

/// Wisp spawning and despawn configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WispConfig {
    /// Attempt spawning every N ticks (coarser than decorations).
    pub interval: u32,
    /// Per-observer chance of spawning on an interval tick.
    pub chance: f64,
    /// Live wisps allowed per observer in the region.
    pub per_observer_cap: u32,
    /// Placement tries per successful roll.
    pub placement_attempts: u32,
    /// Minimum horizontal distance from the observer.
    pub min_distance: i32,
    /// Maximum horizontal distance from the observer.
    pub max_distance: i32,
    /// Ticks of inactivity before an unclaimed wisp is removed.
    pub despawn_delay: u32,
}

/// Energy collector configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectorConfig {
    /// Maximum charge level.
    pub max_charge: u8,
    /// Ticks of exposure per charge level.
    pub fill_rate_ticks: u32,
}

/// Headless server host configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Region names to simulate.
    pub regions: Vec<String>,
    /// Simulated observers placed in each region at startup.
    pub observers_per_region: u32,
    /// Game time at startup.
    pub start_time: i64,
    /// Directory for persisted event state; `None` keeps state in memory.
    pub state_dir: Option<PathBuf>,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Write a JSON log file in debug builds.
    pub log_to_file: bool,
}

// --- Default implementations ---

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            cycle_length: 24_000,
            night_start: 13_000,
            dawn: 23_000,
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            base_chance: 0.33,
            per_catalyst_bonus: 0.15,
            bonus_cap: 0.45,
            chance_cap: 0.95,
            catalyst_radius: 16,
            min_duration: 6_000,
            max_duration: 12_000,
        }
    }
}

impl Default for DecorationConfig {
    fn default() -> Self {
        Self {
            interval: 20,
            chance: 0.2,
            placement_attempts: 8,
            horizontal_radius: 12,
            vertical_radius: 4,
        }
    }
}

impl Default for WispConfig {
    fn default() -> Self {
        Self {
            interval: 100,
            chance: 0.1,
            per_observer_cap: 3,
            placement_attempts: 6,
            min_distance: 6,
            max_distance: 16,
            despawn_delay: 1_200,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_charge: 4,
            fill_rate_ticks: 200,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            seed: None,
            regions: vec!["overworld".to_string(), "frostlands".to_string()],
            observers_per_region: 2,
            start_time: 12_000,
            state_dir: None,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info,bevy_ecs=warn".to_string(),
            log_to_file: false,
        }
    }
}

// --- Validation ---

fn check_probability(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

fn check_nonzero(name: &str, value: u32) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
    }
    Ok(())
}

impl AuroraConfig {
    /// Rejects out-of-range values. Called on every load.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.cycle;
        if c.cycle_length <= 0 {
            return Err(ConfigError::Invalid("cycle.cycle_length must be positive".into()));
        }
        if !(0 <= c.night_start && c.night_start < c.dawn && c.dawn <= c.cycle_length) {
            return Err(ConfigError::Invalid(format!(
                "cycle requires 0 <= night_start < dawn <= cycle_length, got {} / {} / {}",
                c.night_start, c.dawn, c.cycle_length
            )));
        }

        let e = &self.event;
        check_probability("event.base_chance", e.base_chance)?;
        check_probability("event.per_catalyst_bonus", e.per_catalyst_bonus)?;
        check_probability("event.bonus_cap", e.bonus_cap)?;
        check_probability("event.chance_cap", e.chance_cap)?;
        if e.min_duration <= 0 {
            return Err(ConfigError::Invalid("event.min_duration must be positive".into()));
        }
        if e.min_duration > e.max_duration {
            return Err(ConfigError::Invalid(format!(
                "event.min_duration ({}) exceeds event.max_duration ({})",
                e.min_duration, e.max_duration
            )));
        }

        let d = &self.decoration;
        check_nonzero("decoration.interval", d.interval)?;
        check_probability("decoration.chance", d.chance)?;
        if d.horizontal_radius < 0 || d.vertical_radius < 0 {
            return Err(ConfigError::Invalid("decoration radii must not be negative".into()));
        }

        let w = &self.wisp;
        check_nonzero("wisp.interval", w.interval)?;
        check_nonzero("wisp.despawn_delay", w.despawn_delay)?;
        check_probability("wisp.chance", w.chance)?;
        if w.min_distance < 0 || w.min_distance > w.max_distance {
            return Err(ConfigError::Invalid(format!(
                "wisp distances require 0 <= min_distance <= max_distance, got {} / {}",
                w.min_distance, w.max_distance
            )));
        }

        check_nonzero("collector.fill_rate_ticks", self.collector.fill_rate_ticks)?;
        if self.collector.max_charge == 0 {
            return Err(ConfigError::Invalid("collector.max_charge must be non-zero".into()));
        }

        check_nonzero("server.tick_rate", self.server.tick_rate)?;
        Ok(())
    }
}

// --- Load / Save / Reload ---

/// Default per-user config directory (`<config_dir>/aurora`).
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("aurora"))
}

impl AuroraConfig {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: AuroraConfig = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = AuroraConfig::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: AuroraConfig = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
