//! Configuration system for the aurora event server.
//!
//! Provides runtime-configurable settings that persist to disk as RON files.
//! Supports CLI overrides via clap, hot-reload detection, load-time range
//! validation, and forward/backward compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    AuroraConfig, CollectorConfig, CycleConfig, DebugConfig, DecorationConfig, EventConfig,
    ServerConfig, WispConfig, default_config_dir,
};
pub use error::ConfigError;
