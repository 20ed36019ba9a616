//! Command-line argument parsing for the aurora server.

use std::path::PathBuf;

use clap::Parser;

use crate::AuroraConfig;

/// Aurora server command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "aurora-server", about = "Headless aurora event server")]
pub struct CliArgs {
    /// Simulation ticks per second.
    #[arg(long)]
    pub tick_rate: Option<u32>,

    /// RNG seed for reproducible sessions.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Game time at startup.
    #[arg(long)]
    pub start_time: Option<i64>,

    /// Directory for persisted event state.
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Base chance of an event at the night edge.
    #[arg(long)]
    pub base_chance: Option<f64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Stop after this many ticks instead of running forever.
    #[arg(long)]
    pub ticks: Option<u64>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl AuroraConfig {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(rate) = args.tick_rate {
            self.server.tick_rate = rate;
        }
        if let Some(seed) = args.seed {
            self.server.seed = Some(seed);
        }
        if let Some(time) = args.start_time {
            self.server.start_time = time;
        }
        if let Some(ref dir) = args.state_dir {
            self.server.state_dir = Some(dir.clone());
        }
        if let Some(chance) = args.base_chance {
            self.event.base_chance = chance;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = AuroraConfig::default();
        let args = CliArgs {
            tick_rate: Some(40),
            seed: Some(7),
            base_chance: Some(1.0),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.server.tick_rate, 40);
        assert_eq!(config.server.seed, Some(7));
        assert_eq!(config.event.base_chance, 1.0);
        // Non-overridden fields retain defaults
        assert_eq!(config.server.start_time, 12_000);
        assert_eq!(config.debug.log_level, "info,bevy_ecs=warn");
    }

    #[test]
    fn test_cli_no_override() {
        let original = AuroraConfig::default();
        let mut config = AuroraConfig::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args =
            CliArgs::try_parse_from(["aurora-server", "--ticks", "500", "--state-dir", "/tmp/a"])
                .unwrap();
        assert_eq!(args.ticks, Some(500));
        assert_eq!(args.state_dir, Some(PathBuf::from("/tmp/a")));
    }
}
