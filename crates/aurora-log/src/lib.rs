//! Structured logging and tracing for the aurora server.
//!
//! Installs a `tracing` subscriber with console output (uptime timestamps and
//! module paths) and, in debug builds, an optional JSON log file for
//! post-mortem analysis of event cycles. The filter comes from `RUST_LOG`
//! when set, otherwise from the config `debug.log_level`.

use std::path::Path;

use aurora_config::AuroraConfig;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config supply one. The ECS
/// schedule logs at info on every build, which drowns out event logs.
pub const DEFAULT_FILTER: &str = "info,bevy_ecs=warn";

/// Filter that shows every roll and spawn decision.
pub const ROLL_TRACE_FILTER: &str = "info,aurora_core::scheduler=debug,aurora_core::spawn=trace";

/// Name of the JSON log file written into the log directory.
pub const LOG_FILE_NAME: &str = "aurora.log";

/// Resolve the filter string from an optional config.
pub fn filter_from_config(config: Option<&AuroraConfig>) -> String {
    match config {
        Some(config) if !config.debug.log_level.is_empty() => config.debug.log_level.clone(),
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Initialize the global tracing subscriber.
///
/// * `log_dir` - Directory for the JSON log file (debug builds only)
/// * `debug_build` - Whether this is a debug build (enables file logging)
/// * `config` - Optional configuration supplying the log level
///
/// ```no_run
/// use aurora_config::AuroraConfig;
/// use aurora_log::{ROLL_TRACE_FILTER, init_logging};
///
/// // Watch the night-edge rolls of a session.
/// let mut config = AuroraConfig::default();
/// config.debug.log_level = ROLL_TRACE_FILTER.to_string();
/// init_logging(None, false, Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&AuroraConfig>) {
    let filter_str = filter_from_config(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true) // region workers are named after their region
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE_NAME))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}

/// Create an `EnvFilter` with the default filter string.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}
