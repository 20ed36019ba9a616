//! Operator commands: `aurora start <region> [ticks]`, `aurora end <region>`,
//! `aurora status <region>`.

use std::fmt;

use rand::Rng;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::region::RegionId;
use crate::scheduler::{AuroraScheduler, EndOutcome, StartOutcome};
use crate::state::EventState;
use crate::world::HostWorld;

/// Keyword every admin command starts with.
pub const COMMAND_PREFIX: &str = "aurora";

// ---------------------------------------------------------------------------
// Region names
// ---------------------------------------------------------------------------

/// Maps operator-facing region names to [`RegionId`]s.
#[derive(Clone, Debug, Default)]
pub struct RegionDirectory {
    by_name: FxHashMap<String, RegionId>,
    names: Vec<String>,
}

impl RegionDirectory {
    /// Assigns ids `0..n` to `names` in order. Duplicate names keep their
    /// first id.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut directory = Self::default();
        for name in names {
            let name = name.into();
            if directory.by_name.contains_key(&name) {
                continue;
            }
            let id = RegionId(directory.names.len() as u32);
            directory.by_name.insert(name.clone(), id);
            directory.names.push(name);
        }
        directory
    }

    /// Id of `name`.
    pub fn resolve(&self, name: &str) -> Option<RegionId> {
        self.by_name.get(name).copied()
    }

    /// Name of `region`.
    pub fn name_of(&self, region: RegionId) -> Option<&str> {
        self.names.get(region.0 as usize).map(String::as_str)
    }

    /// Every region in id order.
    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (RegionId(i as u32), name.as_str()))
    }

    /// Number of regions.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no regions are registered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// A parsed operator command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdminCommand {
    /// Force the event on, optionally for an explicit number of ticks.
    Start {
        /// Target region name.
        region: String,
        /// Requested duration in ticks.
        duration: Option<i64>,
    },
    /// Force the event off.
    End {
        /// Target region name.
        region: String,
    },
    /// Report the current state.
    Status {
        /// Target region name.
        region: String,
    },
}

/// Errors raised by [`AdminCommand::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminParseError {
    /// Blank input.
    #[error("empty command")]
    Empty,
    /// The line does not start with the command keyword.
    #[error("not an aurora command: {0}")]
    NotAurora(String),
    /// Unrecognized subcommand.
    #[error("unknown subcommand '{0}' (expected start, end or status)")]
    UnknownVerb(String),
    /// No region given.
    #[error("'{0}' needs a region name")]
    MissingRegion(&'static str),
    /// The duration is not a positive integer.
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),
    /// Extra words after the command.
    #[error("unexpected argument '{0}'")]
    TrailingArgument(String),
}

impl AdminCommand {
    /// Parses one command line.
    pub fn parse(line: &str) -> Result<Self, AdminParseError> {
        let mut words = line.split_whitespace();
        let prefix = words.next().ok_or(AdminParseError::Empty)?;
        if !prefix.eq_ignore_ascii_case(COMMAND_PREFIX) {
            return Err(AdminParseError::NotAurora(prefix.to_string()));
        }

        let verb = words
            .next()
            .ok_or_else(|| AdminParseError::UnknownVerb(String::new()))?
            .to_ascii_lowercase();

        let command = match verb.as_str() {
            "start" => {
                let region = words.next().ok_or(AdminParseError::MissingRegion("start"))?;
                let duration = words.next().map(parse_duration).transpose()?;
                Self::Start {
                    region: region.to_string(),
                    duration,
                }
            }
            "end" | "stop" => Self::End {
                region: words
                    .next()
                    .ok_or(AdminParseError::MissingRegion("end"))?
                    .to_string(),
            },
            "status" | "query" => Self::Status {
                region: words
                    .next()
                    .ok_or(AdminParseError::MissingRegion("status"))?
                    .to_string(),
            },
            _ => return Err(AdminParseError::UnknownVerb(verb)),
        };

        match words.next() {
            Some(extra) => Err(AdminParseError::TrailingArgument(extra.to_string())),
            None => Ok(command),
        }
    }

    /// Name of the targeted region.
    pub fn region(&self) -> &str {
        match self {
            Self::Start { region, .. } | Self::End { region } | Self::Status { region } => region,
        }
    }

    /// Runs the command against `region` at `game_time`.
    pub fn execute<W, R>(
        &self,
        scheduler: &AuroraScheduler,
        region: RegionId,
        game_time: i64,
        world: &mut W,
        rng: &mut R,
    ) -> AdminResponse
    where
        W: HostWorld + ?Sized,
        R: Rng + ?Sized,
    {
        let result = match self {
            Self::Start { duration, .. } => scheduler
                .force_start(region, game_time, *duration, rng)
                .map(|outcome| match outcome {
                    StartOutcome::Started(state) => AdminResponse::Started(state),
                    StartOutcome::NotNight => AdminResponse::NotNight,
                    StartOutcome::AlreadyActive => AdminResponse::AlreadyActive,
                }),
            Self::End { .. } => scheduler.force_end(region, world).map(|outcome| match outcome {
                EndOutcome::Ended(cleanup) => AdminResponse::Ended {
                    removed: cleanup.removed,
                },
                EndOutcome::NotActive => AdminResponse::NotActive,
            }),
            Self::Status { .. } => scheduler
                .query_state(region)
                .map(|state| AdminResponse::Status {
                    state,
                    remaining: state.remaining(game_time),
                }),
        };
        result.unwrap_or_else(|err| AdminResponse::Failed(err.to_string()))
    }
}

fn parse_duration(word: &str) -> Result<i64, AdminParseError> {
    match word.parse::<i64>() {
        Ok(ticks) if ticks > 0 => Ok(ticks),
        _ => Err(AdminParseError::InvalidDuration(word.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Result of an executed command, printable for the operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdminResponse {
    /// The event started.
    Started(EventState),
    /// Start refused: daytime.
    NotNight,
    /// Start refused: already running.
    AlreadyActive,
    /// The event ended.
    Ended {
        /// Decorations removed.
        removed: usize,
    },
    /// End refused: not running.
    NotActive,
    /// Current state.
    Status {
        /// Stored state.
        state: EventState,
        /// Ticks until expiry.
        remaining: i64,
    },
    /// The target region is not known.
    UnknownRegion(String),
    /// A transient failure; try again.
    Failed(String),
}

impl fmt::Display for AdminResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started(state) => write!(
                f,
                "aurora started at tick {}, ends at tick {}",
                state.start_tick, state.end_tick
            ),
            Self::NotNight => write!(f, "cannot start: it is not night"),
            Self::AlreadyActive => write!(f, "aurora is already active"),
            Self::Ended { removed } => write!(f, "aurora ended, {removed} decorations removed"),
            Self::NotActive => write!(f, "aurora is not active"),
            Self::Status { state, remaining } if state.active => write!(
                f,
                "active since tick {} until tick {} ({remaining} ticks left)",
                state.start_tick, state.end_tick
            ),
            Self::Status { .. } => write!(f, "inactive"),
            Self::UnknownRegion(name) => write!(f, "unknown region '{name}'"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}
