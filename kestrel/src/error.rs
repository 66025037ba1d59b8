//! Errors that can escape a scheduling run.
//!
//! Infeasibility (an inconsistent temporal network, no window that fits an activity)
//! and root-finding failures are *not* represented here; they are expected outcomes
//! that the creator and solver handle locally.

use crate::Duration;
use crate::activity::ActivityId;
use derive_more::{Display, Error};
use std::fmt::Formatter;

#[derive(Debug, Display, Error)]
pub enum SchedulingError {
    /// The simulation engine failed. Aborts the current goal, not the whole run.
    #[display("{source}")]
    Simulation { source: SimulationError },

    /// The caller's interruption predicate returned true.
    #[display("scheduling was interrupted")]
    Interrupted,

    /// A goal, template, condition, or plan was malformed.
    #[display("invalid scheduling configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[display("unknown activity type `{name}`")]
    UnknownActivityType { name: String },

    /// Anchors in a supplied plan could not be resolved to absolute times.
    #[display("could not ground plan: {reason}")]
    Grounding { reason: String },
}

impl From<SimulationError> for SchedulingError {
    fn from(source: SimulationError) -> Self {
        SchedulingError::Simulation { source }
    }
}

impl SchedulingError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        SchedulingError::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}

/// A failure inside the simulation engine.
#[derive(Debug, Error)]
pub struct SimulationError {
    pub time: Duration,
    pub activity: Option<ActivityId>,
    pub reason: anyhow::Error,
}

impl std::fmt::Display for SimulationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "simulation failed at {}", self.time)?;
        if let Some(activity) = self.activity {
            write!(f, " in activity {activity}")?;
        }
        write!(f, ": {}", self.reason)
    }
}

impl SimulationError {
    pub fn new(time: Duration, reason: impl Into<anyhow::Error>) -> Self {
        Self {
            time,
            activity: None,
            reason: reason.into(),
        }
    }

    pub fn in_activity(time: Duration, activity: ActivityId, reason: anyhow::Error) -> Self {
        Self {
            time,
            activity: Some(activity),
            reason,
        }
    }
}

/// Errors from loading a [SchedulerConfig][crate::config::SchedulerConfig].
#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("could not read configuration: {_0}")]
    Io(std::io::Error),

    #[display("could not parse configuration: {_0}")]
    Toml(toml::de::Error),

    #[display("invalid configuration: {reason}")]
    Invalid { reason: String },
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        ConfigError::Toml(value)
    }
}
