//! Scheduler configuration, loadable from TOML.
//!
//! ```
//! use kestrel::SchedulerConfig;
//!
//! let config = SchedulerConfig::from_toml_str(r#"
//!     [simulation]
//!     max_cached_engines = 4
//!
//!     [root_finding]
//!     max_iterations = 30
//! "#).unwrap();
//!
//! assert_eq!(config.simulation.max_cached_engines, 4);
//! assert_eq!(config.root_finding.discontinuity_retries, 8);
//! ```

use crate::Duration;
use crate::error::ConfigError;
use crate::time::from_micros;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub simulation: SimulationConfig,
    pub root_finding: RootFindingConfig,
    pub solver: SolverConfig,
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads and validates configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_file(path)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses and validates configuration from a TOML string. Missing fields take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: SchedulerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| {
            Err(ConfigError::Invalid {
                reason: reason.to_string(),
            })
        };
        if self.simulation.max_cached_engines == 0 {
            return invalid("simulation.max_cached_engines must be at least 1");
        }
        if self.root_finding.max_iterations == 0 {
            return invalid("root_finding.max_iterations must be at least 1");
        }
        if self.root_finding.perturbation_micros == 0 {
            return invalid("root_finding.perturbation_micros must be at least 1");
        }
        if self.solver.max_creations_per_conflict == 0 {
            return invalid("solver.max_creations_per_conflict must be at least 1");
        }
        Ok(())
    }

    pub fn with_max_cached_engines(mut self, max: usize) -> Self {
        self.simulation.max_cached_engines = max;
        self
    }

    pub fn with_worker_offload(mut self, offload: bool) -> Self {
        self.simulation.offload_to_worker = offload;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Upper bound on checkpointed engines kept by the facade.
    pub max_cached_engines: usize,
    /// Step engines on a rayon worker instead of the calling thread.
    pub offload_to_worker: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_cached_engines: 8,
            offload_to_worker: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RootFindingConfig {
    /// Secant iterations allowed before giving up.
    pub max_iterations: usize,
    /// How many perturbed retries a single discontinuous point gets.
    pub discontinuity_retries: usize,
    /// Size of the first perturbation step, in microseconds. Doubles on each retry.
    pub perturbation_micros: u32,
}

impl RootFindingConfig {
    pub fn perturbation(&self) -> Duration {
        from_micros(self.perturbation_micros as i64)
    }
}

impl Default for RootFindingConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            discontinuity_retries: 8,
            perturbation_micros: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    /// Bounds how many activities a single conflict may create (cardinality goals).
    pub max_creations_per_conflict: usize,
    /// Re-simulate after each goal, so later goals see its effects.
    pub simulate_after_goal: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_creations_per_conflict: 64,
            simulate_after_goal: true,
        }
    }
}
