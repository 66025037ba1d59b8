//! # Kestrel Scheduler
//!
//! A goal-directed activity scheduler for spacecraft plans.
//!
//! Given a mission model (a catalog of activity types and a discrete-event simulation of them),
//! a planning horizon, and a list of declarative goals in priority order, Kestrel produces a
//! plan - a set of timed activity directives - that satisfies as many goals as it can, while
//! respecting temporal constraints and feedback from simulated resources.
//!
//! ## Concepts
//!
//! ### Goals & Conflicts
//!
//! Goals describe what the plan should contain, not how to build it: "an observation every
//! five minutes", "at least three downlinks per orbit", "a heater warmup before every
//! instrument turn-on". Each goal is evaluated over the time it applies to, and every place
//! where it is unmet becomes a conflict. Conflicts are resolved by associating an existing
//! matching activity with the goal when possible, and by creating a new activity otherwise.
//!
//! Goals are processed strictly in priority order, one at a time. Later goals see the activities
//! (and the simulated resource effects) of earlier ones, so the order is meaningful.
//!
//! ### Templates & Creation
//!
//! Activities are described by templates: a type plus optional start, end, and duration ranges,
//! and constraints on arguments. To create an activity from a template, the [creator] builds a
//! small [temporal network][stn] for the candidate and solves it. For activities whose duration
//! is a *result* of simulation (uncontrollable durations), the creator searches for a
//! self-consistent start time with a secant [root finder][root_finding], simulating each guess.
//!
//! ### Simulation
//!
//! Kestrel doesn't contain a simulation engine of its own; it consumes one through the
//! [simulation::SimulationEngine] trait. The [simulation::facade::SimulationFacade] keeps a cache
//! of engine checkpoints, so that adding one activity late in the plan doesn't resimulate
//! everything from the start of the horizon. A small [reference engine][simulation::reference]
//! is included for tests and demos.
//!
//! ### Backtracking
//!
//! Goals may ask to be rolled back if they can't be fully satisfied, in which case the plan is
//! restored to exactly what it was before the goal ran. Composite goals (AND / OR) roll back
//! all of their children together.
//!
//! ## Example
//!
//! See the `potato_sat` crate in the workspace for a complete example of a toy model and a set
//! of goals.

pub mod activity;
pub mod condition;
pub mod config;
pub mod creator;
pub mod error;
pub mod expression;
pub mod goal;
pub mod interrupt;
pub mod plan;
pub mod root_finding;
pub mod simulation;
pub mod solver;
pub mod stn;
pub mod time;
pub mod value;

pub use anyhow;
pub use hifitime::{Duration, Epoch as Time};

pub use activity::{
    ActivityId, ActivityType, ActivityTypeCatalog, DurationType, SchedulingActivityDirective,
};
pub use config::SchedulerConfig;
pub use error::{ConfigError, SchedulingError, SimulationError};
pub use goal::Goal;
pub use interrupt::Interrupter;
pub use plan::Plan;
pub use solver::{PrioritySolver, Problem};
pub use time::{Interval, PlanningHorizon, Spans, Windows};
pub use value::{Arguments, Value};
