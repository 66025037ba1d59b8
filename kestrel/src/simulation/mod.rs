//! The boundary between the scheduler and a discrete-event simulation.
//!
//! Kestrel treats simulation as an oracle: it schedules directives into a [SimulationEngine],
//! steps it forward, and reads back [SimulationResults]. How the engine works inside is up to
//! the mission model. The [facade] owns the policy of when to simulate and what to cache; the
//! [reference] module contains a small engine for tests and demos.

pub mod facade;
pub mod reference;

use crate::Duration;
use crate::activity::{ActivityId, ActivityTypeCatalog, SchedulingActivityDirective};
use crate::error::SimulationError;
use crate::time::{Edge, Interval, Windows};
use crate::value::Value;
use std::collections::BTreeMap;

/// A running simulation.
///
/// Engines only move forward. To explore alternatives, [duplicate][SimulationEngine::duplicate]
/// the engine first.
pub trait SimulationEngine: Send {
    /// The time up to which events have been processed.
    fn now(&self) -> Duration;

    /// Adds a directive to the simulation, starting at `start`. Fails if `start` is before [now][SimulationEngine::now].
    fn schedule(
        &mut self,
        directive: &SchedulingActivityDirective,
        start: Duration,
    ) -> Result<(), SimulationError>;

    /// Processes every event strictly before `time`.
    fn step_until(&mut self, time: Duration) -> Result<(), SimulationError>;

    /// The simulated duration of an activity, once it has started.
    fn activity_duration(&self, id: ActivityId) -> Option<Duration>;

    fn results(&self) -> SimulationResults;

    fn duplicate(&self) -> Box<dyn SimulationEngine>;
}

/// A mission model: the activity types it offers, and a way to start simulating them.
pub trait MissionModel: Send + Sync {
    fn activity_types(&self) -> &ActivityTypeCatalog;

    /// A fresh engine at time zero, with no activities.
    fn new_engine(&self) -> Result<Box<dyn SimulationEngine>, SimulationError>;
}

/// Everything a simulation run produced, up to `until`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimulationResults {
    pub until: Duration,
    pub resources: BTreeMap<String, Profile>,
    pub activities: BTreeMap<ActivityId, SimulatedActivity>,
}

impl SimulationResults {
    pub fn resource(&self, name: &str) -> Option<&Profile> {
        self.resources.get(name)
    }

    pub fn value_at(&self, resource: &str, time: Duration) -> Option<&Value> {
        self.resources.get(resource)?.value_at(time)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimulatedActivity {
    pub activity_type: String,
    pub start: Duration,
    pub duration: Duration,
}

/// A piecewise-constant resource timeline.
///
/// Each segment holds its value from its start time until the next segment's start.
/// The last segment holds forever.
#[derive(Clone, Debug, PartialEq)]
pub struct Profile {
    segments: Vec<(Duration, Value)>,
}

impl Profile {
    /// A profile that is `initial` since the beginning of time.
    pub fn new(initial: Value) -> Self {
        Self {
            segments: vec![(Duration::MIN, initial)],
        }
    }

    /// Changes the value from `time` onward. Times must be non-decreasing.
    pub fn set(&mut self, time: Duration, value: Value) {
        match self.segments.last_mut() {
            Some((last_time, last_value)) if *last_time == time => *last_value = value,
            Some((_, last_value)) if *last_value == value => {}
            _ => self.segments.push((time, value)),
        }
        let n = self.segments.len();
        if n >= 2 && self.segments[n - 2].1 == self.segments[n - 1].1 {
            self.segments.pop();
        }
    }

    pub fn value_at(&self, time: Duration) -> Option<&Value> {
        let index = self.segments.partition_point(|(start, _)| *start <= time);
        index.checked_sub(1).map(|i| &self.segments[i].1)
    }

    /// The last value set.
    pub fn latest(&self) -> Option<&Value> {
        self.segments.last().map(|(_, v)| v)
    }

    /// Each segment as a `[start, next_start)` interval.
    pub fn segments(&self) -> impl Iterator<Item = (Interval, &Value)> {
        self.segments.iter().enumerate().filter_map(|(i, (start, value))| {
            let upper = match self.segments.get(i + 1) {
                Some((next, _)) => Edge::before(*next),
                None => Edge::POS_INFINITY,
            };
            Interval::from_edges(Edge::before(*start), upper).map(|interval| (interval, value))
        })
    }

    /// Where the value satisfies `predicate`.
    pub fn windows_where(&self, mut predicate: impl FnMut(&Value) -> bool) -> Windows {
        self.segments()
            .filter(|(_, value)| predicate(value))
            .map(|(interval, _)| interval)
            .collect()
    }
}
