//! A small event-queue simulation engine.
//!
//! Resources are named [Value]s. Each activity type has an [ActivityBehavior] that runs
//! once, at the activity's start: it sees the arguments and the resource state at that
//! instant, lays out its effects with an [Ops] cursor, and returns its duration.
//!
//! ```
//! # use kestrel::simulation::reference::*;
//! # use kestrel::{ActivityType, Duration, Value};
//! let model = ReferenceModel::new()
//!     .with_resource("battery", 100.0)
//!     .with_activity(
//!         ActivityType::uncontrollable("Drain"),
//!         |_args, _state, ops| {
//!             ops.add("battery", -10.0);
//!             ops.wait(Duration::from_seconds(5.0));
//!             Ok(ops.elapsed())
//!         },
//!     );
//! ```

use crate::Duration;
use crate::activity::{ActivityId, ActivityTypeCatalog, ActivityType, SchedulingActivityDirective};
use crate::error::SimulationError;
use crate::simulation::{MissionModel, Profile, SimulatedActivity, SimulationEngine, SimulationResults};
use crate::value::{Arguments, Value};
use anyhow::anyhow;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The value of every resource at one instant.
pub type ResourceState = BTreeMap<String, Value>;

/// What an activity does when it starts.
pub trait ActivityBehavior: Send + Sync {
    fn run(
        &self,
        arguments: &Arguments,
        state: &ResourceState,
        ops: &mut Ops,
    ) -> anyhow::Result<Duration>;
}

impl<F> ActivityBehavior for F
where
    F: Fn(&Arguments, &ResourceState, &mut Ops) -> anyhow::Result<Duration> + Send + Sync,
{
    fn run(
        &self,
        arguments: &Arguments,
        state: &ResourceState,
        ops: &mut Ops,
    ) -> anyhow::Result<Duration> {
        self(arguments, state, ops)
    }
}

#[derive(Clone, Debug)]
enum Effect {
    Set(Value),
    Add(f64),
}

/// A cursor for laying out an activity's effects over time.
///
/// Starts at the activity's start time. Effects are applied in the order they were
/// declared, at the cursor's position when they were declared.
pub struct Ops {
    start: Duration,
    cursor: Duration,
    effects: Vec<(Duration, String, Effect)>,
}

impl Ops {
    fn new(start: Duration) -> Self {
        Self {
            start,
            cursor: start,
            effects: vec![],
        }
    }

    /// Moves the cursor forward.
    pub fn wait(&mut self, delay: Duration) {
        self.cursor += delay;
    }

    /// Moves the cursor to an offset from the activity's start.
    pub fn goto(&mut self, offset: Duration) {
        self.cursor = self.start + offset;
    }

    /// How far the cursor is from the activity's start.
    pub fn elapsed(&self) -> Duration {
        self.cursor - self.start
    }

    pub fn set(&mut self, resource: impl Into<String>, value: impl Into<Value>) {
        self.effects
            .push((self.cursor, resource.into(), Effect::Set(value.into())));
    }

    /// Adds to a numeric resource.
    pub fn add(&mut self, resource: impl Into<String>, amount: f64) {
        self.effects
            .push((self.cursor, resource.into(), Effect::Add(amount)));
    }
}

#[derive(Clone)]
enum Event {
    Start {
        id: ActivityId,
        activity_type: String,
        arguments: Arguments,
    },
    Effect {
        activity: ActivityId,
        resource: String,
        effect: Effect,
    },
}

/// A mission model made of plain resources and closures.
#[derive(Clone, Default)]
pub struct ReferenceModel {
    catalog: ActivityTypeCatalog,
    behaviors: BTreeMap<String, Arc<dyn ActivityBehavior>>,
    initial: ResourceState,
}

impl ReferenceModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, name: impl Into<String>, initial: impl Into<Value>) -> Self {
        self.initial.insert(name.into(), initial.into());
        self
    }

    /// Adds an activity type whose behavior is a closure.
    pub fn with_activity(
        self,
        activity_type: ActivityType,
        behavior: impl Fn(&Arguments, &ResourceState, &mut Ops) -> anyhow::Result<Duration>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.with_behavior(activity_type, behavior)
    }

    pub fn with_behavior(
        mut self,
        activity_type: ActivityType,
        behavior: impl ActivityBehavior + 'static,
    ) -> Self {
        self.behaviors
            .insert(activity_type.name.clone(), Arc::new(behavior));
        self.catalog.insert(activity_type);
        self
    }
}

impl MissionModel for ReferenceModel {
    fn activity_types(&self) -> &ActivityTypeCatalog {
        &self.catalog
    }

    fn new_engine(&self) -> Result<Box<dyn SimulationEngine>, SimulationError> {
        let profiles = self
            .initial
            .iter()
            .map(|(name, value)| (name.clone(), Profile::new(value.clone())))
            .collect();
        Ok(Box::new(ReferenceEngine {
            catalog: Arc::new(self.catalog.clone()),
            behaviors: Arc::new(self.behaviors.clone()),
            now: Duration::ZERO,
            state: self.initial.clone(),
            profiles,
            queue: BTreeMap::new(),
            sequence: 0,
            activities: BTreeMap::new(),
        }))
    }
}

#[derive(Clone)]
pub struct ReferenceEngine {
    catalog: Arc<ActivityTypeCatalog>,
    behaviors: Arc<BTreeMap<String, Arc<dyn ActivityBehavior>>>,
    now: Duration,
    state: ResourceState,
    profiles: BTreeMap<String, Profile>,
    /// Keyed by time, then insertion order, so simultaneous events run in the order they were queued.
    queue: BTreeMap<(Duration, u64), Event>,
    sequence: u64,
    activities: BTreeMap<ActivityId, SimulatedActivity>,
}

impl ReferenceEngine {
    fn enqueue(&mut self, time: Duration, event: Event) {
        self.queue.insert((time, self.sequence), event);
        self.sequence += 1;
    }

    fn process(&mut self, time: Duration, event: Event) -> Result<(), SimulationError> {
        match event {
            Event::Start {
                id,
                activity_type,
                arguments,
            } => {
                let behavior = self
                    .behaviors
                    .get(&activity_type)
                    .cloned()
                    .ok_or_else(|| {
                        SimulationError::in_activity(
                            time,
                            id,
                            anyhow!("no behavior for activity type {activity_type}"),
                        )
                    })?;
                let mut ops = Ops::new(time);
                let duration = behavior
                    .run(&arguments, &self.state, &mut ops)
                    .map_err(|e| SimulationError::in_activity(time, id, e))?;
                if duration < Duration::ZERO {
                    return Err(SimulationError::in_activity(
                        time,
                        id,
                        anyhow!("negative duration {duration}"),
                    ));
                }
                for (at, resource, effect) in ops.effects {
                    if at < time {
                        return Err(SimulationError::in_activity(
                            time,
                            id,
                            anyhow!("effect on {resource} at {at} is before the activity started"),
                        ));
                    }
                    self.enqueue(
                        at,
                        Event::Effect {
                            activity: id,
                            resource,
                            effect,
                        },
                    );
                }
                self.activities.insert(
                    id,
                    SimulatedActivity {
                        activity_type,
                        start: time,
                        duration,
                    },
                );
            }
            Event::Effect {
                activity,
                resource,
                effect,
            } => {
                let value = match effect {
                    Effect::Set(value) => value,
                    Effect::Add(amount) => {
                        let current = self
                            .state
                            .get(&resource)
                            .and_then(Value::as_real)
                            .ok_or_else(|| {
                                SimulationError::in_activity(
                                    time,
                                    activity,
                                    anyhow!("resource {resource} is missing or not numeric"),
                                )
                            })?;
                        Value::Real(current + amount)
                    }
                };
                self.profiles
                    .entry(resource.clone())
                    .or_insert_with(|| Profile::new(Value::Null))
                    .set(time, value.clone());
                self.state.insert(resource, value);
            }
        }
        Ok(())
    }
}

impl SimulationEngine for ReferenceEngine {
    fn now(&self) -> Duration {
        self.now
    }

    fn schedule(
        &mut self,
        directive: &SchedulingActivityDirective,
        start: Duration,
    ) -> Result<(), SimulationError> {
        if start < self.now {
            return Err(SimulationError::in_activity(
                self.now,
                directive.id,
                anyhow!("cannot schedule an activity at {start}, the engine is already at {}", self.now),
            ));
        }
        let activity_type = self
            .catalog
            .get(&directive.activity_type)
            .ok_or_else(|| {
                SimulationError::in_activity(
                    start,
                    directive.id,
                    anyhow!("unknown activity type {}", directive.activity_type),
                )
            })?;
        let arguments = directive.instantiated_arguments(activity_type);
        self.enqueue(
            start,
            Event::Start {
                id: directive.id,
                activity_type: directive.activity_type.clone(),
                arguments,
            },
        );
        Ok(())
    }

    fn step_until(&mut self, time: Duration) -> Result<(), SimulationError> {
        while let Some(entry) = self.queue.first_entry() {
            let (at, _) = *entry.key();
            if at >= time {
                break;
            }
            let event = entry.remove();
            self.now = at;
            self.process(at, event)?;
        }
        if time > self.now {
            self.now = time;
        }
        Ok(())
    }

    fn activity_duration(&self, id: ActivityId) -> Option<Duration> {
        self.activities.get(&id).map(|a| a.duration)
    }

    fn results(&self) -> SimulationResults {
        SimulationResults {
            until: self.now,
            resources: self.profiles.clone(),
            activities: self.activities.clone(),
        }
    }

    fn duplicate(&self) -> Box<dyn SimulationEngine> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(seconds: f64) -> Duration {
        Duration::from_seconds(seconds)
    }

    fn model() -> ReferenceModel {
        ReferenceModel::new()
            .with_resource("battery", 100.0)
            .with_activity(
                ActivityType::uncontrollable("Drain"),
                |args, _, ops| {
                    let amount = args.get("amount").and_then(Value::as_real).unwrap_or(10.0);
                    ops.wait(s(1.0));
                    ops.add("battery", -amount);
                    ops.wait(s(1.0));
                    Ok(ops.elapsed())
                },
            )
            .with_activity(
                ActivityType::uncontrollable("Fail"),
                |_, _, _| Err(anyhow!("boom")),
            )
    }

    #[test]
    fn effects_land_at_the_cursor() -> anyhow::Result<()> {
        let model = model();
        let mut engine = model.new_engine()?;
        engine.schedule(&SchedulingActivityDirective::new(ActivityId::new(0), "Drain", s(3.0)), s(3.0))?;
        engine.step_until(s(10.0))?;
        let results = engine.results();
        assert_eq!(Some(&Value::Real(100.0)), results.value_at("battery", s(3.5)));
        assert_eq!(Some(&Value::Real(90.0)), results.value_at("battery", s(4.0)));
        assert_eq!(Some(s(2.0)), engine.activity_duration(ActivityId::new(0)));
        Ok(())
    }

    #[test]
    fn stepping_is_exclusive() -> anyhow::Result<()> {
        let model = model();
        let mut engine = model.new_engine()?;
        engine.schedule(&SchedulingActivityDirective::new(ActivityId::new(0), "Drain", s(3.0)), s(3.0))?;
        engine.step_until(s(3.0))?;
        assert_eq!(None, engine.activity_duration(ActivityId::new(0)));
        engine.step_until(s(3.0) + crate::time::resolution())?;
        assert_eq!(Some(s(2.0)), engine.activity_duration(ActivityId::new(0)));
        Ok(())
    }

    #[test]
    fn duplicates_diverge_independently() -> anyhow::Result<()> {
        let model = model();
        let mut engine = model.new_engine()?;
        engine.step_until(s(1.0))?;
        let mut copy = engine.duplicate();
        copy.schedule(&SchedulingActivityDirective::new(ActivityId::new(0), "Drain", s(2.0)), s(2.0))?;
        copy.step_until(s(10.0))?;
        engine.step_until(s(10.0))?;
        assert_eq!(Some(&Value::Real(100.0)), engine.results().value_at("battery", s(9.0)));
        assert_eq!(Some(&Value::Real(90.0)), copy.results().value_at("battery", s(9.0)));
        Ok(())
    }

    #[test]
    fn scheduling_in_the_past_fails() -> anyhow::Result<()> {
        let mut engine = model().new_engine()?;
        engine.step_until(s(5.0))?;
        let result = engine.schedule(&SchedulingActivityDirective::new(ActivityId::new(0), "Drain", s(1.0)), s(1.0));
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn behavior_errors_carry_the_activity() -> anyhow::Result<()> {
        let mut engine = model().new_engine()?;
        engine.schedule(&SchedulingActivityDirective::new(ActivityId::new(4), "Fail", s(1.0)), s(1.0))?;
        let error = engine.step_until(s(2.0)).unwrap_err();
        assert_eq!(Some(ActivityId::new(4)), error.activity);
        assert_eq!(s(1.0), error.time);
        Ok(())
    }
}
