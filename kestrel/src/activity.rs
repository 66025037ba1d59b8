use crate::Duration;
use crate::error::SchedulingError;
use crate::expression::WindowsExpression;
use crate::value::{Arguments, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// A unique activity ID.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, Debug)]
pub struct ActivityId(u32);

impl ActivityId {
    pub fn new(id: u32) -> ActivityId {
        ActivityId(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl Display for ActivityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out sequential [ActivityId]s, so that runs with the same inputs produce the same ids.
#[derive(Clone, Debug, Default)]
pub struct ActivityIdGenerator {
    next: u32,
}

impl ActivityIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A generator that never returns an id already used in `existing`.
    pub fn after<'a>(existing: impl IntoIterator<Item = &'a ActivityId>) -> Self {
        let next = existing
            .into_iter()
            .map(|id| id.0 + 1)
            .max()
            .unwrap_or_default();
        Self { next }
    }

    pub fn peek(&self) -> ActivityId {
        ActivityId(self.next)
    }

    pub fn next_id(&mut self) -> ActivityId {
        let id = ActivityId(self.next);
        self.next += 1;
        id
    }
}

/// How an activity's duration is decided.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum DurationType {
    /// The duration is an argument of the activity, with the given parameter name.
    /// Its value is a [Value::Int] number of microseconds.
    Controllable { parameter: String },
    /// The duration is an output of simulation, and is discovered by root finding.
    Uncontrollable,
}

/// A kind of activity in the mission model.
#[derive(Clone, Debug)]
pub struct ActivityType {
    pub name: String,
    pub duration_type: DurationType,
    /// Default arguments. The keys are also the set of known parameters.
    pub defaults: Arguments,
    /// Where instances of this type are allowed to be placed, if restricted.
    pub constraint: Option<WindowsExpression>,
}

impl ActivityType {
    pub fn controllable(name: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duration_type: DurationType::Controllable {
                parameter: parameter.into(),
            },
            defaults: Arguments::new(),
            constraint: None,
        }
    }

    pub fn uncontrollable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duration_type: DurationType::Uncontrollable,
            defaults: Arguments::new(),
            constraint: None,
        }
    }

    pub fn with_default(mut self, parameter: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(parameter.into(), value.into());
        self
    }

    pub fn with_constraint(mut self, constraint: WindowsExpression) -> Self {
        self.constraint = Some(constraint);
        self
    }

    pub fn duration_parameter(&self) -> Option<&str> {
        match &self.duration_type {
            DurationType::Controllable { parameter } => Some(parameter),
            DurationType::Uncontrollable => None,
        }
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.defaults.contains_key(name) || self.duration_parameter() == Some(name)
    }

    /// Reads the duration out of a set of arguments, for controllable types.
    pub fn duration_from(&self, arguments: &Arguments) -> Option<Duration> {
        self.duration_parameter()
            .and_then(|p| arguments.get(p))
            .and_then(Value::as_duration)
    }
}

/// The read-only catalog of activity types a mission model offers.
#[derive(Clone, Debug, Default)]
pub struct ActivityTypeCatalog {
    types: BTreeMap<String, Arc<ActivityType>>,
}

impl ActivityTypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, activity_type: ActivityType) -> Arc<ActivityType> {
        let activity_type = Arc::new(activity_type);
        self.types
            .insert(activity_type.name.clone(), activity_type.clone());
        activity_type
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ActivityType>> {
        self.types.get(name)
    }

    /// Looks up a type, failing with [SchedulingError::UnknownActivityType].
    pub fn require(&self, name: &str) -> Result<Arc<ActivityType>, SchedulingError> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| SchedulingError::UnknownActivityType {
                name: name.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ActivityType>> {
        self.types.values()
    }
}

/// An activity instance in a plan.
///
/// The start is an offset from the anchor activity (its start or end, per `anchored_to_start`)
/// when `anchor` is set, or from the start of the planning horizon otherwise. The duration is
/// optional until it is resolved, either from a controllable duration argument or from simulation.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct SchedulingActivityDirective {
    pub id: ActivityId,
    pub activity_type: String,
    pub start_offset: Duration,
    pub duration: Option<Duration>,
    pub arguments: Arguments,
    pub anchor: Option<ActivityId>,
    pub anchored_to_start: bool,
}

impl SchedulingActivityDirective {
    /// An unanchored directive starting at `start`.
    pub fn new(id: ActivityId, activity_type: impl Into<String>, start: Duration) -> Self {
        Self {
            id,
            activity_type: activity_type.into(),
            start_offset: start,
            duration: None,
            arguments: Arguments::new(),
            anchor: None,
            anchored_to_start: true,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    pub fn anchored(mut self, anchor: ActivityId, to_start: bool) -> Self {
        self.anchor = Some(anchor);
        self.anchored_to_start = to_start;
        self
    }

    /// The explicit arguments, layered over the type's defaults.
    pub fn instantiated_arguments(&self, activity_type: &ActivityType) -> Arguments {
        let mut arguments = activity_type.defaults.clone();
        arguments.extend(self.arguments.iter().map(|(k, v)| (k.clone(), v.clone())));
        arguments
    }

    /// The duration if it is known without simulating.
    pub fn known_duration(&self, activity_type: Option<&ActivityType>) -> Option<Duration> {
        self.duration.or_else(|| {
            activity_type.and_then(|t| t.duration_from(&self.instantiated_arguments(t)))
        })
    }
}
