//! Partial descriptions of activities, used both to recognize existing activities and
//! to create new ones.

use crate::Duration;
use crate::activity::ActivityType;
use crate::error::SchedulingError;
use crate::expression::{EvaluationContext, EvaluationEnvironment, ProfileExpression};
use crate::plan::PlacedActivity;
use crate::time::Interval;
use crate::value::{Arguments, Value, subset_or_equal};
use std::collections::BTreeMap;
use std::sync::Arc;

/// How template arguments are compared with an activity's arguments.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum ArgumentMatching {
    /// Each template argument must equal the activity's argument.
    #[default]
    Exact,
    /// Each template argument must be a structural subset of the activity's argument.
    /// See [subset_or_equal].
    Subset,
}

/// Inclusive bounds on an activity's duration, evaluated at the activity's start.
#[derive(Clone, PartialEq, Debug)]
pub struct DurationRange {
    pub lower: ProfileExpression,
    pub upper: ProfileExpression,
}

impl DurationRange {
    pub fn between(lower: Duration, upper: Duration) -> Self {
        Self {
            lower: lower.into(),
            upper: upper.into(),
        }
    }

    pub fn exactly(duration: Duration) -> Self {
        Self::between(duration, duration)
    }

    /// The bounds at `time`, if both can be evaluated.
    pub fn evaluate(
        &self,
        context: &EvaluationContext,
        environment: &EvaluationEnvironment,
        time: Duration,
    ) -> Option<(Duration, Duration)> {
        Some((
            self.lower.evaluate_duration(context, environment, time)?,
            self.upper.evaluate_duration(context, environment, time)?,
        ))
    }
}

/// A conjunction of conditions on an activity. Unset fields match anything.
///
/// Fields are public; the `with_*` helpers overwrite one field each.
#[derive(Clone, Debug, Default)]
pub struct ActivityExpression {
    pub type_name: Option<String>,
    pub start_range: Option<Interval>,
    pub end_range: Option<Interval>,
    pub duration_range: Option<DurationRange>,
    /// [Value::Null] constants match any value.
    pub arguments: BTreeMap<String, ProfileExpression>,
    pub argument_matching: ArgumentMatching,
}

impl ActivityExpression {
    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Self::default()
        }
    }

    pub fn starting_in(mut self, range: Interval) -> Self {
        self.start_range = Some(range);
        self
    }

    pub fn ending_in(mut self, range: Interval) -> Self {
        self.end_range = Some(range);
        self
    }

    pub fn with_duration_range(mut self, range: DurationRange) -> Self {
        self.duration_range = Some(range);
        self
    }

    pub fn with_argument(
        mut self,
        name: impl Into<String>,
        value: impl Into<ProfileExpression>,
    ) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    pub fn with_argument_matching(mut self, matching: ArgumentMatching) -> Self {
        self.argument_matching = matching;
        self
    }

    /// Whether a placed activity satisfies every condition.
    pub fn matches(
        &self,
        activity: &PlacedActivity,
        context: &EvaluationContext,
        environment: &EvaluationEnvironment,
    ) -> bool {
        let directive = activity.directive;
        if self
            .type_name
            .as_ref()
            .is_some_and(|name| *name != directive.activity_type)
        {
            return false;
        }
        if self
            .start_range
            .is_some_and(|range| !range.contains(activity.start))
        {
            return false;
        }
        if let Some(range) = self.end_range {
            if !activity.end().is_some_and(|end| range.contains(end)) {
                return false;
            }
        }
        if let Some(range) = &self.duration_range {
            let Some(duration) = activity.duration else {
                return false;
            };
            match range.evaluate(context, environment, activity.start) {
                Some((lower, upper)) if lower <= duration && duration <= upper => {}
                _ => return false,
            }
        }
        if self.arguments.is_empty() {
            return true;
        }

        let instance = match context.catalog.get(&directive.activity_type) {
            Some(activity_type) => directive.instantiated_arguments(activity_type),
            None => directive.arguments.clone(),
        };
        self.arguments.iter().all(|(name, expression)| {
            let Some(expected) = expression.evaluate(context, environment, activity.start) else {
                return false;
            };
            if expected.is_null() {
                return true;
            }
            instance.get(name).is_some_and(|actual| match self.argument_matching {
                ArgumentMatching::Exact => *actual == expected,
                ArgumentMatching::Subset => subset_or_equal(actual, &expected),
            })
        })
    }
}

/// An [ActivityExpression] bound to a concrete type, which can synthesize new activities.
#[derive(Clone, Debug)]
pub struct ActivityCreationTemplate {
    activity_type: Arc<ActivityType>,
    expression: ActivityExpression,
}

impl ActivityCreationTemplate {
    /// Binds an expression to a type, failing fast on anything that could never create
    /// an activity: a different type name, unknown parameters, or a negative or
    /// inverted constant duration range.
    pub fn new(
        activity_type: &ActivityType,
        mut expression: ActivityExpression,
    ) -> Result<Self, SchedulingError> {
        match &expression.type_name {
            Some(name) if *name != activity_type.name => {
                return Err(SchedulingError::invalid(format!(
                    "template for {name} cannot create activities of type {}",
                    activity_type.name
                )));
            }
            Some(_) => {}
            None => expression.type_name = Some(activity_type.name.clone()),
        }
        if let Some(unknown) = expression
            .arguments
            .keys()
            .find(|name| !activity_type.has_parameter(name))
        {
            return Err(SchedulingError::invalid(format!(
                "{} has no parameter named {unknown}",
                activity_type.name
            )));
        }
        if let Some(range) = &expression.duration_range {
            let lower = range.lower.as_constant().map(Value::as_duration);
            let upper = range.upper.as_constant().map(Value::as_duration);
            for bound in [lower, upper].into_iter().flatten() {
                match bound {
                    Some(d) if d < Duration::ZERO => {
                        return Err(SchedulingError::invalid(format!(
                            "duration bound {d} of a {} template is negative",
                            activity_type.name
                        )));
                    }
                    None => {
                        return Err(SchedulingError::invalid(format!(
                            "duration bound of a {} template is not a duration",
                            activity_type.name
                        )));
                    }
                    Some(_) => {}
                }
            }
            if let (Some(Some(lower)), Some(Some(upper))) = (lower, upper) {
                if lower > upper {
                    return Err(SchedulingError::invalid(format!(
                        "duration range [{lower}, {upper}] of a {} template is empty",
                        activity_type.name
                    )));
                }
            }
        }
        Ok(Self {
            activity_type: Arc::new(activity_type.clone()),
            expression,
        })
    }

    pub fn activity_type(&self) -> &ActivityType {
        &self.activity_type
    }

    pub fn expression(&self) -> &ActivityExpression {
        &self.expression
    }

    pub fn matches(
        &self,
        activity: &PlacedActivity,
        context: &EvaluationContext,
        environment: &EvaluationEnvironment,
    ) -> bool {
        self.expression.matches(activity, context, environment)
    }

    /// The explicit arguments for a new activity starting at `start`.
    ///
    /// Null-valued template arguments are left out, so the type's defaults apply.
    /// Returns `None` if an argument can't be evaluated.
    pub fn instantiate_arguments(
        &self,
        context: &EvaluationContext,
        environment: &EvaluationEnvironment,
        start: Duration,
    ) -> Option<Arguments> {
        let mut arguments = Arguments::new();
        for (name, expression) in &self.expression.arguments {
            let value = expression.evaluate(context, environment, start)?;
            if !value.is_null() {
                arguments.insert(name.clone(), value);
            }
        }
        Some(arguments)
    }
}

/// A creation template, or an ordered choice between several.
///
/// Matching succeeds if any branch matches. Creation tries the branches in order and
/// keeps the first one that succeeds, so earlier branches are preferred.
#[derive(Clone, Debug)]
pub enum ActivityTemplate {
    Create(ActivityCreationTemplate),
    Any(Vec<ActivityTemplate>),
}

impl ActivityTemplate {
    pub fn new(
        activity_type: &ActivityType,
        expression: ActivityExpression,
    ) -> Result<Self, SchedulingError> {
        Ok(ActivityTemplate::Create(ActivityCreationTemplate::new(
            activity_type,
            expression,
        )?))
    }

    pub fn any(branches: Vec<ActivityTemplate>) -> Result<Self, SchedulingError> {
        let template = ActivityTemplate::Any(branches);
        template.validate()?;
        Ok(template)
    }

    pub fn validate(&self) -> Result<(), SchedulingError> {
        match self {
            ActivityTemplate::Create(_) => Ok(()),
            ActivityTemplate::Any(branches) if branches.is_empty() => Err(
                SchedulingError::invalid("a disjunction of templates needs at least one branch"),
            ),
            ActivityTemplate::Any(branches) => branches.iter().try_for_each(Self::validate),
        }
    }

    pub fn matches(
        &self,
        activity: &PlacedActivity,
        context: &EvaluationContext,
        environment: &EvaluationEnvironment,
    ) -> bool {
        match self {
            ActivityTemplate::Create(template) => template.matches(activity, context, environment),
            ActivityTemplate::Any(branches) => branches
                .iter()
                .any(|branch| branch.matches(activity, context, environment)),
        }
    }

    /// Every creation template, depth first, in priority order.
    pub fn branches(&self) -> Vec<&ActivityCreationTemplate> {
        match self {
            ActivityTemplate::Create(template) => vec![template],
            ActivityTemplate::Any(branches) => {
                branches.iter().flat_map(|b| b.branches()).collect()
            }
        }
    }
}

impl From<ActivityCreationTemplate> for ActivityTemplate {
    fn from(value: ActivityCreationTemplate) -> Self {
        ActivityTemplate::Create(value)
    }
}
