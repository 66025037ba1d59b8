//! Expressions over the plan and simulation results.
//!
//! Goals and templates are written in terms of these: windows of time where a condition
//! holds, spans of activities to anchor on, and values read from resources or from the
//! arguments of an anchor activity.

pub mod template;

use crate::Duration;
use crate::activity::{ActivityId, ActivityTypeCatalog, SchedulingActivityDirective};
use crate::plan::{Plan, PlacedActivity};
use crate::simulation::SimulationResults;
use crate::time::{Interval, PlanningHorizon, Windows};
use crate::value::Value;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use template::ActivityExpression;

/// Everything an expression may read.
#[derive(Copy, Clone)]
pub struct EvaluationContext<'a> {
    pub plan: &'a Plan,
    pub results: Option<&'a SimulationResults>,
    pub horizon: &'a PlanningHorizon,
    pub catalog: &'a ActivityTypeCatalog,
}

impl<'a> EvaluationContext<'a> {
    pub fn horizon_interval(&self) -> Interval {
        self.horizon.interval()
    }

    pub fn placed_activities(&self) -> Vec<PlacedActivity<'a>> {
        self.plan.placed_activities(self.catalog, self.results)
    }
}

/// Bindings that depend on where an expression is evaluated, rather than on the plan.
#[derive(Clone, Debug, Default)]
pub struct EvaluationEnvironment {
    /// The activity a goal is anchored on, if any. Its arguments are visible to
    /// [ProfileExpression::AnchorArgument].
    pub anchor: Option<SchedulingActivityDirective>,
}

impl EvaluationEnvironment {
    pub fn with_anchor(anchor: SchedulingActivityDirective) -> Self {
        Self {
            anchor: Some(anchor),
        }
    }
}

/// A value that may vary over time.
#[derive(Clone, PartialEq, Debug)]
pub enum ProfileExpression {
    Constant(Value),
    /// A simulated resource.
    Resource(String),
    /// An argument of the anchor activity in the environment, with type defaults applied.
    AnchorArgument(String),
}

impl ProfileExpression {
    /// The value at `time`, or `None` if it can't be known (no results, no anchor, or no such name).
    pub fn evaluate(
        &self,
        context: &EvaluationContext,
        environment: &EvaluationEnvironment,
        time: Duration,
    ) -> Option<Value> {
        match self {
            ProfileExpression::Constant(value) => Some(value.clone()),
            ProfileExpression::Resource(name) => context.results?.value_at(name, time).cloned(),
            ProfileExpression::AnchorArgument(name) => {
                let anchor = environment.anchor.as_ref()?;
                match context.catalog.get(&anchor.activity_type) {
                    Some(activity_type) => anchor
                        .instantiated_arguments(activity_type)
                        .get(name)
                        .cloned(),
                    None => anchor.arguments.get(name).cloned(),
                }
            }
        }
    }

    pub fn evaluate_duration(
        &self,
        context: &EvaluationContext,
        environment: &EvaluationEnvironment,
        time: Duration,
    ) -> Option<Duration> {
        self.evaluate(context, environment, time)?.as_duration()
    }

    /// The value, if it doesn't depend on results or an environment.
    pub fn as_constant(&self) -> Option<&Value> {
        match self {
            ProfileExpression::Constant(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Value> for ProfileExpression {
    fn from(value: Value) -> Self {
        ProfileExpression::Constant(value)
    }
}

impl From<Duration> for ProfileExpression {
    fn from(value: Duration) -> Self {
        ProfileExpression::Constant(value.into())
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Comparison {
    Less,
    LessOrEqual,
    Equal,
    NotEqual,
    GreaterOrEqual,
    Greater,
}

impl Comparison {
    /// Numbers compare numerically (`Int(1)` equals `Real(1.0)` here); anything else
    /// only supports equality.
    pub fn holds(&self, lhs: &Value, rhs: &Value) -> bool {
        let ordering = match (lhs.as_real(), rhs.as_real()) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ if lhs == rhs => Some(Ordering::Equal),
            _ => None,
        };
        match (self, ordering) {
            (Comparison::NotEqual, ordering) => ordering != Some(Ordering::Equal),
            (_, None) => false,
            (Comparison::Less, Some(o)) => o.is_lt(),
            (Comparison::LessOrEqual, Some(o)) => o.is_le(),
            (Comparison::Equal, Some(o)) => o.is_eq(),
            (Comparison::GreaterOrEqual, Some(o)) => o.is_ge(),
            (Comparison::Greater, Some(o)) => o.is_gt(),
        }
    }
}

impl Display for Comparison {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::Equal => "==",
            Comparison::NotEqual => "!=",
            Comparison::GreaterOrEqual => ">=",
            Comparison::Greater => ">",
        };
        write!(f, "{symbol}")
    }
}

/// A boolean function of time.
#[derive(Clone, Debug)]
pub enum WindowsExpression {
    Always,
    Never,
    Constant(Windows),
    /// Where a resource compares to a value.
    Resource {
        name: String,
        op: Comparison,
        value: Value,
    },
    /// Where any activity of the type is running.
    ActivitiesOfType(String),
    And(Vec<WindowsExpression>),
    Or(Vec<WindowsExpression>),
    Not(Box<WindowsExpression>),
    /// Moves every window's start and end independently.
    Shift {
        inner: Box<WindowsExpression>,
        start: Duration,
        end: Duration,
    },
}

impl WindowsExpression {
    pub fn resource(name: impl Into<String>, op: Comparison, value: impl Into<Value>) -> Self {
        WindowsExpression::Resource {
            name: name.into(),
            op,
            value: value.into(),
        }
    }

    pub fn interval(interval: Interval) -> Self {
        WindowsExpression::Constant(Windows::from_interval(interval))
    }

    /// Evaluates the expression, clipped to the planning horizon.
    pub fn evaluate(&self, context: &EvaluationContext) -> Windows {
        let horizon = Windows::from_interval(context.horizon_interval());
        self.evaluate_unclipped(context).intersection(&horizon)
    }

    fn evaluate_unclipped(&self, context: &EvaluationContext) -> Windows {
        match self {
            WindowsExpression::Always => Windows::forever(),
            WindowsExpression::Never => Windows::empty(),
            WindowsExpression::Constant(windows) => windows.clone(),
            WindowsExpression::Resource { name, op, value } => context
                .results
                .and_then(|results| results.resource(name))
                .map(|profile| profile.windows_where(|v| op.holds(v, value)))
                .unwrap_or_default(),
            WindowsExpression::ActivitiesOfType(activity_type) => context
                .placed_activities()
                .iter()
                .filter(|placed| placed.directive.activity_type == *activity_type)
                .map(|placed| placed.span().unwrap_or(Interval::at(placed.start)))
                .collect(),
            WindowsExpression::And(children) => children
                .iter()
                .fold(Windows::forever(), |acc, child| {
                    acc.intersection(&child.evaluate_unclipped(context))
                }),
            WindowsExpression::Or(children) => children
                .iter()
                .fold(Windows::empty(), |acc, child| {
                    acc.union(&child.evaluate_unclipped(context))
                }),
            WindowsExpression::Not(inner) => inner.evaluate_unclipped(context).complement(),
            WindowsExpression::Shift { inner, start, end } => {
                inner.evaluate_unclipped(context).shift_edges(*start, *end)
            }
        }
    }
}

/// A time range to anchor on, and the activity it came from, if any.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct AnchorSpan {
    pub interval: Interval,
    pub activity: Option<ActivityId>,
}

/// A source of anchor spans, for coexistence goals.
#[derive(Clone, Debug)]
pub enum SpansExpression {
    /// One span per activity matching the expression.
    Activities(ActivityExpression),
    /// One span per maximal window.
    Windows(WindowsExpression),
}

impl SpansExpression {
    /// The spans in time order, restricted to the planning horizon.
    pub fn evaluate(&self, context: &EvaluationContext) -> Vec<AnchorSpan> {
        let horizon = context.horizon_interval();
        let mut spans: Vec<AnchorSpan> = match self {
            SpansExpression::Activities(expression) => {
                let environment = EvaluationEnvironment::default();
                context
                    .placed_activities()
                    .into_iter()
                    .filter(|placed| expression.matches(placed, context, &environment))
                    .filter_map(|placed| {
                        let span = placed.span().unwrap_or(Interval::at(placed.start));
                        horizon.contains(placed.start).then_some(AnchorSpan {
                            interval: span,
                            activity: Some(placed.id()),
                        })
                    })
                    .collect()
            }
            SpansExpression::Windows(windows) => windows
                .evaluate(context)
                .iter()
                .map(|interval| AnchorSpan {
                    interval,
                    activity: None,
                })
                .collect(),
        };
        spans.sort_by_key(|span| (span.interval.start(), span.interval.end(), span.activity));
        spans
    }
}
