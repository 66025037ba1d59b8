//! Declarative scheduling goals, and the conflicts that show where they are unmet.
//!
//! Goals are a closed family: three leaf kinds that each own an [ActivityTemplate], and two
//! composites. Leaves detect [Conflict]s against the current plan; the solver resolves them,
//! first by associating existing activities, then by creating new ones.

mod cardinality;
mod coexistence;
mod recurrence;

pub use cardinality::CardinalityGoal;
pub use coexistence::{AnchorPoint, CoexistenceGoal, RelativeRange};
pub use recurrence::RecurrenceGoal;

use crate::Duration;
use crate::activity::{ActivityId, ActivityTypeCatalog};
use crate::creator::CreationRequest;
use crate::error::SchedulingError;
use crate::expression::template::ActivityTemplate;
use crate::expression::{EvaluationContext, WindowsExpression};
use crate::time::Windows;
use std::collections::BTreeSet;

#[derive(Clone, Debug)]
pub struct Goal {
    /// Unique among every goal (and sub-goal) of a problem. Evaluations are keyed by it.
    pub name: String,
    pub kind: GoalKind,
    /// Where the goal applies. `None` is the whole horizon; sub-goals are further
    /// restricted to their parent's windows.
    pub for_all_time_in: Option<WindowsExpression>,
    /// Undo everything the goal added if it ends up unsatisfied.
    pub should_rollback_if_unsatisfied: bool,
}

#[derive(Clone, Debug)]
pub enum GoalKind {
    Recurrence(RecurrenceGoal),
    Cardinality(CardinalityGoal),
    Coexistence(CoexistenceGoal),
    /// Satisfied when every sub-goal is.
    And(Vec<Goal>),
    /// Satisfied by the first sub-goal that is; later ones are not attempted.
    Or(Vec<Goal>),
}

impl Goal {
    fn leaf(name: impl Into<String>, kind: GoalKind) -> Result<Self, SchedulingError> {
        let goal = Goal {
            name: name.into(),
            kind,
            for_all_time_in: None,
            should_rollback_if_unsatisfied: false,
        };
        goal.validate()?;
        Ok(goal)
    }

    pub fn recurrence(
        name: impl Into<String>,
        template: ActivityTemplate,
        interval: Duration,
    ) -> Result<Self, SchedulingError> {
        Self::leaf(
            name,
            GoalKind::Recurrence(RecurrenceGoal { template, interval }),
        )
    }

    pub fn cardinality(
        name: impl Into<String>,
        goal: CardinalityGoal,
    ) -> Result<Self, SchedulingError> {
        Self::leaf(name, GoalKind::Cardinality(goal))
    }

    pub fn coexistence(
        name: impl Into<String>,
        goal: CoexistenceGoal,
    ) -> Result<Self, SchedulingError> {
        Self::leaf(name, GoalKind::Coexistence(goal))
    }

    pub fn and(name: impl Into<String>, goals: Vec<Goal>) -> Result<Self, SchedulingError> {
        Self::leaf(name, GoalKind::And(goals))
    }

    pub fn or(name: impl Into<String>, goals: Vec<Goal>) -> Result<Self, SchedulingError> {
        Self::leaf(name, GoalKind::Or(goals))
    }

    pub fn for_all_time_in(mut self, windows: WindowsExpression) -> Self {
        self.for_all_time_in = Some(windows);
        self
    }

    pub fn rollback_if_unsatisfied(mut self, rollback: bool) -> Self {
        self.should_rollback_if_unsatisfied = rollback;
        self
    }

    /// Checks the goal and all of its sub-goals: unique names, well-formed leaves,
    /// and non-empty composites.
    pub fn validate(&self) -> Result<(), SchedulingError> {
        let mut names = BTreeSet::new();
        self.validate_inner(&mut names)
    }

    fn validate_inner<'a>(&'a self, names: &mut BTreeSet<&'a str>) -> Result<(), SchedulingError> {
        if self.name.is_empty() {
            return Err(SchedulingError::invalid("goal names cannot be empty"));
        }
        if !names.insert(&self.name) {
            return Err(SchedulingError::invalid(format!(
                "goal name {} is used more than once",
                self.name
            )));
        }
        let context = |e: SchedulingError| match e {
            SchedulingError::InvalidConfiguration { reason } => {
                SchedulingError::invalid(format!("goal {}: {reason}", self.name))
            }
            other => other,
        };
        match &self.kind {
            GoalKind::Recurrence(goal) => goal.validate().map_err(context),
            GoalKind::Cardinality(goal) => goal.validate().map_err(context),
            GoalKind::Coexistence(goal) => goal.validate().map_err(context),
            GoalKind::And(goals) | GoalKind::Or(goals) => {
                if goals.is_empty() {
                    return Err(context(SchedulingError::invalid(
                        "a composite goal needs at least one sub-goal",
                    )));
                }
                goals.iter().try_for_each(|g| g.validate_inner(names))
            }
        }
    }

    /// Checks that every activity type the goal refers to is in the catalog.
    pub fn validate_types(&self, catalog: &ActivityTypeCatalog) -> Result<(), SchedulingError> {
        match &self.kind {
            GoalKind::And(goals) | GoalKind::Or(goals) => {
                goals.iter().try_for_each(|g| g.validate_types(catalog))
            }
            _ => {
                for branch in self.template().into_iter().flat_map(|t| t.branches()) {
                    catalog.require(&branch.activity_type().name)?;
                }
                if let GoalKind::Coexistence(goal) = &self.kind {
                    goal.validate_types(catalog)?;
                }
                Ok(())
            }
        }
    }

    /// This goal and all of its sub-goals, depth first.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &Goal> + '_> {
        match &self.kind {
            GoalKind::And(goals) | GoalKind::Or(goals) => Box::new(
                std::iter::once(self).chain(goals.iter().flat_map(|g| g.iter())),
            ),
            _ => Box::new(std::iter::once(self)),
        }
    }

    /// The template of a leaf goal.
    pub fn template(&self) -> Option<&ActivityTemplate> {
        match &self.kind {
            GoalKind::Recurrence(goal) => Some(&goal.template),
            GoalKind::Cardinality(goal) => Some(&goal.template),
            GoalKind::Coexistence(goal) => Some(&goal.template),
            GoalKind::And(_) | GoalKind::Or(_) => None,
        }
    }

    /// Where the goal applies, given the windows of its parent.
    pub fn applicability(&self, inherited: &Windows, context: &EvaluationContext) -> Windows {
        match &self.for_all_time_in {
            Some(expression) => inherited.intersection(&expression.evaluate(context)),
            None => inherited.clone(),
        }
    }

    /// The conflicts of a leaf goal within `windows`, in time order. Composites have none
    /// of their own.
    pub fn detect_conflicts(&self, windows: &Windows, context: &EvaluationContext) -> Vec<Conflict> {
        let mut conflicts = match &self.kind {
            GoalKind::Recurrence(goal) => goal.detect_conflicts(windows, context),
            GoalKind::Cardinality(goal) => goal.detect_conflicts(windows, context),
            GoalKind::Coexistence(goal) => goal.detect_conflicts(windows, context),
            GoalKind::And(_) | GoalKind::Or(_) => vec![],
        };
        conflicts.sort_by_key(|c| c.time);
        tracing::debug!(
            event = "conflicts_detected",
            goal = %self.name,
            count = conflicts.len()
        );
        conflicts
    }
}

/// A place where a goal is unmet.
#[derive(Clone, Debug)]
pub struct Conflict {
    /// Where the conflict begins, for ordering.
    pub time: Duration,
    pub kind: ConflictKind,
}

#[derive(Clone, Debug)]
pub enum ConflictKind {
    /// More matching activities are needed to satisfy `request`.
    MissingActivity {
        request: CreationRequest,
        /// How many more activities are needed.
        missing: usize,
        /// How much more total duration is needed.
        missing_duration: Duration,
        /// At most this many may be added.
        room: Option<usize>,
        /// At most this much duration may be added.
        duration_room: Option<Duration>,
    },
    /// An existing activity satisfies the goal, but isn't associated with it yet.
    MissingAssociation { activity: ActivityId },
    /// Existing activities already exceed what the goal allows. Activities are never
    /// removed, so this can't be resolved.
    Excess { activities: usize, total_duration: Duration },
}

impl Conflict {
    pub(crate) fn missing_one(request: CreationRequest) -> Self {
        let time = request
            .start_within
            .map(|i| i.start())
            .or_else(|| request.windows.first().map(|i| i.start()))
            .unwrap_or(Duration::ZERO);
        Conflict {
            time,
            kind: ConflictKind::MissingActivity {
                request,
                missing: 1,
                missing_duration: Duration::ZERO,
                room: None,
                duration_room: None,
            },
        }
    }

    pub(crate) fn association(activity: ActivityId, time: Duration) -> Self {
        Conflict {
            time,
            kind: ConflictKind::MissingAssociation { activity },
        }
    }
}
