//! The evolving set of scheduled activities, and the record of how each goal fared.

pub mod grounding;

use crate::Duration;
use crate::activity::{ActivityId, ActivityTypeCatalog, SchedulingActivityDirective};
use crate::error::SchedulingError;
use crate::simulation::SimulationResults;
use crate::time::Interval;
use std::collections::{BTreeMap, BTreeSet};

/// A set of activity directives, indexed by id and by anchor.
///
/// The plan is exclusively owned by the solver during a run. Backtracking replaces the
/// whole plan with a snapshot, so cloning is the undo mechanism.
#[derive(Clone, Debug, Default)]
pub struct Plan {
    activities: BTreeMap<ActivityId, SchedulingActivityDirective>,
    by_anchor: BTreeMap<ActivityId, BTreeSet<ActivityId>>,
    evaluation: Evaluation,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a plan from directives, checking that the anchors are well formed.
    pub fn from_directives(
        directives: impl IntoIterator<Item = SchedulingActivityDirective>,
    ) -> Result<Self, SchedulingError> {
        let mut plan = Plan::new();
        for directive in directives {
            plan.insert_unchecked(directive)?;
        }
        grounding::validate_anchors(&plan)?;
        Ok(plan)
    }

    /// Adds a directive. Its anchor, if any, must already be in the plan.
    pub fn add(&mut self, directive: SchedulingActivityDirective) -> Result<(), SchedulingError> {
        if let Some(anchor) = directive.anchor {
            if !self.activities.contains_key(&anchor) {
                return Err(SchedulingError::Grounding {
                    reason: format!(
                        "cannot add {} anchored to missing activity {anchor}",
                        directive.id
                    ),
                });
            }
        }
        self.insert_unchecked(directive)
    }

    fn insert_unchecked(
        &mut self,
        directive: SchedulingActivityDirective,
    ) -> Result<(), SchedulingError> {
        if self.activities.contains_key(&directive.id) {
            return Err(SchedulingError::invalid(format!(
                "activity id {} is used twice",
                directive.id
            )));
        }
        if let Some(anchor) = directive.anchor {
            self.by_anchor.entry(anchor).or_default().insert(directive.id);
        }
        self.activities.insert(directive.id, directive);
        Ok(())
    }

    /// Removes a directive. Fails if other directives are still anchored to it.
    pub fn remove(
        &mut self,
        id: ActivityId,
    ) -> Result<SchedulingActivityDirective, SchedulingError> {
        if self.by_anchor.get(&id).is_some_and(|d| !d.is_empty()) {
            return Err(SchedulingError::Grounding {
                reason: format!("cannot remove {id} while other activities are anchored to it"),
            });
        }
        let directive = self
            .activities
            .remove(&id)
            .ok_or_else(|| SchedulingError::invalid(format!("no activity {id} in the plan")))?;
        if let Some(anchor) = directive.anchor {
            if let Some(dependents) = self.by_anchor.get_mut(&anchor) {
                dependents.remove(&id);
                if dependents.is_empty() {
                    self.by_anchor.remove(&anchor);
                }
            }
        }
        Ok(directive)
    }

    pub fn get(&self, id: ActivityId) -> Option<&SchedulingActivityDirective> {
        self.activities.get(&id)
    }

    pub fn contains(&self, id: ActivityId) -> bool {
        self.activities.contains_key(&id)
    }

    /// Iterates directives in id order.
    pub fn iter(&self) -> impl Iterator<Item = &SchedulingActivityDirective> {
        self.activities.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ActivityId> {
        self.activities.keys()
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// The directives anchored directly to `id`, in id order.
    pub fn anchored_to(
        &self,
        id: ActivityId,
    ) -> impl Iterator<Item = &SchedulingActivityDirective> + '_ {
        self.by_anchor
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|dependent| self.activities.get(dependent))
    }

    pub fn evaluation(&self) -> &Evaluation {
        &self.evaluation
    }

    pub fn evaluation_mut(&mut self) -> &mut Evaluation {
        &mut self.evaluation
    }

    /// Whether both plans hold exactly the same directives, ignoring evaluations.
    pub fn same_activities(&self, other: &Plan) -> bool {
        self.activities == other.activities
    }

    /// The absolute start (and duration, where known) of every directive.
    ///
    /// Durations come from the directive itself, then the type's controllable duration
    /// argument, then `results`. Directives that can't be grounded are left out.
    /// Sorted by start, then id.
    pub fn placed_activities<'a>(
        &'a self,
        catalog: &ActivityTypeCatalog,
        results: Option<&SimulationResults>,
    ) -> Vec<PlacedActivity<'a>> {
        let duration_of = |d: &SchedulingActivityDirective| {
            d.known_duration(catalog.get(&d.activity_type).map(|t| t.as_ref()))
                .or_else(|| results.and_then(|r| r.activities.get(&d.id)).map(|a| a.duration))
        };
        let starts = match grounding::ground(self, &duration_of) {
            Some(starts) => starts,
            None => {
                tracing::warn!(
                    event = "ungroundable_plan",
                    activities = self.len(),
                    "falling back to grounding directive by directive"
                );
                self.ground_partially(&duration_of)
            }
        };

        let mut placed: Vec<PlacedActivity<'a>> = self
            .iter()
            .filter_map(|directive| {
                let start = *starts.get(&directive.id)?;
                Some(PlacedActivity {
                    directive,
                    start,
                    duration: duration_of(directive),
                })
            })
            .collect();
        placed.sort_by_key(|p| (p.start, p.directive.id));
        placed
    }

    fn ground_partially(
        &self,
        duration_of: &dyn Fn(&SchedulingActivityDirective) -> Option<Duration>,
    ) -> grounding::GroundedStarts {
        let mut starts = grounding::GroundedStarts::new();
        let mut frontier: Vec<&SchedulingActivityDirective> =
            self.iter().filter(|d| d.anchor.is_none()).collect();
        while let Some(directive) = frontier.pop() {
            let start = match directive.anchor {
                None => Some(directive.start_offset),
                Some(anchor) => self.get(anchor).and_then(|a| {
                    let anchor_start = *starts.get(&anchor)?;
                    let point = if directive.anchored_to_start {
                        anchor_start
                    } else {
                        anchor_start + duration_of(a)?
                    };
                    Some(point + directive.start_offset)
                }),
            };
            if let Some(start) = start {
                starts.insert(directive.id, start);
                frontier.extend(self.anchored_to(directive.id));
            }
        }
        starts
    }
}

/// A directive with its anchors resolved.
#[derive(Copy, Clone, Debug)]
pub struct PlacedActivity<'a> {
    pub directive: &'a SchedulingActivityDirective,
    pub start: Duration,
    pub duration: Option<Duration>,
}

impl PlacedActivity<'_> {
    pub fn id(&self) -> ActivityId {
        self.directive.id
    }

    pub fn end(&self) -> Option<Duration> {
        self.duration.map(|d| self.start + d)
    }

    /// The time the activity occupies: `[start, end)`, or the instant `[start, start]`
    /// for zero-duration activities. `None` until the duration is known.
    pub fn span(&self) -> Option<Interval> {
        let end = self.end()?;
        if end > self.start {
            Some(Interval::closed_open(self.start, end))
        } else {
            Some(Interval::at(self.start))
        }
    }
}

/// Per-goal satisfaction records, keyed by goal name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Evaluation {
    goals: BTreeMap<String, GoalEvaluation>,
}

impl Evaluation {
    pub fn get(&self, goal: &str) -> Option<&GoalEvaluation> {
        self.goals.get(goal)
    }

    pub fn insert(&mut self, goal: impl Into<String>, evaluation: GoalEvaluation) {
        self.goals.insert(goal.into(), evaluation);
    }

    pub fn remove(&mut self, goal: &str) -> Option<GoalEvaluation> {
        self.goals.remove(goal)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GoalEvaluation)> {
        self.goals.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_satisfied(&self, goal: &str) -> bool {
        self.goals.get(goal).is_some_and(|g| g.satisfied)
    }

    /// Every activity associated with some goal.
    pub fn associated_activities(&self) -> BTreeSet<ActivityId> {
        self.goals
            .values()
            .flat_map(|g| g.activities.keys().copied())
            .collect()
    }

    /// Sum of every goal's score.
    pub fn total_score(&self) -> f64 {
        self.goals.values().map(|g| g.score).sum()
    }
}

/// How one goal fared.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GoalEvaluation {
    pub satisfied: bool,
    /// Minus the number of unresolved conflicts.
    pub score: f64,
    /// Associated activities, with `true` for those this goal created.
    pub activities: BTreeMap<ActivityId, bool>,
    pub conflicts_detected: usize,
    pub unresolved_conflicts: usize,
    /// Set when a simulation failure aborted the goal.
    pub error: Option<String>,
}

impl GoalEvaluation {
    pub fn associate(&mut self, id: ActivityId, created: bool) {
        let entry = self.activities.entry(id).or_insert(created);
        *entry |= created;
    }

    pub fn created(&self) -> impl Iterator<Item = ActivityId> + '_ {
        self.activities
            .iter()
            .filter(|(_, created)| **created)
            .map(|(id, _)| *id)
    }

    pub fn associated(&self) -> impl Iterator<Item = ActivityId> + '_ {
        self.activities.keys().copied()
    }

    /// Folds a child's record into a composite's.
    pub fn absorb(&mut self, child: &GoalEvaluation) {
        for (id, created) in &child.activities {
            self.associate(*id, *created);
        }
        self.conflicts_detected += child.conflicts_detected;
        self.unresolved_conflicts += child.unresolved_conflicts;
        self.score += child.score;
        if self.error.is_none() {
            self.error.clone_from(&child.error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityType, SchedulingActivityDirective as Directive};

    fn s(seconds: f64) -> Duration {
        Duration::from_seconds(seconds)
    }

    fn catalog() -> ActivityTypeCatalog {
        let mut catalog = ActivityTypeCatalog::new();
        catalog.insert(
            ActivityType::controllable("Observe", "duration")
                .with_default("duration", s(2.0)),
        );
        catalog
    }

    #[test]
    fn remove_rejects_anchor_targets() -> Result<(), SchedulingError> {
        let mut plan = Plan::from_directives([
            Directive::new(ActivityId::new(0), "Observe", s(1.0)),
            Directive::new(ActivityId::new(1), "Observe", s(1.0)).anchored(ActivityId::new(0), false),
        ])?;
        assert!(plan.remove(ActivityId::new(0)).is_err());
        plan.remove(ActivityId::new(1))?;
        plan.remove(ActivityId::new(0))?;
        assert!(plan.is_empty());
        Ok(())
    }

    #[test]
    fn placed_activities_use_default_durations() -> Result<(), SchedulingError> {
        let plan = Plan::from_directives([
            Directive::new(ActivityId::new(0), "Observe", s(4.0)),
            Directive::new(ActivityId::new(1), "Observe", s(0.5)).anchored(ActivityId::new(0), false),
            Directive::new(ActivityId::new(2), "Observe", s(1.0)),
        ])?;
        let placed = plan.placed_activities(&catalog(), None);
        let starts: Vec<_> = placed.iter().map(|p| (p.id().value(), p.start)).collect();
        assert_eq!(vec![(2, s(1.0)), (0, s(4.0)), (1, s(6.5))], starts);
        assert_eq!(Some(Interval::closed_open(s(4.0), s(6.0))), placed[1].span());
        Ok(())
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let result = Plan::from_directives([
            Directive::new(ActivityId::new(0), "Observe", s(1.0)),
            Directive::new(ActivityId::new(0), "Observe", s(2.0)),
        ]);
        assert!(matches!(result, Err(SchedulingError::InvalidConfiguration { .. })));
    }

    #[test]
    fn same_activities_ignores_evaluations() -> Result<(), SchedulingError> {
        let a = Plan::from_directives([Directive::new(ActivityId::new(0), "Observe", s(1.0))])?;
        let mut b = a.clone();
        b.evaluation_mut().insert("goal", GoalEvaluation::default());
        assert!(a.same_activities(&b));
        Ok(())
    }
}
