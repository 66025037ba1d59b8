//! The priority solver: processes goals in order, resolving their conflicts against a
//! single evolving plan.
//!
//! Each goal runs to completion before the next starts, because later goals see the
//! simulated effects of earlier ones. A goal that asks to be rolled back when unsatisfied
//! is undone by restoring a snapshot of the plan taken before it ran.

use crate::Duration;
use crate::activity::{ActivityIdGenerator, SchedulingActivityDirective};
use crate::condition::GlobalCondition;
use crate::config::SchedulerConfig;
use crate::creator::{ActivityCreator, CreationRequest};
use crate::error::SchedulingError;
use crate::expression::EvaluationContext;
use crate::expression::template::ActivityTemplate;
use crate::goal::{ConflictKind, Goal, GoalKind};
use crate::interrupt::Interrupter;
use crate::plan::{GoalEvaluation, Plan, grounding};
use crate::root_finding::RootFinder;
use crate::simulation::facade::SimulationFacade;
use crate::simulation::{MissionModel, SimulationResults};
use crate::time::{Interval, PlanningHorizon, Windows};
use std::cmp::min;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything one scheduling run needs.
pub struct Problem {
    pub model: Arc<dyn MissionModel>,
    pub horizon: PlanningHorizon,
    pub initial_plan: Plan,
    /// Results already computed for `initial_plan`, to skip the first simulation.
    pub initial_results: Option<SimulationResults>,
    /// In priority order.
    pub goals: Vec<Goal>,
    pub conditions: Vec<GlobalCondition>,
}

impl Problem {
    pub fn new(model: Arc<dyn MissionModel>, horizon: PlanningHorizon) -> Self {
        Self {
            model,
            horizon,
            initial_plan: Plan::new(),
            initial_results: None,
            goals: vec![],
            conditions: vec![],
        }
    }

    pub fn with_initial_plan(mut self, plan: Plan) -> Self {
        self.initial_plan = plan;
        self
    }

    pub fn with_initial_results(mut self, results: SimulationResults) -> Self {
        self.initial_results = Some(results);
        self
    }

    /// Appends a goal, at lower priority than those already added.
    pub fn with_goal(mut self, goal: Goal) -> Self {
        self.goals.push(goal);
        self
    }

    pub fn with_condition(mut self, condition: GlobalCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    fn validate(&self) -> Result<(), SchedulingError> {
        let catalog = self.model.activity_types();
        let mut names = BTreeSet::new();
        for goal in &self.goals {
            goal.validate()?;
            goal.validate_types(catalog)?;
            for sub_goal in goal.iter() {
                if !names.insert(sub_goal.name.as_str()) {
                    return Err(SchedulingError::invalid(format!(
                        "goal name {} is used more than once",
                        sub_goal.name
                    )));
                }
            }
        }
        for condition in &self.conditions {
            condition.validate(catalog)?;
        }
        for directive in self.initial_plan.iter() {
            catalog.require(&directive.activity_type)?;
        }
        grounding::validate_anchors(&self.initial_plan)
    }
}

pub struct PrioritySolver {
    goals: Vec<Goal>,
    conditions: Vec<GlobalCondition>,
    config: SchedulerConfig,
    interrupter: Interrupter,
    root_finder: RootFinder,
    facade: SimulationFacade,
    plan: Plan,
    ids: ActivityIdGenerator,
    done: bool,
}

impl PrioritySolver {
    /// Validates the configuration, goals, conditions and initial plan up front, so a run
    /// never fails halfway through on malformed input.
    pub fn new(
        problem: Problem,
        config: SchedulerConfig,
        interrupter: Interrupter,
    ) -> Result<Self, SchedulingError> {
        config
            .validate()
            .map_err(|e| SchedulingError::invalid(e.to_string()))?;
        problem.validate()?;

        let Problem {
            model,
            horizon,
            initial_plan,
            initial_results,
            goals,
            conditions,
        } = problem;
        let mut facade = SimulationFacade::new(
            model,
            horizon,
            config.simulation.clone(),
            interrupter.clone(),
        );
        if let Some(results) = initial_results {
            facade = facade.with_initial_results(&initial_plan, results);
        }
        Ok(Self {
            goals,
            conditions,
            root_finder: RootFinder::new(&config.root_finding),
            config,
            interrupter,
            facade,
            ids: ActivityIdGenerator::after(initial_plan.ids()),
            plan: initial_plan,
            done: false,
        })
    }

    /// The plan as of the last committed goal.
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn facade(&self) -> &SimulationFacade {
        &self.facade
    }

    /// Runs every goal in priority order and returns the resulting plan.
    ///
    /// A solver produces exactly one solution; later calls return `Ok(None)`. If the run is
    /// interrupted, the goal in progress is undone and [SchedulingError::Interrupted] is
    /// returned; [plan][Self::plan] still holds the goals committed before it.
    pub fn get_next_solution(&mut self) -> Result<Option<Plan>, SchedulingError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        info!(
            event = "solve_start",
            goals = self.goals.len(),
            activities = self.plan.len()
        );
        self.facade.simulate_horizon(&self.plan)?;

        let horizon = Windows::from_interval(self.facade.horizon().interval());
        let goals = self.goals.clone();
        for goal in &goals {
            let snapshot = self.plan.clone();
            if let Err(e) = self.solve_goal(goal, &horizon) {
                if matches!(e, SchedulingError::Interrupted) {
                    self.plan = snapshot;
                    info!(event = "solve_interrupted", goal = %goal.name);
                }
                return Err(e);
            }
        }

        info!(
            event = "solve_end",
            activities = self.plan.len(),
            score = self.plan.evaluation().total_score(),
            simulations = self.facade.count_simulations(),
            restarts = self.facade.count_restarts()
        );
        Ok(Some(self.plan.clone()))
    }

    fn solve_goal(
        &mut self,
        goal: &Goal,
        inherited: &Windows,
    ) -> Result<GoalEvaluation, SchedulingError> {
        self.interrupter.check()?;
        info!(event = "goal_start", goal = %goal.name);
        let snapshot = self.plan.clone();
        let windows = self.applicability(goal, inherited);

        let result = match &goal.kind {
            GoalKind::And(goals) => self.solve_and(goals, &windows, goal.should_rollback_if_unsatisfied),
            GoalKind::Or(goals) => self.solve_or(goals, &windows, goal.should_rollback_if_unsatisfied),
            _ => self.solve_leaf(goal, &windows),
        };
        let evaluation = match result {
            Ok(evaluation) if !evaluation.satisfied && goal.should_rollback_if_unsatisfied => {
                self.restore(snapshot, goal)?;
                without_created(&evaluation)
            }
            Ok(evaluation) => evaluation,
            Err(SchedulingError::Simulation { source }) => {
                warn!(event = "goal_simulation_failed", goal = %goal.name, error = %source);
                self.restore(snapshot, goal)?;
                GoalEvaluation {
                    score: -1.0,
                    error: Some(source.to_string()),
                    ..GoalEvaluation::default()
                }
            }
            Err(e) => return Err(e),
        };

        info!(
            event = "goal_end",
            goal = %goal.name,
            satisfied = evaluation.satisfied,
            created = evaluation.created().count(),
            associated = evaluation.associated().count()
        );
        self.plan
            .evaluation_mut()
            .insert(goal.name.clone(), evaluation.clone());
        Ok(evaluation)
    }

    fn applicability(&self, goal: &Goal, inherited: &Windows) -> Windows {
        let model = self.facade.model().clone();
        let results = self.facade.latest_results();
        let context = EvaluationContext {
            plan: &self.plan,
            results: results.as_deref(),
            horizon: self.facade.horizon(),
            catalog: model.activity_types(),
        };
        goal.applicability(inherited, &context)
    }

    /// Solves every sub-goal in order. With rollback, the first failure ends the
    /// conjunction since everything it added is about to be undone.
    fn solve_and(
        &mut self,
        goals: &[Goal],
        windows: &Windows,
        rollback: bool,
    ) -> Result<GoalEvaluation, SchedulingError> {
        let mut evaluation = GoalEvaluation {
            satisfied: true,
            ..GoalEvaluation::default()
        };
        for goal in goals {
            let child = self.solve_goal(goal, windows)?;
            evaluation.satisfied &= child.satisfied;
            evaluation.absorb(&child);
            if rollback && !evaluation.satisfied {
                break;
            }
        }
        Ok(evaluation)
    }

    /// Tries the sub-goals in order until one is satisfied. With rollback, a branch that
    /// fails is undone before the next is tried.
    fn solve_or(
        &mut self,
        goals: &[Goal],
        windows: &Windows,
        rollback: bool,
    ) -> Result<GoalEvaluation, SchedulingError> {
        let mut failed = GoalEvaluation::default();
        for goal in goals {
            let snapshot = self.plan.clone();
            let child = self.solve_goal(goal, windows)?;
            if child.satisfied {
                let mut evaluation = child;
                for (id, created) in &failed.activities {
                    evaluation.associate(*id, *created);
                }
                evaluation.conflicts_detected += failed.conflicts_detected;
                return Ok(evaluation);
            }
            if rollback {
                self.restore(snapshot, goal)?;
                failed.absorb(&without_created(&child));
            } else {
                failed.absorb(&child);
            }
        }
        Ok(failed)
    }

    fn solve_leaf(
        &mut self,
        goal: &Goal,
        windows: &Windows,
    ) -> Result<GoalEvaluation, SchedulingError> {
        let Some(template) = goal.template() else {
            return Err(SchedulingError::invalid(format!(
                "goal {} has no activity template",
                goal.name
            )));
        };
        let conflicts = {
            let model = self.facade.model().clone();
            let results = self.facade.latest_results();
            let context = EvaluationContext {
                plan: &self.plan,
                results: results.as_deref(),
                horizon: self.facade.horizon(),
                catalog: model.activity_types(),
            };
            goal.detect_conflicts(windows, &context)
        };

        let mut evaluation = GoalEvaluation {
            conflicts_detected: conflicts.len(),
            ..GoalEvaluation::default()
        };
        let (associations, others): (Vec<_>, Vec<_>) = conflicts
            .into_iter()
            .partition(|c| matches!(c.kind, ConflictKind::MissingAssociation { .. }));
        for conflict in associations {
            if let ConflictKind::MissingAssociation { activity } = conflict.kind {
                debug!(event = "activity_associated", goal = %goal.name, %activity);
                evaluation.associate(activity, false);
            }
        }

        let mut unresolved = 0;
        for conflict in others {
            self.interrupter.check()?;
            let resolved = match conflict.kind {
                ConflictKind::MissingActivity {
                    request,
                    missing,
                    missing_duration,
                    room,
                    duration_room,
                } => self.resolve_missing(
                    template,
                    request,
                    Needed {
                        missing,
                        missing_duration,
                        room,
                        duration_room,
                    },
                    &mut evaluation,
                )?,
                ConflictKind::Excess {
                    activities,
                    total_duration,
                } => {
                    debug!(
                        event = "excess_activities",
                        goal = %goal.name,
                        activities,
                        %total_duration
                    );
                    false
                }
                ConflictKind::MissingAssociation { .. } => true,
            };
            if !resolved {
                unresolved += 1;
            }
        }

        evaluation.unresolved_conflicts = unresolved;
        evaluation.score = -(unresolved as f64);
        evaluation.satisfied = unresolved == 0;
        if self.config.solver.simulate_after_goal && evaluation.created().next().is_some() {
            self.facade.simulate_horizon(&self.plan)?;
        }
        Ok(evaluation)
    }

    /// Associates or creates activities until the conflict is satisfied, creation fails, or
    /// the per-conflict creation budget runs out. Returns whether the conflict was resolved.
    fn resolve_missing(
        &mut self,
        template: &ActivityTemplate,
        mut request: CreationRequest,
        mut needed: Needed,
        evaluation: &mut GoalEvaluation,
    ) -> Result<bool, SchedulingError> {
        let mut added = 0;
        let mut added_duration = Duration::ZERO;
        let requested_duration = request.duration_within;
        for _ in 0..self.config.solver.max_creations_per_conflict {
            if needed.is_met() || needed.room.is_some_and(|room| added >= room) {
                break;
            }
            let room = needed.duration_room.map(|room| room - added_duration);
            if room.is_some_and(|room| room < Duration::ZERO) {
                break;
            }
            let Some(attempts) = duration_attempts(needed.missing_duration, room, requested_duration)
            else {
                break;
            };
            request.duration_within = attempts.last().copied().flatten();
            let existing = {
                let model = self.facade.model().clone();
                let results = self.facade.latest_results();
                let context = EvaluationContext {
                    plan: &self.plan,
                    results: results.as_deref(),
                    horizon: self.facade.horizon(),
                    catalog: model.activity_types(),
                };
                context
                    .placed_activities()
                    .iter()
                    .find(|p| {
                        !evaluation.activities.contains_key(&p.id())
                            && template.matches(p, &context, &request.environment)
                            && request.admits(p)
                    })
                    .map(|p| (p.id(), p.span(), p.duration))
            };

            let (span, duration) = match existing {
                Some((id, span, duration)) => {
                    debug!(event = "activity_associated", %id);
                    evaluation.associate(id, false);
                    (span, duration)
                }
                None => {
                    let id = self.ids.peek();
                    let mut creator = ActivityCreator {
                        facade: &mut self.facade,
                        conditions: &self.conditions,
                        root_finder: self.root_finder,
                        interrupter: &self.interrupter,
                    };
                    let mut created = None;
                    for duration_within in attempts {
                        request.duration_within = duration_within;
                        created = creator.create_activity(id, template, &request, &self.plan)?;
                        if created.is_some() {
                            break;
                        }
                    }
                    let Some(directive) = created else {
                        break;
                    };
                    self.ids.next_id();
                    let span = created_span(&directive, &request);
                    let duration = directive.duration;
                    self.plan.add(directive)?;
                    evaluation.associate(id, true);
                    (span, duration)
                }
            };

            added += 1;
            needed.missing = needed.missing.saturating_sub(1);
            if let Some(d) = duration {
                needed.missing_duration = needed.missing_duration - d;
                added_duration += d;
            }
            if let Some(span) = span {
                request.windows = request.windows.subtract(&Windows::from_interval(span));
            }
        }
        Ok(needed.is_met())
    }

    /// Puts `snapshot` back in place of the plan. The records of `goal`'s sub-goals survive,
    /// minus the activities they created.
    fn restore(&mut self, snapshot: Plan, goal: &Goal) -> Result<(), SchedulingError> {
        let records: Vec<(String, GoalEvaluation)> = goal
            .iter()
            .filter_map(|g| {
                self.plan
                    .evaluation()
                    .get(&g.name)
                    .map(|e| (g.name.clone(), without_created(e)))
            })
            .collect();
        let discarded = self.plan.len().saturating_sub(snapshot.len());
        self.plan = snapshot;
        for (name, record) in records {
            self.plan.evaluation_mut().insert(name, record);
        }
        info!(event = "goal_rolled_back", goal = %goal.name, discarded);
        if self.config.solver.simulate_after_goal && discarded > 0 {
            self.facade.simulate_horizon(&self.plan)?;
        }
        Ok(())
    }
}

/// What a missing-activity conflict still needs.
#[derive(Copy, Clone, Debug)]
struct Needed {
    missing: usize,
    missing_duration: Duration,
    room: Option<usize>,
    duration_room: Option<Duration>,
}

impl Needed {
    fn is_met(&self) -> bool {
        self.missing == 0 && self.missing_duration <= Duration::ZERO
    }
}

/// Duration bounds to try, in order, for the next activity of a conflict.
///
/// An activity that covers all of the missing duration is preferred. Failing that, any
/// activity that fits the remaining room. `None` if the room and `requested` don't overlap.
fn duration_attempts(
    missing: Duration,
    room: Option<Duration>,
    requested: Option<Interval>,
) -> Option<Vec<Option<Interval>>> {
    let upper = room.unwrap_or(Duration::MAX);
    let fitting = |lower: Duration| -> Option<Option<Interval>> {
        if lower == Duration::ZERO && room.is_none() {
            return Some(requested);
        }
        let bounds = Interval::between(lower, upper);
        match requested {
            Some(requested) => requested.intersect(&bounds).map(Some),
            None => Some(Some(bounds)),
        }
    };
    let any = fitting(Duration::ZERO)?;
    let mut attempts = vec![];
    if missing > Duration::ZERO {
        if let Some(covering) = fitting(min(missing, upper)) {
            attempts.push(covering);
        }
    }
    attempts.push(any);
    Some(attempts)
}

fn without_created(evaluation: &GoalEvaluation) -> GoalEvaluation {
    let mut evaluation = evaluation.clone();
    evaluation.activities.retain(|_, created| !*created);
    evaluation
}

fn created_span(directive: &SchedulingActivityDirective, request: &CreationRequest) -> Option<Interval> {
    let start = match request.anchor {
        Some(anchor) => anchor.anchor_point + directive.start_offset,
        None => directive.start_offset,
    };
    let end = start + directive.duration?;
    if end > start {
        Some(Interval::closed_open(start, end))
    } else {
        Some(Interval::at(start))
    }
}
