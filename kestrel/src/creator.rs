//! Synthesizing new activities from templates.
//!
//! For each candidate window, the creator builds a one-activity [TemporalNetwork] from the
//! window, the horizon, and the template's ranges. Controllable activities are placed
//! directly from the solved bounds. Uncontrollable activities need simulation to know their
//! duration, so the creator searches the solved start range with the [RootFinder] for a start
//! whose simulated end lands in the solved end range.
//!
//! Nothing here is an error unless simulation fails or the run is interrupted: a window that
//! can't host the activity is skipped, and running out of windows returns `Ok(None)`.

use crate::Duration;
use crate::activity::{ActivityId, SchedulingActivityDirective};
use crate::condition::{GlobalCondition, allowed_windows};
use crate::error::SchedulingError;
use crate::expression::template::{ActivityCreationTemplate, ActivityTemplate};
use crate::expression::{EvaluationContext, EvaluationEnvironment};
use crate::interrupt::Interrupter;
use crate::plan::{PlacedActivity, Plan};
use crate::root_finding::{FunctionValue, RootFinder, RootFindingError};
use crate::simulation::facade::SimulationFacade;
use crate::stn::{ActivityBounds, TemporalNetwork};
use crate::time::{Interval, Windows};
use crate::value::Value;

const CANDIDATE: &str = "candidate";

/// Ties a new activity to a point of an existing one.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct AnchoredPlacement {
    pub anchor: ActivityId,
    /// Anchor to the anchor's start, rather than its end.
    pub to_start: bool,
    /// Where the anchor point currently is, on the plan's time axis.
    pub anchor_point: Duration,
}

/// Where and how to create one activity.
#[derive(Clone, Debug)]
pub struct CreationRequest {
    /// The new activity must fit entirely inside one of these windows.
    pub windows: Windows,
    /// Further restricts the start, independently of the windows.
    pub start_within: Option<Interval>,
    pub end_within: Option<Interval>,
    /// Bounds the duration of the new activity, on top of its template's range.
    pub duration_within: Option<Interval>,
    pub anchor: Option<AnchoredPlacement>,
    pub environment: EvaluationEnvironment,
}

impl CreationRequest {
    pub fn within(windows: Windows) -> Self {
        Self {
            windows,
            start_within: None,
            end_within: None,
            duration_within: None,
            anchor: None,
            environment: EvaluationEnvironment::default(),
        }
    }

    /// Whether an existing activity already satisfies the request's placement. The
    /// anchor is not checked.
    pub fn admits(&self, activity: &PlacedActivity) -> bool {
        let fits = match activity.span() {
            Some(span) => self.windows.contains_interval(&span),
            None => self.windows.contains(activity.start),
        };
        fits && self.start_within.is_none_or(|range| range.contains(activity.start))
            && self
                .end_within
                .is_none_or(|range| activity.end().is_some_and(|end| range.contains(end)))
            && self
                .duration_within
                .is_none_or(|range| activity.duration.is_some_and(|d| range.contains(d)))
    }
}

pub struct ActivityCreator<'a> {
    pub facade: &'a mut SimulationFacade,
    pub conditions: &'a [GlobalCondition],
    pub root_finder: RootFinder,
    pub interrupter: &'a Interrupter,
}

impl ActivityCreator<'_> {
    /// Tries each branch of the template in order, and returns the first activity that
    /// could be created. The returned directive is not added to the plan.
    pub fn create_activity(
        &mut self,
        id: ActivityId,
        template: &ActivityTemplate,
        request: &CreationRequest,
        plan: &Plan,
    ) -> Result<Option<SchedulingActivityDirective>, SchedulingError> {
        for branch in template.branches() {
            if let Some(directive) = self.create_from_branch(id, branch, request, plan)? {
                return Ok(Some(directive));
            }
        }
        Ok(None)
    }

    fn create_from_branch(
        &mut self,
        id: ActivityId,
        template: &ActivityCreationTemplate,
        request: &CreationRequest,
        plan: &Plan,
    ) -> Result<Option<SchedulingActivityDirective>, SchedulingError> {
        let model = self.facade.model().clone();
        let horizon = *self.facade.horizon();
        let results = self.facade.latest_results();
        let context = EvaluationContext {
            plan,
            results: results.as_deref(),
            horizon: &horizon,
            catalog: model.activity_types(),
        };

        let activity_type = template.activity_type();
        let mut windows = request
            .windows
            .intersection(&allowed_windows(self.conditions, &activity_type.name, &context))
            .intersection(&Windows::from_interval(horizon.interval()));
        if let Some(constraint) = &activity_type.constraint {
            windows = windows.intersection(&constraint.evaluate(&context));
        }

        for window in windows.iter() {
            match self.create_instance_for_real(id, template, window, request, plan, &context)? {
                Some(directive) => {
                    tracing::debug!(
                        event = "activity_created",
                        id = %directive.id,
                        activity_type = %directive.activity_type,
                        start = %directive.start_offset,
                        %window
                    );
                    return Ok(Some(directive));
                }
                None => tracing::debug!(
                    event = "window_infeasible",
                    activity_type = %activity_type.name,
                    %window
                ),
            }
        }
        Ok(None)
    }

    /// Attempts to place the activity inside a single window.
    pub fn create_instance_for_real(
        &mut self,
        id: ActivityId,
        template: &ActivityCreationTemplate,
        window: Interval,
        request: &CreationRequest,
        plan: &Plan,
        context: &EvaluationContext,
    ) -> Result<Option<SchedulingActivityDirective>, SchedulingError> {
        let expression = template.expression();
        let environment = &request.environment;

        let mut stn = TemporalNetwork::new();
        stn.add_activity(CANDIDATE);
        stn.add_envelope(CANDIDATE, "window", window);
        stn.add_envelope(CANDIDATE, "horizon", context.horizon_interval());
        if let Some(start_within) = request.start_within {
            stn.add_start_interval(CANDIDATE, start_within);
        }
        if let Some(end_within) = request.end_within {
            stn.add_end_interval(CANDIDATE, end_within);
        }
        if let Some(duration_within) = request.duration_within {
            stn.add_duration_interval(CANDIDATE, duration_within);
        }
        if let Some(range) = expression.start_range {
            stn.add_start_interval(CANDIDATE, range);
        }
        if let Some(range) = expression.end_range {
            stn.add_end_interval(CANDIDATE, range);
        }
        if let Some(range) = &expression.duration_range {
            let Some((lower, upper)) = range.evaluate(context, environment, window.start()) else {
                return Ok(None);
            };
            let Some(bounds) = Interval::new(lower, upper, true, true) else {
                return Ok(None);
            };
            stn.add_duration_interval(CANDIDATE, bounds);
        }
        if !stn.solve() {
            return Ok(None);
        }
        let Some(bounds) = stn.get_bounds(CANDIDATE) else {
            return Ok(None);
        };

        let placed = if let Some(parameter) = template.activity_type().duration_parameter() {
            self.place_controllable(template, parameter, stn, bounds, environment, context)
        } else {
            self.place_uncontrollable(id, template, bounds, environment, plan, context)?
        };
        let Some((start, duration, arguments)) = placed else {
            return Ok(None);
        };

        if let Some(range) = &expression.duration_range {
            match range.evaluate(context, environment, start) {
                Some((lower, upper)) if lower <= duration && duration <= upper => {}
                _ => return Ok(None),
            }
        }

        let mut directive =
            SchedulingActivityDirective::new(id, template.activity_type().name.clone(), start)
                .with_duration(duration);
        directive.arguments = arguments;
        if let Some(anchor) = request.anchor {
            directive = directive.anchored(anchor.anchor, anchor.to_start);
            directive.start_offset = start - anchor.anchor_point;
        }
        Ok(Some(directive))
    }

    /// Places a controllable activity at its earliest feasible start.
    ///
    /// A duration argument (explicit or default) fixes the duration, and must fit the
    /// solved bounds. Without one, the activity takes the longest duration the network
    /// allows from that start.
    fn place_controllable(
        &self,
        template: &ActivityCreationTemplate,
        parameter: &str,
        mut stn: TemporalNetwork,
        bounds: ActivityBounds,
        environment: &EvaluationEnvironment,
        context: &EvaluationContext,
    ) -> Option<(Duration, Duration, crate::Arguments)> {
        let earliest = bounds.start.start();
        let mut arguments = template.instantiate_arguments(context, environment, earliest)?;
        let instantiated: crate::Arguments = arguments
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .chain(
                template
                    .activity_type()
                    .defaults
                    .iter()
                    .filter(|(k, _)| !arguments.contains_key(*k))
                    .map(|(k, v)| (k.clone(), v.clone())),
            )
            .collect();

        match template.activity_type().duration_from(&instantiated) {
            Some(duration) => {
                stn.add_duration_interval(CANDIDATE, Interval::at(duration));
                if !stn.solve() {
                    tracing::debug!(
                        event = "duration_argument_infeasible",
                        %duration,
                        bounds = %bounds.duration
                    );
                    return None;
                }
                let start = stn.get_bounds(CANDIDATE)?.start.start();
                Some((start, duration, arguments))
            }
            None if instantiated.get(parameter).is_some_and(|v| !v.is_null()) => {
                tracing::debug!(
                    event = "duration_argument_invalid",
                    parameter,
                    "duration argument is not a number of microseconds"
                );
                None
            }
            None => {
                stn.add_start_interval(CANDIDATE, Interval::at(earliest));
                if !stn.solve() {
                    return None;
                }
                let end = stn.get_bounds(CANDIDATE)?.end.end();
                let duration = end - earliest;
                arguments.insert(parameter.to_string(), Value::from_duration(duration));
                Some((earliest, duration, arguments))
            }
        }
    }

    /// Searches the solved start range for a start whose simulated end is in the solved end range.
    fn place_uncontrollable(
        &mut self,
        id: ActivityId,
        template: &ActivityCreationTemplate,
        bounds: ActivityBounds,
        environment: &EvaluationEnvironment,
        plan: &Plan,
        context: &EvaluationContext,
    ) -> Result<Option<(Duration, Duration, crate::Arguments)>, SchedulingError> {
        let finder = self.root_finder;
        let interrupter = self.interrupter;
        let facade = &mut *self.facade;
        let type_name = &template.activity_type().name;

        let f = |start: Duration| -> Result<FunctionValue, SchedulingError> {
            interrupter.check()?;
            let Some(arguments) = template.instantiate_arguments(context, environment, start)
            else {
                return Ok(FunctionValue::Discontinuous);
            };
            let mut candidate = SchedulingActivityDirective::new(id, type_name.clone(), start);
            candidate.arguments = arguments;
            Ok(match facade.activity_duration(plan, &candidate, start)? {
                Some(duration) => FunctionValue::Evaluated(start + duration),
                None => FunctionValue::Discontinuous,
            })
        };

        match finder.find_root(f, bounds.start, bounds.end) {
            Ok(root) => {
                let duration = root.y - root.x;
                if !bounds.duration.contains(duration) {
                    return Ok(None);
                }
                let Some(arguments) = template.instantiate_arguments(context, environment, root.x)
                else {
                    return Ok(None);
                };
                tracing::trace!(
                    event = "root_found",
                    start = %root.x,
                    %duration,
                    evaluations = root.history.len()
                );
                Ok(Some((root.x, duration, arguments)))
            }
            Err(RootFindingError::Failed(failure)) => {
                tracing::warn!(
                    event = "root_finding_failed",
                    activity_type = %type_name,
                    kind = %failure.kind,
                    evaluations = failure.history.len()
                );
                Ok(None)
            }
            Err(RootFindingError::Aborted(error)) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Time;
    use crate::activity::ActivityType;
    use crate::config::SimulationConfig;
    use crate::expression::template::{ActivityExpression, DurationRange};
    use crate::simulation::reference::ReferenceModel;
    use crate::time::PlanningHorizon;
    use std::sync::Arc;

    fn s(seconds: f64) -> Duration {
        Duration::from_seconds(seconds)
    }

    fn facade() -> SimulationFacade {
        let model = ReferenceModel::new()
            .with_resource("battery", 100.0)
            .with_activity(
                ActivityType::controllable("Observe", "duration").with_default("duration", s(2.0)),
                |args, _, ops| {
                    ops.wait(args.get("duration").and_then(Value::as_duration).unwrap_or(Duration::ZERO));
                    Ok(ops.elapsed())
                },
            )
            .with_activity(ActivityType::controllable("Soak", "duration"), |args, _, ops| {
                ops.wait(args.get("duration").and_then(Value::as_duration).unwrap_or(Duration::ZERO));
                Ok(ops.elapsed())
            })
            .with_activity(ActivityType::uncontrollable("Recharge"), |_, state, ops| {
                let battery = state.get("battery").and_then(Value::as_real).unwrap_or(0.0);
                ops.wait(Duration::from_seconds(100.0 - battery));
                ops.set("battery", 100.0);
                Ok(ops.elapsed())
            })
            .with_activity(ActivityType::uncontrollable("Drain"), |_, _, ops| {
                ops.add("battery", -10.0);
                Ok(Duration::ZERO)
            });
        let horizon = PlanningHorizon::starting_at(Time::from_tai_seconds(0.0), s(20.0)).unwrap();
        SimulationFacade::new(Arc::new(model), horizon, SimulationConfig::default(), Interrupter::never())
    }

    fn template(facade: &SimulationFacade, name: &str, expression: ActivityExpression) -> ActivityTemplate {
        let activity_type = facade.model().activity_types().get(name).unwrap().clone();
        ActivityTemplate::new(&activity_type, expression).unwrap()
    }

    fn create(
        facade: &mut SimulationFacade,
        template: &ActivityTemplate,
        request: &CreationRequest,
        plan: &Plan,
    ) -> Result<Option<SchedulingActivityDirective>, SchedulingError> {
        let interrupter = Interrupter::never();
        let mut creator = ActivityCreator {
            facade,
            conditions: &[],
            root_finder: RootFinder::default(),
            interrupter: &interrupter,
        };
        creator.create_activity(ActivityId::new(9), template, request, plan)
    }

    #[test]
    fn controllable_takes_the_earliest_start() -> anyhow::Result<()> {
        let mut facade = facade();
        let template = template(&facade, "Observe", ActivityExpression::default());
        let windows = Windows::from_intervals([
            Interval::closed_open(s(2.0), s(3.0)),
            Interval::closed_open(s(5.0), s(10.0)),
        ]);
        let created = create(&mut facade, &template, &CreationRequest::within(windows), &Plan::new())?
            .unwrap();
        assert_eq!(s(5.0), created.start_offset);
        assert_eq!(Some(s(2.0)), created.duration);
        Ok(())
    }

    #[test]
    fn duration_argument_must_fit() -> anyhow::Result<()> {
        let mut facade = facade();
        let template = template(
            &facade,
            "Observe",
            ActivityExpression::default().with_argument("duration", s(6.0)),
        );
        let windows = Windows::from_interval(Interval::closed_open(s(0.0), s(5.0)));
        assert!(create(&mut facade, &template, &CreationRequest::within(windows), &Plan::new())?.is_none());
        Ok(())
    }

    #[test]
    fn missing_duration_fills_the_window() -> anyhow::Result<()> {
        let mut facade = facade();
        let template = template(
            &facade,
            "Soak",
            ActivityExpression::default().with_duration_range(DurationRange::between(s(0.0), s(3.0))),
        );
        let windows = Windows::from_interval(Interval::closed_open(s(4.0), s(10.0)));
        let created = create(&mut facade, &template, &CreationRequest::within(windows), &Plan::new())?
            .unwrap();
        assert_eq!(s(4.0), created.start_offset);
        assert_eq!(Some(s(3.0)), created.duration);
        assert_eq!(Some(&Value::from_duration(s(3.0))), created.arguments.get("duration"));
        Ok(())
    }

    #[test]
    fn requested_duration_bounds_the_fill() -> anyhow::Result<()> {
        let mut facade = facade();
        let template = template(&facade, "Soak", ActivityExpression::default());
        let request = CreationRequest {
            duration_within: Some(Interval::between(s(3.0), s(4.0))),
            ..CreationRequest::within(Windows::from_interval(Interval::closed_open(s(0.0), s(10.0))))
        };
        let created = create(&mut facade, &template, &request, &Plan::new())?.unwrap();
        assert_eq!(s(0.0), created.start_offset);
        assert_eq!(Some(s(4.0)), created.duration);

        // Nothing fits a 3s minimum in a 2s window.
        let request = CreationRequest {
            duration_within: Some(Interval::between(s(3.0), s(4.0))),
            ..CreationRequest::within(Windows::from_interval(Interval::closed_open(s(0.0), s(2.0))))
        };
        assert!(create(&mut facade, &template, &request, &Plan::new())?.is_none());
        Ok(())
    }

    #[test]
    fn uncontrollable_duration_is_found_by_simulation() -> anyhow::Result<()> {
        let mut facade = facade();
        let plan = Plan::from_directives([SchedulingActivityDirective::new(
            ActivityId::new(0),
            "Drain",
            s(0.0),
        )])?;
        facade.simulate_horizon(&plan)?;
        let template = template(
            &facade,
            "Recharge",
            ActivityExpression::default().ending_in(Interval::between(s(15.0), s(16.0))),
        );
        let windows = Windows::from_interval(Interval::closed_open(s(0.0), s(20.0)));
        let created = create(&mut facade, &template, &CreationRequest::within(windows), &plan)?
            .unwrap();
        assert_eq!(s(10.0), created.duration.unwrap());
        let end = created.start_offset + created.duration.unwrap();
        assert!(Interval::between(s(15.0), s(16.0)).contains(end));
        Ok(())
    }

    #[test]
    fn anchored_creation_is_relative_to_the_anchor() -> anyhow::Result<()> {
        let mut facade = facade();
        let template = template(&facade, "Observe", ActivityExpression::default());
        let request = CreationRequest {
            anchor: Some(AnchoredPlacement {
                anchor: ActivityId::new(0),
                to_start: false,
                anchor_point: s(3.0),
            }),
            ..CreationRequest::within(Windows::from_interval(Interval::closed_open(s(4.0), s(10.0))))
        };
        let created = create(&mut facade, &template, &request, &Plan::new())?.unwrap();
        assert_eq!(Some(ActivityId::new(0)), created.anchor);
        assert!(!created.anchored_to_start);
        assert_eq!(s(1.0), created.start_offset);
        Ok(())
    }

    #[test]
    fn disjunctions_fall_through_to_later_branches() -> anyhow::Result<()> {
        let mut facade = facade();
        let too_long = template(
            &facade,
            "Observe",
            ActivityExpression::default().with_argument("duration", s(8.0)),
        );
        let fits = template(&facade, "Soak", ActivityExpression::default().with_argument("duration", s(1.0)));
        let either = ActivityTemplate::any(vec![too_long, fits])?;
        let windows = Windows::from_interval(Interval::closed_open(s(0.0), s(5.0)));
        let created = create(&mut facade, &either, &CreationRequest::within(windows), &Plan::new())?
            .unwrap();
        assert_eq!("Soak", created.activity_type);
        Ok(())
    }
}
