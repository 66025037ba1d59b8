use crate::Duration;
use crate::creator::CreationRequest;
use crate::error::SchedulingError;
use crate::expression::template::ActivityTemplate;
use crate::expression::{EvaluationContext, EvaluationEnvironment};
use crate::goal::{Conflict, ConflictKind};
use crate::time::Windows;

/// Bounds the number and total duration of matching activities inside each applicability
/// window. Only activities entirely inside a window count towards it.
#[derive(Clone, Debug)]
pub struct CardinalityGoal {
    pub template: ActivityTemplate,
    pub min_occurrences: usize,
    pub max_occurrences: Option<usize>,
    pub min_total_duration: Duration,
    pub max_total_duration: Option<Duration>,
}

impl CardinalityGoal {
    /// A goal on the number of activities only.
    pub fn occurrences(template: ActivityTemplate, min: usize, max: Option<usize>) -> Self {
        Self {
            template,
            min_occurrences: min,
            max_occurrences: max,
            min_total_duration: Duration::ZERO,
            max_total_duration: None,
        }
    }

    /// A goal on the total duration of activities only.
    pub fn total_duration(template: ActivityTemplate, min: Duration, max: Option<Duration>) -> Self {
        Self {
            template,
            min_occurrences: 0,
            max_occurrences: None,
            min_total_duration: min,
            max_total_duration: max,
        }
    }

    pub fn validate(&self) -> Result<(), SchedulingError> {
        if self.max_occurrences.is_some_and(|max| max < self.min_occurrences) {
            return Err(SchedulingError::invalid(format!(
                "occurrence range [{}, {:?}] is empty",
                self.min_occurrences, self.max_occurrences
            )));
        }
        if self.min_total_duration < Duration::ZERO {
            return Err(SchedulingError::invalid("minimum total duration is negative"));
        }
        if self
            .max_total_duration
            .is_some_and(|max| max < self.min_total_duration)
        {
            return Err(SchedulingError::invalid("total duration range is empty"));
        }
        if self.min_occurrences == 0
            && self.min_total_duration == Duration::ZERO
            && self.max_occurrences.is_none()
            && self.max_total_duration.is_none()
        {
            return Err(SchedulingError::invalid(
                "a cardinality goal needs an occurrence or duration bound",
            ));
        }
        self.template.validate()
    }

    pub(super) fn detect_conflicts(
        &self,
        windows: &Windows,
        context: &EvaluationContext,
    ) -> Vec<Conflict> {
        let environment = EvaluationEnvironment::default();
        let placed = context.placed_activities();
        let mut conflicts = vec![];

        for window in windows.iter() {
            let inside: Vec<_> = placed
                .iter()
                .filter(|p| p.span().is_some_and(|span| window.contains_interval(&span)))
                .filter(|p| self.template.matches(p, context, &environment))
                .collect();
            let count = inside.len();
            let total = inside
                .iter()
                .filter_map(|p| p.duration)
                .fold(Duration::ZERO, |acc, d| acc + d);

            conflicts.extend(inside.iter().map(|p| Conflict::association(p.id(), p.start)));

            let too_many = self.max_occurrences.is_some_and(|max| count > max);
            let too_long = self.max_total_duration.is_some_and(|max| total > max);
            if too_many || too_long {
                conflicts.push(Conflict {
                    time: window.start(),
                    kind: ConflictKind::Excess {
                        activities: count,
                        total_duration: total,
                    },
                });
                continue;
            }

            let missing = self.min_occurrences.saturating_sub(count);
            let missing_duration = if total < self.min_total_duration {
                self.min_total_duration - total
            } else {
                Duration::ZERO
            };
            if missing == 0 && missing_duration <= Duration::ZERO {
                continue;
            }
            let occupied: Windows = inside.iter().filter_map(|p| p.span()).collect();
            conflicts.push(Conflict {
                time: window.start(),
                kind: ConflictKind::MissingActivity {
                    request: CreationRequest::within(
                        Windows::from_interval(window).subtract(&occupied),
                    ),
                    missing,
                    missing_duration,
                    room: self.max_occurrences.map(|max| max - count),
                    duration_room: self.max_total_duration.map(|max| max - total),
                },
            });
        }
        conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Time;
    use crate::activity::{ActivityId, ActivityType, ActivityTypeCatalog, SchedulingActivityDirective};
    use crate::expression::template::ActivityExpression;
    use crate::plan::Plan;
    use crate::time::{Interval, PlanningHorizon};

    fn s(seconds: f64) -> Duration {
        Duration::from_seconds(seconds)
    }

    fn observe() -> ActivityType {
        ActivityType::controllable("Observe", "duration").with_default("duration", s(2.0))
    }

    fn detect(goal: &CardinalityGoal, plan: &Plan) -> Vec<Conflict> {
        let mut catalog = ActivityTypeCatalog::new();
        catalog.insert(observe());
        let horizon = PlanningHorizon::starting_at(Time::from_tai_seconds(0.0), s(20.0)).unwrap();
        let context = EvaluationContext {
            plan,
            results: None,
            horizon: &horizon,
            catalog: &catalog,
        };
        goal.detect_conflicts(
            &Windows::from_interval(Interval::closed_open(s(0.0), s(10.0))),
            &context,
        )
    }

    fn template() -> ActivityTemplate {
        ActivityTemplate::new(&observe(), ActivityExpression::default()).unwrap()
    }

    fn plan(starts: &[f64]) -> Plan {
        Plan::from_directives(starts.iter().enumerate().map(|(i, start)| {
            SchedulingActivityDirective::new(ActivityId::new(i as u32), "Observe", s(*start))
        }))
        .unwrap()
    }

    #[test]
    fn missing_occurrences_avoid_existing_spans() {
        let goal = CardinalityGoal::occurrences(template(), 3, Some(4));
        let conflicts = detect(&goal, &plan(&[2.0, 9.0]));
        // The activity at 9s runs past the window, so it doesn't count.
        assert_eq!(2, conflicts.len());
        match &conflicts[1].kind {
            ConflictKind::MissingActivity {
                request,
                missing,
                room,
                ..
            } => {
                assert_eq!(2, *missing);
                assert_eq!(Some(3), *room);
                assert_eq!(
                    vec![Interval::closed_open(s(0.0), s(2.0)), Interval::closed_open(s(4.0), s(10.0))],
                    request.windows.iter().collect::<Vec<_>>()
                );
            }
            other => panic!("unexpected conflict {other:?}"),
        }
    }

    #[test]
    fn total_duration_counts() {
        let goal = CardinalityGoal::total_duration(template(), s(5.0), None);
        let conflicts = detect(&goal, &plan(&[0.0]));
        assert!(matches!(
            conflicts.last().map(|c| &c.kind),
            Some(ConflictKind::MissingActivity { missing: 0, missing_duration, .. }) if *missing_duration == s(3.0)
        ));
        assert!(
            detect(&goal, &plan(&[0.0, 3.0, 6.0]))
                .iter()
                .all(|c| matches!(c.kind, ConflictKind::MissingAssociation { .. }))
        );
    }

    #[test]
    fn excess_is_reported() {
        let goal = CardinalityGoal::occurrences(template(), 0, Some(1));
        let conflicts = detect(&goal, &plan(&[0.0, 4.0]));
        assert!(matches!(
            conflicts.last().map(|c| &c.kind),
            Some(ConflictKind::Excess { activities: 2, .. })
        ));
    }

    #[test]
    fn empty_ranges_are_rejected() {
        assert!(CardinalityGoal::occurrences(template(), 3, Some(1)).validate().is_err());
        assert!(CardinalityGoal::occurrences(template(), 0, None).validate().is_err());
    }
}
