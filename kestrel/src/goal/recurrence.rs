use crate::Duration;
use crate::creator::CreationRequest;
use crate::error::SchedulingError;
use crate::expression::template::ActivityTemplate;
use crate::expression::{EvaluationContext, EvaluationEnvironment};
use crate::goal::Conflict;
use crate::time::{Interval, Windows};

/// Requires a matching activity to start in every `interval`-long slot of each
/// applicability window.
///
/// Slots start at the window start. When a slot holds a matching activity, the next slot
/// starts `interval` after that activity's start rather than after the slot, so existing
/// activities set the rhythm. The last slot of a window may be shorter than `interval`.
#[derive(Clone, Debug)]
pub struct RecurrenceGoal {
    pub template: ActivityTemplate,
    pub interval: Duration,
}

impl RecurrenceGoal {
    pub fn validate(&self) -> Result<(), SchedulingError> {
        if self.interval <= Duration::ZERO {
            return Err(SchedulingError::invalid(format!(
                "recurrence interval must be positive, got {}",
                self.interval
            )));
        }
        self.template.validate()
    }

    pub(super) fn detect_conflicts(
        &self,
        windows: &Windows,
        context: &EvaluationContext,
    ) -> Vec<Conflict> {
        let environment = EvaluationEnvironment::default();
        let matching: Vec<_> = context
            .placed_activities()
            .into_iter()
            .filter(|placed| self.template.matches(placed, context, &environment))
            .collect();

        let mut conflicts = vec![];
        for window in windows.iter() {
            let mut cursor = window.start();
            while cursor < window.end() {
                let Some(slot) = Interval::closed_open(cursor, cursor + self.interval).intersect(&window)
                else {
                    break;
                };
                match matching.iter().find(|placed| slot.contains(placed.start)) {
                    Some(placed) => {
                        conflicts.push(Conflict::association(placed.id(), placed.start));
                        cursor = placed.start + self.interval;
                    }
                    None => {
                        conflicts.push(Conflict::missing_one(CreationRequest {
                            start_within: Some(slot),
                            ..CreationRequest::within(Windows::from_interval(window))
                        }));
                        cursor = cursor + self.interval;
                    }
                }
            }
        }
        conflicts
    }
}
