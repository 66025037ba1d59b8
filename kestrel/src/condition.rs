//! Global scheduling conditions: restrictions on where activities of certain types may
//! be placed, applied to every goal.

use crate::activity::ActivityTypeCatalog;
use crate::error::SchedulingError;
use crate::expression::{EvaluationContext, WindowsExpression};
use crate::time::Windows;

#[derive(Clone, Debug)]
pub enum GlobalCondition {
    /// Activities of these types may only be placed entirely within the windows.
    OnlyWhen {
        activity_types: Vec<String>,
        windows: WindowsExpression,
    },
    /// Activities of a `first` type never overlap activities of a `second` type.
    Mutex {
        first: Vec<String>,
        second: Vec<String>,
    },
}

impl GlobalCondition {
    pub fn only_when(
        activity_types: impl IntoIterator<Item = impl Into<String>>,
        windows: WindowsExpression,
    ) -> Self {
        GlobalCondition::OnlyWhen {
            activity_types: activity_types.into_iter().map(Into::into).collect(),
            windows,
        }
    }

    pub fn mutex(
        first: impl IntoIterator<Item = impl Into<String>>,
        second: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        GlobalCondition::Mutex {
            first: first.into_iter().map(Into::into).collect(),
            second: second.into_iter().map(Into::into).collect(),
        }
    }

    /// Checks that every type named exists, and that no list is empty.
    pub fn validate(&self, catalog: &ActivityTypeCatalog) -> Result<(), SchedulingError> {
        let lists: Vec<&Vec<String>> = match self {
            GlobalCondition::OnlyWhen { activity_types, .. } => vec![activity_types],
            GlobalCondition::Mutex { first, second } => vec![first, second],
        };
        for list in lists {
            if list.is_empty() {
                return Err(SchedulingError::invalid(
                    "a global condition needs at least one activity type on each side",
                ));
            }
            for name in list {
                catalog.require(name)?;
            }
        }
        Ok(())
    }

    /// The windows this condition allows for `activity_type`. Unrestricted types get
    /// [Windows::forever].
    pub fn allowed_windows(&self, activity_type: &str, context: &EvaluationContext) -> Windows {
        match self {
            GlobalCondition::OnlyWhen {
                activity_types,
                windows,
            } => {
                if activity_types.iter().any(|t| t == activity_type) {
                    windows.evaluate(context)
                } else {
                    Windows::forever()
                }
            }
            GlobalCondition::Mutex { first, second } => {
                let mut partners: Vec<&String> = vec![];
                if first.iter().any(|t| t == activity_type) {
                    partners.extend(second);
                }
                if second.iter().any(|t| t == activity_type) {
                    partners.extend(first);
                }
                if partners.is_empty() {
                    return Windows::forever();
                }
                let busy: Windows = context
                    .placed_activities()
                    .iter()
                    .filter(|placed| partners.contains(&&placed.directive.activity_type))
                    .filter_map(|placed| placed.span())
                    .collect();
                busy.complement()
            }
        }
    }
}

/// The intersection of what every condition allows for `activity_type`.
pub fn allowed_windows(
    conditions: &[GlobalCondition],
    activity_type: &str,
    context: &EvaluationContext,
) -> Windows {
    conditions
        .iter()
        .fold(Windows::forever(), |acc, condition| {
            acc.intersection(&condition.allowed_windows(activity_type, context))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityId, ActivityType, SchedulingActivityDirective};
    use crate::plan::Plan;
    use crate::time::{Interval, PlanningHorizon};
    use crate::{Duration, Time};

    fn s(seconds: f64) -> Duration {
        Duration::from_seconds(seconds)
    }

    fn catalog() -> ActivityTypeCatalog {
        let mut catalog = ActivityTypeCatalog::new();
        catalog.insert(ActivityType::controllable("Heat", "duration").with_default("duration", s(2.0)));
        catalog.insert(ActivityType::controllable("Image", "duration").with_default("duration", s(1.0)));
        catalog
    }

    #[test]
    fn mutex_forbids_partner_spans() {
        let catalog = catalog();
        let plan = Plan::from_directives([SchedulingActivityDirective::new(
            ActivityId::new(0),
            "Heat",
            s(4.0),
        )])
        .unwrap();
        let horizon = PlanningHorizon::starting_at(Time::from_tai_seconds(0.0), s(10.0)).unwrap();
        let context = EvaluationContext {
            plan: &plan,
            results: None,
            horizon: &horizon,
            catalog: &catalog,
        };
        let conditions = [
            GlobalCondition::mutex(["Heat"], ["Image"]),
            GlobalCondition::only_when(
                ["Image"],
                WindowsExpression::interval(Interval::closed_open(s(1.0), s(9.0))),
            ),
        ];
        let allowed = allowed_windows(&conditions, "Image", &context);
        assert_eq!(
            vec![Interval::closed_open(s(1.0), s(4.0)), Interval::closed_open(s(6.0), s(9.0))],
            allowed.iter().collect::<Vec<_>>()
        );
        assert_eq!(Windows::forever(), allowed_windows(&conditions[1..], "Heat", &context));
    }

    #[test]
    fn unknown_types_fail_validation() {
        let condition = GlobalCondition::mutex(["Heat"], ["Nope"]);
        assert!(matches!(
            condition.validate(&catalog()),
            Err(SchedulingError::UnknownActivityType { .. })
        ));
        assert!(GlobalCondition::mutex(Vec::<String>::new(), ["Heat"]).validate(&catalog()).is_err());
    }
}
