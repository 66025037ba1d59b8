//! Resolving anchored directives to absolute start times.
//!
//! Anchors form a forest over the plan: every directive either starts at an offset from
//! the horizon, or at an offset from the start or end of another directive. Grounding
//! walks that forest from the roots down (Kahn's algorithm), so each directive is visited
//! only after its anchor has a known start and, for end anchors, a known duration.

use crate::Duration;
use crate::activity::{ActivityId, SchedulingActivityDirective};
use crate::error::SchedulingError;
use crate::plan::Plan;
use std::collections::{BTreeMap, VecDeque};

/// Absolute start offsets (relative to the horizon) for every directive in a plan.
pub type GroundedStarts = BTreeMap<ActivityId, Duration>;

/// Grounds every directive in the plan.
///
/// `duration_of` is only asked about directives that other directives are anchored
/// to the end of. Returns `None` if the anchors contain a cycle, point at a directive
/// that isn't in the plan, or need a duration that `duration_of` can't provide.
pub fn ground(
    plan: &Plan,
    mut duration_of: impl FnMut(&SchedulingActivityDirective) -> Option<Duration>,
) -> Option<GroundedStarts> {
    let mut starts = GroundedStarts::new();
    let mut queue: VecDeque<&SchedulingActivityDirective> =
        plan.iter().filter(|d| d.anchor.is_none()).collect();

    while let Some(directive) = queue.pop_front() {
        let start = match directive.anchor {
            None => directive.start_offset,
            Some(anchor_id) => {
                let anchor = plan.get(anchor_id)?;
                let anchor_start = *starts.get(&anchor_id)?;
                let point = if directive.anchored_to_start {
                    anchor_start
                } else {
                    anchor_start + duration_of(anchor)?
                };
                point + directive.start_offset
            }
        };
        starts.insert(directive.id, start);
        queue.extend(plan.anchored_to(directive.id));
    }

    (starts.len() == plan.len()).then_some(starts)
}

/// Checks that anchors only point at directives in the plan and never form a cycle.
pub fn validate_anchors(plan: &Plan) -> Result<(), SchedulingError> {
    for directive in plan.iter() {
        if let Some(anchor) = directive.anchor {
            if plan.get(anchor).is_none() {
                return Err(SchedulingError::Grounding {
                    reason: format!(
                        "activity {} is anchored to {anchor}, which is not in the plan",
                        directive.id
                    ),
                });
            }
        }
    }

    let mut depth: BTreeMap<ActivityId, usize> = BTreeMap::new();
    let mut queue: VecDeque<ActivityId> = plan
        .iter()
        .filter(|d| d.anchor.is_none())
        .map(|d| d.id)
        .collect();
    while let Some(id) = queue.pop_front() {
        let d = depth.get(&id).copied().unwrap_or_default();
        depth.insert(id, d);
        for dependent in plan.anchored_to(id) {
            depth.insert(dependent.id, d + 1);
            queue.push_back(dependent.id);
        }
    }

    match plan.iter().find(|d| !depth.contains_key(&d.id)) {
        Some(stuck) => Err(SchedulingError::Grounding {
            reason: format!("activity {} is part of an anchor cycle", stuck.id),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::SchedulingActivityDirective as Directive;

    fn s(seconds: f64) -> Duration {
        Duration::from_seconds(seconds)
    }

    fn id(n: u32) -> ActivityId {
        ActivityId::new(n)
    }

    #[test]
    fn chains_resolve_through_starts_and_ends() -> Result<(), SchedulingError> {
        let plan = Plan::from_directives([
            Directive::new(id(0), "A", s(10.0)).with_duration(s(5.0)),
            Directive::new(id(1), "B", s(2.0)).anchored(id(0), false),
            Directive::new(id(2), "C", s(-1.0))
                .anchored(id(1), true)
                .with_duration(s(1.0)),
        ])?;
        let starts = ground(&plan, |d| d.duration).unwrap();
        assert_eq!(s(10.0), starts[&id(0)]);
        assert_eq!(s(17.0), starts[&id(1)]);
        assert_eq!(s(16.0), starts[&id(2)]);
        Ok(())
    }

    #[test]
    fn end_anchor_without_duration_fails() -> Result<(), SchedulingError> {
        let plan = Plan::from_directives([
            Directive::new(id(0), "A", s(0.0)),
            Directive::new(id(1), "B", s(1.0)).anchored(id(0), false),
        ])?;
        assert!(ground(&plan, |d| d.duration).is_none());
        Ok(())
    }

    #[test]
    fn cycles_are_rejected() {
        let result = Plan::from_directives([
            Directive::new(id(0), "A", s(0.0)).anchored(id(1), true),
            Directive::new(id(1), "B", s(0.0)).anchored(id(0), true),
        ]);
        assert!(matches!(result, Err(SchedulingError::Grounding { .. })));
    }

    #[test]
    fn dangling_anchors_are_rejected() {
        let result =
            Plan::from_directives([Directive::new(id(0), "A", s(0.0)).anchored(id(9), true)]);
        assert!(matches!(result, Err(SchedulingError::Grounding { .. })));
    }
}
