use crate::Duration;
use crate::activity::ActivityTypeCatalog;
use crate::creator::{AnchoredPlacement, CreationRequest};
use crate::error::SchedulingError;
use crate::expression::template::ActivityTemplate;
use crate::expression::{AnchorSpan, EvaluationContext, EvaluationEnvironment, SpansExpression};
use crate::goal::Conflict;
use crate::time::{Interval, Windows};
use std::collections::BTreeSet;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AnchorPoint {
    Start,
    End,
}

/// A range of offsets from one end of an anchor span.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct RelativeRange {
    pub from: AnchorPoint,
    pub offsets: Interval,
}

impl RelativeRange {
    pub fn from_start(offsets: Interval) -> Self {
        Self {
            from: AnchorPoint::Start,
            offsets,
        }
    }

    pub fn from_end(offsets: Interval) -> Self {
        Self {
            from: AnchorPoint::End,
            offsets,
        }
    }

    fn point(&self, anchor: Interval) -> Duration {
        match self.from {
            AnchorPoint::Start => anchor.start(),
            AnchorPoint::End => anchor.end(),
        }
    }

    /// The range on the plan's time axis, for a given anchor span.
    pub fn absolute(&self, anchor: Interval) -> Option<Interval> {
        let point = self.point(anchor);
        self.offsets.shift_by(point, point)
    }
}

/// For every anchor span, requires a matching activity placed relative to it.
///
/// With neither `start` nor `end` given, the activity must lie within the anchor span.
/// An activity serves at most one anchor.
#[derive(Clone, Debug)]
pub struct CoexistenceGoal {
    pub template: ActivityTemplate,
    pub for_each: SpansExpression,
    pub start: Option<RelativeRange>,
    pub end: Option<RelativeRange>,
    /// Anchor created activities to the anchor activity, so they move with it.
    pub create_anchored: bool,
}

impl CoexistenceGoal {
    pub fn new(template: ActivityTemplate, for_each: SpansExpression) -> Self {
        Self {
            template,
            for_each,
            start: None,
            end: None,
            create_anchored: false,
        }
    }

    pub fn starting_within(mut self, range: RelativeRange) -> Self {
        self.start = Some(range);
        self
    }

    pub fn ending_within(mut self, range: RelativeRange) -> Self {
        self.end = Some(range);
        self
    }

    pub fn anchored(mut self) -> Self {
        self.create_anchored = true;
        self
    }

    pub fn validate(&self) -> Result<(), SchedulingError> {
        self.template.validate()
    }

    pub(super) fn validate_types(&self, catalog: &ActivityTypeCatalog) -> Result<(), SchedulingError> {
        if let SpansExpression::Activities(expression) = &self.for_each {
            if let Some(name) = &expression.type_name {
                catalog.require(name)?;
            }
        }
        Ok(())
    }

    fn request(&self, anchor: &AnchorSpan, context: &EvaluationContext) -> Option<CreationRequest> {
        let start_within = match &self.start {
            Some(range) => Some(range.absolute(anchor.interval)?),
            None => None,
        };
        let end_within = match &self.end {
            Some(range) => Some(range.absolute(anchor.interval)?),
            None => None,
        };
        let windows = if self.start.is_none() && self.end.is_none() {
            Windows::from_interval(anchor.interval)
        } else {
            Windows::forever()
        };

        let anchor_directive = anchor.activity.and_then(|id| context.plan.get(id));
        let environment = anchor_directive
            .cloned()
            .map(EvaluationEnvironment::with_anchor)
            .unwrap_or_default();
        let placement = match (self.create_anchored, anchor.activity) {
            (true, Some(id)) => {
                let to_start = self.start.is_none_or(|range| range.from == AnchorPoint::Start);
                Some(AnchoredPlacement {
                    anchor: id,
                    to_start,
                    anchor_point: if to_start {
                        anchor.interval.start()
                    } else {
                        anchor.interval.end()
                    },
                })
            }
            _ => None,
        };
        Some(CreationRequest {
            windows,
            start_within,
            end_within,
            duration_within: None,
            anchor: placement,
            environment,
        })
    }

    pub(super) fn detect_conflicts(
        &self,
        windows: &Windows,
        context: &EvaluationContext,
    ) -> Vec<Conflict> {
        let placed = context.placed_activities();
        let mut used = BTreeSet::new();
        let mut conflicts = vec![];

        for anchor in self.for_each.evaluate(context) {
            if !windows.contains(anchor.interval.start()) {
                continue;
            }
            let Some(request) = self.request(&anchor, context) else {
                continue;
            };
            let existing = placed.iter().find(|p| {
                Some(p.id()) != anchor.activity
                    && !used.contains(&p.id())
                    && self.template.matches(p, context, &request.environment)
                    && request.admits(p)
            });
            match existing {
                Some(p) => {
                    used.insert(p.id());
                    conflicts.push(Conflict::association(p.id(), anchor.interval.start()));
                }
                None => conflicts.push(Conflict {
                    time: anchor.interval.start(),
                    ..Conflict::missing_one(request)
                }),
            }
        }
        conflicts
    }
}
