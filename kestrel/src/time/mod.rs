//! Intervals, windows, and the planning horizon.
//!
//! All scheduling happens on a relative time axis measured from the start of the
//! [PlanningHorizon], using [Duration] as the unit. Absolute [Time]s only appear
//! at the boundary, when converting to and from wall-clock epochs.

mod windows;

pub use windows::{Spans, Windows};

use crate::error::SchedulingError;
use crate::{Duration, Time};
use std::cmp::{max, min};
use std::fmt::{Display, Formatter};

/// The fixed precision of the scheduler: one microsecond.
///
/// Exclusive interval bounds are turned into inclusive ones by stepping one unit of resolution,
/// and duration-valued activity arguments are stored as integer microseconds.
pub fn resolution() -> Duration {
    Duration::from_microseconds(1.0)
}

/// Converts a duration to whole microseconds, truncating toward zero.
pub fn to_micros(duration: Duration) -> i64 {
    (duration.total_nanoseconds() / 1_000) as i64
}

/// Converts whole microseconds to a duration.
pub fn from_micros(micros: i64) -> Duration {
    Duration::from_total_nanoseconds(micros as i128 * 1_000)
}

/// One side of an instant, used to normalize inclusive and exclusive bounds.
///
/// `Edge { at: t, after: false }` sits immediately before the instant `t`, and
/// `Edge { at: t, after: true }` immediately after it. Every interval maps to a
/// half-open `[lower, upper)` pair of edges, which makes set operations uniform.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub(crate) struct Edge {
    pub(crate) at: Duration,
    pub(crate) after: bool,
}

impl Edge {
    pub(crate) const NEG_INFINITY: Edge = Edge {
        at: Duration::MIN,
        after: false,
    };
    pub(crate) const POS_INFINITY: Edge = Edge {
        at: Duration::MAX,
        after: true,
    };

    pub(crate) fn before(at: Duration) -> Edge {
        Edge { at, after: false }
    }

    pub(crate) fn after(at: Duration) -> Edge {
        Edge { at, after: true }
    }
}

/// A contiguous range of relative time, with each end either inclusive or exclusive.
///
/// Intervals are never empty: `start <= end`, and a degenerate interval (`start == end`)
/// must include both ends. Constructors that could produce an empty interval return [Option].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Interval {
    start: Duration,
    end: Duration,
    start_inclusive: bool,
    end_inclusive: bool,
}

impl Interval {
    /// Creates an interval, or `None` if the bounds describe an empty set.
    pub fn new(
        start: Duration,
        end: Duration,
        start_inclusive: bool,
        end_inclusive: bool,
    ) -> Option<Interval> {
        Self::from_edges(
            Edge {
                at: start,
                after: !start_inclusive,
            },
            Edge {
                at: end,
                after: end_inclusive,
            },
        )
    }

    /// A closed interval `[start, end]`.
    ///
    /// # Panics
    ///
    /// Panics if `end < start`.
    pub fn between(start: Duration, end: Duration) -> Interval {
        Self::new(start, end, true, true)
            .unwrap_or_else(|| panic!("tried to build the interval [{start}, {end}]"))
    }

    /// A half-open interval `[start, end)`.
    ///
    /// # Panics
    ///
    /// Panics if `end <= start`.
    pub fn closed_open(start: Duration, end: Duration) -> Interval {
        Self::new(start, end, true, false)
            .unwrap_or_else(|| panic!("tried to build the interval [{start}, {end})"))
    }

    /// The degenerate interval `[time, time]`.
    pub fn at(time: Duration) -> Interval {
        Interval {
            start: time,
            end: time,
            start_inclusive: true,
            end_inclusive: true,
        }
    }

    /// The largest representable interval.
    pub fn forever() -> Interval {
        Self::between(Duration::MIN, Duration::MAX)
    }

    pub fn start(&self) -> Duration {
        self.start
    }

    pub fn end(&self) -> Duration {
        self.end
    }

    pub fn start_inclusive(&self) -> bool {
        self.start_inclusive
    }

    pub fn end_inclusive(&self) -> bool {
        self.end_inclusive
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_point(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, time: Duration) -> bool {
        self.lower() <= Edge::before(time) && Edge::after(time) <= self.upper()
    }

    pub fn contains_interval(&self, other: &Interval) -> bool {
        self.lower() <= other.lower() && other.upper() <= self.upper()
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.intersect(other).is_some()
    }

    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        Self::from_edges(
            max(self.lower(), other.lower()),
            min(self.upper(), other.upper()),
        )
    }

    /// Moves the start and end independently. Returns `None` if the result is empty.
    pub fn shift_by(&self, start_delta: Duration, end_delta: Duration) -> Option<Interval> {
        Self::new(
            self.start + start_delta,
            self.end + end_delta,
            self.start_inclusive,
            self.end_inclusive,
        )
    }

    /// The earliest and latest instants in the interval, at the scheduler's resolution.
    ///
    /// Returns `None` if no instant on the resolution grid fits (an exclusive interval
    /// narrower than two units of resolution).
    pub fn inclusive_bounds(&self) -> Option<(Duration, Duration)> {
        let lo = if self.start_inclusive {
            self.start
        } else {
            self.start + resolution()
        };
        let hi = if self.end_inclusive {
            self.end
        } else {
            self.end - resolution()
        };
        (lo <= hi).then_some((lo, hi))
    }

    pub(crate) fn lower(&self) -> Edge {
        Edge {
            at: self.start,
            after: !self.start_inclusive,
        }
    }

    pub(crate) fn upper(&self) -> Edge {
        Edge {
            at: self.end,
            after: self.end_inclusive,
        }
    }

    pub(crate) fn from_edges(lower: Edge, upper: Edge) -> Option<Interval> {
        (lower < upper).then_some(Interval {
            start: lower.at,
            end: upper.at,
            start_inclusive: !lower.after,
            end_inclusive: upper.after,
        })
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}, {}{}",
            if self.start_inclusive { '[' } else { '(' },
            self.start,
            self.end,
            if self.end_inclusive { ']' } else { ')' }
        )
    }
}

/// The absolute bounds of a plan.
///
/// Maps between wall-clock epochs and the plan's relative time axis, which starts
/// at zero at [PlanningHorizon::start].
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct PlanningHorizon {
    start: Time,
    end: Time,
}

impl PlanningHorizon {
    pub fn new(start: Time, end: Time) -> Result<Self, SchedulingError> {
        if end <= start {
            return Err(SchedulingError::InvalidConfiguration {
                reason: format!("planning horizon ends ({end}) before it starts ({start})"),
            });
        }
        Ok(Self { start, end })
    }

    /// A horizon starting at `start` and lasting `duration`.
    pub fn starting_at(start: Time, duration: Duration) -> Result<Self, SchedulingError> {
        Self::new(start, start + duration)
    }

    pub fn start(&self) -> Time {
        self.start
    }

    pub fn end(&self) -> Time {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn to_relative(&self, time: Time) -> Duration {
        time - self.start
    }

    pub fn to_absolute(&self, offset: Duration) -> Time {
        self.start + offset
    }

    /// The horizon on the relative axis: `[0, duration)`.
    pub fn interval(&self) -> Interval {
        Interval::closed_open(Duration::ZERO, self.duration())
    }

    pub fn contains(&self, offset: Duration) -> bool {
        self.interval().contains(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(seconds: f64) -> Duration {
        Duration::from_seconds(seconds)
    }

    #[test]
    fn degenerate_intervals_need_both_ends() {
        assert!(Interval::new(s(1.0), s(1.0), true, true).is_some());
        assert!(Interval::new(s(1.0), s(1.0), true, false).is_none());
        assert!(Interval::new(s(1.0), s(1.0), false, true).is_none());
        assert!(Interval::new(s(2.0), s(1.0), true, true).is_none());
    }

    #[test]
    fn containment_respects_inclusivity() {
        let open = Interval::new(s(1.0), s(3.0), false, false).unwrap();
        assert!(!open.contains(s(1.0)));
        assert!(open.contains(s(2.0)));
        assert!(!open.contains(s(3.0)));

        let closed = Interval::between(s(1.0), s(3.0));
        assert!(closed.contains(s(1.0)));
        assert!(closed.contains(s(3.0)));
        assert!(closed.contains_interval(&open));
        assert!(!open.contains_interval(&closed));
    }

    #[test]
    fn touching_half_open_intervals_do_not_intersect() {
        let a = Interval::closed_open(s(0.0), s(5.0));
        let b = Interval::closed_open(s(5.0), s(10.0));
        assert_eq!(None, a.intersect(&b));
        assert_eq!(
            Some(Interval::at(s(5.0))),
            Interval::between(s(0.0), s(5.0)).intersect(&b)
        );
    }

    #[test]
    fn inclusive_bounds_step_exclusive_ends() {
        let interval = Interval::new(s(1.0), s(2.0), false, false).unwrap();
        let (lo, hi) = interval.inclusive_bounds().unwrap();
        assert_eq!(s(1.0) + resolution(), lo);
        assert_eq!(s(2.0) - resolution(), hi);
    }

    #[test]
    fn micros_round_trip() {
        assert_eq!(2_000_000, to_micros(s(2.0)));
        assert_eq!(s(2.0), from_micros(2_000_000));
    }

    #[test]
    fn horizon_maps_between_axes() {
        let start = Time::from_tai_seconds(100.0);
        let horizon = PlanningHorizon::starting_at(start, s(20.0)).unwrap();
        assert_eq!(s(5.0), horizon.to_relative(start + s(5.0)));
        assert_eq!(start + s(5.0), horizon.to_absolute(s(5.0)));
        assert!(horizon.contains(Duration::ZERO));
        assert!(!horizon.contains(s(20.0)));
        assert!(PlanningHorizon::new(start, start).is_err());
    }
}
