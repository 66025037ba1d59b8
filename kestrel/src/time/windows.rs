use crate::Duration;
use crate::time::{Edge, Interval};
use derive_more::{Deref, DerefMut};
use std::cmp::{max, min};
use std::fmt::{Display, Formatter};

/// A piecewise-constant boolean function of time, stored as the set of intervals where it is true.
///
/// The intervals are always sorted, disjoint, and coalesced: two intervals that touch
/// (such as `[0, 5)` and `[5, 10)`) are merged into one.
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Windows {
    ranges: Vec<(Edge, Edge)>,
}

impl Windows {
    /// Windows that are false everywhere.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Windows that are true over the whole representable time axis.
    pub fn forever() -> Self {
        Self {
            ranges: vec![(Edge::NEG_INFINITY, Edge::POS_INFINITY)],
        }
    }

    pub fn from_interval(interval: Interval) -> Self {
        Self {
            ranges: vec![(interval.lower(), interval.upper())],
        }
    }

    pub fn from_intervals(intervals: impl IntoIterator<Item = Interval>) -> Self {
        Self::normalize(
            intervals
                .into_iter()
                .map(|i| (i.lower(), i.upper()))
                .collect(),
        )
    }

    fn normalize(mut ranges: Vec<(Edge, Edge)>) -> Self {
        ranges.retain(|(lo, hi)| lo < hi);
        ranges.sort();
        let mut merged: Vec<(Edge, Edge)> = Vec::with_capacity(ranges.len());
        for (lo, hi) in ranges {
            match merged.last_mut() {
                Some(last) if lo <= last.1 => last.1 = max(last.1, hi),
                _ => merged.push((lo, hi)),
            }
        }
        Self { ranges: merged }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The number of maximal true intervals.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Iterates the maximal true intervals in time order.
    pub fn iter(&self) -> impl Iterator<Item = Interval> + '_ {
        self.ranges
            .iter()
            .filter_map(|(lo, hi)| Interval::from_edges(*lo, *hi))
    }

    pub fn first(&self) -> Option<Interval> {
        self.iter().next()
    }

    pub fn contains(&self, time: Duration) -> bool {
        self.iter().any(|i| i.contains(time))
    }

    /// Whether some maximal true interval contains all of `interval`.
    pub fn contains_interval(&self, interval: &Interval) -> bool {
        self.iter().any(|i| i.contains_interval(interval))
    }

    pub fn union(&self, other: &Windows) -> Windows {
        let mut ranges = self.ranges.clone();
        ranges.extend_from_slice(&other.ranges);
        Self::normalize(ranges)
    }

    pub fn intersection(&self, other: &Windows) -> Windows {
        let mut result = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let (a_lo, a_hi) = self.ranges[i];
            let (b_lo, b_hi) = other.ranges[j];
            let lo = max(a_lo, b_lo);
            let hi = min(a_hi, b_hi);
            if lo < hi {
                result.push((lo, hi));
            }
            if a_hi < b_hi {
                i += 1;
            } else {
                j += 1;
            }
        }
        Self { ranges: result }
    }

    /// Everything in `bounds` where these windows are false.
    pub fn complement_within(&self, bounds: Interval) -> Windows {
        let mut result = Vec::new();
        let mut cursor = bounds.lower();
        for &(lo, hi) in &self.ranges {
            if hi <= cursor {
                continue;
            }
            if lo >= bounds.upper() {
                break;
            }
            if cursor < lo {
                result.push((cursor, lo));
            }
            cursor = max(cursor, hi);
        }
        if cursor < bounds.upper() {
            result.push((cursor, bounds.upper()));
        }
        Self { ranges: result }
    }

    pub fn complement(&self) -> Windows {
        self.complement_within(Interval::forever())
    }

    pub fn subtract(&self, other: &Windows) -> Windows {
        self.intersection(&other.complement())
    }

    /// Moves the start of every interval by `start_delta` and the end by `end_delta`,
    /// dropping intervals that become empty.
    pub fn shift_edges(&self, start_delta: Duration, end_delta: Duration) -> Windows {
        Self::from_intervals(
            self.iter()
                .filter_map(|i| i.shift_by(start_delta, end_delta)),
        )
    }

    /// Keeps only the intervals at least `minimum` long.
    pub fn filter_min_duration(&self, minimum: Duration) -> Windows {
        Self::from_intervals(self.iter().filter(|i| i.duration() >= minimum))
    }
}

impl From<Interval> for Windows {
    fn from(value: Interval) -> Self {
        Windows::from_interval(value)
    }
}

impl FromIterator<Interval> for Windows {
    fn from_iter<T: IntoIterator<Item = Interval>>(iter: T) -> Self {
        Windows::from_intervals(iter)
    }
}

impl Display for Windows {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, interval) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{interval}")?;
        }
        write!(f, "}}")
    }
}

/// An ordered list of intervals that, unlike [Windows], may overlap or touch.
///
/// Used for activity spans, where two activities occupying the same time are
/// still two distinct spans.
#[derive(Clone, PartialEq, Eq, Default, Debug, Deref, DerefMut)]
pub struct Spans(Vec<Interval>);

impl Spans {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorts the spans by start, then end.
    pub fn sort(&mut self) {
        self.0
            .sort_by_key(|i| (i.lower(), i.upper()));
    }

    pub fn to_windows(&self) -> Windows {
        Windows::from_intervals(self.0.iter().copied())
    }
}

impl FromIterator<Interval> for Spans {
    fn from_iter<T: IntoIterator<Item = Interval>>(iter: T) -> Self {
        let mut spans = Spans(iter.into_iter().collect());
        spans.sort();
        spans
    }
}
