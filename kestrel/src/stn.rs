//! A Simple Temporal Network over activity start and end points.
//!
//! Every constraint is a bound on the difference of two time points, `b - a ∈ [lo, hi]`,
//! stored as a pair of edges in a distance matrix (`a -> b` weighted `hi`, `b -> a` weighted
//! `-lo`). Adding a constraint intersects it with whatever is already on that edge.
//! [TemporalNetwork::solve] runs Floyd-Warshall, so constraints may chain through any number
//! of activities; the network is inconsistent exactly when a negative cycle appears.
//!
//! Time points are measured relative to a fixed origin (the start of the planning horizon).

use crate::Duration;
use crate::time::Interval;
use std::fmt::{Display, Formatter};

/// A time point in the network.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TimePoint {
    /// The fixed reference time. All bounds are reported relative to it.
    Origin,
    Start(String),
    End(String),
}

impl Display for TimePoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TimePoint::Origin => write!(f, "origin"),
            TimePoint::Start(name) => write!(f, "start({name})"),
            TimePoint::End(name) => write!(f, "end({name})"),
        }
    }
}

/// The tightest bounds of one activity, after a successful solve.
///
/// All three are closed intervals. Unbounded sides are [Duration::MIN] / [Duration::MAX].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ActivityBounds {
    pub start: Interval,
    pub end: Interval,
    pub duration: Interval,
}

/// `None` is +infinity.
type Distance = Option<i128>;

const ORIGIN: usize = 0;

#[derive(Clone, Debug)]
pub struct TemporalNetwork {
    activities: Vec<String>,
    distances: Vec<Vec<Distance>>,
    /// Set when a bound was empty before it ever reached the matrix.
    trivially_inconsistent: bool,
    solved: Option<bool>,
}

impl Default for TemporalNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl TemporalNetwork {
    pub fn new() -> Self {
        Self {
            activities: vec![],
            distances: vec![vec![Some(0)]],
            trivially_inconsistent: false,
            solved: None,
        }
    }

    /// Registers an activity's start and end points, with `end - start >= 0`.
    ///
    /// Does nothing if the activity is already registered. The other `add_*` methods
    /// register their activities on first use, so calling this is optional.
    pub fn add_activity(&mut self, name: &str) {
        self.index_of(name);
    }

    fn index_of(&mut self, name: &str) -> usize {
        if let Some(i) = self.activities.iter().position(|a| a == name) {
            return i;
        }
        self.activities.push(name.to_string());
        let size = self.distances.len() + 2;
        for row in &mut self.distances {
            row.resize(size, None);
        }
        self.distances.resize_with(size, || vec![None; size]);
        let i = self.activities.len() - 1;
        let (start, end) = (Self::start_node(i), Self::end_node(i));
        self.distances[start][start] = Some(0);
        self.distances[end][end] = Some(0);
        self.tighten(start, end, Some(0), None);
        i
    }

    fn start_node(activity: usize) -> usize {
        1 + 2 * activity
    }

    fn end_node(activity: usize) -> usize {
        2 + 2 * activity
    }

    /// Constrains `t_to - t_from` to `[lo, hi]`, where `None` leaves a side unbounded.
    fn tighten(&mut self, from: usize, to: usize, lo: Option<i128>, hi: Option<i128>) {
        self.solved = None;
        if let Some(hi) = hi {
            self.distances[from][to] = Some(min_distance(self.distances[from][to], hi));
        }
        if let Some(lo) = lo {
            self.distances[to][from] = Some(min_distance(self.distances[to][from], -lo));
        }
    }

    /// Adds `t_to - t_from ∈ interval`.
    fn constrain(&mut self, from: usize, to: usize, interval: Interval) {
        match interval.inclusive_bounds() {
            Some((lo, hi)) => self.tighten(from, to, finite(lo), finite(hi)),
            None => {
                self.solved = None;
                self.trivially_inconsistent = true;
            }
        }
    }

    /// Keeps the whole activity inside an external window: the start is an instant of the
    /// window, and the end is no later than the window's end. An activity may end exactly
    /// at an exclusive window end, since it doesn't occupy its end instant.
    /// The label is only used for diagnostics.
    pub fn add_envelope(&mut self, name: &str, label: &str, window: Interval) {
        tracing::trace!(event = "stn_envelope", activity = name, label, %window);
        let i = self.index_of(name);
        match window.inclusive_bounds() {
            Some((lo, hi)) => {
                self.tighten(ORIGIN, Self::start_node(i), finite(lo), finite(hi));
                self.tighten(ORIGIN, Self::end_node(i), None, finite(window.end()));
            }
            None => {
                self.solved = None;
                self.trivially_inconsistent = true;
            }
        }
    }

    pub fn add_start_interval(&mut self, name: &str, interval: Interval) {
        let i = self.index_of(name);
        self.constrain(ORIGIN, Self::start_node(i), interval);
    }

    pub fn add_end_interval(&mut self, name: &str, interval: Interval) {
        let i = self.index_of(name);
        self.constrain(ORIGIN, Self::end_node(i), interval);
    }

    pub fn add_duration_interval(&mut self, name: &str, interval: Interval) {
        let i = self.index_of(name);
        self.constrain(Self::start_node(i), Self::end_node(i), interval);
    }

    /// Requires `after` to start at least `min_gap` after `before` ends.
    pub fn add_precedence(&mut self, before: &str, after: &str, min_gap: Duration) {
        let b = self.index_of(before);
        let a = self.index_of(after);
        self.tighten(
            Self::end_node(b),
            Self::start_node(a),
            Some(min_gap.total_nanoseconds()),
            None,
        );
    }

    /// Propagates all constraints. Returns `false` if they are inconsistent.
    pub fn solve(&mut self) -> bool {
        if let Some(result) = self.solved {
            return result;
        }
        let n = self.distances.len();
        let mut consistent = !self.trivially_inconsistent;
        if consistent {
            for k in 0..n {
                for i in 0..n {
                    let Some(ik) = self.distances[i][k] else {
                        continue;
                    };
                    for j in 0..n {
                        if let Some(kj) = self.distances[k][j] {
                            self.distances[i][j] = Some(min_distance(self.distances[i][j], ik + kj));
                        }
                    }
                }
            }
            consistent = (0..n).all(|i| self.distances[i][i].is_none_or(|d| d >= 0));
        }
        tracing::trace!(
            event = "stn_solve",
            activities = self.activities.len(),
            consistent
        );
        self.solved = Some(consistent);
        consistent
    }

    /// The tightest bounds of an activity. `None` unless the last [solve][Self::solve]
    /// succeeded and no constraint was added since.
    pub fn get_bounds(&self, name: &str) -> Option<ActivityBounds> {
        if self.solved != Some(true) {
            return None;
        }
        let i = self.activities.iter().position(|a| a == name)?;
        let (start, end) = (Self::start_node(i), Self::end_node(i));
        Some(ActivityBounds {
            start: self.difference_bounds(ORIGIN, start),
            end: self.difference_bounds(ORIGIN, end),
            duration: self.difference_bounds(start, end),
        })
    }

    /// The bounds of `t_to - t_from`.
    fn difference_bounds(&self, from: usize, to: usize) -> Interval {
        let lo = self.distances[to][from].map_or(Duration::MIN, |d| to_duration(-d));
        let hi = self.distances[from][to].map_or(Duration::MAX, to_duration);
        Interval::between(lo, hi)
    }

    pub fn activities(&self) -> impl Iterator<Item = &str> {
        self.activities.iter().map(String::as_str)
    }
}

fn min_distance(existing: Distance, candidate: i128) -> i128 {
    existing.map_or(candidate, |e| e.min(candidate))
}

/// The representable extremes stand for "unbounded".
fn finite(bound: Duration) -> Option<i128> {
    (bound != Duration::MIN && bound != Duration::MAX).then(|| bound.total_nanoseconds())
}

fn to_duration(nanoseconds: i128) -> Duration {
    Duration::from_total_nanoseconds(nanoseconds)
}
