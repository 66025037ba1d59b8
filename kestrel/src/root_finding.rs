//! Secant search for self-consistent placements of uncontrollable activities.
//!
//! The function being solved is expensive (each call simulates the plan) and may be
//! discontinuous, so the finder keeps a history of every input it tried and reuses it,
//! retries discontinuous points with growing perturbations, and always terminates with
//! either a root or a [RootFindingFailure] describing why it gave up.

use crate::Duration;
use crate::config::RootFindingConfig;
use crate::time::{Interval, resolution};
use derive_more::Deref;
use smallvec::SmallVec;
use std::fmt::{Display, Formatter};

/// The outcome of evaluating the function at one point.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FunctionValue {
    Evaluated(Duration),
    /// The function has no usable value at this point. The finder will try nearby points.
    Discontinuous,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct EvaluationRecord {
    pub x: Duration,
    /// `None` if the function was discontinuous at `x`.
    pub y: Option<Duration>,
}

/// Every evaluation made during one search, in order.
#[derive(Clone, Default, Debug, Deref)]
pub struct EvaluationHistory(SmallVec<EvaluationRecord, 8>);

impl EvaluationHistory {
    fn lookup(&self, x: Duration) -> Option<Option<Duration>> {
        self.0.iter().find(|r| r.x == x).map(|r| r.y)
    }

    fn record(&mut self, x: Duration, y: Option<Duration>) {
        self.0.push(EvaluationRecord { x, y });
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FailureKind {
    /// Two iterates produced the same value; the secant has no slope to follow.
    ZeroDerivative,
    /// The secant step was not a finite number.
    InfiniteDerivative,
    /// The iterates kept pushing outside the bracket.
    Divergence,
    ExceededMaxIterations,
    /// The bracket or target range contains no instants.
    NoSolution,
    /// A point and all of its perturbations were discontinuous.
    DiscontinuityExhausted,
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::ZeroDerivative => "zero derivative",
            FailureKind::InfiniteDerivative => "infinite derivative",
            FailureKind::Divergence => "divergence",
            FailureKind::ExceededMaxIterations => "exceeded max iterations",
            FailureKind::NoSolution => "no solution",
            FailureKind::DiscontinuityExhausted => "discontinuity exhausted",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug)]
pub struct RootFindingFailure {
    pub kind: FailureKind,
    pub history: EvaluationHistory,
}

#[derive(Debug)]
pub enum RootFindingError<E> {
    /// The search gave up. Recoverable; the caller should try elsewhere.
    Failed(RootFindingFailure),
    /// The function itself returned an error, which is passed through untouched.
    Aborted(E),
}

/// A point whose value landed in the target range.
#[derive(Clone, Debug)]
pub struct Root {
    pub x: Duration,
    pub y: Duration,
    pub history: EvaluationHistory,
}

#[derive(Copy, Clone, Debug)]
pub struct RootFinder {
    max_iterations: usize,
    discontinuity_retries: usize,
    perturbation: i128,
}

impl Default for RootFinder {
    fn default() -> Self {
        Self::new(&RootFindingConfig::default())
    }
}

/// Internal control flow of one search.
enum Stop<E> {
    Found(Duration, Duration),
    Fail(FailureKind),
    Abort(E),
}

impl RootFinder {
    pub fn new(config: &RootFindingConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            discontinuity_retries: config.discontinuity_retries,
            perturbation: config.perturbation().total_nanoseconds().max(1),
        }
    }

    /// Searches `bracket` for an `x` such that `f(x)` lies in `target` (both inclusive).
    ///
    /// The secant is seeded at the start and the midpoint of the bracket, and aims at the
    /// midpoint of the target. Every iterate is rounded to the scheduler's resolution and
    /// clamped into the bracket.
    pub fn find_root<E>(
        &self,
        mut f: impl FnMut(Duration) -> Result<FunctionValue, E>,
        bracket: Interval,
        target: Interval,
    ) -> Result<Root, RootFindingError<E>> {
        let mut history = EvaluationHistory::default();
        match self.search(&mut f, bracket, target, &mut history) {
            Stop::Found(x, y) => Ok(Root { x, y, history }),
            Stop::Fail(kind) => Err(RootFindingError::Failed(RootFindingFailure { kind, history })),
            Stop::Abort(e) => Err(RootFindingError::Aborted(e)),
        }
    }

    fn search<E>(
        &self,
        f: &mut impl FnMut(Duration) -> Result<FunctionValue, E>,
        bracket: Interval,
        target: Interval,
        history: &mut EvaluationHistory,
    ) -> Stop<E> {
        let (Some((lo, hi)), Some((y_lo, y_hi))) =
            (bracket.inclusive_bounds(), target.inclusive_bounds())
        else {
            return Stop::Fail(FailureKind::NoSolution);
        };
        let (lo, hi) = (nanos(lo), nanos(hi));
        let (y_lo, y_hi) = (nanos(y_lo), nanos(y_hi));
        let goal = y_lo + (y_hi - y_lo) / 2;
        let in_target = |y: i128| y_lo <= y && y <= y_hi;

        let (mut x0, mut y0) = match self.evaluate(f, lo, lo, hi, history) {
            Ok(v) => v,
            Err(stop) => return stop,
        };
        if in_target(y0) {
            return Stop::Found(duration(x0), duration(y0));
        }
        let mid = round_to_grid(lo + (hi - lo) / 2).clamp(lo, hi);
        if mid == x0 {
            return Stop::Fail(FailureKind::NoSolution);
        }
        let (mut x1, mut y1) = match self.evaluate(f, mid, lo, hi, history) {
            Ok(v) => v,
            Err(stop) => return stop,
        };
        if in_target(y1) {
            return Stop::Found(duration(x1), duration(y1));
        }

        for _ in 0..self.max_iterations {
            let (g0, g1) = (y0 - goal, y1 - goal);
            if g1 == g0 {
                return Stop::Fail(FailureKind::ZeroDerivative);
            }
            let step = g1 as f64 * (x1 - x0) as f64 / (g1 - g0) as f64;
            if !step.is_finite() {
                return Stop::Fail(FailureKind::InfiniteDerivative);
            }
            let mut x2 = round_to_grid(x1 - step.round() as i128);
            if x2 == x1 {
                // The step is smaller than the resolution; move one unit in its direction.
                x2 = if step > 0.0 { x1 - grid() } else { x1 + grid() };
            }
            let clamped = x2.clamp(lo, hi);
            if clamped != x2 && clamped == x1 {
                return Stop::Fail(FailureKind::Divergence);
            }

            let (x, y) = match self.evaluate(f, clamped, lo, hi, history) {
                Ok(v) => v,
                Err(stop) => return stop,
            };
            if in_target(y) {
                return Stop::Found(duration(x), duration(y));
            }
            (x0, y0) = (x1, y1);
            (x1, y1) = (x, y);
        }
        Stop::Fail(FailureKind::ExceededMaxIterations)
    }

    /// Evaluates `f` at `x`, or the nearest continuous point around it.
    ///
    /// Perturbations alternate sides and double in size: `x + p`, `x - p`, `x + 2p`, ...
    /// Points outside `[lo, hi]` are skipped.
    fn evaluate<E>(
        &self,
        f: &mut impl FnMut(Duration) -> Result<FunctionValue, E>,
        x: i128,
        lo: i128,
        hi: i128,
        history: &mut EvaluationHistory,
    ) -> Result<(i128, i128), Stop<E>> {
        let mut offset = self.perturbation;
        let mut candidates = vec![x];
        for _ in 0..self.discontinuity_retries {
            candidates.push(x + offset);
            candidates.push(x - offset);
            offset *= 2;
        }

        let mut tried = 0;
        for candidate in candidates {
            if candidate < lo || candidate > hi {
                continue;
            }
            if tried > self.discontinuity_retries {
                break;
            }
            tried += 1;
            let at = duration(candidate);
            let value = match history.lookup(at) {
                Some(cached) => cached,
                None => {
                    let value = match f(at) {
                        Ok(FunctionValue::Evaluated(y)) => Some(y),
                        Ok(FunctionValue::Discontinuous) => None,
                        Err(e) => return Err(Stop::Abort(e)),
                    };
                    tracing::trace!(event = "root_finding_evaluation", x = %at, y = ?value);
                    history.record(at, value);
                    value
                }
            };
            if let Some(y) = value {
                return Ok((candidate, nanos(y)));
            }
        }
        Err(Stop::Fail(FailureKind::DiscontinuityExhausted))
    }
}

fn nanos(d: Duration) -> i128 {
    d.total_nanoseconds()
}

fn duration(nanos: i128) -> Duration {
    Duration::from_total_nanoseconds(nanos)
}

fn grid() -> i128 {
    resolution().total_nanoseconds()
}

fn round_to_grid(nanos: i128) -> i128 {
    let grid = grid();
    (nanos as f64 / grid as f64).round() as i128 * grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn s(seconds: f64) -> Duration {
        Duration::from_seconds(seconds)
    }

    fn double(x: Duration) -> Result<FunctionValue, Infallible> {
        Ok(FunctionValue::Evaluated(duration(nanos(x) * 2)))
    }

    fn zero_target() -> Interval {
        Interval::at(Duration::ZERO)
    }

    #[test]
    fn linear_function_converges() {
        let root = RootFinder::default()
            .find_root(double, Interval::between(s(-2.0), s(2.0)), zero_target())
            .unwrap();
        assert_eq!(Duration::ZERO, root.x);
        assert!(root.history.len() <= 29);
    }

    #[test]
    fn secant_step_finds_off_seed_root() {
        let root = RootFinder::default()
            .find_root(double, Interval::between(s(-2.0), s(4.0)), zero_target())
            .unwrap();
        assert_eq!(Duration::ZERO, root.x);
        assert_eq!(3, root.history.len());
    }

    #[test]
    fn target_near_the_upper_edge_converges() {
        let bracket = Interval::between(s(0.0), s(10.0));
        let root = RootFinder::default()
            .find_root(double, bracket, Interval::between(s(19.5), s(20.0)))
            .unwrap();
        assert_eq!(s(9.875), root.x);
        assert_eq!(3, root.history.len());

        // Quadratic, with the secant overshooting the bracket before landing on its edge.
        let square = |x: Duration| -> Result<FunctionValue, Infallible> {
            Ok(FunctionValue::Evaluated(s(x.to_seconds().powi(2) / 10.0)))
        };
        let config = RootFindingConfig::default();
        let root = RootFinder::new(&config)
            .find_root(square, bracket, Interval::between(s(9.0), s(10.0)))
            .unwrap();
        assert!(bracket.contains(root.x));
        assert!(Interval::between(s(9.0), s(10.0)).contains(root.y));
        assert!(root.history.len() <= config.max_iterations + 2);
    }

    #[test]
    fn discontinuity_is_skipped() {
        let f = |x: Duration| -> Result<FunctionValue, Infallible> {
            if x == s(1.0) {
                Ok(FunctionValue::Discontinuous)
            } else {
                double(x)
            }
        };
        let root = RootFinder::default()
            .find_root(f, Interval::between(s(-2.0), s(4.0)), zero_target())
            .unwrap();
        assert_eq!(Duration::ZERO, root.x);
        assert!(root.history.iter().any(|r| r.x == s(1.0) && r.y.is_none()));
    }

    #[test]
    fn constant_function_has_zero_derivative() {
        let f = |_| -> Result<FunctionValue, Infallible> { Ok(FunctionValue::Evaluated(s(50.0))) };
        let result = RootFinder::default().find_root(
            f,
            Interval::between(s(0.0), s(10.0)),
            Interval::between(s(0.0), s(1.0)),
        );
        match result {
            Err(RootFindingError::Failed(failure)) => {
                assert_eq!(FailureKind::ZeroDerivative, failure.kind);
                assert_eq!(2, failure.history.len());
            }
            other => panic!("expected a zero derivative failure, got {other:?}"),
        }
    }

    #[test]
    fn root_outside_bracket_diverges() {
        let f = |x: Duration| -> Result<FunctionValue, Infallible> {
            Ok(FunctionValue::Evaluated(x + s(100.0)))
        };
        let result = RootFinder::default().find_root(
            f,
            Interval::between(s(0.0), s(10.0)),
            Interval::between(s(0.0), s(1.0)),
        );
        assert!(matches!(
            result,
            Err(RootFindingError::Failed(RootFindingFailure {
                kind: FailureKind::Divergence,
                ..
            }))
        ));
    }

    #[test]
    fn empty_bracket_has_no_solution() {
        let bracket = Interval::new(Duration::ZERO, resolution(), false, false).unwrap();
        let result = RootFinder::default().find_root(double, bracket, zero_target());
        assert!(matches!(
            result,
            Err(RootFindingError::Failed(RootFindingFailure {
                kind: FailureKind::NoSolution,
                ..
            }))
        ));
    }

    #[test]
    fn function_errors_abort() {
        let f = |_| -> Result<FunctionValue, &'static str> { Err("simulation exploded") };
        let result = RootFinder::default().find_root(
            f,
            Interval::between(s(0.0), s(10.0)),
            zero_target(),
        );
        assert!(matches!(result, Err(RootFindingError::Aborted("simulation exploded"))));
    }

    #[test]
    fn everywhere_discontinuous_is_exhausted() {
        let f = |_| -> Result<FunctionValue, Infallible> { Ok(FunctionValue::Discontinuous) };
        let result = RootFinder::default().find_root(
            f,
            Interval::between(s(0.0), s(10.0)),
            zero_target(),
        );
        assert!(matches!(
            result,
            Err(RootFindingError::Failed(RootFindingFailure {
                kind: FailureKind::DiscontinuityExhausted,
                ..
            }))
        ));
    }
}
