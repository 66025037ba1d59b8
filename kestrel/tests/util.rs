#![allow(dead_code)]

use kestrel::anyhow::anyhow;
use kestrel::expression::WindowsExpression;
use kestrel::expression::template::{ActivityExpression, ActivityTemplate};
use kestrel::simulation::MissionModel;
use kestrel::simulation::reference::ReferenceModel;
use kestrel::*;
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub fn seconds(s: f64) -> Duration {
    Duration::from_seconds(s)
}

pub static HORIZON: Lazy<PlanningHorizon> = Lazy::new(|| {
    PlanningHorizon::starting_at(Time::from_tai_seconds(0.0), seconds(20.0))
        .expect("twenty seconds is a valid horizon")
});

fn timed(args: &Arguments, ops: &mut kestrel::simulation::reference::Ops) -> Duration {
    ops.wait(
        args.get("duration")
            .and_then(Value::as_duration)
            .unwrap_or(Duration::ZERO),
    );
    ops.elapsed()
}

/// A small satellite with a battery.
///
/// - `Observe` (2s by default) draws 5 from the battery.
/// - `Heat` (3s by default).
/// - `Image` (1s by default).
/// - `Soak` has no default duration.
/// - `Drain` is instantaneous and draws 10.
/// - `Recharge` takes one second per missing unit of battery, then fills it.
/// - `Downlink` (1s by default) may only happen in the last five seconds.
/// - `Glitch` always fails in simulation.
/// - `Trip` sets the flag it was built with.
pub fn potato_sat(trip: Arc<AtomicBool>) -> ReferenceModel {
    ReferenceModel::new()
        .with_resource("battery", 100.0)
        .with_activity(
            ActivityType::controllable("Observe", "duration").with_default("duration", seconds(2.0)),
            |args, _, ops| {
                ops.add("battery", -5.0);
                Ok(timed(args, ops))
            },
        )
        .with_activity(
            ActivityType::controllable("Heat", "duration").with_default("duration", seconds(3.0)),
            |args, _, ops| Ok(timed(args, ops)),
        )
        .with_activity(
            ActivityType::controllable("Image", "duration").with_default("duration", seconds(1.0)),
            |args, _, ops| Ok(timed(args, ops)),
        )
        .with_activity(ActivityType::controllable("Soak", "duration"), |args, _, ops| {
            Ok(timed(args, ops))
        })
        .with_activity(ActivityType::uncontrollable("Drain"), |_, _, ops| {
            ops.add("battery", -10.0);
            Ok(Duration::ZERO)
        })
        .with_activity(ActivityType::uncontrollable("Recharge"), |_, state, ops| {
            let battery = state
                .get("battery")
                .and_then(Value::as_real)
                .ok_or_else(|| anyhow!("battery is not numeric"))?;
            ops.wait(Duration::from_seconds(100.0 - battery));
            ops.set("battery", 100.0);
            Ok(ops.elapsed())
        })
        .with_activity(
            ActivityType::controllable("Downlink", "duration")
                .with_default("duration", seconds(1.0))
                .with_constraint(WindowsExpression::interval(Interval::closed_open(
                    seconds(15.0),
                    seconds(20.0),
                ))),
            |args, _, ops| Ok(timed(args, ops)),
        )
        .with_activity(
            ActivityType::controllable("Glitch", "duration").with_default("duration", seconds(1.0)),
            |_, _, _| Err(anyhow!("sensor fault")),
        )
        .with_activity(ActivityType::uncontrollable("Trip"), move |_, _, _| {
            trip.store(true, Ordering::SeqCst);
            Ok(Duration::ZERO)
        })
}

pub fn model() -> Arc<ReferenceModel> {
    Arc::new(potato_sat(Arc::new(AtomicBool::new(false))))
}

pub fn template(model: &ReferenceModel, name: &str, expression: ActivityExpression) -> ActivityTemplate {
    let activity_type = model
        .activity_types()
        .get(name)
        .expect("the model declares this type");
    ActivityTemplate::new(activity_type, expression).expect("template is valid")
}

pub fn any(model: &ReferenceModel, name: &str) -> ActivityTemplate {
    template(model, name, ActivityExpression::default())
}

pub fn solve(problem: Problem) -> anyhow::Result<Plan> {
    let mut solver = PrioritySolver::new(problem, SchedulerConfig::default(), Interrupter::never())?;
    solver
        .get_next_solution()?
        .ok_or_else(|| anyhow!("the first call always produces a plan"))
}

/// `(type, absolute start)` of every activity, in time order.
pub fn timeline(model: &ReferenceModel, plan: &Plan) -> Vec<(String, Duration)> {
    plan.placed_activities(model.activity_types(), None)
        .into_iter()
        .map(|p| (p.directive.activity_type.clone(), p.start))
        .collect()
}
