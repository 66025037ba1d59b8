mod util;

use kestrel::activity::{ActivityId, SchedulingActivityDirective};
use kestrel::expression::WindowsExpression;
use kestrel::*;
use util::{HORIZON, any, model, seconds, solve, timeline};

fn every_five_seconds(model: &simulation::reference::ReferenceModel) -> anyhow::Result<Goal> {
    Ok(
        Goal::recurrence("observe every 5s", any(model, "Observe"), seconds(5.0))?.for_all_time_in(
            WindowsExpression::interval(Interval::closed_open(seconds(1.0), seconds(20.0))),
        ),
    )
}

#[test]
fn recurrence_fills_every_slot() -> anyhow::Result<()> {
    let model = model();
    let plan = solve(Problem::new(model.clone(), *HORIZON).with_goal(every_five_seconds(&model)?))?;

    let observe = |start: f64| ("Observe".to_string(), seconds(start));
    assert_eq!(
        vec![observe(1.0), observe(6.0), observe(11.0), observe(16.0)],
        timeline(&model, &plan)
    );
    assert_eq!(4, plan.len());

    let evaluation = plan.evaluation().get("observe every 5s").unwrap();
    assert!(evaluation.satisfied);
    assert_eq!(4, evaluation.created().count());
    assert_eq!(0.0, evaluation.score);
    Ok(())
}

#[test]
fn scheduling_is_deterministic() -> anyhow::Result<()> {
    let model = model();
    let first = solve(Problem::new(model.clone(), *HORIZON).with_goal(every_five_seconds(&model)?))?;
    let second = solve(Problem::new(model.clone(), *HORIZON).with_goal(every_five_seconds(&model)?))?;
    assert!(first.same_activities(&second));
    assert_eq!(first.evaluation(), second.evaluation());
    Ok(())
}

#[test]
fn existing_activities_are_associated() -> anyhow::Result<()> {
    let model = model();
    let initial = Plan::from_directives([SchedulingActivityDirective::new(
        ActivityId::new(0),
        "Observe",
        seconds(3.0),
    )])?;
    let goal = Goal::recurrence("observe", any(&model, "Observe"), seconds(5.0))?;
    let plan = solve(
        Problem::new(model.clone(), *HORIZON)
            .with_initial_plan(initial)
            .with_goal(goal),
    )?;

    let starts: Vec<Duration> = timeline(&model, &plan).into_iter().map(|(_, t)| t).collect();
    assert_eq!(
        vec![seconds(3.0), seconds(8.0), seconds(13.0), seconds(18.0)],
        starts
    );
    let evaluation = plan.evaluation().get("observe").unwrap();
    assert_eq!(Some(&false), evaluation.activities.get(&ActivityId::new(0)));
    assert_eq!(3, evaluation.created().count());
    Ok(())
}

#[test]
fn a_slot_too_short_for_the_activity_is_unresolved() -> anyhow::Result<()> {
    let model = model();
    let goal = Goal::recurrence("observe", any(&model, "Observe"), seconds(5.0))?.for_all_time_in(
        WindowsExpression::interval(Interval::closed_open(seconds(0.0), seconds(16.0))),
    );
    let plan = solve(Problem::new(model.clone(), *HORIZON).with_goal(goal))?;

    // Slots start at 0, 5, 10 and 15; the last is one second long.
    assert_eq!(3, plan.len());
    let evaluation = plan.evaluation().get("observe").unwrap();
    assert!(!evaluation.satisfied);
    assert_eq!(1, evaluation.unresolved_conflicts);
    assert_eq!(-1.0, evaluation.score);
    Ok(())
}
