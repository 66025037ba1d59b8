mod util;

use kestrel::activity::{ActivityId, SchedulingActivityDirective};
use kestrel::condition::GlobalCondition;
use kestrel::expression::WindowsExpression;
use kestrel::goal::CardinalityGoal;
use kestrel::*;
use util::{HORIZON, any, model, seconds, solve, timeline};

fn one(model: &kestrel::simulation::reference::ReferenceModel, name: &str) -> anyhow::Result<Goal> {
    Ok(Goal::cardinality(
        format!("one {name}"),
        CardinalityGoal::occurrences(any(model, name), 1, Some(1)),
    )?)
}

#[test]
fn mutex_keeps_images_out_of_heats() -> anyhow::Result<()> {
    let model = model();
    let initial = Plan::from_directives([SchedulingActivityDirective::new(
        ActivityId::new(0),
        "Heat",
        seconds(4.0),
    )])?;
    let goal = one(&model, "Image")?.for_all_time_in(WindowsExpression::interval(
        Interval::closed_open(seconds(4.0), seconds(10.0)),
    ));
    let plan = solve(
        Problem::new(model.clone(), *HORIZON)
            .with_initial_plan(initial)
            .with_goal(goal)
            .with_condition(GlobalCondition::mutex(["Heat"], ["Image"])),
    )?;
    assert_eq!(
        vec![
            ("Heat".to_string(), seconds(4.0)),
            ("Image".to_string(), seconds(7.0)),
        ],
        timeline(&model, &plan)
    );
    Ok(())
}

#[test]
fn only_when_restricts_placement() -> anyhow::Result<()> {
    let model = model();
    let plan = solve(
        Problem::new(model.clone(), *HORIZON)
            .with_goal(one(&model, "Image")?)
            .with_condition(GlobalCondition::only_when(
                ["Image"],
                WindowsExpression::interval(Interval::closed_open(seconds(12.0), seconds(15.0))),
            )),
    )?;
    assert_eq!(
        vec![("Image".to_string(), seconds(12.0))],
        timeline(&model, &plan)
    );
    Ok(())
}

#[test]
fn only_when_with_no_room_leaves_the_goal_unsatisfied() -> anyhow::Result<()> {
    let model = model();
    let plan = solve(
        Problem::new(model.clone(), *HORIZON)
            .with_goal(one(&model, "Heat")?)
            .with_condition(GlobalCondition::only_when(
                ["Heat"],
                WindowsExpression::interval(Interval::closed_open(seconds(12.0), seconds(14.0))),
            )),
    )?;
    assert!(plan.is_empty());
    assert!(!plan.evaluation().is_satisfied("one Heat"));
    Ok(())
}

#[test]
fn type_constraints_restrict_placement() -> anyhow::Result<()> {
    let model = model();
    let plan = solve(Problem::new(model.clone(), *HORIZON).with_goal(one(&model, "Downlink")?))?;
    assert_eq!(
        vec![("Downlink".to_string(), seconds(15.0))],
        timeline(&model, &plan)
    );
    Ok(())
}

#[test]
fn unknown_types_in_conditions_are_rejected() {
    let model = model();
    let problem = Problem::new(model, *HORIZON)
        .with_condition(GlobalCondition::mutex(["Heat"], ["Teleport"]));
    assert!(matches!(
        PrioritySolver::new(problem, SchedulerConfig::default(), Interrupter::never()),
        Err(SchedulingError::UnknownActivityType { .. })
    ));
}
