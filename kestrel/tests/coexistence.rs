mod util;

use kestrel::activity::{ActivityId, SchedulingActivityDirective};
use kestrel::expression::template::ActivityExpression;
use kestrel::expression::{Comparison, SpansExpression, WindowsExpression};
use kestrel::goal::{CoexistenceGoal, RelativeRange};
use kestrel::*;
use util::{HORIZON, any, model, seconds, solve, timeline};

fn heats() -> anyhow::Result<Plan> {
    Ok(Plan::from_directives([
        SchedulingActivityDirective::new(ActivityId::new(0), "Heat", seconds(2.0)),
        SchedulingActivityDirective::new(ActivityId::new(1), "Heat", seconds(10.0)),
    ])?)
}

#[test]
fn images_follow_each_heat() -> anyhow::Result<()> {
    let model = model();
    let goal = Goal::coexistence(
        "image after heat",
        CoexistenceGoal::new(
            any(&model, "Image"),
            SpansExpression::Activities(ActivityExpression::of_type("Heat")),
        )
        .starting_within(RelativeRange::from_end(Interval::between(seconds(0.0), seconds(1.0))))
        .anchored(),
    )?;
    let plan = solve(
        Problem::new(model.clone(), *HORIZON)
            .with_initial_plan(heats()?)
            .with_goal(goal),
    )?;

    assert_eq!(
        vec![
            ("Heat".to_string(), seconds(2.0)),
            ("Image".to_string(), seconds(5.0)),
            ("Heat".to_string(), seconds(10.0)),
            ("Image".to_string(), seconds(13.0)),
        ],
        timeline(&model, &plan)
    );
    for (image, heat) in [(2, 0), (3, 1)] {
        let directive = plan.get(ActivityId::new(image)).unwrap();
        assert_eq!(Some(ActivityId::new(heat)), directive.anchor);
        assert!(!directive.anchored_to_start);
        assert_eq!(Duration::ZERO, directive.start_offset);
    }
    assert!(plan.evaluation().is_satisfied("image after heat"));
    Ok(())
}

#[test]
fn one_activity_serves_one_anchor() -> anyhow::Result<()> {
    let model = model();
    let initial = Plan::from_directives([
        SchedulingActivityDirective::new(ActivityId::new(0), "Heat", seconds(2.0)),
        SchedulingActivityDirective::new(ActivityId::new(1), "Heat", seconds(3.0)),
        SchedulingActivityDirective::new(ActivityId::new(2), "Image", seconds(6.0)),
    ])?;
    let goal = Goal::coexistence(
        "image near heat end",
        CoexistenceGoal::new(
            any(&model, "Image"),
            SpansExpression::Activities(ActivityExpression::of_type("Heat")),
        )
        .starting_within(RelativeRange::from_end(Interval::between(seconds(0.0), seconds(2.0)))),
    )?;
    let plan = solve(
        Problem::new(model.clone(), *HORIZON)
            .with_initial_plan(initial)
            .with_goal(goal),
    )?;

    // The existing image serves the first heat; the second heat gets a new one at its end.
    let evaluation = plan.evaluation().get("image near heat end").unwrap();
    assert_eq!(Some(&false), evaluation.activities.get(&ActivityId::new(2)));
    assert_eq!(1, evaluation.created().count());
    let created = plan.get(ActivityId::new(3)).unwrap();
    assert_eq!(seconds(6.0), created.start_offset);
    assert_eq!(None, created.anchor);
    Ok(())
}

#[test]
fn resource_windows_can_be_anchors() -> anyhow::Result<()> {
    let model = model();
    let initial = Plan::from_directives([SchedulingActivityDirective::new(
        ActivityId::new(0),
        "Observe",
        seconds(4.0),
    )])?;
    let goal = Goal::coexistence(
        "image while depleted",
        CoexistenceGoal::new(
            any(&model, "Image"),
            SpansExpression::Windows(WindowsExpression::resource(
                "battery",
                Comparison::Less,
                96.0,
            )),
        ),
    )?;
    let plan = solve(
        Problem::new(model.clone(), *HORIZON)
            .with_initial_plan(initial)
            .with_goal(goal),
    )?;
    assert_eq!(
        vec![
            ("Observe".to_string(), seconds(4.0)),
            ("Image".to_string(), seconds(4.0)),
        ],
        timeline(&model, &plan)
    );
    Ok(())
}
