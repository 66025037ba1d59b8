mod util;

use kestrel::goal::CardinalityGoal;
use kestrel::*;
use util::{HORIZON, any, model, seconds, solve, timeline};

#[test]
fn failing_activities_roll_back_their_goal() -> anyhow::Result<()> {
    let model = model();
    let plan = solve(
        Problem::new(model.clone(), *HORIZON)
            .with_goal(Goal::cardinality(
                "glitch",
                CardinalityGoal::occurrences(any(&model, "Glitch"), 1, None),
            )?)
            .with_goal(Goal::cardinality(
                "image",
                CardinalityGoal::occurrences(any(&model, "Image"), 1, None),
            )?),
    )?;

    assert_eq!(
        vec![("Image".to_string(), seconds(0.0))],
        timeline(&model, &plan)
    );
    let glitch = plan.evaluation().get("glitch").unwrap();
    assert!(!glitch.satisfied);
    assert_eq!(-1.0, glitch.score);
    assert_eq!(0, glitch.created().count());
    assert!(glitch.error.as_deref().is_some_and(|e| e.contains("sensor fault")));
    assert!(plan.evaluation().is_satisfied("image"));
    Ok(())
}
