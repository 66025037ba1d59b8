use crate::model::potato_sat;
use clap::Parser;
use kestrel::activity::{ActivityId, SchedulingActivityDirective};
use kestrel::expression::template::{ActivityExpression, ActivityTemplate};
use kestrel::expression::{Comparison, SpansExpression, WindowsExpression};
use kestrel::goal::{CardinalityGoal, CoexistenceGoal, RelativeRange};
use kestrel::simulation::MissionModel;
use kestrel::condition::GlobalCondition;
use kestrel::*;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

mod activities;
mod model;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Scheduler configuration, in TOML
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Length of the plan, in hours
    #[arg(long, default_value_t = 6.0)]
    hours: f64,

    /// Time between observations, in minutes
    #[arg(long, default_value_t = 30.0)]
    every: f64,
}

#[derive(Serialize)]
struct Report {
    score: f64,
    activities: Vec<Row>,
}

#[derive(Serialize)]
struct Row {
    id: ActivityId,
    activity_type: String,
    start: String,
    duration: Option<String>,
}

fn template(model: &impl MissionModel, name: &str) -> anyhow::Result<ActivityTemplate> {
    let activity_type = model.activity_types().require(name)?;
    Ok(ActivityTemplate::new(&activity_type, ActivityExpression::default())?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SchedulerConfig::load(path)?,
        None => SchedulerConfig::default(),
    };

    let model = Arc::new(potato_sat());
    let horizon = PlanningHorizon::starting_at(
        Time::from_gregorian_utc_at_midnight(2025, 1, 1),
        Duration::from_seconds(args.hours * 3600.0),
    )?;
    let initial = Plan::from_directives([SchedulingActivityDirective::new(
        ActivityId::new(0),
        "Downlink",
        Duration::from_seconds(3600.0),
    )])?;

    let observe = Goal::recurrence(
        "observe",
        template(model.as_ref(), "Observe")?,
        Duration::from_seconds(args.every * 60.0),
    )?;
    let recharge = Goal::coexistence(
        "recharge when low",
        CoexistenceGoal::new(
            template(model.as_ref(), "RechargePotato")?,
            SpansExpression::Windows(WindowsExpression::resource(
                "battery",
                Comparison::Less,
                50.0,
            )),
        )
        .starting_within(RelativeRange::from_start(Interval::between(
            Duration::ZERO,
            Duration::from_seconds(600.0),
        ))),
    )?;
    let downlink = Goal::cardinality(
        "downlinks",
        CardinalityGoal::occurrences(template(model.as_ref(), "Downlink")?, 2, Some(3)),
    )?
    .rollback_if_unsatisfied(true);

    let problem = Problem::new(model.clone(), horizon)
        .with_initial_plan(initial)
        .with_goal(observe)
        .with_goal(recharge)
        .with_goal(downlink)
        .with_condition(GlobalCondition::mutex(["Observe"], ["Downlink"]));

    let mut solver = PrioritySolver::new(problem, config, Interrupter::never())?;
    let plan = solver
        .get_next_solution()?
        .ok_or_else(|| anyhow::anyhow!("the solver produced no plan"))?;

    for (goal, evaluation) in plan.evaluation().iter() {
        info!(
            event = "goal_summary",
            goal,
            satisfied = evaluation.satisfied,
            score = evaluation.score,
            created = evaluation.created().count()
        );
    }

    let report = Report {
        score: plan.evaluation().total_score(),
        activities: plan
            .placed_activities(model.activity_types(), solver.facade().latest_results().as_deref())
            .into_iter()
            .map(|placed| Row {
                id: placed.id(),
                activity_type: placed.directive.activity_type.clone(),
                start: (horizon.start() + placed.start).to_string(),
                duration: placed.duration.map(|d| d.to_string()),
            })
            .collect(),
    };
    println!("{}", toml::to_string(&report)?);

    Ok(())
}
