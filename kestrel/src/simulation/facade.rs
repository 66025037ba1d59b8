//! Simulation policy: what to simulate, and which engine checkpoints to keep.
//!
//! Scheduling edits the plan in small steps, and most edits only touch the future of the
//! timeline. The facade keeps a bounded cache of engine checkpoints, each tagged with the
//! fingerprinted set of activities it has absorbed. A later simulation of a plan that
//! contains that set, and only adds activities at or after the checkpoint's time, resumes
//! from the checkpoint instead of from zero.

use crate::Duration;
use crate::activity::{ActivityId, SchedulingActivityDirective};
use crate::config::SimulationConfig;
use crate::error::{SchedulingError, SimulationError};
use crate::interrupt::Interrupter;
use crate::plan::Plan;
use crate::simulation::{MissionModel, SimulationEngine, SimulationResults};
use crate::time::{PlanningHorizon, resolution};
use ahash::AHasher;
use anyhow::anyhow;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The start time and a content hash of one scheduled activity.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
struct Fingerprint {
    start: Duration,
    hash: u64,
}

impl Fingerprint {
    fn of(directive: &SchedulingActivityDirective, start: Duration) -> Self {
        let mut hasher = AHasher::default();
        directive.activity_type.hash(&mut hasher);
        directive.arguments.hash(&mut hasher);
        start.total_nanoseconds().hash(&mut hasher);
        directive
            .duration
            .map(|d| d.total_nanoseconds())
            .hash(&mut hasher);
        Self {
            start,
            hash: hasher.finish(),
        }
    }
}

type ActivitySet = BTreeMap<ActivityId, Fingerprint>;

struct Checkpoint {
    engine: Box<dyn SimulationEngine>,
    activities: ActivitySet,
    last_used: u64,
}

impl Checkpoint {
    /// Whether simulating `target` can resume from this checkpoint.
    fn reusable_for(&self, target: &ActivitySet) -> bool {
        let now = self.engine.now();
        self.activities
            .iter()
            .all(|(id, fingerprint)| target.get(id) == Some(fingerprint))
            && target
                .iter()
                .filter(|(id, _)| !self.activities.contains_key(id))
                .all(|(_, fingerprint)| fingerprint.start >= now)
    }
}

/// A directive scheduled at an absolute start.
#[derive(Clone, Debug)]
struct Scheduled {
    directive: SchedulingActivityDirective,
    start: Duration,
}

pub struct SimulationFacade {
    model: Arc<dyn MissionModel>,
    horizon: PlanningHorizon,
    config: SimulationConfig,
    interrupter: Interrupter,

    cache: Vec<Checkpoint>,
    clock: u64,
    restarts: usize,
    simulations: usize,

    current: BTreeMap<ActivityId, Scheduled>,
    latest: Option<(ActivitySet, Arc<SimulationResults>)>,
}

impl SimulationFacade {
    pub fn new(
        model: Arc<dyn MissionModel>,
        horizon: PlanningHorizon,
        config: SimulationConfig,
        interrupter: Interrupter,
    ) -> Self {
        Self {
            model,
            horizon,
            config,
            interrupter,
            cache: vec![],
            clock: 0,
            restarts: 0,
            simulations: 0,
            current: BTreeMap::new(),
            latest: None,
        }
    }

    /// Seeds the facade with results already computed for `plan`, so that simulating
    /// the same plan again costs nothing.
    pub fn with_initial_results(mut self, plan: &Plan, results: SimulationResults) -> Self {
        self.load_plan(plan, Some(&results));
        let key = self.current_set();
        self.latest = Some((key, Arc::new(results)));
        self
    }

    pub fn horizon(&self) -> &PlanningHorizon {
        &self.horizon
    }

    pub fn model(&self) -> &Arc<dyn MissionModel> {
        &self.model
    }

    /// How many engines were started from time zero.
    pub fn count_restarts(&self) -> usize {
        self.restarts
    }

    /// How many simulation runs were performed, from scratch or from a checkpoint.
    pub fn count_simulations(&self) -> usize {
        self.simulations
    }

    pub fn latest_results(&self) -> Option<Arc<SimulationResults>> {
        self.latest.as_ref().map(|(_, results)| results.clone())
    }

    /// Replaces the facade's activities with the plan's and simulates through `until`.
    pub fn simulate(
        &mut self,
        plan: &Plan,
        until: Duration,
    ) -> Result<Arc<SimulationResults>, SchedulingError> {
        let previous = self.latest_results();
        self.load_plan(plan, previous.as_deref());
        self.compute_results_until(until)
    }

    /// Simulates the plan through the end of the horizon.
    pub fn simulate_horizon(&mut self, plan: &Plan) -> Result<Arc<SimulationResults>, SchedulingError> {
        self.simulate(plan, self.horizon.duration())
    }

    fn load_plan(&mut self, plan: &Plan, results: Option<&SimulationResults>) {
        self.current = plan
            .placed_activities(self.model.activity_types(), results)
            .into_iter()
            .map(|placed| {
                (
                    placed.id(),
                    Scheduled {
                        directive: placed.directive.clone(),
                        start: placed.start,
                    },
                )
            })
            .collect();
    }

    /// Adds activities at absolute starts to the set the facade simulates.
    pub fn insert_activities(
        &mut self,
        activities: impl IntoIterator<Item = (SchedulingActivityDirective, Duration)>,
    ) {
        for (directive, start) in activities {
            self.current
                .insert(directive.id, Scheduled { directive, start });
        }
    }

    pub fn remove_activities<'a>(&mut self, ids: impl IntoIterator<Item = &'a ActivityId>) {
        for id in ids {
            self.current.remove(id);
        }
    }

    /// Simulates the facade's current activities through `until`.
    pub fn compute_results_until(
        &mut self,
        until: Duration,
    ) -> Result<Arc<SimulationResults>, SchedulingError> {
        let key = self.current_set();
        if let Some((latest_key, results)) = &self.latest {
            if *latest_key == key && results.until >= until {
                return Ok(results.clone());
            }
        }
        let scheduled: Vec<Scheduled> = self.current.values().cloned().collect();
        let engine = self.run(&scheduled, until, None)?;
        let results = Arc::new(engine.results());
        self.latest = Some((key, results.clone()));
        Ok(results)
    }

    /// The simulated duration `candidate` would have if it were added to `plan` at `start`.
    ///
    /// The plan itself is checkpointed as usual; states that include the candidate are not.
    pub fn activity_duration(
        &mut self,
        plan: &Plan,
        candidate: &SchedulingActivityDirective,
        start: Duration,
    ) -> Result<Option<Duration>, SchedulingError> {
        let previous = self.latest_results();
        let mut scheduled: Vec<Scheduled> = plan
            .placed_activities(self.model.activity_types(), previous.as_deref())
            .into_iter()
            .filter(|placed| placed.id() != candidate.id)
            .map(|placed| Scheduled {
                directive: placed.directive.clone(),
                start: placed.start,
            })
            .collect();
        scheduled.push(Scheduled {
            directive: candidate.clone(),
            start,
        });
        let engine = self.run(&scheduled, start + resolution(), Some(candidate.id))?;
        Ok(engine.activity_duration(candidate.id))
    }

    fn current_set(&self) -> ActivitySet {
        self.current
            .values()
            .map(|s| (s.directive.id, Fingerprint::of(&s.directive, s.start)))
            .collect()
    }

    /// Runs one simulation of `scheduled` through `until`, resuming from the best checkpoint.
    ///
    /// Checkpoints are taken before each newly scheduled activity, and at the end, except
    /// for states that contain `transient`.
    fn run(
        &mut self,
        scheduled: &[Scheduled],
        until: Duration,
        transient: Option<ActivityId>,
    ) -> Result<Box<dyn SimulationEngine>, SchedulingError> {
        self.simulations += 1;
        let target: ActivitySet = scheduled
            .iter()
            .map(|s| (s.directive.id, Fingerprint::of(&s.directive, s.start)))
            .collect();

        let (mut engine, mut absorbed) = self.resume(&target)?;

        let mut pending: Vec<&Scheduled> = scheduled
            .iter()
            .filter(|s| s.start <= until && !absorbed.contains_key(&s.directive.id))
            .collect();
        pending.sort_by_key(|s| (s.start, s.directive.id));

        let mut transient_absorbed = false;
        for next in pending {
            if next.start > engine.now() {
                engine = self.step(engine, next.start)?;
                if !transient_absorbed {
                    self.checkpoint(engine.as_ref(), &absorbed);
                }
            }
            engine.schedule(&next.directive, next.start)?;
            absorbed.insert(
                next.directive.id,
                Fingerprint::of(&next.directive, next.start),
            );
            transient_absorbed |= Some(next.directive.id) == transient;
        }

        engine = self.step(engine, until)?;
        if !transient_absorbed {
            self.checkpoint(engine.as_ref(), &absorbed);
        }
        Ok(engine)
    }

    /// The most advanced reusable checkpoint, or a fresh engine.
    fn resume(
        &mut self,
        target: &ActivitySet,
    ) -> Result<(Box<dyn SimulationEngine>, ActivitySet), SchedulingError> {
        self.clock += 1;
        let best = self
            .cache
            .iter_mut()
            .filter(|c| c.reusable_for(target))
            .max_by_key(|c| c.engine.now());
        match best {
            Some(checkpoint) => {
                checkpoint.last_used = self.clock;
                tracing::debug!(
                    event = "checkpoint_reuse",
                    at = %checkpoint.engine.now(),
                    activities = checkpoint.activities.len()
                );
                Ok((checkpoint.engine.duplicate(), checkpoint.activities.clone()))
            }
            None => {
                self.restarts += 1;
                tracing::debug!(event = "simulation_restart", restarts = self.restarts);
                Ok((self.model.new_engine()?, ActivitySet::new()))
            }
        }
    }

    fn checkpoint(&mut self, engine: &dyn SimulationEngine, activities: &ActivitySet) {
        self.clock += 1;
        let now = engine.now();
        if let Some(existing) = self
            .cache
            .iter_mut()
            .find(|c| c.engine.now() == now && c.activities == *activities)
        {
            existing.last_used = self.clock;
            return;
        }
        self.cache.push(Checkpoint {
            engine: engine.duplicate(),
            activities: activities.clone(),
            last_used: self.clock,
        });
        while self.cache.len() > self.config.max_cached_engines {
            let Some(oldest) = self
                .cache
                .iter()
                .enumerate()
                .min_by_key(|(_, c)| c.last_used)
                .map(|(i, _)| i)
            else {
                break;
            };
            self.cache.swap_remove(oldest);
        }
    }

    /// Steps the engine to `until`, on a rayon worker if configured.
    fn step(
        &self,
        mut engine: Box<dyn SimulationEngine>,
        until: Duration,
    ) -> Result<Box<dyn SimulationEngine>, SchedulingError> {
        self.interrupter.check()?;
        if !self.config.offload_to_worker {
            engine.step_until(until)?;
            return Ok(engine);
        }
        let (sender, receiver) = oneshot::channel();
        rayon::spawn(move || {
            let result = engine.step_until(until);
            let _ = sender.send((engine, result));
        });
        let (engine, result) = receiver.recv().map_err(|_| {
            SimulationError::new(until, anyhow!("simulation worker stopped without a result"))
        })?;
        result?;
        Ok(engine)
    }
}
