use anyhow::anyhow;
use kestrel::simulation::reference::{ActivityBehavior, Ops, ResourceState};
use kestrel::{Arguments, Duration, Value};

/// Recharges the battery at a fixed rate until it is full.
///
/// How long this takes depends on the battery level when it starts, so the scheduler
/// can only learn its duration by simulating it.
pub struct RechargePotato {
    pub capacity: f64,
    /// Units per second.
    pub rate: f64,
}

impl ActivityBehavior for RechargePotato {
    fn run(&self, _arguments: &Arguments, state: &ResourceState, ops: &mut Ops) -> anyhow::Result<Duration> {
        let battery = state
            .get("battery")
            .and_then(Value::as_real)
            .ok_or_else(|| anyhow!("battery is not numeric"))?;
        let missing = (self.capacity - battery).max(0.0);
        ops.wait(Duration::from_seconds(missing / self.rate));
        ops.set("battery", self.capacity);
        Ok(ops.elapsed())
    }
}
