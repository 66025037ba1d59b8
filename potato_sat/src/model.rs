use crate::activities::recharge_potato::RechargePotato;
use kestrel::simulation::reference::{Ops, ReferenceModel};
use kestrel::{ActivityType, Arguments, Duration, Value};

fn seconds(s: f64) -> Duration {
    Duration::from_seconds(s)
}

fn timed(args: &Arguments, ops: &mut Ops) -> Duration {
    ops.wait(
        args.get("duration")
            .and_then(Value::as_duration)
            .unwrap_or(Duration::ZERO),
    );
    ops.elapsed()
}

/// A potato in low orbit, with a camera, a heater, and a battery that is never quite big
/// enough.
pub fn potato_sat() -> ReferenceModel {
    ReferenceModel::new()
        .with_resource("battery", 100.0)
        .with_resource("mode", "idle")
        .with_activity(
            ActivityType::controllable("Observe", "duration").with_default("duration", seconds(120.0)),
            |args, _, ops| {
                ops.set("mode", "observing");
                ops.add("battery", -15.0);
                let elapsed = timed(args, ops);
                ops.set("mode", "idle");
                Ok(elapsed)
            },
        )
        .with_activity(
            ActivityType::controllable("Downlink", "duration").with_default("duration", seconds(300.0)),
            |args, _, ops| {
                ops.add("battery", -10.0);
                Ok(timed(args, ops))
            },
        )
        .with_behavior(
            ActivityType::uncontrollable("RechargePotato"),
            RechargePotato {
                capacity: 100.0,
                rate: 0.5,
            },
        )
}
