// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::traits::{Telemetry, TelemetryEvent};

/// Telemetry sink that discards everything.
///
/// Use when no exporter is wired; recording compiles down to a no-op, so the
/// instrumentation points cost nothing on the invocation hot path.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn record(&self, _event: TelemetryEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::names;
    use crate::util::ActorKey;

    #[test]
    fn test_noop_accepts_events() {
        let telemetry = NoopTelemetry;
        telemetry.record(TelemetryEvent::now(names::REMINDER_TICK));
        telemetry.record(TelemetryEvent::actor(
            names::ACTOR_INVOKE,
            ActorKey::new("Counter", "k"),
        ));
    }

    #[test]
    fn test_noop_is_copy() {
        let telemetry = NoopTelemetry;
        let copied = telemetry;
        copied.record(TelemetryEvent::now(names::STATE_LOAD));
        telemetry.record(TelemetryEvent::now(names::STATE_SAVE));
    }
}
