// Layer 1: Standard library imports
use std::fmt::Debug;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};

// Layer 3: Internal module imports
use crate::util::ActorKey;

/// One recorded instrumentation event.
#[derive(Debug, Clone)]
pub struct TelemetryEvent {
    /// Stable instrumentation-point name (see [`crate::monitoring::names`]).
    pub name: &'static str,
    /// The actor involved, when the event concerns one.
    pub actor: Option<ActorKey>,
    /// Emission time.
    pub at: DateTime<Utc>,
}

impl TelemetryEvent {
    /// Create an event stamped now.
    pub fn now(name: &'static str) -> Self {
        Self {
            name,
            actor: None,
            at: Utc::now(),
        }
    }

    /// Create an event about one actor, stamped now.
    pub fn actor(name: &'static str, actor: ActorKey) -> Self {
        Self {
            name,
            actor: Some(actor),
            at: Utc::now(),
        }
    }
}

/// Sink for instrumentation events.
///
/// Recording must be cheap and non-blocking; it sits on the invocation hot
/// path. Exporter implementations live outside the core.
pub trait Telemetry: Send + Sync + Debug {
    /// Record one event.
    fn record(&self, event: TelemetryEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_constructors() {
        let plain = TelemetryEvent::now(crate::monitoring::names::REMINDER_TICK);
        assert!(plain.actor.is_none());

        let key = ActorKey::new("Counter", "k");
        let tagged = TelemetryEvent::actor(crate::monitoring::names::ACTOR_INVOKE, key.clone());
        assert_eq!(tagged.actor, Some(key));
    }
}
