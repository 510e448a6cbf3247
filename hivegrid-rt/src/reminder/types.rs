// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::util::ActorKey;

/// One durable wall-clock reminder.
///
/// Keyed by `(actor, name)`; there is exactly one reminder per key. A zero
/// period means one-shot. Ownership is not stored: the silo that currently
/// owns `actor` on the placement ring fires the reminder, so ownership moves
/// with the ring on membership changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Target actor.
    pub actor: ActorKey,
    /// Name, unique per actor.
    pub name: String,
    /// First requested fire time.
    pub due_time: DateTime<Utc>,
    /// Firing period; zero means one-shot.
    pub period: Duration,
    /// Next scheduled fire time.
    pub next_fire: DateTime<Utc>,
    /// When the reminder last fired, if ever.
    pub last_fired: Option<DateTime<Utc>>,
}

impl Reminder {
    /// Create a periodic reminder first firing at `due_time`.
    pub fn periodic(
        actor: ActorKey,
        name: impl Into<String>,
        due_time: DateTime<Utc>,
        period: Duration,
    ) -> Self {
        Self {
            actor,
            name: name.into(),
            due_time,
            period,
            next_fire: due_time,
            last_fired: None,
        }
    }

    /// Create a one-shot reminder firing at `due_time`.
    pub fn one_shot(actor: ActorKey, name: impl Into<String>, due_time: DateTime<Utc>) -> Self {
        Self::periodic(actor, name, due_time, Duration::ZERO)
    }

    /// Whether the reminder fires once and unregisters.
    pub fn is_one_shot(&self) -> bool {
        self.period.is_zero()
    }

    /// Next fire time after firing at `fired_at`, or `None` for one-shots.
    pub fn next_after(&self, fired_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_one_shot() {
            return None;
        }
        let period = chrono::Duration::from_std(self.period).ok()?;
        Some(fired_at + period)
    }
}

/// Arguments delivered to an actor's reminder handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderTick {
    /// Reminder name.
    pub name: String,
    /// When the reminder last fired before this tick, if ever.
    pub last_fired: Option<DateTime<Utc>>,
    /// The tick instant that triggered this delivery.
    pub fired_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;

    #[test]
    fn test_one_shot() {
        let reminder = Reminder::one_shot(ActorKey::new("Order", "o-1"), "once", Utc::now());
        assert!(reminder.is_one_shot());
        assert!(reminder.next_after(Utc::now()).is_none());
    }

    #[test]
    fn test_periodic_advances_from_fire_time() {
        let now = Utc::now();
        let reminder = Reminder::periodic(
            ActorKey::new("Order", "o-1"),
            "daily",
            now,
            Duration::from_secs(10),
        );

        let fired_at = now + chrono::Duration::seconds(3);
        let next = reminder.next_after(fired_at).unwrap();
        assert_eq!(next, fired_at + chrono::Duration::seconds(10));
    }
}
