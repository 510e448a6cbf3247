// Layer 1: Standard library imports
use std::collections::VecDeque;

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use parking_lot::Mutex;

// Layer 3: Internal module imports
use super::traits::{Telemetry, TelemetryEvent};

const DEFAULT_HISTORY: usize = 1024;

/// Telemetry sink keeping per-name counters and a bounded event history.
///
/// Intended for tests and diagnostics; counters are lock-free, the history
/// sits behind a short mutex.
#[derive(Debug)]
pub struct InMemoryTelemetry {
    counts: DashMap<&'static str, u64>,
    history: Mutex<VecDeque<TelemetryEvent>>,
    max_history: usize,
}

impl Default for InMemoryTelemetry {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

impl InMemoryTelemetry {
    /// Create a sink retaining at most `max_history` events.
    pub fn new(max_history: usize) -> Self {
        Self {
            counts: DashMap::new(),
            history: Mutex::new(VecDeque::new()),
            max_history,
        }
    }

    /// Times `name` was recorded.
    pub fn count(&self, name: &str) -> u64 {
        self.counts.get(name).map(|count| *count).unwrap_or(0)
    }

    /// Recorded events, oldest first.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.history.lock().iter().cloned().collect()
    }

    /// Clear counters and history.
    pub fn reset(&self) {
        self.counts.clear();
        self.history.lock().clear();
    }
}

impl Telemetry for InMemoryTelemetry {
    fn record(&self, event: TelemetryEvent) {
        *self.counts.entry(event.name).or_insert(0) += 1;

        let mut history = self.history.lock();
        if history.len() == self.max_history {
            history.pop_front();
        }
        history.push_back(event);
    }
}
