// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Per-subject flow control applied at publish time.
///
/// # Policy Selection
///
/// - **Unbuffered**: deliver inline, never drop; publish waits for delivery
/// - **DropOldest**: freshest-wins feeds (positions, gauges)
/// - **DropNewest**: oldest-wins feeds (audit trails)
/// - **Block**: lossless with a bounded buffer; publish waits for space
/// - **Throttle**: sliding-window rate limit; excess blocks or is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DeliveryPolicy {
    /// Deliver during publish, unbuffered; never drops.
    #[default]
    Unbuffered,
    /// Bounded buffer; overflow discards the oldest pending message.
    DropOldest {
        /// Buffer capacity.
        buffer: usize,
    },
    /// Bounded buffer; overflow discards the incoming publish.
    DropNewest {
        /// Buffer capacity.
        buffer: usize,
    },
    /// Bounded buffer; publish suspends until space or deadline.
    Block {
        /// Buffer capacity.
        buffer: usize,
    },
    /// Sliding-window rate limit on publishes.
    Throttle {
        /// Publishes admitted per window.
        max_per_window: u32,
        /// Window length.
        window: Duration,
        /// Excess publishes wait (`true`) or are rejected (`false`).
        block: bool,
    },
}

impl DeliveryPolicy {
    /// Buffer capacity for the buffered variants.
    pub fn buffer(&self) -> Option<usize> {
        match self {
            Self::DropOldest { buffer } | Self::DropNewest { buffer } | Self::Block { buffer } => {
                Some((*buffer).max(1))
            }
            Self::Unbuffered | Self::Throttle { .. } => None,
        }
    }
}
