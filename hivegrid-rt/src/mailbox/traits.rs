// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// What a full mailbox does with the next post.
///
/// # Policy Selection
///
/// - **Block**: callers that must not lose requests and can wait
/// - **DropOldest**: freshest-wins feeds (telemetry, position updates)
/// - **DropNewest**: oldest-wins feeds (audit trails)
/// - **Error**: request/response paths where the caller handles rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OverflowPolicy {
    /// Suspend the poster until space is available.
    Block,
    /// Evict the oldest queued envelope to admit the new one.
    DropOldest,
    /// Discard the incoming envelope.
    DropNewest,
    /// Reject the post immediately.
    #[default]
    Error,
}

/// Result of a successful post.
#[derive(Debug)]
pub enum PostOutcome<T> {
    /// The item was queued.
    Accepted,
    /// The item was queued after evicting the returned oldest item
    /// (DropOldest), or the incoming item itself was discarded and is
    /// returned (DropNewest). The caller decides how to answer the victim.
    Dropped(T),
}

impl<T> PostOutcome<T> {
    /// Whether a policy discarded something while handling the post.
    pub fn dropped(&self) -> bool {
        matches!(self, Self::Dropped(_))
    }
}

/// Mailbox errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    /// The queue is full and the policy rejects new posts.
    #[error("Mailbox is full (capacity: {capacity})")]
    Full {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// The mailbox is shut down.
    #[error("Mailbox is closed")]
    Closed,
}

/// Failed post, handing the item back to the caller (mirrors the mpsc
/// `TrySendError` shape so rejected envelopes and their reply channels are
/// never silently dropped).
#[derive(Debug)]
pub enum PostError<T> {
    /// The queue is full and the policy rejects new posts.
    Full {
        /// The rejected item.
        item: T,
        /// Configured queue capacity.
        capacity: usize,
    },
    /// The mailbox is shut down.
    Closed(T),
}

impl<T> PostError<T> {
    /// Recover the rejected item.
    pub fn into_item(self) -> T {
        match self {
            Self::Full { item, .. } => item,
            Self::Closed(item) => item,
        }
    }

    /// The equivalent itemless error for display.
    pub fn as_mailbox_error(&self) -> MailboxError {
        match self {
            Self::Full { capacity, .. } => MailboxError::Full {
                capacity: *capacity,
            },
            Self::Closed(_) => MailboxError::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_error() {
        assert_eq!(OverflowPolicy::default(), OverflowPolicy::Error);
    }

    #[test]
    fn test_error_display() {
        let err = MailboxError::Full { capacity: 16 };
        assert!(err.to_string().contains("16"));
        assert_eq!(MailboxError::Closed.to_string(), "Mailbox is closed");
    }
}
