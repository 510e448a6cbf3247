//! Per-activation message queuing with overflow policies and dead letters.

pub mod dead_letter;
pub mod metrics;
pub mod queue;
pub mod traits;

pub use dead_letter::{DeadLetter, DeadLetterQueue};
pub use metrics::MailboxMetrics;
pub use queue::{bounded, mailbox, MailboxReceiver, MailboxSender, QueueReceiver, QueueSender};
pub use traits::{MailboxError, OverflowPolicy, PostError, PostOutcome};
