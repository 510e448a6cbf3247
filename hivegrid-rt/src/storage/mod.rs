//! Storage seams (state, reminders, outbox/inbox) and in-memory providers.

pub mod error;
pub mod inbox;
pub mod memory;
pub mod outbox;
pub mod traits;

pub use error::StorageError;
pub use inbox::Inbox;
pub use memory::{MemoryInboxStore, MemoryOutboxStore, MemoryReminderStore, MemoryStateStore};
pub use outbox::{Outbox, OutboxConfig, OutboxSink};
pub use traits::{
    InboxStore, OutboxMessage, OutboxStatus, OutboxStore, ReminderStore, StateRecord, StateStore,
};
