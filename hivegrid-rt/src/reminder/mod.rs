//! Durable wall-clock reminders with ring-derived ownership.

pub mod service;
pub mod types;

pub use service::{ReminderService, ReminderServiceConfig};
pub use types::{Reminder, ReminderTick};
