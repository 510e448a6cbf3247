//! Silo configuration with sensible defaults.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::mailbox::OverflowPolicy;
use crate::stream::DeliveryPolicy;

/// Default mailbox capacity for activations.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1000;

/// Default idle TTL before an activation is collected.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(300);

/// Default interval of the idle-collection sweep.
pub const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_secs(30);

/// Default reminder tick interval.
pub const DEFAULT_REMINDER_INTERVAL: Duration = Duration::from_secs(1);

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);

/// Default virtual-node count per silo on the placement ring.
pub const DEFAULT_VIRTUAL_NODES: usize = 150;

/// Default dead-letter queue capacity.
pub const DEFAULT_DLQ_CAPACITY: usize = 1024;

/// Default deadline applied to calls without one.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default transient-error retry budget of the gateway.
pub const DEFAULT_RETRY_BUDGET: usize = 3;

/// Default timeout for graceful silo shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Silo-wide configuration.
///
/// # Examples
///
/// ```rust
/// use hivegrid_rt::silo::SiloConfig;
/// use std::time::Duration;
///
/// let config = SiloConfig::builder()
///     .with_mailbox_capacity(500)
///     .with_idle_ttl(Duration::from_secs(60))
///     .build()
///     .unwrap();
/// assert_eq!(config.mailbox_capacity, 500);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiloConfig {
    /// Mailbox capacity for activations without a per-type override.
    pub mailbox_capacity: usize,
    /// Overflow policy for activations without a per-type override.
    pub overflow: OverflowPolicy,
    /// Idle TTL before an activation is collected.
    pub idle_ttl: Duration,
    /// Interval of the idle-collection sweep.
    pub collection_interval: Duration,
    /// Reminder tick interval.
    pub reminder_interval: Duration,
    /// Membership heartbeat interval.
    pub heartbeat_interval: Duration,
    /// Virtual nodes this silo contributes to the placement ring.
    pub virtual_nodes: usize,
    /// Dead-letter queue capacity.
    pub dlq_capacity: usize,
    /// Deadline applied to calls without one.
    pub default_call_timeout: Duration,
    /// Gateway retry budget for transient errors.
    pub retry_budget: usize,
    /// Backpressure policy for subjects without an explicit one.
    pub stream_default_policy: DeliveryPolicy,
    /// Timeout for graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for SiloConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            overflow: OverflowPolicy::Error,
            idle_ttl: DEFAULT_IDLE_TTL,
            collection_interval: DEFAULT_COLLECTION_INTERVAL,
            reminder_interval: DEFAULT_REMINDER_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            virtual_nodes: DEFAULT_VIRTUAL_NODES,
            dlq_capacity: DEFAULT_DLQ_CAPACITY,
            default_call_timeout: DEFAULT_CALL_TIMEOUT,
            retry_budget: DEFAULT_RETRY_BUDGET,
            stream_default_policy: DeliveryPolicy::Unbuffered,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl SiloConfig {
    /// Create a configuration builder.
    pub fn builder() -> SiloConfigBuilder {
        SiloConfigBuilder::default()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.mailbox_capacity == 0 {
            return Err("mailbox_capacity must be > 0".to_string());
        }
        if self.virtual_nodes == 0 {
            return Err("virtual_nodes must be > 0".to_string());
        }
        if self.dlq_capacity == 0 {
            return Err("dlq_capacity must be > 0".to_string());
        }
        if self.collection_interval.is_zero() {
            return Err("collection_interval must be > 0".to_string());
        }
        if self.reminder_interval.is_zero() {
            return Err("reminder_interval must be > 0".to_string());
        }
        if self.heartbeat_interval.is_zero() {
            return Err("heartbeat_interval must be > 0".to_string());
        }
        if self.default_call_timeout.is_zero() {
            return Err("default_call_timeout must be > 0".to_string());
        }
        Ok(())
    }
}

/// Builder for [`SiloConfig`] with a fluent API.
#[derive(Debug, Clone, Default)]
pub struct SiloConfigBuilder {
    config: SiloConfig,
}

impl SiloConfigBuilder {
    /// Set the default mailbox capacity.
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.config.mailbox_capacity = capacity;
        self
    }

    /// Set the default overflow policy.
    pub fn with_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow = policy;
        self
    }

    /// Set the idle TTL.
    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.config.idle_ttl = ttl;
        self
    }

    /// Set the collection sweep interval.
    pub fn with_collection_interval(mut self, interval: Duration) -> Self {
        self.config.collection_interval = interval;
        self
    }

    /// Set the reminder tick interval.
    pub fn with_reminder_interval(mut self, interval: Duration) -> Self {
        self.config.reminder_interval = interval;
        self
    }

    /// Set the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Set the virtual-node count.
    pub fn with_virtual_nodes(mut self, virtual_nodes: usize) -> Self {
        self.config.virtual_nodes = virtual_nodes;
        self
    }

    /// Set the dead-letter queue capacity.
    pub fn with_dlq_capacity(mut self, capacity: usize) -> Self {
        self.config.dlq_capacity = capacity;
        self
    }

    /// Set the default call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_call_timeout = timeout;
        self
    }

    /// Set the gateway retry budget.
    pub fn with_retry_budget(mut self, budget: usize) -> Self {
        self.config.retry_budget = budget;
        self
    }

    /// Set the default stream backpressure policy.
    pub fn with_stream_default_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.config.stream_default_policy = policy;
        self
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> Result<SiloConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SiloConfig::default();
        config.validate().unwrap();
        assert_eq!(config.mailbox_capacity, DEFAULT_MAILBOX_CAPACITY);
        assert_eq!(config.virtual_nodes, DEFAULT_VIRTUAL_NODES);
    }

    #[test]
    fn test_builder_overrides() {
        let config = SiloConfig::builder()
            .with_mailbox_capacity(8)
            .with_idle_ttl(Duration::from_millis(100))
            .with_retry_budget(5)
            .build()
            .unwrap();
        assert_eq!(config.mailbox_capacity, 8);
        assert_eq!(config.idle_ttl, Duration::from_millis(100));
        assert_eq!(config.retry_budget, 5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = SiloConfig::builder()
            .with_mailbox_capacity(0)
            .build()
            .unwrap_err();
        assert!(err.contains("mailbox_capacity"));

        let err = SiloConfig::builder()
            .with_virtual_nodes(0)
            .build()
            .unwrap_err();
        assert!(err.contains("virtual_nodes"));
    }
}
