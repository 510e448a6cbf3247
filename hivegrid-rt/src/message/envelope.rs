// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

// Layer 3: Internal module imports
use super::chain::CallChain;
use crate::error::InvokeError;
use crate::stream::StreamSubject;
use crate::util::{ActorKey, CorrelationId, MessageId};

/// Reply channel carried by request envelopes.
pub type ReplySender = oneshot::Sender<Result<Bytes, InvokeError>>;

/// What the dispatcher should do with an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Invoke a registered method by name.
    Call {
        /// Method name looked up in the actor type's method table.
        method: String,
    },
    /// Deliver a reminder tick to the actor's reminder handler.
    Reminder {
        /// Reminder name, unique per actor.
        name: String,
        /// When the reminder last fired, if ever.
        last_fired: Option<DateTime<Utc>>,
        /// The tick instant that triggered this delivery.
        fired_at: DateTime<Utc>,
    },
    /// Deliver a stream event to the actor's stream handler.
    Stream {
        /// The subject the event was published on.
        subject: StreamSubject,
    },
}

impl Operation {
    /// Short operation name for logs and dead letters.
    pub fn name(&self) -> String {
        match self {
            Self::Call { method } => method.clone(),
            Self::Reminder { name, .. } => format!("reminder:{name}"),
            Self::Stream { subject } => format!("stream:{subject}"),
        }
    }
}

/// One message bound for an activation's mailbox.
///
/// Envelopes are delivered to the dispatcher in enqueue order. The reply
/// channel, when present, receives exactly one result; a dropped receiver is
/// treated as a cancelled caller and the send result is ignored.
pub struct Envelope {
    /// Unique id of this message.
    pub message_id: MessageId,
    /// Correlates the response to the originating request.
    pub correlation_id: CorrelationId,
    /// Originating actor, or `None` for external callers.
    pub sender: Option<ActorKey>,
    /// The target actor.
    pub recipient: ActorKey,
    /// What to invoke.
    pub operation: Operation,
    /// Opaque argument payload.
    pub payload: Bytes,
    /// Reply channel; `None` for one-way deliveries.
    pub reply: Option<ReplySender>,
    /// Absolute deadline after which the caller no longer waits.
    pub deadline: Option<DateTime<Utc>>,
    /// Opaque trace-context bytes propagated end to end.
    pub trace: Bytes,
    /// Delivery attempt count, starting at 1.
    pub attempt: u32,
    /// Actor keys already on the logical call stack.
    pub chain: CallChain,
    /// When the envelope was created.
    pub enqueued_at: DateTime<Utc>,
}

impl Envelope {
    /// Create a request envelope for a method call.
    pub fn call(recipient: ActorKey, method: impl Into<String>, payload: Bytes) -> Self {
        Self {
            message_id: MessageId::new(),
            correlation_id: CorrelationId::new(),
            sender: None,
            recipient,
            operation: Operation::Call {
                method: method.into(),
            },
            payload,
            reply: None,
            deadline: None,
            trace: Bytes::new(),
            attempt: 1,
            chain: CallChain::new(),
            enqueued_at: Utc::now(),
        }
    }

    /// Create a one-way reminder-tick envelope.
    pub fn reminder(
        recipient: ActorKey,
        name: impl Into<String>,
        last_fired: Option<DateTime<Utc>>,
        fired_at: DateTime<Utc>,
    ) -> Self {
        Self {
            operation: Operation::Reminder {
                name: name.into(),
                last_fired,
                fired_at,
            },
            ..Self::call(recipient, "", Bytes::new())
        }
    }

    /// Create a one-way stream-event envelope.
    pub fn stream(recipient: ActorKey, subject: StreamSubject, payload: Bytes) -> Self {
        Self {
            operation: Operation::Stream { subject },
            ..Self::call(recipient, "", payload)
        }
    }

    /// Builder method: set the sending actor.
    pub fn with_sender(mut self, sender: ActorKey) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Builder method: set the reply channel.
    pub fn with_reply(mut self, reply: ReplySender) -> Self {
        self.reply = Some(reply);
        self
    }

    /// Builder method: set the absolute deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Builder method: set the correlation id.
    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = id;
        self
    }

    /// Builder method: set the call chain.
    pub fn with_chain(mut self, chain: CallChain) -> Self {
        self.chain = chain;
        self
    }

    /// Builder method: set trace-context bytes.
    pub fn with_trace(mut self, trace: Bytes) -> Self {
        self.trace = trace;
        self
    }

    /// Whether the caller's deadline has already passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| d < now)
    }

    /// Send the result to the caller, if anyone is still waiting.
    pub fn respond(&mut self, result: Result<Bytes, InvokeError>) {
        if let Some(reply) = self.reply.take() {
            // A dropped receiver means the caller gave up; nothing to do.
            let _ = reply.send(result);
        }
    }

    /// Immutable summary for dead letters and diagnostics.
    pub fn record(&self) -> EnvelopeRecord {
        EnvelopeRecord {
            message_id: self.message_id,
            correlation_id: self.correlation_id,
            sender: self.sender.clone(),
            recipient: self.recipient.clone(),
            operation: self.operation.name(),
            payload: self.payload.clone(),
            attempt: self.attempt,
            enqueued_at: self.enqueued_at,
        }
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("message_id", &self.message_id)
            .field("recipient", &self.recipient)
            .field("operation", &self.operation.name())
            .field("attempt", &self.attempt)
            .field("has_reply", &self.reply.is_some())
            .finish()
    }
}

/// Cloneable snapshot of an envelope, kept in the dead-letter queue.
#[derive(Debug, Clone)]
pub struct EnvelopeRecord {
    /// Unique id of the original message.
    pub message_id: MessageId,
    /// Correlation id of the original request.
    pub correlation_id: CorrelationId,
    /// Originating actor, if any.
    pub sender: Option<ActorKey>,
    /// The target actor.
    pub recipient: ActorKey,
    /// Operation name.
    pub operation: String,
    /// Original argument payload.
    pub payload: Bytes,
    /// Delivery attempt count at the time of failure.
    pub attempt: u32,
    /// When the original envelope was created.
    pub enqueued_at: DateTime<Utc>,
}

/// Deadline helpers shared by the transport and gateway.
pub trait DeadlineExt {
    /// Remaining time until the deadline, if any is left.
    fn remaining(&self, now: DateTime<Utc>) -> Option<std::time::Duration>;
}

impl DeadlineExt for DateTime<Utc> {
    fn remaining(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        self.signed_duration_since(now).to_std().ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;

    fn key(id: &str) -> ActorKey {
        ActorKey::new("Test", id)
    }

    #[test]
    fn test_call_envelope_defaults() {
        let env = Envelope::call(key("a"), "Ping", Bytes::new());
        assert_eq!(env.attempt, 1);
        assert!(env.sender.is_none());
        assert!(env.reply.is_none());
        assert!(env.deadline.is_none());
        assert_eq!(env.operation.name(), "Ping");
    }

    #[test]
    fn test_builder_chaining() {
        let (tx, _rx) = oneshot::channel();
        let deadline = Utc::now() + chrono::Duration::seconds(5);
        let env = Envelope::call(key("a"), "Ping", Bytes::new())
            .with_sender(key("b"))
            .with_reply(tx)
            .with_deadline(deadline);

        assert_eq!(env.sender, Some(key("b")));
        assert!(env.reply.is_some());
        assert_eq!(env.deadline, Some(deadline));
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let env = Envelope::call(key("a"), "Ping", Bytes::new())
            .with_deadline(now - chrono::Duration::seconds(1));
        assert!(env.is_expired(now));

        let fresh = Envelope::call(key("a"), "Ping", Bytes::new())
            .with_deadline(now + chrono::Duration::seconds(30));
        assert!(!fresh.is_expired(now));
    }

    #[tokio::test]
    async fn test_respond_delivers_once() {
        let (tx, rx) = oneshot::channel();
        let mut env = Envelope::call(key("a"), "Ping", Bytes::new()).with_reply(tx);

        env.respond(Ok(Bytes::from_static(b"pong")));
        // Second respond is a no-op.
        env.respond(Ok(Bytes::from_static(b"again")));

        let got = rx.await.unwrap().unwrap();
        assert_eq!(&got[..], b"pong");
    }

    #[test]
    fn test_respond_with_dropped_caller_is_silent() {
        let (tx, rx) = oneshot::channel();
        drop(rx);
        let mut env = Envelope::call(key("a"), "Ping", Bytes::new()).with_reply(tx);
        env.respond(Err(InvokeError::timeout("late")));
    }

    #[test]
    fn test_record_snapshot() {
        let env = Envelope::call(key("a"), "Get", Bytes::from_static(b"{}")).with_sender(key("b"));
        let record = env.record();
        assert_eq!(record.operation, "Get");
        assert_eq!(record.recipient, key("a"));
        assert_eq!(record.sender, Some(key("b")));
        assert_eq!(&record.payload[..], b"{}");
    }

    #[test]
    fn test_reminder_operation_name() {
        let env = Envelope::reminder(key("a"), "daily", None, Utc::now());
        assert_eq!(env.operation.name(), "reminder:daily");
    }
}
