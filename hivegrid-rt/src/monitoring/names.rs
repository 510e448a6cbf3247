//! Stable instrumentation-point names, kept fixed for test assertions.

/// An activation was constructed and entered the active state.
pub const ACTOR_ACTIVATE: &str = "actor.activate";
/// A method invocation was dispatched to an activation.
pub const ACTOR_INVOKE: &str = "actor.invoke";
/// An activation was drained and evicted.
pub const ACTOR_DEACTIVATE: &str = "actor.deactivate";
/// A state record was loaded.
pub const STATE_LOAD: &str = "state.load";
/// A state record was written.
pub const STATE_SAVE: &str = "state.save";
/// One reminder-service tick ran.
pub const REMINDER_TICK: &str = "reminder.tick";
/// A message was published to a stream subject.
pub const STREAM_PUBLISH: &str = "stream.publish";
/// A stream message was delivered to a consumer.
pub const STREAM_CONSUME: &str = "stream.consume";
/// A request was sent through the transport.
pub const TRANSPORT_INVOKE: &str = "transport.invoke";
