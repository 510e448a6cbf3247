//! Message plumbing: envelopes, operations, and the call chain they carry.

pub mod chain;
pub mod envelope;

pub use chain::CallChain;
pub use envelope::{DeadlineExt, Envelope, EnvelopeRecord, Operation, ReplySender};
