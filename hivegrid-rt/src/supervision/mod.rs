//! Supervision directives and policies.
//!
//! An actor type may declare how failures of the activations it supervises
//! are handled. The activation manager applies the resulting directive;
//! `Escalate` walks the supervisor chain (held by [`crate::util::ActorKey`]
//! identity, never by owning handle) and terminates the activation when it
//! reaches an actor with no supervisor of its own.

// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// What the activation manager does with a failed activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Directive {
    /// Keep the activation and continue with the next envelope.
    Resume,
    /// Replace the instance (fresh construction and activation hook).
    Restart,
    /// Drain and evict the activation.
    Stop,
    /// Defer to the supervisor's supervisor.
    Escalate,
}

impl Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resume => "resume",
            Self::Restart => "restart",
            Self::Stop => "stop",
            Self::Escalate => "escalate",
        };
        write!(f, "{name}")
    }
}

/// Why an activation is being supervised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    /// Construction or the activation hook failed.
    ActivationFailed,
    /// A message handler returned an error.
    HandlerError,
    /// The deactivation hook failed during drain.
    DeactivationFailed,
}

/// Per-type mapping from failure cause to directive.
///
/// The defaults are conservative: a broken construction stops the
/// activation, a handler error resumes (the envelope is already
/// dead-lettered and answered), a failed drain stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorPolicy {
    /// Directive for [`FailureCause::ActivationFailed`].
    pub on_activation_failed: Directive,
    /// Directive for [`FailureCause::HandlerError`].
    pub on_handler_error: Directive,
    /// Directive for [`FailureCause::DeactivationFailed`].
    pub on_deactivation_failed: Directive,
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self {
            on_activation_failed: Directive::Stop,
            on_handler_error: Directive::Resume,
            on_deactivation_failed: Directive::Stop,
        }
    }
}

impl SupervisorPolicy {
    /// A policy that restarts on every failure cause.
    pub fn always_restart() -> Self {
        Self {
            on_activation_failed: Directive::Restart,
            on_handler_error: Directive::Restart,
            on_deactivation_failed: Directive::Restart,
        }
    }

    /// A policy that escalates every failure cause.
    pub fn always_escalate() -> Self {
        Self {
            on_activation_failed: Directive::Escalate,
            on_handler_error: Directive::Escalate,
            on_deactivation_failed: Directive::Escalate,
        }
    }

    /// The directive for `cause`.
    pub fn directive_for(&self, cause: FailureCause) -> Directive {
        match cause {
            FailureCause::ActivationFailed => self.on_activation_failed,
            FailureCause::HandlerError => self.on_handler_error,
            FailureCause::DeactivationFailed => self.on_deactivation_failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = SupervisorPolicy::default();
        assert_eq!(
            policy.directive_for(FailureCause::ActivationFailed),
            Directive::Stop
        );
        assert_eq!(
            policy.directive_for(FailureCause::HandlerError),
            Directive::Resume
        );
        assert_eq!(
            policy.directive_for(FailureCause::DeactivationFailed),
            Directive::Stop
        );
    }

    #[test]
    fn test_always_restart() {
        let policy = SupervisorPolicy::always_restart();
        assert_eq!(
            policy.directive_for(FailureCause::HandlerError),
            Directive::Restart
        );
    }

    #[test]
    fn test_directive_display() {
        assert_eq!(Directive::Escalate.to_string(), "escalate");
        assert_eq!(Directive::Resume.to_string(), "resume");
    }
}
