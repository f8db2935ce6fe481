//! Session state machine error types.

use thiserror::Error;

/// Errors from the pure transition function.
#[derive(Debug, Error)]
pub enum TransitionError {
    /// The event is not legal in the current state.
    #[error("invalid transition from {from} via {event}")]
    InvalidTransition {
        /// Name of the current state.
        from: &'static str,
        /// Name of the offending event.
        event: &'static str,
    },
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn invalid_transition_names_both_sides() {
        let err = TransitionError::InvalidTransition {
            from: "Idle",
            event: "Retry",
        };
        assert_eq!(err.to_string(), "invalid transition from Idle via Retry");
    }
}
