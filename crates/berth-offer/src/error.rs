//! Offer evaluation error types.
//!
//! Only failures that void the whole evaluation call surface as errors.
//! An offer that cannot satisfy the pod is not an error: the evaluator
//! logs the failing stages and moves on to the next offer, returning an
//! empty recommendation list when none match. Value-kind mismatches are
//! programmer errors and panic in `berth-proto`.

use thiserror::Error;

/// Result type alias for offer evaluation.
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors that abort an evaluation call.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("invalid pod requirement: {0}")]
    InvalidRequirement(String),

    #[error("state store error: {0}")]
    State(#[from] berth_state::StateError),
}
