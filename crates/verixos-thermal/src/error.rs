//! The closed solver error taxonomy (§7).
//!
//! thermal@: layered the way `RotaStellarError` wraps `ValidationError` — a
//! domain enum at the crate root, one `#[from]` arm for the shared
//! `verixos::ValidationError`, and the rest named after the condition that
//! actually happened rather than the layer that detected it.

use thiserror::Error;

use crate::results::History;

/// Errors produced by the thermal simulation engine.
///
/// This enum is intentionally closed (§7): callers match on it exhaustively
/// rather than treating it as an extensible error bag.
#[derive(Error, Debug, Clone)]
pub enum ThermalError {
    /// The model failed structural or physical validation before any solve
    /// was attempted (dangling references, self-loops, non-positive
    /// capacitance, malformed heat-pipe tables, etc).
    #[error("invalid model: {reason}")]
    InvalidModel {
        /// Human-readable description of the violated constraint.
        reason: String,
    },

    /// Newton's method failed to converge within the configured iteration
    /// budget at a fixed step, even after damping.
    #[error("solver diverged after {iterations} Newton iterations (||R||={residual_norm:.3e})")]
    SolverDiverged {
        /// Newton iterations attempted before giving up.
        iterations: usize,
        /// Final infinity-norm residual.
        residual_norm: f64,
    },

    /// The adaptive step-size controller drove `h` below `h_min` while still
    /// failing the local error test.
    #[error("step size underflowed below {h_min_s:.3e} s at t={time_s:.3e} s")]
    StepSizeUnderflow {
        /// Simulation time the underflow occurred at.
        time_s: f64,
        /// The configured floor the controller hit.
        h_min_s: f64,
    },

    /// A steady-state solve did not reach the residual tolerance within the
    /// configured iteration budget.
    #[error("steady-state solve did not converge after {iterations} iterations (||R||={residual_norm:.3e})")]
    SteadyStateNonConvergent {
        /// Iterations attempted.
        iterations: usize,
        /// Final infinity-norm residual.
        residual_norm: f64,
    },

    /// A temperature, flux, or Jacobian entry became non-finite mid-solve.
    #[error("numerical overflow at t={time_s:.3e} s: {detail}")]
    NumericalOverflow {
        /// Simulation time the overflow was detected at.
        time_s: f64,
        /// Which quantity overflowed and how.
        detail: String,
    },

    /// The run was cooperatively cancelled via its [`crate::concurrency::CancellationToken`].
    #[error("run cancelled at t={:.3e} s", partial.node_series.first().map(|s| s.times_s.last().copied().unwrap_or(0.0)).unwrap_or(0.0))]
    Cancelled {
        /// History accumulated up to the point of cancellation.
        partial: Box<History>,
    },

    /// The run's wall-clock deadline elapsed before it finished.
    #[error("deadline exceeded")]
    DeadlineExceeded {
        /// History accumulated up to the point the deadline elapsed.
        partial: Box<History>,
    },

    /// A solver invariant that should be impossible to violate was violated
    /// anyway — surfaced rather than silently producing a wrong answer.
    #[error("internal assertion failed: {what}")]
    InternalAssertion {
        /// Description of the violated invariant.
        what: String,
    },
}

impl From<verixos::ValidationError> for ThermalError {
    fn from(e: verixos::ValidationError) -> Self {
        ThermalError::InvalidModel {
            reason: e.to_string(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ThermalError>;
