//! Errors reported by the physics engine.

use thiserror::Error;

use crate::solver::ForceTorque;

/// Failures surfaced by the engine.
///
/// Constraint breakage and ordinary non-convergence are not errors; they are
/// reported through [`crate::Constraint::broken`] and
/// [`crate::EvolutionDetails::converged`].  This type covers invalid input and
/// the strict evolution variant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    /// Strict evolution could not reach the required precision.
    #[error(
        "relaxation did not converge after {iterations} iterations: \
         achieved {achieved}, required {required}"
    )]
    NotConverged {
        iterations: usize,
        achieved: ForceTorque,
        required: ForceTorque,
    },

    /// Mass must be positive and finite.
    #[error("invalid mass: {0} kg")]
    InvalidMass(f64),

    /// Inertia tensor must be symmetric positive-definite.
    #[error("inertia tensor is not symmetric positive-definite")]
    InvalidInertia,

    /// Timestep must be positive and finite.
    #[error("invalid time step: {0} s")]
    InvalidTimeStep(f64),

    /// Solver settings failed validation.
    #[error("invalid solver settings: {0}")]
    InvalidSettings(String),

    /// A snapshot was restored into a system of a different shape.
    #[error("snapshot mismatch: expected {expected} {what}, found {found}")]
    SnapshotMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Convenience alias used throughout the crate.
pub type PhysicsResult<T> = Result<T, PhysicsError>;
