//! Constraint-based rigid body dynamics.
//!
//! A [`System`] owns bodies, joint geometry and constraints.  An
//! [`ImpulseSolver`] advances it in fixed steps: mutual gravity, external
//! forces, Baumgarte-stabilised sequential impulses for the constraints and
//! semi-implicit Euler integration.

extern crate nalgebra as na;

pub mod atmosphere;
pub mod attitude;
pub mod body;
pub mod constraint;
pub mod control;
pub mod error;
pub mod group;
pub mod nature;
pub mod placement;
pub mod precalculation;
pub mod snapshot;
pub mod solver;
pub mod system;

pub use atmosphere::{AerodynamicDrag, Air, Atmosphere, StandardAtmosphere};
pub use body::{Body, BodyId, ForceContributor};
pub use constraint::{
    AngularLimitsConstraint, AngularMotorConstraint, AngularServoConstraint,
    AngularSpringConstraint, BreakingLimits, Constraint, ConstraintForces, ConstraintId,
    ConstraintKind, ConstraintState, FixedConstraint, HingeConstraint, Jacobian, JacobianRow,
    JointContext, JointModel, LimitSide, LimitState, LinearLimitsConstraint, ServoEfficiency,
    ServoOrientation, SliderConstraint,
};
pub use control::{PidController, PidSettings, Range};
pub use error::{PhysicsError, PhysicsResult};
pub use group::{CompositeMass, Group};
pub use nature::{AccelerationMoments, ForceMoments, MassMoments, VelocityMoments};
pub use placement::Placement;
pub use precalculation::{HingeData, HingeId, SliderData, SliderId};
pub use snapshot::{BodySnapshot, ConstraintSnapshot, SystemSnapshot};
pub use solver::{
    BodyFrameCache, EvolutionDetails, ForceTorque, ImpulseSolver, Limits, SolverSettings,
};
pub use system::System;
