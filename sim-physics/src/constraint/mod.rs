//! Constraints between pairs of bodies.
//!
//! Every constraint kind only describes its Jacobian rows and positional
//! errors for the current step; [`Constraint`] turns them into forces with the
//! Baumgarte-stabilised impulse solve in [`jacobian`], tracks breakage and
//! keeps the per-step multipliers for the relaxation loop.

use bevy::log::debug;
use serde::{Deserialize, Serialize};

use crate::body::{Body, BodyId};
use crate::nature::{ForceMoments, VelocityMoments};
use crate::precalculation::{
    FramePrecalculation, HingeData, HingeFrame, HingeId, SliderData, SliderFrame, SliderId,
};
use crate::solver::BodyFrameCache;

pub mod fixed;
pub mod hinge;
pub mod jacobian;
pub mod limits;
pub mod motor;
pub mod servo;
pub mod slider;
pub mod spring;

pub use fixed::FixedConstraint;
pub use hinge::HingeConstraint;
pub use jacobian::{Jacobian, JacobianRow};
pub use limits::{AngularLimitsConstraint, LimitSide, LimitState, LinearLimitsConstraint};
pub use motor::AngularMotorConstraint;
pub use servo::{AngularServoConstraint, ServoEfficiency, ServoOrientation};
pub use slider::SliderConstraint;
pub use spring::AngularSpringConstraint;

use jacobian::SolveParameters;

/// Index of a constraint in its [`crate::System`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstraintId(pub(crate) usize);

impl ConstraintId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Breakage is one-way: a broken constraint never becomes active again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConstraintState {
    #[default]
    Active,
    Broken,
}

/// Forces a constraint applies to its two bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintForces {
    pub body_1: ForceMoments,
    pub body_2: ForceMoments,
}

impl ConstraintForces {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Largest force and torque magnitude on either body.
    pub fn max_magnitudes(&self) -> (f64, f64) {
        (
            self.body_1.force.norm().max(self.body_2.force.norm()),
            self.body_1.torque.norm().max(self.body_2.torque.norm()),
        )
    }
}

impl std::ops::Sub for ConstraintForces {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            body_1: self.body_1 - rhs.body_1,
            body_2: self.body_2 - rhs.body_2,
        }
    }
}

/// Force and torque above which a constraint breaks.  `None` is unbreakable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakingLimits {
    pub force: Option<f64>,
    pub torque: Option<f64>,
}

impl BreakingLimits {
    pub fn exceeded_by(&self, forces: &ConstraintForces) -> bool {
        let (force, torque) = forces.max_magnitudes();
        self.force.is_some_and(|limit| force > limit)
            || self.torque.is_some_and(|limit| torque > limit)
    }
}

/// Read access to bodies and joint geometry while constraints are solved.
pub struct JointContext<'a> {
    pub(crate) bodies: &'a [Body],
    pub(crate) hinges: &'a [FramePrecalculation<HingeFrame>],
    pub(crate) sliders: &'a [FramePrecalculation<SliderFrame>],
    /// Solver state of the step, once the constraint forces are known.
    pub(crate) frames: &'a [BodyFrameCache],
}

impl<'a> JointContext<'a> {
    /// The body as it was at the start of the step.
    pub fn body(&self, id: BodyId) -> &'a Body {
        &self.bodies[id.index()]
    }

    /// End-of-step velocity with the solved constraint forces applied.
    /// Before the solve this is the start-of-step velocity.
    pub fn solved_velocity(&self, id: BodyId) -> &'a VelocityMoments {
        match self.frames.get(id.index()) {
            Some(frame) => frame.velocity_moments(),
            None => self.bodies[id.index()].velocity_moments(),
        }
    }

    pub fn hinge(&self, id: HingeId) -> &'a HingeData {
        self.hinges[id.index()].data(self.bodies)
    }

    pub fn slider(&self, id: SliderId) -> &'a SliderData {
        self.sliders[id.index()].data(self.bodies)
    }
}

/// What a constraint kind has to provide.
///
/// Implement it for joints the built-in kinds don't cover and register them
/// with [`ConstraintKind::Custom`].
pub trait JointModel: Send + Sync {
    fn name(&self) -> &str;

    fn bodies(&self) -> (BodyId, BodyId);

    /// Called once at the start of each step, before any Jacobian is built.
    fn initialize_step(&mut self, _ctx: &JointContext<'_>, _dt: f64) {}

    /// Rows and errors for this step.  Called at most once per step.
    fn jacobian(&mut self, ctx: &JointContext<'_>, dt: f64) -> Jacobian;

    /// Row measuring motion along the degree of freedom the joint leaves
    /// free, if it leaves exactly one.  Friction damps it.
    fn free_motion_row(&self, _ctx: &JointContext<'_>) -> Option<JacobianRow> {
        None
    }

    /// Called with the forces accepted at the end of the step.
    fn calculated_constraint_forces(
        &mut self,
        _ctx: &JointContext<'_>,
        _forces: &ConstraintForces,
        _dt: f64,
    ) {
    }

    /// Whether the accepted forces break the constraint.
    fn breaks_under(&self, forces: &ConstraintForces, limits: &BreakingLimits) -> bool {
        limits.exceeded_by(forces)
    }
}

/// The known constraint kinds, plus an escape hatch for custom ones.
pub enum ConstraintKind {
    Fixed(FixedConstraint),
    Hinge(HingeConstraint),
    Slider(SliderConstraint),
    AngularLimits(AngularLimitsConstraint),
    LinearLimits(LinearLimitsConstraint),
    AngularSpring(AngularSpringConstraint),
    AngularMotor(AngularMotorConstraint),
    AngularServo(AngularServoConstraint),
    Custom(Box<dyn JointModel>),
}

macro_rules! dispatch {
    ($kind:expr, $m:ident => $body:expr) => {
        match $kind {
            ConstraintKind::Fixed($m) => $body,
            ConstraintKind::Hinge($m) => $body,
            ConstraintKind::Slider($m) => $body,
            ConstraintKind::AngularLimits($m) => $body,
            ConstraintKind::LinearLimits($m) => $body,
            ConstraintKind::AngularSpring($m) => $body,
            ConstraintKind::AngularMotor($m) => $body,
            ConstraintKind::AngularServo($m) => $body,
            ConstraintKind::Custom($m) => $body,
        }
    };
}

impl ConstraintKind {
    pub fn name(&self) -> &str {
        dispatch!(self, m => m.name())
    }

    pub fn bodies(&self) -> (BodyId, BodyId) {
        dispatch!(self, m => m.bodies())
    }

    fn initialize_step(&mut self, ctx: &JointContext<'_>, dt: f64) {
        dispatch!(self, m => m.initialize_step(ctx, dt))
    }

    fn jacobian(&mut self, ctx: &JointContext<'_>, dt: f64) -> Jacobian {
        dispatch!(self, m => m.jacobian(ctx, dt))
    }

    fn free_motion_row(&self, ctx: &JointContext<'_>) -> Option<JacobianRow> {
        dispatch!(self, m => m.free_motion_row(ctx))
    }

    fn calculated_constraint_forces(
        &mut self,
        ctx: &JointContext<'_>,
        forces: &ConstraintForces,
        dt: f64,
    ) {
        dispatch!(self, m => m.calculated_constraint_forces(ctx, forces, dt))
    }

    fn breaks_under(&self, forces: &ConstraintForces, limits: &BreakingLimits) -> bool {
        dispatch!(self, m => m.breaks_under(forces, limits))
    }

    pub fn as_servo(&self) -> Option<&AngularServoConstraint> {
        match self {
            ConstraintKind::AngularServo(servo) => Some(servo),
            _ => None,
        }
    }

    pub fn as_servo_mut(&mut self) -> Option<&mut AngularServoConstraint> {
        match self {
            ConstraintKind::AngularServo(servo) => Some(servo),
            _ => None,
        }
    }

    pub fn as_motor_mut(&mut self) -> Option<&mut AngularMotorConstraint> {
        match self {
            ConstraintKind::AngularMotor(motor) => Some(motor),
            _ => None,
        }
    }

    /// Limit state of the limit kinds.
    pub fn limit_state(&self) -> Option<LimitState> {
        match self {
            ConstraintKind::AngularLimits(limits) => Some(limits.state()),
            ConstraintKind::LinearLimits(limits) => Some(limits.state()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

macro_rules! impl_from_kind {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for ConstraintKind {
                fn from(model: $ty) -> Self {
                    ConstraintKind::$variant(model)
                }
            }
        )*
    };
}

impl_from_kind!(
    Fixed(FixedConstraint),
    Hinge(HingeConstraint),
    Slider(SliderConstraint),
    AngularLimits(AngularLimitsConstraint),
    LinearLimits(LinearLimitsConstraint),
    AngularSpring(AngularSpringConstraint),
    AngularMotor(AngularMotorConstraint),
    AngularServo(AngularServoConstraint),
    Custom(Box<dyn JointModel>),
);

/// Default Baumgarte stabilisation factor.
pub const DEFAULT_BAUMGARTE_FACTOR: f64 = 0.5;

/// Multipliers and forces of the step in progress.
#[derive(Debug)]
struct StepState {
    jacobian: Option<Jacobian>,
    lambda: na::DVector<f64>,
    forces: ConstraintForces,
}

impl Default for StepState {
    fn default() -> Self {
        Self {
            jacobian: None,
            lambda: na::DVector::zeros(0),
            forces: ConstraintForces::zero(),
        }
    }
}

/// A constraint between two bodies with its tunables and solver state.
#[derive(Debug)]
pub struct Constraint {
    label: String,
    body_1: BodyId,
    body_2: BodyId,
    kind: ConstraintKind,
    enabled: bool,
    state: ConstraintState,
    breaking_limits: BreakingLimits,
    baumgarte_factor: f64,
    constraint_force_mixing_factor: f64,
    friction_factor: f64,
    step: StepState,
    /// Last computed total, from the previous iteration or the previous step.
    previous_forces: Option<ConstraintForces>,
    /// Forces accepted at the end of the last step.
    final_forces: ConstraintForces,
}

impl Constraint {
    pub fn new(kind: impl Into<ConstraintKind>) -> Self {
        let kind = kind.into();
        let (body_1, body_2) = kind.bodies();
        Self {
            label: kind.name().to_string(),
            body_1,
            body_2,
            kind,
            enabled: true,
            state: ConstraintState::Active,
            breaking_limits: BreakingLimits::default(),
            baumgarte_factor: DEFAULT_BAUMGARTE_FACTOR,
            constraint_force_mixing_factor: 0.0,
            friction_factor: 0.0,
            step: StepState::default(),
            previous_forces: None,
            final_forces: ConstraintForces::zero(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn body_1(&self) -> BodyId {
        self.body_1
    }

    pub fn body_2(&self) -> BodyId {
        self.body_2
    }

    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut ConstraintKind {
        &mut self.kind
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn state(&self) -> ConstraintState {
        self.state
    }

    pub fn broken(&self) -> bool {
        self.state == ConstraintState::Broken
    }

    /// Break the constraint for the rest of the run.
    pub fn set_broken(&mut self) {
        self.state = ConstraintState::Broken;
        self.step = StepState::default();
        self.previous_forces = None;
        self.final_forces = ConstraintForces::zero();
    }

    pub fn breaking_limits(&self) -> &BreakingLimits {
        &self.breaking_limits
    }

    /// Force (N) and torque (N·m) above which the constraint breaks.
    pub fn set_breaking_force_torque(&mut self, force: Option<f64>, torque: Option<f64>) {
        self.breaking_limits = BreakingLimits { force, torque };
    }

    pub fn baumgarte_factor(&self) -> f64 {
        self.baumgarte_factor
    }

    /// 0 corrects velocity only and lets position drift; 1 tries to remove
    /// the whole positional error in one step.
    pub fn set_baumgarte_factor(&mut self, factor: f64) {
        self.baumgarte_factor = factor;
    }

    pub fn constraint_force_mixing_factor(&self) -> f64 {
        self.constraint_force_mixing_factor
    }

    pub fn set_constraint_force_mixing_factor(&mut self, factor: f64) {
        self.constraint_force_mixing_factor = factor;
    }

    pub fn friction_factor(&self) -> f64 {
        self.friction_factor
    }

    /// Fraction of the relative velocity along the free axis of a hinge or
    /// slider removed each step, 0…1.  Other kinds ignore it.
    pub fn set_friction_factor(&mut self, factor: f64) {
        self.friction_factor = if factor.is_nan() { 0.0 } else { factor.clamp(0.0, 1.0) };
    }

    fn step_jacobian(&mut self, ctx: &JointContext<'_>, dt: f64) -> Jacobian {
        let mut jacobian = self.kind.jacobian(ctx, dt);
        if self.friction_factor > 0.0 {
            if let Some(row) = self.kind.free_motion_row(ctx) {
                let rate = row.rate_of(
                    ctx.body(self.body_1).velocity_moments(),
                    ctx.body(self.body_2).velocity_moments(),
                );
                jacobian.push(row.with_target_velocity((1.0 - self.friction_factor) * rate));
            }
        }
        jacobian
    }

    /// Forces accepted at the end of the last step.  Zero once broken.
    pub fn forces(&self) -> &ConstraintForces {
        &self.final_forces
    }

    pub(crate) fn step_forces(&self) -> ConstraintForces {
        self.step.forces
    }

    pub(crate) fn previous_forces(&self) -> Option<ConstraintForces> {
        self.previous_forces
    }

    /// Prepare for a new step.
    pub(crate) fn begin_step(&mut self, ctx: &JointContext<'_>, dt: f64, warm_starting: bool) {
        self.step = StepState::default();
        if !warm_starting {
            self.previous_forces = None;
        }
        if !self.broken() {
            self.kind.initialize_step(ctx, dt);
        }
    }

    /// Refine this constraint's forces against the current velocities and
    /// return the new total for the step.
    pub fn constraint_forces(
        &mut self,
        ctx: &JointContext<'_>,
        body_1: &BodyFrameCache,
        body_2: &BodyFrameCache,
        dt: f64,
    ) -> ConstraintForces {
        if self.broken() {
            return ConstraintForces::zero();
        }

        if self.step.jacobian.is_none() {
            let jacobian = self.step_jacobian(ctx, dt);
            self.step.lambda = na::DVector::zeros(jacobian.len());
            self.step.jacobian = Some(jacobian);
        }
        let Some(rows) = self.step.jacobian.as_ref() else {
            return ConstraintForces::zero();
        };
        if rows.is_empty() {
            self.previous_forces = Some(ConstraintForces::zero());
            return ConstraintForces::zero();
        }

        let params = SolveParameters {
            baumgarte: self.baumgarte_factor,
            cfm: self.constraint_force_mixing_factor,
            dt,
        };
        if let Some(lambda) = jacobian::solve(rows, &self.step.lambda, body_1, body_2, params) {
            self.step.forces = rows.forces(&lambda);
            self.step.lambda = lambda;
        }
        self.previous_forces = Some(self.step.forces);
        self.step.forces
    }

    /// Accept the step's forces and check for breakage.
    pub(crate) fn accept_forces(&mut self, ctx: &JointContext<'_>, dt: f64) {
        if self.broken() {
            return;
        }
        let forces = self.step.forces;
        self.final_forces = forces;
        self.kind.calculated_constraint_forces(ctx, &forces, dt);
        if self.kind.breaks_under(&forces, &self.breaking_limits) {
            let (force, torque) = forces.max_magnitudes();
            debug!(
                "constraint '{}' broke at {:.3} N, {:.3} N·m",
                self.label, force, torque
            );
            self.set_broken();
        }
    }

    /// Forget forces while disabled so a re-enabled constraint starts clean.
    pub(crate) fn clear_forces(&mut self) {
        self.step = StepState::default();
        self.previous_forces = None;
        self.final_forces = ConstraintForces::zero();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;

    impl JointModel for Nothing {
        fn name(&self) -> &str {
            "nothing"
        }

        fn bodies(&self) -> (BodyId, BodyId) {
            (BodyId(0), BodyId(1))
        }

        fn jacobian(&mut self, _: &JointContext<'_>, _: f64) -> Jacobian {
            Jacobian::empty()
        }
    }

    #[test]
    fn defaults() {
        let c = Constraint::new(ConstraintKind::Custom(Box::new(Nothing)));
        assert_eq!(c.label(), "nothing");
        assert_eq!(c.baumgarte_factor(), 0.5);
        assert_eq!(c.constraint_force_mixing_factor(), 0.0);
        assert_eq!(c.friction_factor(), 0.0);
        assert!(c.enabled());
        assert!(!c.broken());
        assert_eq!(c.body_2(), BodyId(1));
    }

    #[test]
    fn breaking_limits() {
        let limits = BreakingLimits {
            force: Some(10.0),
            torque: None,
        };
        let mut forces = ConstraintForces::zero();
        forces.body_2.force = na::Vector3::new(0.0, 9.0, 0.0);
        forces.body_2.torque = na::Vector3::new(1e6, 0.0, 0.0);
        assert!(!limits.exceeded_by(&forces));
        forces.body_1.force = na::Vector3::new(0.0, 0.0, -11.0);
        assert!(limits.exceeded_by(&forces));
        assert!(!BreakingLimits::default().exceeded_by(&forces));
    }

    #[test]
    fn broken_is_permanent() {
        let mut c = Constraint::new(ConstraintKind::Custom(Box::new(Nothing)));
        c.set_broken();
        c.set_enabled(true);
        assert_eq!(c.state(), ConstraintState::Broken);
        assert_eq!(*c.forces(), ConstraintForces::zero());
    }
}
