//! Rigid bodies.

use serde::{Deserialize, Serialize};

use crate::atmosphere::Atmosphere;
use crate::nature::{AccelerationMoments, ForceMoments, MassMoments, VelocityMoments};
use crate::placement::Placement;

/// Index of a body in its [`crate::System`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub(crate) usize);

impl BodyId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Something that pushes on a body every step: thrusters, drag, springs to the
/// world and so on.
///
/// Queried once per evolution, before the constraints are solved.
pub trait ForceContributor: Send + Sync {
    fn force_moments(
        &mut self,
        body: &Body,
        atmosphere: Option<&dyn Atmosphere>,
        dt: f64,
    ) -> ForceMoments;
}

/// A rigid body.
pub struct Body {
    label: String,
    mass_moments: MassMoments,
    placement: Placement,
    velocity_moments: VelocityMoments,
    /// Total acceleration from the last step.
    acceleration_moments: AccelerationMoments,
    /// Acceleration from the last step without the gravity contribution, what
    /// an accelerometer fixed to the body would read.
    acceleration_except_gravity: AccelerationMoments,
    /// One-shot forces for the next step.
    applied_impulses: ForceMoments,
    contributors: Vec<Box<dyn ForceContributor>>,
    broken: bool,
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Body")
            .field("label", &self.label)
            .field("mass_moments", &self.mass_moments)
            .field("placement", &self.placement)
            .field("velocity_moments", &self.velocity_moments)
            .field("contributors", &self.contributors.len())
            .field("broken", &self.broken)
            .finish()
    }
}

impl Body {
    pub fn new(mass_moments: MassMoments) -> Self {
        Self {
            label: String::new(),
            mass_moments,
            placement: Placement::default(),
            velocity_moments: VelocityMoments::zero(),
            acceleration_moments: AccelerationMoments::zero(),
            acceleration_except_gravity: AccelerationMoments::zero(),
            applied_impulses: ForceMoments::zero(),
            contributors: Vec::new(),
            broken: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_velocity_moments(mut self, velocity_moments: VelocityMoments) -> Self {
        self.velocity_moments = velocity_moments;
        self
    }

    pub fn with_contributor(mut self, contributor: impl ForceContributor + 'static) -> Self {
        self.add_contributor(contributor);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn mass_moments(&self) -> &MassMoments {
        &self.mass_moments
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn placement_mut(&mut self) -> &mut Placement {
        &mut self.placement
    }

    pub fn set_placement(&mut self, placement: Placement) {
        self.placement = placement;
    }

    pub fn position(&self) -> na::Vector3<f64> {
        self.placement.position
    }

    pub fn velocity_moments(&self) -> &VelocityMoments {
        &self.velocity_moments
    }

    pub fn set_velocity_moments(&mut self, velocity_moments: VelocityMoments) {
        self.velocity_moments = velocity_moments;
    }

    pub fn acceleration_moments(&self) -> &AccelerationMoments {
        &self.acceleration_moments
    }

    pub fn acceleration_moments_except_gravity(&self) -> &AccelerationMoments {
        &self.acceleration_except_gravity
    }

    pub(crate) fn set_acceleration_moments(
        &mut self,
        total: AccelerationMoments,
        except_gravity: AccelerationMoments,
    ) {
        self.acceleration_moments = total;
        self.acceleration_except_gravity = except_gravity;
    }

    /// Apply a force for the duration of the next step only.
    ///
    /// Repeated calls accumulate.
    pub fn apply_impulse(&mut self, force_moments: ForceMoments) {
        self.applied_impulses += force_moments;
    }

    /// Apply a world-frame force at a world point for the next step only.
    pub fn apply_impulse_at(&mut self, force: na::Vector3<f64>, world_point: na::Vector3<f64>) {
        let arm = world_point - self.placement.position;
        self.apply_impulse(ForceMoments::force_at(force, arm));
    }

    pub fn applied_impulses(&self) -> &ForceMoments {
        &self.applied_impulses
    }

    pub fn reset_applied_impulses(&mut self) {
        self.applied_impulses = ForceMoments::zero();
    }

    pub(crate) fn take_applied_impulses(&mut self) -> ForceMoments {
        std::mem::take(&mut self.applied_impulses)
    }

    pub fn add_contributor(&mut self, contributor: impl ForceContributor + 'static) {
        self.contributors.push(Box::new(contributor));
    }

    /// Sum of all registered force contributors for the coming step.
    pub(crate) fn contributed_forces(
        &mut self,
        atmosphere: Option<&dyn Atmosphere>,
        dt: f64,
    ) -> ForceMoments {
        // Contributors look at the body they are attached to.
        let mut contributors = std::mem::take(&mut self.contributors);
        let total = contributors
            .iter_mut()
            .fold(ForceMoments::zero(), |acc, c| acc + c.force_moments(self, atmosphere, dt));
        self.contributors = contributors;
        total
    }

    /// Rotate about the center of mass, carrying the velocities along.
    pub fn rotate_about_center_of_mass(&mut self, rotation: &na::UnitQuaternion<f64>) {
        self.placement.rotate_body(rotation);
        self.rotate_velocities(rotation);
    }

    /// Rotate about the world origin, carrying the velocities along.
    pub fn rotate_about_world_origin(&mut self, rotation: &na::UnitQuaternion<f64>) {
        self.placement.rotate_about_world_origin(rotation);
        self.rotate_velocities(rotation);
    }

    /// Rotate about the world point `point`, carrying the velocities along.
    pub fn rotate_about(&mut self, point: &na::Vector3<f64>, rotation: &na::UnitQuaternion<f64>) {
        self.placement.translate(&-point);
        self.placement.rotate_about_world_origin(rotation);
        self.placement.translate(point);
        self.rotate_velocities(rotation);
    }

    fn rotate_velocities(&mut self, rotation: &na::UnitQuaternion<f64>) {
        let vm = &mut self.velocity_moments;
        vm.velocity = rotation.transform_vector(&vm.velocity);
        vm.angular_velocity = rotation.transform_vector(&vm.angular_velocity);
        for am in [&mut self.acceleration_moments, &mut self.acceleration_except_gravity] {
            am.acceleration = rotation.transform_vector(&am.acceleration);
            am.angular_acceleration = rotation.transform_vector(&am.angular_acceleration);
        }
    }

    pub fn translate(&mut self, by: &na::Vector3<f64>) {
        self.placement.translate(by);
    }

    pub fn move_to(&mut self, position: na::Vector3<f64>) {
        self.placement.position = position;
    }

    /// Inertia tensor about the center of mass, WORLD frame.
    pub fn world_inertia(&self) -> na::Matrix3<f64> {
        crate::attitude::world_tensor(&self.placement.q_bw, self.mass_moments.inertia())
    }

    /// Inverse inertia tensor, WORLD frame.
    pub fn world_inverse_inertia(&self) -> na::Matrix3<f64> {
        crate::attitude::world_tensor(&self.placement.q_bw, self.mass_moments.inverse_inertia())
    }

    /// ½ m v², J.
    pub fn translational_kinetic_energy(&self) -> f64 {
        0.5 * self.mass_moments.mass() * self.velocity_moments.velocity.norm_squared()
    }

    /// ½ ωᵀ I ω, J.
    pub fn rotational_kinetic_energy(&self) -> f64 {
        let omega = &self.velocity_moments.angular_velocity;
        0.5 * omega.dot(&(self.world_inertia() * omega))
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.translational_kinetic_energy() + self.rotational_kinetic_energy()
    }

    /// Broken bodies are left out of gravity, constraints and integration.
    pub fn broken(&self) -> bool {
        self.broken
    }

    pub fn set_broken(&mut self) {
        self.broken = true;
    }

    pub(crate) fn state_is_finite(&self) -> bool {
        self.placement.is_finite() && self.velocity_moments.is_finite()
    }
}
