//! The set of bodies, joints and constraints evolved together.

use bevy::prelude::Resource;

use crate::atmosphere::Atmosphere;
use crate::body::{Body, BodyId};
use crate::constraint::{Constraint, ConstraintId, ConstraintKind, JointContext};
use crate::error::{PhysicsError, PhysicsResult};
use crate::nature::G;
use crate::precalculation::{
    FramePrecalculation, HingeData, HingeFrame, HingeId, SliderData, SliderFrame, SliderId,
};
use crate::snapshot::{BodySnapshot, ConstraintSnapshot, SystemSnapshot};
use crate::solver::MINIMUM_DISTANCE;

/// Owns every body, constraint and frame precalculation.
///
/// All collections are add-only; ids stay valid for the lifetime of the
/// system.  Bodies are either gravitating (attract each other and everything
/// else) or non-gravitating (only attracted by gravitating bodies), which keeps
/// the gravity pass at O(n² + n·m) for a planet-plus-small-bodies setup.
#[derive(Resource, Default)]
pub struct System {
    bodies: Vec<Body>,
    gravitating: Vec<BodyId>,
    non_gravitating: Vec<BodyId>,
    constraints: Vec<Constraint>,
    hinges: Vec<FramePrecalculation<HingeFrame>>,
    sliders: Vec<FramePrecalculation<SliderFrame>>,
    atmosphere: Option<Box<dyn Atmosphere>>,
}

impl System {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_atmosphere(mut self, atmosphere: impl Atmosphere + 'static) -> Self {
        self.set_atmosphere(atmosphere);
        self
    }

    pub fn set_atmosphere(&mut self, atmosphere: impl Atmosphere + 'static) {
        self.atmosphere = Some(Box::new(atmosphere));
    }

    pub fn atmosphere(&self) -> Option<&dyn Atmosphere> {
        self.atmosphere.as_deref()
    }

    /// Add a body that is attracted by gravitating bodies only.
    pub fn add_body(&mut self, body: Body) -> BodyId {
        let id = self.push_body(body);
        self.non_gravitating.push(id);
        id
    }

    /// Add a body that attracts every other body.
    pub fn add_gravitating_body(&mut self, body: Body) -> BodyId {
        let id = self.push_body(body);
        self.gravitating.push(id);
        id
    }

    fn push_body(&mut self, body: Body) -> BodyId {
        let id = BodyId(self.bodies.len());
        self.bodies.push(body);
        id
    }

    pub fn body(&self, id: BodyId) -> &Body {
        &self.bodies[id.index()]
    }

    /// Mutable access drops cached joint geometry.
    pub fn body_mut(&mut self, id: BodyId) -> &mut Body {
        self.reset_precalculations();
        &mut self.bodies[id.index()]
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn bodies_mut(&mut self) -> &mut [Body] {
        self.reset_precalculations();
        &mut self.bodies
    }

    pub fn body_ids(&self) -> impl Iterator<Item = BodyId> {
        (0..self.bodies.len()).map(BodyId)
    }

    pub fn gravitating_bodies(&self) -> &[BodyId] {
        &self.gravitating
    }

    pub fn non_gravitating_bodies(&self) -> &[BodyId] {
        &self.non_gravitating
    }

    /// Hinge through the world point `anchor` around the world direction
    /// `axis`; the current pose is angle zero.
    pub fn add_hinge(
        &mut self,
        body_1: BodyId,
        body_2: BodyId,
        anchor: na::Vector3<f64>,
        axis: na::Vector3<f64>,
    ) -> HingeId {
        let frame = HingeFrame::new(
            (body_1, self.body(body_1)),
            (body_2, self.body(body_2)),
            anchor,
            axis,
        );
        self.hinges.push(FramePrecalculation::new(frame));
        HingeId::new(self.hinges.len() - 1)
    }

    /// Slider along the world direction `axis`; the current pose is
    /// translation zero.
    pub fn add_slider(
        &mut self,
        body_1: BodyId,
        body_2: BodyId,
        axis: na::Vector3<f64>,
    ) -> SliderId {
        let frame = SliderFrame::new((body_1, self.body(body_1)), (body_2, self.body(body_2)), axis);
        self.sliders.push(FramePrecalculation::new(frame));
        SliderId::new(self.sliders.len() - 1)
    }

    pub fn hinge(&self, id: HingeId) -> &FramePrecalculation<HingeFrame> {
        &self.hinges[id.index()]
    }

    pub fn slider(&self, id: SliderId) -> &FramePrecalculation<SliderFrame> {
        &self.sliders[id.index()]
    }

    /// Current hinge geometry.
    pub fn hinge_data(&self, id: HingeId) -> &HingeData {
        self.hinges[id.index()].data(&self.bodies)
    }

    /// Current slider geometry.
    pub fn slider_data(&self, id: SliderId) -> &SliderData {
        self.sliders[id.index()].data(&self.bodies)
    }

    /// Register a constraint.  Constraints are solved in registration order.
    pub fn add_constraint(&mut self, constraint: impl Into<ConstraintKind>) -> ConstraintId {
        self.push_constraint(Constraint::new(constraint))
    }

    /// Register a constraint with its tunables already set.
    pub fn push_constraint(&mut self, constraint: Constraint) -> ConstraintId {
        self.constraints.push(constraint);
        ConstraintId(self.constraints.len() - 1)
    }

    pub fn constraint(&self, id: ConstraintId) -> &Constraint {
        &self.constraints[id.index()]
    }

    pub fn constraint_mut(&mut self, id: ConstraintId) -> &mut Constraint {
        &mut self.constraints[id.index()]
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn constraints_mut(&mut self) -> &mut [Constraint] {
        &mut self.constraints
    }

    /// Set the Baumgarte factor of every constraint.
    pub fn set_baumgarte_factor(&mut self, factor: f64) {
        for c in &mut self.constraints {
            c.set_baumgarte_factor(factor);
        }
    }

    /// Set the force mixing factor of every constraint.
    pub fn set_constraint_force_mixing_factor(&mut self, factor: f64) {
        for c in &mut self.constraints {
            c.set_constraint_force_mixing_factor(factor);
        }
    }

    /// Set the friction factor of every constraint.  Only hinges and
    /// sliders use it.
    pub fn set_friction_factor(&mut self, factor: f64) {
        for c in &mut self.constraints {
            c.set_friction_factor(factor);
        }
    }

    /// Move every body.  Joint frames are attached to bodies and move along.
    pub fn translate(&mut self, by: &na::Vector3<f64>) {
        for body in self.bodies_mut() {
            body.translate(by);
        }
    }

    /// Rotate every body, with its velocities, about the world origin.
    pub fn rotate_about_world_origin(&mut self, rotation: &na::UnitQuaternion<f64>) {
        for body in self.bodies_mut() {
            body.rotate_about_world_origin(rotation);
        }
    }

    /// J
    pub fn translational_kinetic_energy(&self) -> f64 {
        self.bodies.iter().map(Body::translational_kinetic_energy).sum()
    }

    /// J
    pub fn rotational_kinetic_energy(&self) -> f64 {
        self.bodies.iter().map(Body::rotational_kinetic_energy).sum()
    }

    /// Total kinetic energy, J.
    pub fn kinetic_energy(&self) -> f64 {
        self.translational_kinetic_energy() + self.rotational_kinetic_energy()
    }

    /// Gravitational potential energy of the pairs the gravity pass
    /// considers, J.
    pub fn gravitational_potential_energy(&self) -> f64 {
        let pair = |a: &BodyId, b: &BodyId| {
            let (a, b) = (self.body(*a), self.body(*b));
            let distance = (b.position() - a.position()).norm().max(MINIMUM_DISTANCE);
            -G * a.mass_moments().mass() * b.mass_moments().mass() / distance
        };
        let mut energy = 0.0;
        for (i, a) in self.gravitating.iter().enumerate() {
            energy += self.gravitating[i + 1..].iter().map(|b| pair(a, b)).sum::<f64>();
            energy += self.non_gravitating.iter().map(|b| pair(a, b)).sum::<f64>();
        }
        energy
    }

    pub fn total_energy(&self) -> f64 {
        self.kinetic_energy() + self.gravitational_potential_energy()
    }

    /// Capture body states and constraint flags.
    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            bodies: self
                .bodies
                .iter()
                .map(|b| BodySnapshot {
                    placement: *b.placement(),
                    velocity_moments: *b.velocity_moments(),
                    broken: b.broken(),
                })
                .collect(),
            constraints: self
                .constraints
                .iter()
                .map(|c| ConstraintSnapshot {
                    enabled: c.enabled(),
                    broken: c.broken(),
                })
                .collect(),
        }
    }

    /// Restore a snapshot taken from a system of the same shape.
    ///
    /// Breakage is permanent: something broken now stays broken even when the
    /// snapshot predates the breakage.
    pub fn restore(&mut self, snapshot: &SystemSnapshot) -> PhysicsResult<()> {
        if snapshot.bodies.len() != self.bodies.len() {
            return Err(PhysicsError::SnapshotMismatch {
                what: "bodies",
                expected: self.bodies.len(),
                found: snapshot.bodies.len(),
            });
        }
        if snapshot.constraints.len() != self.constraints.len() {
            return Err(PhysicsError::SnapshotMismatch {
                what: "constraints",
                expected: self.constraints.len(),
                found: snapshot.constraints.len(),
            });
        }
        for (body, saved) in self.bodies.iter_mut().zip(&snapshot.bodies) {
            body.set_placement(saved.placement);
            body.set_velocity_moments(saved.velocity_moments);
            body.reset_applied_impulses();
            if saved.broken {
                body.set_broken();
            }
        }
        for (constraint, saved) in self.constraints.iter_mut().zip(&snapshot.constraints) {
            constraint.set_enabled(saved.enabled);
            constraint.clear_forces();
            if saved.broken {
                constraint.set_broken();
            }
        }
        self.reset_precalculations();
        Ok(())
    }

    pub(crate) fn reset_precalculations(&mut self) {
        self.hinges.iter_mut().for_each(FramePrecalculation::reset);
        self.sliders.iter_mut().for_each(FramePrecalculation::reset);
    }

    /// Geometry for the constraints alongside mutable access to them.
    pub(crate) fn constraint_parts(&mut self) -> (JointContext<'_>, &mut [Constraint]) {
        (
            JointContext {
                bodies: &self.bodies,
                hinges: &self.hinges,
                sliders: &self.sliders,
                frames: &[],
            },
            &mut self.constraints,
        )
    }

    pub(crate) fn bodies_and_atmosphere(&mut self) -> (&mut [Body], Option<&dyn Atmosphere>) {
        (&mut self.bodies, self.atmosphere.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{FixedConstraint, HingeConstraint};
    use crate::nature::{MassMoments, VelocityMoments};
    use crate::placement::Placement;

    fn ball(x: f64) -> Body {
        Body::new(MassMoments::sphere(1.0, 0.1).unwrap())
            .with_placement(Placement::at(na::Vector3::new(x, 0.0, 0.0)))
    }

    #[test]
    fn partitions_bodies() {
        let mut system = System::new();
        let a = system.add_gravitating_body(ball(0.0));
        let b = system.add_body(ball(1.0));
        let c = system.add_gravitating_body(ball(2.0));
        assert_eq!(system.gravitating_bodies(), &[a, c]);
        assert_eq!(system.non_gravitating_bodies(), &[b]);
        assert_eq!(system.body_ids().collect::<Vec<_>>(), vec![a, b, c]);
    }

    #[test]
    fn potential_energy_counts_each_pair_once() {
        let mut system = System::new();
        system.add_gravitating_body(ball(0.0));
        system.add_gravitating_body(ball(1.0));
        system.add_body(ball(2.0));
        system.add_body(ball(3.0));
        // Pairs: (0,1), (0,2), (0,3), (1,2), (1,3); never (2,3).
        let expected = -G * (1.0 + 0.5 + 1.0 / 3.0 + 1.0 + 0.5);
        assert!((system.gravitational_potential_energy() - expected).abs() < 1e-20);
    }

    #[test]
    fn broadcast_tunables() {
        let mut system = System::new();
        let a = system.add_body(ball(0.0));
        let b = system.add_body(ball(1.0));
        let fixed = FixedConstraint::new(&system, a, b);
        let id = system.add_constraint(fixed);
        system.set_baumgarte_factor(0.2);
        system.set_constraint_force_mixing_factor(1e-6);
        system.set_friction_factor(0.3);
        assert_eq!(system.constraint(id).baumgarte_factor(), 0.2);
        assert_eq!(system.constraint(id).constraint_force_mixing_factor(), 1e-6);
        assert_eq!(system.constraint(id).friction_factor(), 0.3);
        system.set_friction_factor(4.0);
        assert_eq!(system.constraint(id).friction_factor(), 1.0);
    }

    #[test]
    fn moving_the_system_keeps_joints_consistent() {
        let mut system = System::new();
        let a = system.add_body(ball(0.0));
        let b = system.add_body(ball(1.0).with_velocity_moments(VelocityMoments::new(
            na::Vector3::new(0.0, 2.0, 0.0),
            na::Vector3::new(0.0, 0.0, 2.0),
        )));
        let hinge = system.add_hinge(a, b, na::Vector3::new(0.5, 0.0, 0.0), na::Vector3::z());
        system.add_constraint(HingeConstraint::new(&system, hinge));
        let energy = (
            system.translational_kinetic_energy(),
            system.rotational_kinetic_energy(),
        );
        assert!((energy.0 - 2.0).abs() < 1e-12);
        assert!((system.kinetic_energy() - energy.0 - energy.1).abs() < 1e-12);

        let quarter =
            na::UnitQuaternion::from_axis_angle(&na::Vector3::x_axis(), std::f64::consts::FRAC_PI_2);
        system.translate(&na::Vector3::new(5.0, -3.0, 1.0));
        system.rotate_about_world_origin(&quarter);

        let h = system.hinge_data(hinge);
        assert!(h.u.norm() < 1e-12);
        assert!((h.a1 - na::Vector3::new(0.0, -1.0, 0.0)).norm() < 1e-12);
        assert!(h.angle.abs() < 1e-12);
        assert!((system.body(a).position() - na::Vector3::new(5.0, -1.0, -3.0)).norm() < 1e-12);
        assert!(
            (system.body(b).velocity_moments().velocity - na::Vector3::new(0.0, 0.0, 2.0)).norm()
                < 1e-12
        );
        assert!((system.translational_kinetic_energy() - energy.0).abs() < 1e-12);
        assert!((system.rotational_kinetic_energy() - energy.1).abs() < 1e-12);
    }

    #[test]
    fn restore_checks_shape() {
        let mut system = System::new();
        let a = system.add_body(ball(0.0));
        let snapshot = system.snapshot();
        system.body_mut(a).set_velocity_moments(VelocityMoments::new(
            na::Vector3::new(1.0, 2.0, 3.0),
            na::Vector3::zeros(),
        ));
        system.restore(&snapshot).unwrap();
        assert_eq!(*system.body(a).velocity_moments(), VelocityMoments::zero());

        system.add_body(ball(1.0));
        assert_eq!(
            system.restore(&snapshot),
            Err(PhysicsError::SnapshotMismatch {
                what: "bodies",
                expected: 2,
                found: 1
            })
        );
    }
}
