//! Sets of bodies moved and measured as a whole.

use crate::body::{Body, BodyId};
use crate::system::System;

/// Mass of several bodies lumped together, world frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeMass {
    /// kg
    pub mass: f64,
    pub center_of_mass: na::Vector3<f64>,
    /// Inertia tensor about `center_of_mass`, kg·m².
    pub inertia: na::Matrix3<f64>,
}

/// A labelled set of bodies, for example everything making up one vehicle.
///
/// The [`System`] owns the bodies; a group only remembers their ids, so every
/// operation takes the system it was filled from.
#[derive(Debug, Clone, Default)]
pub struct Group {
    label: String,
    bodies: Vec<BodyId>,
    rotation_reference: Option<BodyId>,
}

impl Group {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    /// Add a body to `system` and to this group.
    pub fn add_body(&mut self, system: &mut System, body: Body) -> BodyId {
        let id = system.add_body(body);
        self.bodies.push(id);
        id
    }

    /// Add a gravitating body to `system` and to this group.
    pub fn add_gravitating_body(&mut self, system: &mut System, body: Body) -> BodyId {
        let id = system.add_gravitating_body(body);
        self.bodies.push(id);
        id
    }

    /// Include a body that is already in the system.
    pub fn insert(&mut self, id: BodyId) {
        if !self.bodies.contains(&id) {
            self.bodies.push(id);
        }
    }

    pub fn bodies(&self) -> &[BodyId] {
        &self.bodies
    }

    /// Body whose orientation stands for the group's.  It doesn't have to
    /// be a member.
    pub fn rotation_reference_body(&self) -> Option<BodyId> {
        self.rotation_reference
    }

    pub fn set_rotation_reference_body(&mut self, body: Option<BodyId>) {
        self.rotation_reference = body;
    }

    /// Orientation of the rotation reference body, body to world.
    pub fn orientation(&self, system: &System) -> Option<na::UnitQuaternion<f64>> {
        self.rotation_reference.map(|id| system.body(id).placement().q_bw)
    }

    pub fn rotate_about_world_origin(
        &self,
        system: &mut System,
        rotation: &na::UnitQuaternion<f64>,
    ) {
        self.rotate_about(system, &na::Vector3::zeros(), rotation);
    }

    /// Rotate every member about the world point `point`, velocities
    /// included.
    pub fn rotate_about(
        &self,
        system: &mut System,
        point: &na::Vector3<f64>,
        rotation: &na::UnitQuaternion<f64>,
    ) {
        for id in &self.bodies {
            system.body_mut(*id).rotate_about(point, rotation);
        }
    }

    pub fn translate(&self, system: &mut System, by: &na::Vector3<f64>) {
        for id in &self.bodies {
            system.body_mut(*id).translate(by);
        }
    }

    /// J
    pub fn translational_kinetic_energy(&self, system: &System) -> f64 {
        self.members(system).map(Body::translational_kinetic_energy).sum()
    }

    /// J
    pub fn rotational_kinetic_energy(&self, system: &System) -> f64 {
        self.members(system).map(Body::rotational_kinetic_energy).sum()
    }

    /// Combined mass, center of mass and inertia of the members.  `None`
    /// for an empty group.
    pub fn mass_moments(&self, system: &System) -> Option<CompositeMass> {
        let mass: f64 = self.members(system).map(|b| b.mass_moments().mass()).sum();
        if self.bodies.is_empty() || mass <= 0.0 {
            return None;
        }
        let center_of_mass = self
            .members(system)
            .map(|b| b.position() * b.mass_moments().mass())
            .sum::<na::Vector3<f64>>()
            / mass;
        // Parallel axis theorem for each member.
        let inertia = self
            .members(system)
            .map(|b| {
                let d = b.position() - center_of_mass;
                let offset = na::Matrix3::identity() * d.norm_squared() - d * d.transpose();
                b.world_inertia() + offset * b.mass_moments().mass()
            })
            .sum::<na::Matrix3<f64>>();
        Some(CompositeMass {
            mass,
            center_of_mass,
            inertia,
        })
    }

    fn members<'a>(&'a self, system: &'a System) -> impl Iterator<Item = &'a Body> + 'a {
        self.bodies.iter().map(|id| system.body(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nature::{MassMoments, VelocityMoments};
    use crate::placement::Placement;

    fn ball(mass: f64, x: f64) -> Body {
        Body::new(MassMoments::sphere(mass, 0.1).unwrap())
            .with_placement(Placement::at(na::Vector3::new(x, 0.0, 0.0)))
    }

    #[test]
    fn moves_members_only() {
        let mut system = System::new();
        let outsider = system.add_body(ball(1.0, -1.0));
        let mut group = Group::new("pair");
        let a = group.add_body(&mut system, ball(1.0, 1.0));
        let b = group.add_gravitating_body(&mut system, ball(1.0, 3.0));
        assert_eq!(group.label(), "pair");
        assert_eq!(group.bodies(), &[a, b]);
        assert_eq!(system.gravitating_bodies(), &[b]);

        group.translate(&mut system, &na::Vector3::new(0.0, 1.0, 0.0));
        let half =
            na::UnitQuaternion::from_axis_angle(&na::Vector3::z_axis(), std::f64::consts::PI);
        group.rotate_about(&mut system, &na::Vector3::new(2.0, 1.0, 0.0), &half);
        assert!((system.body(a).position() - na::Vector3::new(3.0, 1.0, 0.0)).norm() < 1e-12);
        assert!((system.body(b).position() - na::Vector3::new(1.0, 1.0, 0.0)).norm() < 1e-12);
        assert_eq!(system.body(outsider).position(), na::Vector3::new(-1.0, 0.0, 0.0));

        group.set_rotation_reference_body(Some(a));
        let orientation = group.orientation(&system).unwrap();
        assert!(orientation.angle_to(&half) < 1e-12);
    }

    #[test]
    fn energies_and_mass_moments() {
        let mut system = System::new();
        let mut group = Group::new("dumbbell");
        let a = group.add_body(&mut system, ball(1.0, 0.0));
        group.add_body(&mut system, ball(3.0, 4.0));
        system.add_body(ball(100.0, 10.0));
        assert!(Group::new("empty").mass_moments(&system).is_none());

        system.body_mut(a).set_velocity_moments(VelocityMoments::new(
            na::Vector3::new(2.0, 0.0, 0.0),
            na::Vector3::new(0.0, 0.0, 1.0),
        ));
        assert!((group.translational_kinetic_energy(&system) - 2.0).abs() < 1e-12);
        // Solid sphere: I = 2/5 m r².
        let spin = 0.5 * 0.4 * 1.0 * 0.01;
        assert!((group.rotational_kinetic_energy(&system) - spin).abs() < 1e-12);

        let mm = group.mass_moments(&system).unwrap();
        assert_eq!(mm.mass, 4.0);
        assert!((mm.center_of_mass - na::Vector3::new(3.0, 0.0, 0.0)).norm() < 1e-12);
        // About z: spheres plus 1·3² + 3·1².
        let spheres = 0.4 * 0.01 * 4.0;
        assert!((mm.inertia[(2, 2)] - (spheres + 12.0)).abs() < 1e-12);
        assert!((mm.inertia[(0, 0)] - spheres).abs() < 1e-12);
    }
}
