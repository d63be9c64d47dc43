//! Where a body is and how it is turned.

use serde::{Deserialize, Serialize};

use crate::attitude;

/// Position of the center of mass and body -> world orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// World position of the center of mass, m.
    pub position: na::Vector3<f64>,
    /// Orientation: body -> world
    pub q_bw: na::UnitQuaternion<f64>,
}

impl Default for Placement {
    fn default() -> Self {
        Self::new(na::Vector3::zeros(), na::UnitQuaternion::identity())
    }
}

impl Placement {
    pub fn new(position: na::Vector3<f64>, q_bw: na::UnitQuaternion<f64>) -> Self {
        Self { position, q_bw }
    }

    pub fn at(position: na::Vector3<f64>) -> Self {
        Self::new(position, na::UnitQuaternion::identity())
    }

    /// Body-frame vector expressed in world.
    pub fn to_world_vector(&self, v_b: &na::Vector3<f64>) -> na::Vector3<f64> {
        self.q_bw.transform_vector(v_b)
    }

    /// World vector expressed in the body frame.
    pub fn to_body_vector(&self, v_w: &na::Vector3<f64>) -> na::Vector3<f64> {
        self.q_bw.inverse_transform_vector(v_w)
    }

    /// Body-frame point (relative to the center of mass) as a world point.
    pub fn to_world_point(&self, p_b: &na::Vector3<f64>) -> na::Vector3<f64> {
        self.position + self.to_world_vector(p_b)
    }

    /// World point as a body-frame point relative to the center of mass.
    pub fn to_body_point(&self, p_w: &na::Vector3<f64>) -> na::Vector3<f64> {
        self.to_body_vector(&(p_w - self.position))
    }

    pub fn translate(&mut self, by: &na::Vector3<f64>) {
        self.position += by;
    }

    /// Rotate about the center of mass by a world-frame rotation.
    pub fn rotate_body(&mut self, rotation: &na::UnitQuaternion<f64>) {
        self.q_bw = rotation * self.q_bw;
    }

    /// Rotate about the world origin, moving the center of mass as well.
    pub fn rotate_about_world_origin(&mut self, rotation: &na::UnitQuaternion<f64>) {
        self.position = rotation.transform_vector(&self.position);
        self.rotate_body(rotation);
    }

    /// Step position and orientation with constant velocities over `dt`.
    pub fn advance(&mut self, velocity: &na::Vector3<f64>, omega_w: &na::Vector3<f64>, dt: f64) {
        self.position += velocity * dt;
        self.q_bw = attitude::integrate_orientation(&self.q_bw, omega_w, dt);
    }

    /// Pull the orientation back onto the unit sphere.
    pub fn renormalize(&mut self) {
        self.q_bw.renormalize();
    }

    pub fn is_finite(&self) -> bool {
        self.position
            .iter()
            .chain(self.q_bw.coords.iter())
            .all(|c| c.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn point_transforms_are_inverse() {
        let p = Placement::new(
            na::Vector3::new(1.0, 2.0, 3.0),
            na::UnitQuaternion::from_euler_angles(0.3, -0.2, 1.1),
        );
        let b = na::Vector3::new(-0.5, 0.25, 4.0);
        let w = p.to_world_point(&b);
        assert!((p.to_body_point(&w) - b).norm() < 1e-12);
    }

    #[test]
    fn rotate_about_origin_moves_position() {
        let mut p = Placement::at(na::Vector3::new(1.0, 0.0, 0.0));
        p.rotate_about_world_origin(&na::UnitQuaternion::from_axis_angle(
            &na::Vector3::z_axis(),
            FRAC_PI_2,
        ));
        assert!((p.position - na::Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-12);
        assert!((p.to_world_vector(&na::Vector3::x()) - na::Vector3::y()).norm() < 1e-12);
    }

    #[test]
    fn renormalize_restores_unit_length() {
        let mut p = Placement::default();
        // Accumulate drift by composing many tiny rotations.
        for _ in 0..100_000 {
            p.advance(&na::Vector3::zeros(), &na::Vector3::new(0.3, 0.7, -0.2), 1e-3);
        }
        p.renormalize();
        assert!((p.q_bw.coords.norm() - 1.0).abs() < 1e-15);
    }
}
