//! Velocity drive on a hinge.

use bevy::log::warn;

use crate::body::BodyId;
use crate::precalculation::HingeId;
use crate::system::System;

use super::{Jacobian, JacobianRow, JointContext, JointModel};

/// Drives the relative angular velocity about the hinge axis towards a target
/// using at most `max_torque`.  With zero torque the joint turns freely.
#[derive(Debug, Clone)]
pub struct AngularMotorConstraint {
    hinge: HingeId,
    bodies: (BodyId, BodyId),
    /// rad/s
    target_velocity: f64,
    /// N·m, non-negative.
    max_torque: f64,
}

impl AngularMotorConstraint {
    pub fn new(system: &System, hinge: HingeId, target_velocity: f64, max_torque: f64) -> Self {
        Self {
            hinge,
            bodies: system.hinge(hinge).bodies(),
            target_velocity,
            max_torque: torque_cap(max_torque),
        }
    }

    pub fn hinge(&self) -> HingeId {
        self.hinge
    }

    pub fn target_velocity(&self) -> f64 {
        self.target_velocity
    }

    pub fn set_target_velocity(&mut self, target_velocity: f64) {
        self.target_velocity = target_velocity;
    }

    pub fn max_torque(&self) -> f64 {
        self.max_torque
    }

    pub fn set_max_torque(&mut self, max_torque: f64) {
        self.max_torque = torque_cap(max_torque);
    }
}

fn torque_cap(max_torque: f64) -> f64 {
    if max_torque.is_nan() {
        warn!("NaN motor torque, motor released");
        0.0
    } else {
        max_torque.abs()
    }
}

impl JointModel for AngularMotorConstraint {
    fn name(&self) -> &str {
        "angular motor"
    }

    fn bodies(&self) -> (BodyId, BodyId) {
        self.bodies
    }

    fn jacobian(&mut self, ctx: &JointContext<'_>, _dt: f64) -> Jacobian {
        if self.max_torque == 0.0 {
            return Jacobian::empty();
        }
        let h = ctx.hinge(self.hinge);
        [JacobianRow::angular(h.a1, 0.0)
            .with_target_velocity(self.target_velocity)
            .with_bounds(-self.max_torque, self.max_torque)]
        .into_iter()
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::nature::MassMoments;

    #[test]
    fn nan_torque_releases_motor() {
        let mut system = System::new();
        let a = system.add_body(Body::new(MassMoments::cube(1.0, 0.1).unwrap()));
        let b = system.add_body(Body::new(MassMoments::cube(1.0, 0.1).unwrap()));
        let hinge = system.add_hinge(a, b, na::Vector3::zeros(), na::Vector3::z());
        let mut motor = AngularMotorConstraint::new(&system, hinge, 1.0, f64::NAN);
        assert_eq!(motor.max_torque(), 0.0);
        motor.set_max_torque(-2.0);
        assert_eq!(motor.max_torque(), 2.0);
    }
}
