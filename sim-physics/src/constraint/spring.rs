//! Torsion spring on a hinge.

use std::f64::consts::{PI, TAU};

use crate::body::BodyId;
use crate::precalculation::HingeId;
use crate::system::System;

use super::{Jacobian, JacobianRow, JointContext, JointModel};

/// Hooke's-law torque −k (θ − θ₀) − c θ̇ about the hinge axis.
///
/// Solved implicitly: the spring becomes a soft row whose Baumgarte factor and
/// force mixing are derived from the stiffness, damping and timestep, so even
/// stiff springs stay stable.
#[derive(Debug, Clone)]
pub struct AngularSpringConstraint {
    hinge: HingeId,
    bodies: (BodyId, BodyId),
    /// N·m/rad
    stiffness: f64,
    /// N·m·s/rad
    damping: f64,
    /// rad
    neutral_angle: f64,
}

impl AngularSpringConstraint {
    pub fn new(system: &System, hinge: HingeId, stiffness: f64) -> Self {
        Self {
            hinge,
            bodies: system.hinge(hinge).bodies(),
            stiffness,
            damping: 0.0,
            neutral_angle: 0.0,
        }
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_neutral_angle(mut self, neutral_angle: f64) -> Self {
        self.neutral_angle = neutral_angle;
        self
    }

    pub fn stiffness(&self) -> f64 {
        self.stiffness
    }

    pub fn set_stiffness(&mut self, stiffness: f64) {
        self.stiffness = stiffness;
    }

    pub fn neutral_angle(&self) -> f64 {
        self.neutral_angle
    }

    pub fn set_neutral_angle(&mut self, neutral_angle: f64) {
        self.neutral_angle = neutral_angle;
    }
}

/// Wrap into (−π, π].
fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped == -PI { PI } else { wrapped }
}

impl JointModel for AngularSpringConstraint {
    fn name(&self) -> &str {
        "angular spring"
    }

    fn bodies(&self) -> (BodyId, BodyId) {
        self.bodies
    }

    fn jacobian(&mut self, ctx: &JointContext<'_>, dt: f64) -> Jacobian {
        let h = ctx.hinge(self.hinge);
        let gain = self.stiffness * dt + self.damping;
        if gain <= 0.0 {
            return Jacobian::empty();
        }
        let baumgarte = self.stiffness * dt / gain;
        let cfm = 1.0 / (dt * gain);
        let error = wrap_angle(h.angle - self.neutral_angle);
        [JacobianRow::angular(h.a1, error).with_softness(baumgarte, cfm)]
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_into_half_open_interval() {
        assert!((wrap_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert!((wrap_angle(-PI) - PI).abs() < 1e-12);
        assert!((wrap_angle(0.25) - 0.25).abs() < 1e-12);
    }
}
