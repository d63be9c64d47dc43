//! Revolute joint.

use crate::body::BodyId;
use crate::precalculation::HingeId;
use crate::system::System;

use super::{Jacobian, JacobianRow, JointContext, JointModel};

/// Removes five degrees of freedom, leaving rotation about the hinge axis.
#[derive(Debug, Clone)]
pub struct HingeConstraint {
    hinge: HingeId,
    bodies: (BodyId, BodyId),
}

impl HingeConstraint {
    pub fn new(system: &System, hinge: HingeId) -> Self {
        Self {
            hinge,
            bodies: system.hinge(hinge).bodies(),
        }
    }

    pub fn hinge(&self) -> HingeId {
        self.hinge
    }
}

impl JointModel for HingeConstraint {
    fn name(&self) -> &str {
        "hinge"
    }

    fn bodies(&self) -> (BodyId, BodyId) {
        self.bodies
    }

    fn jacobian(&mut self, ctx: &JointContext<'_>, _dt: f64) -> Jacobian {
        let h = ctx.hinge(self.hinge);
        let mut jacobian = Jacobian::new();
        jacobian.push_point_rows(&h.r1, &h.r2, &h.u);
        // a1 × a2 is the small rotation tilting axis 2 away from axis 1.
        let tilt = h.a1.cross(&h.a2);
        for t in [h.t1, h.t2] {
            jacobian.push(JacobianRow::angular(t, t.dot(&tilt)));
        }
        jacobian
    }

    fn free_motion_row(&self, ctx: &JointContext<'_>) -> Option<JacobianRow> {
        Some(JacobianRow::angular(ctx.hinge(self.hinge).a1, 0.0))
    }
}
