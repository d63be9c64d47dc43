//! Rigid weld between two bodies.

use crate::attitude::rotation_error;
use crate::body::BodyId;
use crate::system::System;

use super::{Jacobian, JointContext, JointModel};

/// Removes all six relative degrees of freedom, holding the pose the bodies
/// had when the constraint was made.
#[derive(Debug, Clone)]
pub struct FixedConstraint {
    body_1: BodyId,
    body_2: BodyId,
    /// Body 2's center of mass, body 1 frame.
    anchor_1: na::Vector3<f64>,
    /// Orientation of body 2 relative to body 1.
    relative_orientation: na::UnitQuaternion<f64>,
}

impl FixedConstraint {
    pub fn new(system: &System, body_1: BodyId, body_2: BodyId) -> Self {
        let p1 = system.body(body_1).placement();
        let p2 = system.body(body_2).placement();
        Self {
            body_1,
            body_2,
            anchor_1: p1.to_body_point(&p2.position),
            relative_orientation: p1.q_bw.inverse() * p2.q_bw,
        }
    }
}

impl JointModel for FixedConstraint {
    fn name(&self) -> &str {
        "fixed"
    }

    fn bodies(&self) -> (BodyId, BodyId) {
        (self.body_1, self.body_2)
    }

    fn jacobian(&mut self, ctx: &JointContext<'_>, _dt: f64) -> Jacobian {
        let p1 = ctx.body(self.body_1).placement();
        let p2 = ctx.body(self.body_2).placement();
        let r1 = p1.to_world_vector(&self.anchor_1);
        let u = p2.position - (p1.position + r1);

        let mut jacobian = Jacobian::new();
        jacobian.push_point_rows(&r1, &na::Vector3::zeros(), &u);
        jacobian.push_rotation_rows(&rotation_error(
            &(p1.q_bw * self.relative_orientation),
            &p2.q_bw,
        ));
        jacobian
    }
}
