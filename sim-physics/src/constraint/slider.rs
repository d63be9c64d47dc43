//! Prismatic joint.

use crate::body::BodyId;
use crate::precalculation::SliderId;
use crate::system::System;

use super::{Jacobian, JacobianRow, JointContext, JointModel};

/// Removes five degrees of freedom, leaving translation along the slider
/// axis fixed to body 1.
#[derive(Debug, Clone)]
pub struct SliderConstraint {
    slider: SliderId,
    bodies: (BodyId, BodyId),
}

impl SliderConstraint {
    pub fn new(system: &System, slider: SliderId) -> Self {
        Self {
            slider,
            bodies: system.slider(slider).bodies(),
        }
    }
}

impl JointModel for SliderConstraint {
    fn name(&self) -> &str {
        "slider"
    }

    fn bodies(&self) -> (BodyId, BodyId) {
        self.bodies
    }

    fn jacobian(&mut self, ctx: &JointContext<'_>, _dt: f64) -> Jacobian {
        let s = ctx.slider(self.slider);
        let mut jacobian = Jacobian::new();
        jacobian.push_rotation_rows(&s.rotation_error);
        for t in [s.t1, s.t2] {
            jacobian.push(translation_row(t, &s.r1, &s.u, t.dot(&s.u)));
        }
        jacobian
    }

    fn free_motion_row(&self, ctx: &JointContext<'_>) -> Option<JacobianRow> {
        let s = ctx.slider(self.slider);
        Some(translation_row(s.axis, &s.r1, &s.u, 0.0))
    }
}

/// Row constraining the translation along `direction`; shared with the
/// linear limits.
pub(super) fn translation_row(
    direction: na::Vector3<f64>,
    r1: &na::Vector3<f64>,
    u: &na::Vector3<f64>,
    error: f64,
) -> JacobianRow {
    JacobianRow::new(
        -direction,
        -(r1 + u).cross(&direction),
        direction,
        na::Vector3::zeros(),
        error,
    )
}
