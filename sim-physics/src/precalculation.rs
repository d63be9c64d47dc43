//! Geometry shared by the constraints of one joint.
//!
//! A hinge motor, a hinge limit and the hinge itself all need the same
//! world-space axis and angle.  Each step that data is computed once, on first
//! read, and dropped again at the start of the next evolution.

use std::marker::PhantomData;
use std::sync::OnceLock;

use crate::attitude::{any_orthonormal_vector, rotation_error};
use crate::body::{Body, BodyId};

/// Per-joint geometry recomputed every step.
pub trait Precalculate: Send + Sync {
    type Data: Send + Sync;

    fn bodies(&self) -> (BodyId, BodyId);

    fn calculate(&self, body_1: &Body, body_2: &Body) -> Self::Data;
}

/// Index of a precalculation in its [`crate::System`].
pub struct PrecalculationId<P> {
    index: usize,
    _kind: PhantomData<fn() -> P>,
}

impl<P> PrecalculationId<P> {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            _kind: PhantomData,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl<P> Clone for PrecalculationId<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for PrecalculationId<P> {}

impl<P> PartialEq for PrecalculationId<P> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<P> Eq for PrecalculationId<P> {}

impl<P> std::fmt::Debug for PrecalculationId<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrecalculationId({})", self.index)
    }
}

pub type HingeId = PrecalculationId<HingeFrame>;
pub type SliderId = PrecalculationId<SliderFrame>;

/// Parameters plus the lazily computed data for the current step.
pub struct FramePrecalculation<P: Precalculate> {
    params: P,
    data: OnceLock<P::Data>,
}

impl<P: Precalculate> FramePrecalculation<P> {
    pub fn new(params: P) -> Self {
        Self {
            params,
            data: OnceLock::new(),
        }
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    pub fn bodies(&self) -> (BodyId, BodyId) {
        self.params.bodies()
    }

    /// Drop the cached data; the next read recomputes it.
    pub fn reset(&mut self) {
        self.data.take();
    }

    pub fn is_calculated(&self) -> bool {
        self.data.get().is_some()
    }

    pub fn data(&self, bodies: &[Body]) -> &P::Data {
        self.data.get_or_init(|| {
            let (b1, b2) = self.params.bodies();
            self.params.calculate(&bodies[b1.index()], &bodies[b2.index()])
        })
    }
}

/// Hinge between two bodies: a shared anchor point and a shared axis, both
/// stored in each body's frame.
#[derive(Debug, Clone)]
pub struct HingeFrame {
    body_1: BodyId,
    body_2: BodyId,
    anchor_1: na::Vector3<f64>,
    anchor_2: na::Vector3<f64>,
    axis_1: na::Vector3<f64>,
    axis_2: na::Vector3<f64>,
    /// Perpendicular to the axis, angle zero when both coincide in world.
    reference_1: na::Vector3<f64>,
    reference_2: na::Vector3<f64>,
}

impl HingeFrame {
    /// Hinge through the world point `anchor` around the world direction
    /// `axis`, with the current relative pose defining angle zero.
    pub fn new(
        (id_1, body_1): (BodyId, &Body),
        (id_2, body_2): (BodyId, &Body),
        anchor: na::Vector3<f64>,
        axis: na::Vector3<f64>,
    ) -> Self {
        let axis = axis.normalize();
        let reference = any_orthonormal_vector(&axis);
        let (p1, p2) = (body_1.placement(), body_2.placement());
        Self {
            body_1: id_1,
            body_2: id_2,
            anchor_1: p1.to_body_point(&anchor),
            anchor_2: p2.to_body_point(&anchor),
            axis_1: p1.to_body_vector(&axis),
            axis_2: p2.to_body_vector(&axis),
            reference_1: p1.to_body_vector(&reference),
            reference_2: p2.to_body_vector(&reference),
        }
    }

    pub fn body_1_anchor(&self) -> &na::Vector3<f64> {
        &self.anchor_1
    }

    pub fn body_1_axis(&self) -> &na::Vector3<f64> {
        &self.axis_1
    }
}

/// World-space hinge geometry for one step.
#[derive(Debug, Clone)]
pub struct HingeData {
    /// Anchor as attached to body 1 and body 2.
    pub x1: na::Vector3<f64>,
    pub x2: na::Vector3<f64>,
    /// Arms from the centers of mass to the anchors.
    pub r1: na::Vector3<f64>,
    pub r2: na::Vector3<f64>,
    /// Anchor separation x2 − x1.
    pub u: na::Vector3<f64>,
    /// Axis as attached to body 1 and body 2.
    pub a1: na::Vector3<f64>,
    pub a2: na::Vector3<f64>,
    /// Orthonormal to `a1` and to each other.
    pub t1: na::Vector3<f64>,
    pub t2: na::Vector3<f64>,
    /// Rotation of body 2 relative to body 1 about `a1`, rad, in (−π, π].
    pub angle: f64,
}

impl Precalculate for HingeFrame {
    type Data = HingeData;

    fn bodies(&self) -> (BodyId, BodyId) {
        (self.body_1, self.body_2)
    }

    fn calculate(&self, body_1: &Body, body_2: &Body) -> HingeData {
        let (p1, p2) = (body_1.placement(), body_2.placement());
        let r1 = p1.to_world_vector(&self.anchor_1);
        let r2 = p2.to_world_vector(&self.anchor_2);
        let x1 = p1.position + r1;
        let x2 = p2.position + r2;
        let a1 = p1.to_world_vector(&self.axis_1).normalize();
        let a2 = p2.to_world_vector(&self.axis_2).normalize();
        let t1 = any_orthonormal_vector(&a1);
        let t2 = a1.cross(&t1);
        let ref_1 = p1.to_world_vector(&self.reference_1);
        let ref_2 = p2.to_world_vector(&self.reference_2);
        let angle = a1.dot(&ref_1.cross(&ref_2)).atan2(ref_1.dot(&ref_2));
        HingeData {
            x1,
            x2,
            r1,
            r2,
            u: x2 - x1,
            a1,
            a2,
            t1,
            t2,
            angle,
        }
    }
}

/// Prismatic joint: body 2 may only translate along an axis fixed to body 1.
#[derive(Debug, Clone)]
pub struct SliderFrame {
    body_1: BodyId,
    body_2: BodyId,
    /// Body 1 frame.
    axis_1: na::Vector3<f64>,
    /// Initial center of mass separation, body 1 frame.
    offset_1: na::Vector3<f64>,
    /// Initial orientation of body 2 relative to body 1.
    relative_orientation: na::UnitQuaternion<f64>,
}

impl SliderFrame {
    /// Slider along the world direction `axis`; the current pose is
    /// translation zero.
    pub fn new(
        (id_1, body_1): (BodyId, &Body),
        (id_2, body_2): (BodyId, &Body),
        axis: na::Vector3<f64>,
    ) -> Self {
        let (p1, p2) = (body_1.placement(), body_2.placement());
        Self {
            body_1: id_1,
            body_2: id_2,
            axis_1: p1.to_body_vector(&axis.normalize()),
            offset_1: p1.to_body_vector(&(p2.position - p1.position)),
            relative_orientation: p1.q_bw.inverse() * p2.q_bw,
        }
    }
}

/// World-space slider geometry for one step.
#[derive(Debug, Clone)]
pub struct SliderData {
    pub axis: na::Vector3<f64>,
    /// Orthonormal to `axis` and to each other.
    pub t1: na::Vector3<f64>,
    pub t2: na::Vector3<f64>,
    /// Body 1 arm to the reference point.
    pub r1: na::Vector3<f64>,
    /// Displacement of body 2 from the reference point.
    pub u: na::Vector3<f64>,
    /// Signed translation along `axis`, m.
    pub translation: f64,
    /// Rotation of body 2 away from its initial relative orientation, scaled
    /// axis, world.
    pub rotation_error: na::Vector3<f64>,
}

impl Precalculate for SliderFrame {
    type Data = SliderData;

    fn bodies(&self) -> (BodyId, BodyId) {
        (self.body_1, self.body_2)
    }

    fn calculate(&self, body_1: &Body, body_2: &Body) -> SliderData {
        let (p1, p2) = (body_1.placement(), body_2.placement());
        let axis = p1.to_world_vector(&self.axis_1).normalize();
        let t1 = any_orthonormal_vector(&axis);
        let t2 = axis.cross(&t1);
        let r1 = p1.to_world_vector(&self.offset_1);
        let u = p2.position - p1.position - r1;
        SliderData {
            axis,
            t1,
            t2,
            r1,
            u,
            translation: axis.dot(&u),
            rotation_error: rotation_error(&(p1.q_bw * self.relative_orientation), &p2.q_bw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nature::MassMoments;
    use crate::placement::Placement;
    use std::f64::consts::FRAC_PI_4;

    fn bodies() -> Vec<Body> {
        let m = MassMoments::cube(1.0, 0.1).unwrap();
        vec![
            Body::new(m),
            Body::new(m).with_placement(Placement::at(na::Vector3::new(1.0, 0.0, 0.0))),
        ]
    }

    #[test]
    fn hinge_angle_follows_relative_rotation() {
        let mut bodies = bodies();
        let hinge = HingeFrame::new(
            (BodyId(0), &bodies[0]),
            (BodyId(1), &bodies[1]),
            na::Vector3::new(0.5, 0.0, 0.0),
            na::Vector3::z(),
        );
        let mut pre = FramePrecalculation::new(hinge);
        assert!(pre.data(&bodies).angle.abs() < 1e-12);
        assert!(pre.data(&bodies).u.norm() < 1e-12);

        bodies[1].rotate_about_center_of_mass(&na::UnitQuaternion::from_axis_angle(
            &na::Vector3::z_axis(),
            FRAC_PI_4,
        ));
        // Cached until reset.
        assert!(pre.data(&bodies).angle.abs() < 1e-12);
        pre.reset();
        assert!(!pre.is_calculated());
        assert!((pre.data(&bodies).angle - FRAC_PI_4).abs() < 1e-12);
    }

    #[test]
    fn hinge_basis_is_orthonormal() {
        let bodies = bodies();
        let pre = FramePrecalculation::new(HingeFrame::new(
            (BodyId(0), &bodies[0]),
            (BodyId(1), &bodies[1]),
            na::Vector3::new(0.5, 0.0, 0.0),
            na::Vector3::new(1.0, 1.0, 0.0),
        ));
        let d = pre.data(&bodies);
        assert!(d.a1.dot(&d.t1).abs() < 1e-12);
        assert!(d.a1.dot(&d.t2).abs() < 1e-12);
        assert!(d.t1.dot(&d.t2).abs() < 1e-12);
    }

    #[test]
    fn slider_translation_along_axis() {
        let mut bodies = bodies();
        let mut pre = FramePrecalculation::new(SliderFrame::new(
            (BodyId(0), &bodies[0]),
            (BodyId(1), &bodies[1]),
            na::Vector3::x(),
        ));
        assert!(pre.data(&bodies).translation.abs() < 1e-12);
        bodies[1].translate(&na::Vector3::new(0.25, 0.1, 0.0));
        pre.reset();
        let d = pre.data(&bodies);
        assert!((d.translation - 0.25).abs() < 1e-12);
        assert!(d.rotation_error.norm() < 1e-12);
    }
}
