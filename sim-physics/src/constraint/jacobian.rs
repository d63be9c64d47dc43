//! Jacobian rows and the impulse solve shared by every constraint.
//!
//! Each row maps the velocities of both bodies to the rate of change of one
//! scalar constraint error:
//!
//! ```text
//! Ċ = v1·Jv1 + ω1·Jw1 + v2·Jv2 + ω2·Jw2
//! ```
//!
//! For N rows the multipliers λ solve
//!
//! ```text
//! dt (K + CFM·I) Δλ = −(J v − target + β/dt · C + dt·CFM·λ)
//! K = J M⁻¹ Jᵀ
//! ```
//!
//! where `v` already contains the effect of the λ accumulated so far this
//! step, so repeated solves refine the same λ instead of adding to it.

use bevy::log::warn;

use crate::nature::{ForceMoments, VelocityMoments, skew};
use crate::solver::BodyFrameCache;

use super::ConstraintForces;

/// One scalar constraint equation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JacobianRow {
    pub v1: na::Vector3<f64>,
    pub w1: na::Vector3<f64>,
    pub v2: na::Vector3<f64>,
    pub w2: na::Vector3<f64>,
    /// Positional error C, m or rad.
    pub error: f64,
    /// Desired Ċ, m/s or rad/s.
    pub target_velocity: f64,
    /// Bounds on the accumulated multiplier, N or N·m.
    pub lower: f64,
    pub upper: f64,
    /// Per-row override of the constraint's Baumgarte factor.
    pub baumgarte: Option<f64>,
    /// Per-row override of the constraint's force mixing factor.
    pub cfm: Option<f64>,
}

impl JacobianRow {
    pub fn new(
        v1: na::Vector3<f64>,
        w1: na::Vector3<f64>,
        v2: na::Vector3<f64>,
        w2: na::Vector3<f64>,
        error: f64,
    ) -> Self {
        Self {
            v1,
            w1,
            v2,
            w2,
            error,
            target_velocity: 0.0,
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
            baumgarte: None,
            cfm: None,
        }
    }

    /// Row acting only on the relative angular velocity about `axis`.
    pub fn angular(axis: na::Vector3<f64>, error: f64) -> Self {
        let zero = na::Vector3::zeros();
        Self::new(zero, -axis, zero, axis, error)
    }

    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    pub fn with_target_velocity(mut self, target_velocity: f64) -> Self {
        self.target_velocity = target_velocity;
        self
    }

    pub fn with_softness(mut self, baumgarte: f64, cfm: f64) -> Self {
        self.baumgarte = Some(baumgarte);
        self.cfm = Some(cfm);
        self
    }

    /// Ċ for the velocities the solver currently predicts.
    pub fn rate(&self, b1: &BodyFrameCache, b2: &BodyFrameCache) -> f64 {
        self.rate_of(b1.velocity_moments(), b2.velocity_moments())
    }

    /// Ċ for the given velocities.
    pub fn rate_of(&self, vm1: &VelocityMoments, vm2: &VelocityMoments) -> f64 {
        self.v1.dot(&vm1.velocity)
            + self.w1.dot(&vm1.angular_velocity)
            + self.v2.dot(&vm2.velocity)
            + self.w2.dot(&vm2.angular_velocity)
    }
}

/// Rows of one constraint for one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Jacobian {
    rows: Vec<JacobianRow>,
}

impl Jacobian {
    pub fn new() -> Self {
        Self::default()
    }

    /// No rows: the constraint does nothing this step.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: JacobianRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[JacobianRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Three rows holding the world points `x1 + r1` and `x2 + r2` together,
    /// with `u` their current separation.
    pub fn push_point_rows(
        &mut self,
        r1: &na::Vector3<f64>,
        r2: &na::Vector3<f64>,
        u: &na::Vector3<f64>,
    ) {
        let s1 = skew(r1);
        let s2 = skew(r2);
        for (i, axis) in [na::Vector3::x(), na::Vector3::y(), na::Vector3::z()]
            .into_iter()
            .enumerate()
        {
            // (r × ω)_i is row i of [r]× dotted with ω.
            self.push(JacobianRow::new(
                -axis,
                s1.row(i).transpose(),
                axis,
                -s2.row(i).transpose(),
                u[i],
            ));
        }
    }

    /// Three rows locking relative orientation, given the rotation error of
    /// body 2 as a world scaled axis.
    pub fn push_rotation_rows(&mut self, rotation_error: &na::Vector3<f64>) {
        for (i, axis) in [na::Vector3::x(), na::Vector3::y(), na::Vector3::z()]
            .into_iter()
            .enumerate()
        {
            self.push(JacobianRow::angular(axis, rotation_error[i]));
        }
    }

    /// Force moments on each body for the multipliers `lambda`.
    pub fn forces(&self, lambda: &na::DVector<f64>) -> ConstraintForces {
        let mut forces = ConstraintForces::zero();
        for (row, l) in self.rows.iter().zip(lambda.iter()) {
            forces.body_1 += ForceMoments::new(row.v1 * *l, row.w1 * *l);
            forces.body_2 += ForceMoments::new(row.v2 * *l, row.w2 * *l);
        }
        forces
    }
}

impl FromIterator<JacobianRow> for Jacobian {
    fn from_iter<I: IntoIterator<Item = JacobianRow>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

/// Constraint-wide solve parameters.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SolveParameters {
    pub baumgarte: f64,
    pub cfm: f64,
    pub dt: f64,
}

/// Refine the accumulated multipliers against the current velocities.
///
/// Returns the new accumulated multipliers, clamped to each row's bounds, or
/// `None` when the constraint mass matrix is singular.
pub(crate) fn solve(
    jacobian: &Jacobian,
    accumulated: &na::DVector<f64>,
    b1: &BodyFrameCache,
    b2: &BodyFrameCache,
    params: SolveParameters,
) -> Option<na::DVector<f64>> {
    let rows = jacobian.rows();
    let n = rows.len();
    let dt = params.dt;

    // M⁻¹ Jᵀ, column by column.
    let m_inv_jt: Vec<[na::Vector3<f64>; 4]> = rows
        .iter()
        .map(|r| {
            [
                r.v1 * b1.inverse_mass(),
                b1.inverse_inertia() * r.w1,
                r.v2 * b2.inverse_mass(),
                b2.inverse_inertia() * r.w2,
            ]
        })
        .collect();
    let cfm = |i: usize| rows[i].cfm.unwrap_or(params.cfm);

    let k = na::DMatrix::from_fn(n, n, |i, j| {
        let r = &rows[i];
        let c = &m_inv_jt[j];
        let mut value = r.v1.dot(&c[0]) + r.w1.dot(&c[1]) + r.v2.dot(&c[2]) + r.w2.dot(&c[3]);
        if i == j {
            value += cfm(i);
        }
        value
    });

    let rhs = na::DVector::from_fn(n, |i, _| {
        let r = &rows[i];
        let beta = r.baumgarte.unwrap_or(params.baumgarte);
        let bias = beta / dt * r.error;
        -(r.rate(b1, b2) - r.target_velocity + bias + dt * cfm(i) * accumulated[i]) / dt
    });

    let Some(delta) = k.lu().solve(&rhs) else {
        warn!("singular constraint mass matrix ({n} rows), skipping");
        return None;
    };
    if !delta.iter().all(|d| d.is_finite()) {
        warn!("non-finite constraint impulse, skipping");
        return None;
    }

    // Not f64::clamp: bounds may be NaN or inverted.
    Some(na::DVector::from_fn(n, |i, _| {
        (accumulated[i] + delta[i]).max(rows[i].lower).min(rows[i].upper)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::nature::{MassMoments, VelocityMoments};

    fn cache(mass: f64, velocity: VelocityMoments) -> BodyFrameCache {
        let body = Body::new(MassMoments::cube(mass, 1.0).unwrap()).with_velocity_moments(velocity);
        BodyFrameCache::prepare(&body)
    }

    fn params() -> SolveParameters {
        SolveParameters {
            baumgarte: 0.0,
            cfm: 0.0,
            dt: 0.01,
        }
    }

    #[test]
    fn point_rows_match_velocity_at_anchor() {
        let r1 = na::Vector3::new(0.5, 0.0, 0.0);
        let r2 = na::Vector3::new(-0.5, 0.2, 0.0);
        let mut j = Jacobian::new();
        j.push_point_rows(&r1, &r2, &na::Vector3::zeros());
        let vm1 = VelocityMoments::new(na::Vector3::new(0.1, 0.2, 0.3), na::Vector3::new(1.0, -2.0, 0.5));
        let vm2 = VelocityMoments::new(na::Vector3::new(-0.3, 0.0, 0.7), na::Vector3::new(0.0, 3.0, -1.0));
        let (b1, b2) = (cache(1.0, vm1), cache(1.0, vm2));
        let relative = vm2.velocity_at(&r2) - vm1.velocity_at(&r1);
        for (i, row) in j.rows().iter().enumerate() {
            assert!((row.rate(&b1, &b2) - relative[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn single_row_solve_cancels_relative_velocity() {
        let row = JacobianRow::new(
            -na::Vector3::x(),
            na::Vector3::zeros(),
            na::Vector3::x(),
            na::Vector3::zeros(),
            0.0,
        );
        let j: Jacobian = [row].into_iter().collect();
        let b1 = cache(2.0, VelocityMoments::zero());
        let b2 = cache(1.0, VelocityMoments::new(na::Vector3::new(3.0, 0.0, 0.0), na::Vector3::zeros()));
        let lambda = solve(&j, &na::DVector::zeros(1), &b1, &b2, params()).unwrap();
        // Δv2 − Δv1 = dt λ (1/m1 + 1/m2) must equal −3.
        let expected = -3.0 / (0.01 * (0.5 + 1.0));
        assert!((lambda[0] - expected).abs() < 1e-9);
        let forces = j.forces(&lambda);
        assert_eq!(forces.body_1.force, -forces.body_2.force);
    }

    #[test]
    fn bounds_clamp_accumulated_total() {
        let row = JacobianRow::angular(na::Vector3::z(), 0.0).with_bounds(-1.0, 1.0);
        let j: Jacobian = [row].into_iter().collect();
        let b1 = cache(1.0, VelocityMoments::zero());
        let b2 = cache(1.0, VelocityMoments::new(na::Vector3::zeros(), na::Vector3::new(0.0, 0.0, 10.0)));
        let lambda = solve(&j, &na::DVector::zeros(1), &b1, &b2, params()).unwrap();
        assert_eq!(lambda[0], -1.0);
    }

    #[test]
    fn singular_matrix_is_skipped() {
        // Two identical rows make K rank deficient.
        let row = JacobianRow::angular(na::Vector3::z(), 0.0);
        let j: Jacobian = [row, row].into_iter().collect();
        let b1 = cache(1.0, VelocityMoments::zero());
        let b2 = cache(1.0, VelocityMoments::new(na::Vector3::zeros(), na::Vector3::new(0.0, 0.0, 1.0)));
        assert!(solve(&j, &na::DVector::zeros(2), &b1, &b2, params()).is_none());
    }

    #[test]
    fn bad_bounds_do_not_panic() {
        let b1 = cache(1.0, VelocityMoments::zero());
        let b2 = cache(1.0, VelocityMoments::new(na::Vector3::zeros(), na::Vector3::new(0.0, 0.0, 10.0)));
        for (lower, upper) in [(f64::NAN, f64::NAN), (1.0, -1.0), (f64::NAN, 2.0)] {
            let row = JacobianRow::angular(na::Vector3::z(), 0.0).with_bounds(lower, upper);
            let j: Jacobian = [row].into_iter().collect();
            let lambda = solve(&j, &na::DVector::zeros(1), &b1, &b2, params()).unwrap();
            assert!(!lambda[0].is_nan());
        }
    }
}
