//! Rotation helpers used by the integrator and the constraints.

/// Exponential map: converts axis-angle vector to unit quaternion.
///
/// Given a 3D vector v = θ * n (where n is unit axis, θ is rotation angle),
/// returns the unit quaternion q representing rotation by θ radians around n.
pub fn exp_quat(v: &na::Vector3<f64>) -> na::UnitQuaternion<f64> {
    let theta = v.norm();
    if theta < 1e-15 {
        // No significant rotation
        na::UnitQuaternion::identity()
    } else {
        na::UnitQuaternion::from_axis_angle(&na::Unit::new_normalize(*v), theta)
    }
}

/// Advance a body -> world orientation by a world-frame angular velocity held
/// constant over `dt`.
pub fn integrate_orientation(
    q_bw: &na::UnitQuaternion<f64>,
    omega_w: &na::Vector3<f64>,
    dt: f64,
) -> na::UnitQuaternion<f64> {
    exp_quat(&(omega_w * dt)) * q_bw
}

/// Inertia tensor re-expressed in WORLD: R I Rᵀ.
pub fn world_tensor(q_bw: &na::UnitQuaternion<f64>, i_body: &na::Matrix3<f64>) -> na::Matrix3<f64> {
    let r = q_bw.to_rotation_matrix();
    r.matrix() * i_body * r.matrix().transpose()
}

/// Gyroscopic torque −ω × (I ω), WORLD frame.
///
/// Added to the applied torque, it turns τ = I ω̇ into the full Euler equation
/// ω̇ = I⁻¹ (τ − ω × (I ω)).
#[inline]
pub fn gyroscopic_torque(i_world: &na::Matrix3<f64>, omega_w: &na::Vector3<f64>) -> na::Vector3<f64> {
    let i_omega = i_world * omega_w;
    -omega_w.cross(&i_omega)
}

/// Some unit vector perpendicular to `v`.
///
/// Crossed with whichever basis axis `v` is least aligned to, so the result
/// is well conditioned.
pub fn any_orthonormal_vector(v: &na::Vector3<f64>) -> na::Vector3<f64> {
    let mut axis = na::Vector3::x_axis();
    if v.x.abs() > v.y.abs() {
        if v.y.abs() > v.z.abs() {
            axis = na::Vector3::z_axis();
        } else {
            axis = na::Vector3::y_axis();
        }
    } else if v.x.abs() > v.z.abs() {
        axis = na::Vector3::z_axis();
    }
    v.cross(&axis.into_inner()).normalize()
}

/// Rotation error between two orientations as a scaled axis (WORLD), such
/// that rotating `from` by it yields `to`.
pub fn rotation_error(
    from: &na::UnitQuaternion<f64>,
    to: &na::UnitQuaternion<f64>,
) -> na::Vector3<f64> {
    (to * from.inverse()).scaled_axis()
}
