//! Physical quantities shared by the whole engine.
//!
//! Everything is SI: metres, kilograms, seconds, newtons, radians.  Vectors
//! are world frame unless the field says otherwise.

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, PhysicsResult};

/// The gravitational constant, m³/(kg·s²).
pub const G: f64 = 6.67430e-11;

/// Standard gravity, m/s².
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Force and torque acting on a body's center of mass, world frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ForceMoments {
    /// N
    pub force: na::Vector3<f64>,
    /// N·m
    pub torque: na::Vector3<f64>,
}

impl ForceMoments {
    pub fn new(force: na::Vector3<f64>, torque: na::Vector3<f64>) -> Self {
        Self { force, torque }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_force(force: na::Vector3<f64>) -> Self {
        Self::new(force, na::Vector3::zeros())
    }

    pub fn from_torque(torque: na::Vector3<f64>) -> Self {
        Self::new(na::Vector3::zeros(), torque)
    }

    /// Force applied at `arm` (world vector from the center of mass), reduced
    /// to the center of mass.
    pub fn force_at(force: na::Vector3<f64>, arm: na::Vector3<f64>) -> Self {
        Self::new(force, arm.cross(&force))
    }

    pub fn is_finite(&self) -> bool {
        self.force.iter().chain(self.torque.iter()).all(|c| c.is_finite())
    }
}

impl Add for ForceMoments {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.force + rhs.force, self.torque + rhs.torque)
    }
}

impl AddAssign for ForceMoments {
    fn add_assign(&mut self, rhs: Self) {
        self.force += rhs.force;
        self.torque += rhs.torque;
    }
}

impl Sub for ForceMoments {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.force - rhs.force, self.torque - rhs.torque)
    }
}

impl SubAssign for ForceMoments {
    fn sub_assign(&mut self, rhs: Self) {
        self.force -= rhs.force;
        self.torque -= rhs.torque;
    }
}

impl Neg for ForceMoments {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.force, -self.torque)
    }
}

impl Mul<f64> for ForceMoments {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.force * rhs, self.torque * rhs)
    }
}

/// Linear and angular velocity of a body's center of mass, world frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityMoments {
    /// m/s
    pub velocity: na::Vector3<f64>,
    /// rad/s
    pub angular_velocity: na::Vector3<f64>,
}

impl VelocityMoments {
    pub fn new(velocity: na::Vector3<f64>, angular_velocity: na::Vector3<f64>) -> Self {
        Self {
            velocity,
            angular_velocity,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Velocity of a point rigidly attached to the body, `arm` away from the
    /// center of mass.
    pub fn velocity_at(&self, arm: &na::Vector3<f64>) -> na::Vector3<f64> {
        self.velocity + self.angular_velocity.cross(arm)
    }

    pub fn is_finite(&self) -> bool {
        self.velocity
            .iter()
            .chain(self.angular_velocity.iter())
            .all(|c| c.is_finite())
    }
}

impl Add for VelocityMoments {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.velocity + rhs.velocity,
            self.angular_velocity + rhs.angular_velocity,
        )
    }
}

impl AddAssign for VelocityMoments {
    fn add_assign(&mut self, rhs: Self) {
        self.velocity += rhs.velocity;
        self.angular_velocity += rhs.angular_velocity;
    }
}

/// Linear and angular acceleration of a body's center of mass, world frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelerationMoments {
    /// m/s²
    pub acceleration: na::Vector3<f64>,
    /// rad/s²
    pub angular_acceleration: na::Vector3<f64>,
}

impl AccelerationMoments {
    pub fn new(acceleration: na::Vector3<f64>, angular_acceleration: na::Vector3<f64>) -> Self {
        Self {
            acceleration,
            angular_acceleration,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Velocity change this acceleration produces over `dt`.
    pub fn over(&self, dt: f64) -> VelocityMoments {
        VelocityMoments::new(self.acceleration * dt, self.angular_acceleration * dt)
    }
}

/// Mass and inertia tensor about the center of mass, body frame.
///
/// Validated on construction, so the inverse always exists.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMassMoments", into = "RawMassMoments")]
pub struct MassMoments {
    mass: f64,
    inertia: na::Matrix3<f64>,
    inverse_inertia: na::Matrix3<f64>,
}

impl MassMoments {
    /// Mass in kg and inertia tensor in kg·m².
    pub fn new(mass: f64, inertia: na::Matrix3<f64>) -> PhysicsResult<Self> {
        if !(mass.is_finite() && mass > 0.0) {
            return Err(PhysicsError::InvalidMass(mass));
        }
        let asymmetry = (inertia - inertia.transpose()).amax();
        if !inertia.iter().all(|c| c.is_finite()) || asymmetry > 1e-9 * inertia.amax() {
            return Err(PhysicsError::InvalidInertia);
        }
        // Cholesky only succeeds for positive-definite matrices.
        let inverse_inertia = inertia
            .cholesky()
            .ok_or(PhysicsError::InvalidInertia)?
            .inverse();
        Ok(Self {
            mass,
            inertia,
            inverse_inertia,
        })
    }

    /// Solid sphere of uniform density.
    pub fn sphere(mass: f64, radius: f64) -> PhysicsResult<Self> {
        let i = 0.4 * mass * radius * radius;
        Self::new(mass, na::Matrix3::from_diagonal_element(i))
    }

    /// Solid cuboid of uniform density with edge lengths along body x, y, z.
    pub fn cuboid(mass: f64, edges: na::Vector3<f64>) -> PhysicsResult<Self> {
        let sq = edges.component_mul(&edges);
        let k = mass / 12.0;
        Self::new(
            mass,
            na::Matrix3::from_diagonal(&na::Vector3::new(
                k * (sq.y + sq.z),
                k * (sq.x + sq.z),
                k * (sq.x + sq.y),
            )),
        )
    }

    /// Solid cube of uniform density.
    pub fn cube(mass: f64, edge: f64) -> PhysicsResult<Self> {
        Self::cuboid(mass, na::Vector3::repeat(edge))
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn inertia(&self) -> &na::Matrix3<f64> {
        &self.inertia
    }

    pub fn inverse_inertia(&self) -> &na::Matrix3<f64> {
        &self.inverse_inertia
    }
}

#[derive(Serialize, Deserialize)]
struct RawMassMoments {
    mass: f64,
    inertia: na::Matrix3<f64>,
}

impl TryFrom<RawMassMoments> for MassMoments {
    type Error = PhysicsError;

    fn try_from(raw: RawMassMoments) -> PhysicsResult<Self> {
        MassMoments::new(raw.mass, raw.inertia)
    }
}

impl From<MassMoments> for RawMassMoments {
    fn from(m: MassMoments) -> Self {
        RawMassMoments {
            mass: m.mass,
            inertia: m.inertia,
        }
    }
}

/// Scale `v` down so its length does not exceed `max`.
pub fn length_limited(v: na::Vector3<f64>, max: f64) -> na::Vector3<f64> {
    let norm = v.norm();
    if norm > max && norm > 0.0 {
        v * (max / norm)
    } else {
        v
    }
}

/// Cross-product matrix: `skew(a) * b == a × b`.
pub fn skew(a: &na::Vector3<f64>) -> na::Matrix3<f64> {
    a.cross_matrix()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mass_moments_reject_bad_input() {
        assert!(matches!(
            MassMoments::new(0.0, na::Matrix3::identity()),
            Err(PhysicsError::InvalidMass(_))
        ));
        assert!(matches!(
            MassMoments::new(f64::NAN, na::Matrix3::identity()),
            Err(PhysicsError::InvalidMass(_))
        ));
        let indefinite = na::Matrix3::from_diagonal(&na::Vector3::new(1.0, -1.0, 1.0));
        assert_eq!(
            MassMoments::new(1.0, indefinite),
            Err(PhysicsError::InvalidInertia)
        );
        let asymmetric = na::Matrix3::new(1.0, 0.5, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        assert_eq!(
            MassMoments::new(1.0, asymmetric),
            Err(PhysicsError::InvalidInertia)
        );
    }

    #[test]
    fn cube_inertia_and_inverse() {
        let m = MassMoments::cube(6.0, 1.0).unwrap();
        assert!((m.inertia()[(0, 0)] - 1.0).abs() < 1e-12);
        let product = m.inertia() * m.inverse_inertia();
        assert!((product - na::Matrix3::identity()).amax() < 1e-12);
    }

    #[test]
    fn mass_moments_deserialize_validates() {
        let ok: MassMoments =
            serde_json::from_str(r#"{"mass":2.0,"inertia":[1,0,0,0,1,0,0,0,1]}"#).unwrap();
        assert_eq!(ok.mass(), 2.0);
        let bad = serde_json::from_str::<MassMoments>(
            r#"{"mass":-2.0,"inertia":[1,0,0,0,1,0,0,0,1]}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn length_limit_keeps_direction() {
        let v = length_limited(na::Vector3::new(3.0, 4.0, 0.0), 1.0);
        assert!((v.norm() - 1.0).abs() < 1e-12);
        assert!((v.x - 0.6).abs() < 1e-12);
        let short = na::Vector3::new(0.1, 0.0, 0.0);
        assert_eq!(length_limited(short, 1.0), short);
    }

    #[test]
    fn force_at_arm_produces_torque() {
        let fm = ForceMoments::force_at(
            na::Vector3::new(0.0, 1.0, 0.0),
            na::Vector3::new(2.0, 0.0, 0.0),
        );
        assert_eq!(fm.torque, na::Vector3::new(0.0, 0.0, 2.0));
    }
}
