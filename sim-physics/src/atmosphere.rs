//! Air around the bodies.
//!
//! The system holds at most one [`Atmosphere`]; force contributors such as
//! [`AerodynamicDrag`] query it per body per step.  Z is up.

use serde::{Deserialize, Serialize};

use crate::body::{Body, ForceContributor};
use crate::nature::ForceMoments;

/// State of the air at a point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Air {
    /// kg/m³
    pub density: f64,
    /// Pa
    pub pressure: f64,
    /// K
    pub temperature: f64,
    /// Air velocity, world frame, m/s.
    pub wind: na::Vector3<f64>,
}

pub trait Atmosphere: Send + Sync {
    fn air_at(&self, position: &na::Vector3<f64>) -> Air;
}

/// Altitude (km), pressure (Pa), temperature (K), density (kg/m³).
const ISA_TABLE: [(f64, f64, f64, f64); 9] = [
    (-0.61, 108_900.0, 254.15, 1.2985),
    (0.0, 101_325.0, 288.15, 1.2250),
    (11.0, 22_632.1, 216.65, 0.36391),
    (20.0, 5_474.89, 216.65, 0.08803),
    (32.0, 868.02, 228.65, 0.01322),
    (47.0, 110.91, 270.65, 0.0020),
    (51.0, 66.939, 270.65, 0.00086),
    (71.0, 3.9564, 214.65, 0.000064211),
    (84.852, 0.3734, 186.87, 8.0510e-6),
];

/// International Standard Atmosphere, piecewise-linear between the layer
/// boundaries and clamped outside them.  Altitude is world Z above
/// `ground_level`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardAtmosphere {
    /// World Z of mean sea level, m.
    pub ground_level: f64,
    /// Uniform wind, world frame, m/s.
    pub wind: na::Vector3<f64>,
}

impl StandardAtmosphere {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wind(mut self, wind: na::Vector3<f64>) -> Self {
        self.wind = wind;
        self
    }

    /// (pressure, temperature, density) at the altitude in metres.
    fn interpolate(altitude_m: f64) -> (f64, f64, f64) {
        let km = altitude_m / 1000.0;
        let first = ISA_TABLE[0];
        let last = ISA_TABLE[ISA_TABLE.len() - 1];
        if km <= first.0 {
            return (first.1, first.2, first.3);
        }
        if km >= last.0 {
            return (last.1, last.2, last.3);
        }
        let (lo, hi) = ISA_TABLE
            .windows(2)
            .map(|w| (w[0], w[1]))
            .find(|(_, hi)| km <= hi.0)
            .unwrap_or((first, last));
        let t = (km - lo.0) / (hi.0 - lo.0);
        let lerp = |a: f64, b: f64| a + (b - a) * t;
        (lerp(lo.1, hi.1), lerp(lo.2, hi.2), lerp(lo.3, hi.3))
    }
}

impl Atmosphere for StandardAtmosphere {
    fn air_at(&self, position: &na::Vector3<f64>) -> Air {
        let (pressure, temperature, density) = Self::interpolate(position.z - self.ground_level);
        Air {
            density,
            pressure,
            temperature,
            wind: self.wind,
        }
    }
}

/// Quadratic drag at the center of mass: F = −½ ρ Cd A |v| v, with v the
/// body velocity relative to the air.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AerodynamicDrag {
    /// Drag coefficient, dimensionless.
    pub drag_coefficient: f64,
    /// Reference area, m².
    pub area: f64,
}

impl AerodynamicDrag {
    pub fn new(drag_coefficient: f64, area: f64) -> Self {
        Self {
            drag_coefficient,
            area,
        }
    }
}

impl ForceContributor for AerodynamicDrag {
    fn force_moments(
        &mut self,
        body: &Body,
        atmosphere: Option<&dyn Atmosphere>,
        _dt: f64,
    ) -> ForceMoments {
        let Some(atmosphere) = atmosphere else {
            return ForceMoments::zero();
        };
        let air = atmosphere.air_at(&body.position());
        let v = body.velocity_moments().velocity - air.wind;
        let f = -0.5 * air.density * self.drag_coefficient * self.area * v.norm() * v;
        ForceMoments::from_force(f)
    }
}
