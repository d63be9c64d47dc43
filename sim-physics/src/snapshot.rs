//! Serializable state of a [`crate::System`].
//!
//! Captures what changes while a system evolves: body placements, velocities
//! and the broken/enabled flags.  Masses, joint geometry and controller state
//! come from the code that built the system and are not part of it.

use serde::{Deserialize, Serialize};

use crate::nature::VelocityMoments;
use crate::placement::Placement;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodySnapshot {
    pub placement: Placement,
    pub velocity_moments: VelocityMoments,
    pub broken: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSnapshot {
    pub enabled: bool,
    pub broken: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub bodies: Vec<BodySnapshot>,
    pub constraints: Vec<ConstraintSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_keeps_full_precision() {
        let snapshot = SystemSnapshot {
            bodies: vec![BodySnapshot {
                placement: Placement::new(
                    na::Vector3::new(0.1, 1.0 / 3.0, -2.5e-17),
                    na::UnitQuaternion::from_euler_angles(0.3, 0.2, 0.1),
                ),
                velocity_moments: VelocityMoments::new(
                    na::Vector3::new(1e300, 0.0, -7.0),
                    na::Vector3::new(0.0, 0.5, 0.0),
                ),
                broken: false,
            }],
            constraints: vec![ConstraintSnapshot {
                enabled: true,
                broken: true,
            }],
        };
        let text = serde_json::to_string(&snapshot).unwrap();
        let back: SystemSnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(back, snapshot);
    }
}
