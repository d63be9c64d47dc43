//! Model RC servo acting on a hinge.
//!
//! A PID loop on the hinge angle picks the arm speed as a fraction of what
//! the supply voltage allows; an [`AngularMotorConstraint`] then delivers it
//! with the torque the voltage allows.  Inside the backlash band the motor
//! stops driving and the gear train holds the arm.  A crude electrical model
//! reports the current drawn.
//!
//! The derivative term uses the measured arm rate through a low-pass filter.
//! The loop is stable for time steps up to about 2 ms.

use bevy::log::warn;
use serde::{Deserialize, Serialize};

use crate::body::BodyId;
use crate::control::{PidController, PidSettings, Range};
use crate::nature::VelocityMoments;
use crate::precalculation::HingeId;
use crate::system::System;

use super::{
    AngularMotorConstraint, BreakingLimits, ConstraintForces, Jacobian, JointContext, JointModel,
};

const SIXTY_DEGREES: f64 = std::f64::consts::FRAC_PI_3;

/// Typical micro servo speed per volt, rad/s/V (60° in 0.15 s at 6 V).
pub const NINE_GRAM_ANGULAR_VELOCITY_POTENTIAL: f64 = SIXTY_DEGREES / 0.15 / 6.0;
/// Typical standard servo speed per volt, rad/s/V (60° in 0.20 s at 6 V).
pub const STANDARD_ANGULAR_VELOCITY_POTENTIAL: f64 = SIXTY_DEGREES / 0.20 / 6.0;
/// Typical micro servo torque per volt, N·m/V.
pub const NINE_GRAM_TORQUE_POTENTIAL: f64 = 0.144 / 6.0;
/// Typical standard servo torque per volt, N·m/V.
pub const STANDARD_TORQUE_POTENTIAL: f64 = 0.4 / 6.0;

/// Supply outside this range destroys the servo, V.
pub const ABSOLUTE_MAXIMUM_VOLTAGE: Range = Range {
    min: -0.1,
    max: 7.2,
};

/// Resistance reported before any current has been computed, Ω.
pub const INITIAL_RESISTANCE: f64 = 1000.0;

/// Resistance of a burnt servo, Ω.
const FAILED_RESISTANCE: f64 = 0.1;

/// Nominal supply, V.
const NOMINAL_VOLTAGE: f64 = 6.0;

/// Time constant of the PID derivative filter, s.
const DERIVATIVE_FILTER_TIME_CONSTANT: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServoOrientation {
    #[default]
    Normal,
    Reverse,
}

impl ServoOrientation {
    fn sign(&self) -> f64 {
        match self {
            ServoOrientation::Normal => 1.0,
            ServoOrientation::Reverse => -1.0,
        }
    }
}

/// How mechanical output relates to electrical input.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ServoEfficiency {
    /// Electrical power equals mechanical power.
    #[default]
    Ideal,
    /// Fraction of electrical power turned into mechanical power, 0…1.
    Factor(f64),
    /// Torque produced per electrical power, N·m/W.
    TorqueEfficacy(f64),
}

#[derive(Debug, Clone)]
pub struct AngularServoConstraint {
    motor: AngularMotorConstraint,
    pid: PidController,
    /// rad
    angle_range: Range,
    /// rad
    backlash: f64,
    /// rad, clamped, as requested.
    requested_setpoint: f64,
    /// rad, clamped and oriented.
    setpoint: f64,
    orientation: ServoOrientation,
    /// rad/s/V
    angular_velocity_potential: f64,
    /// N·m/V
    torque_potential: f64,
    efficiency: ServoEfficiency,
    /// V
    voltage: f64,
    arm_angular_velocity: f64,
    arm_torque: f64,
    current: f64,
    resistance: f64,
    power_loss: f64,
    failed: bool,
}

impl AngularServoConstraint {
    pub fn new(
        system: &System,
        hinge: HingeId,
        angle_range: Range,
        backlash: f64,
        angular_velocity_potential: f64,
        torque_potential: f64,
    ) -> Self {
        let setpoint = angle_range.midpoint();
        let mut pid = PidController::new(
            PidSettings {
                p: 50.0,
                i: 1.0,
                d: 1.0,
            },
            setpoint,
        );
        // ±0.1°·s
        pid.set_integral_limit(Range::symmetric(0.1_f64.to_radians()));
        pid.set_output_limit(Range::symmetric(1.0));
        pid.set_derivative_filter(Some(DERIVATIVE_FILTER_TIME_CONSTANT));

        Self {
            motor: AngularMotorConstraint::new(system, hinge, 0.0, 0.0),
            pid,
            angle_range,
            backlash,
            requested_setpoint: setpoint,
            setpoint,
            orientation: ServoOrientation::Normal,
            angular_velocity_potential,
            torque_potential,
            efficiency: ServoEfficiency::Ideal,
            voltage: NOMINAL_VOLTAGE,
            arm_angular_velocity: 0.0,
            arm_torque: 0.0,
            current: 0.0,
            resistance: INITIAL_RESISTANCE,
            power_loss: 0.0,
            failed: false,
        }
    }

    /// Standard size servo; `scale` 1.0 is the typical one.
    pub fn standard(system: &System, hinge: HingeId, scale: f64) -> Self {
        Self::new(
            system,
            hinge,
            Range::symmetric(90_f64.to_radians()),
            0.5_f64.to_radians(),
            // Roughly: bigger servos are a little slower.
            STANDARD_ANGULAR_VELOCITY_POTENTIAL / scale.powf(0.25),
            STANDARD_TORQUE_POTENTIAL * scale,
        )
    }

    /// 9 gram micro servo; `scale` 1.0 is the typical one.
    pub fn nine_gram(system: &System, hinge: HingeId, scale: f64) -> Self {
        Self::new(
            system,
            hinge,
            Range::symmetric(90_f64.to_radians()),
            0.5_f64.to_radians(),
            NINE_GRAM_ANGULAR_VELOCITY_POTENTIAL / scale.powf(0.25),
            NINE_GRAM_TORQUE_POTENTIAL * scale,
        )
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Target hinge angle, rad, clamped to the angle range.  A reverse
    /// mounted servo turns the hinge the other way.
    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.requested_setpoint = self.angle_range.clamp(setpoint);
        self.apply_setpoint();
    }

    pub fn orientation(&self) -> ServoOrientation {
        self.orientation
    }

    /// The current setpoint is kept and re-applied with the new orientation.
    pub fn set_orientation(&mut self, orientation: ServoOrientation) {
        self.orientation = orientation;
        self.apply_setpoint();
    }

    fn apply_setpoint(&mut self) {
        self.setpoint = self.orientation.sign() * self.requested_setpoint;
        self.pid.set_setpoint(self.setpoint);
    }

    pub fn angle_range(&self) -> &Range {
        &self.angle_range
    }

    pub fn backlash(&self) -> f64 {
        self.backlash
    }

    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    /// Supply voltage, V.  Outside [`ABSOLUTE_MAXIMUM_VOLTAGE`] the servo
    /// fails at the next step.
    pub fn set_voltage(&mut self, voltage: f64) {
        self.voltage = voltage;
    }

    pub fn set_efficiency(&mut self, efficiency: ServoEfficiency) {
        self.efficiency = efficiency;
    }

    /// Relative arm angular velocity about the hinge axis, rad/s.
    pub fn arm_angular_velocity(&self) -> f64 {
        self.arm_angular_velocity
    }

    /// Torque on the arm about the hinge axis, N·m.
    pub fn arm_torque(&self) -> f64 {
        self.arm_torque
    }

    /// Supply current, A.
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Apparent electrical resistance, Ω.  Infinite while idle.
    pub fn resistance(&self) -> f64 {
        self.resistance
    }

    /// Electrical power not turned into mechanical power, W.
    pub fn power_loss(&self) -> f64 {
        self.power_loss
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn motor(&self) -> &AngularMotorConstraint {
        &self.motor
    }

    fn update_pid_controller(&mut self, angle: f64, rate: f64, dt: f64) {
        let error = angle - self.setpoint;
        self.motor.set_max_torque(self.torque_potential * self.voltage);
        if error.abs() < self.backlash {
            self.motor.set_target_velocity(0.0);
        } else {
            let velocity_factor = self.pid.process_with_rate(angle, rate, dt);
            let angular_velocity = self.angular_velocity_potential * self.voltage;
            self.motor.set_target_velocity(velocity_factor * angular_velocity);
        }
    }

    fn update_electrical_model(&mut self) {
        let mechanical_power = self.arm_torque * self.arm_angular_velocity;
        let electrical_power = match self.efficiency {
            ServoEfficiency::Ideal => mechanical_power,
            // With backlash torque and velocity may disagree in sign; a real
            // servo doesn't feed that power back into the supply.
            ServoEfficiency::Factor(factor) => mechanical_power.max(0.0) / factor,
            ServoEfficiency::TorqueEfficacy(efficacy) => {
                if self.arm_torque.signum() == self.arm_angular_velocity.signum() {
                    self.arm_torque.abs() / efficacy
                } else {
                    0.0
                }
            }
        };
        self.current = if self.voltage != 0.0 {
            electrical_power / self.voltage
        } else {
            0.0
        };
        self.resistance = if self.current != 0.0 {
            self.voltage / self.current
        } else {
            f64::INFINITY
        };
        self.power_loss = electrical_power - mechanical_power;
    }
}

impl JointModel for AngularServoConstraint {
    fn name(&self) -> &str {
        "angular servo"
    }

    fn bodies(&self) -> (BodyId, BodyId) {
        self.motor.bodies()
    }

    fn initialize_step(&mut self, ctx: &JointContext<'_>, dt: f64) {
        if !self.failed && !ABSOLUTE_MAXIMUM_VOLTAGE.includes(self.voltage) {
            warn!("servo supply {:.2} V out of range, servo destroyed", self.voltage);
            self.failed = true;
            self.resistance = FAILED_RESISTANCE;
        }
        if self.failed {
            self.motor.set_max_torque(0.0);
            return;
        }
        let (b1, b2) = self.motor.bodies();
        let hinge = ctx.hinge(self.motor.hinge());
        let rate = relative_rate(
            hinge.a1,
            ctx.body(b1).velocity_moments(),
            ctx.body(b2).velocity_moments(),
        );
        self.update_pid_controller(hinge.angle, rate, dt);
    }

    fn jacobian(&mut self, ctx: &JointContext<'_>, dt: f64) -> Jacobian {
        self.motor.jacobian(ctx, dt)
    }

    fn calculated_constraint_forces(
        &mut self,
        ctx: &JointContext<'_>,
        forces: &ConstraintForces,
        _dt: f64,
    ) {
        if self.failed {
            return;
        }
        let (b1, b2) = self.motor.bodies();
        let axis = ctx.hinge(self.motor.hinge()).a1;
        self.arm_angular_velocity =
            relative_rate(axis, ctx.solved_velocity(b1), ctx.solved_velocity(b2));
        self.arm_torque = axis.dot(&forces.body_2.torque);
        self.update_electrical_model();
    }

    fn breaks_under(&self, forces: &ConstraintForces, limits: &BreakingLimits) -> bool {
        self.failed || limits.exceeded_by(forces)
    }
}

/// Angular velocity of body 2 relative to body 1 about `axis`, rad/s.
fn relative_rate(axis: na::Vector3<f64>, vm_1: &VelocityMoments, vm_2: &VelocityMoments) -> f64 {
    axis.dot(&(vm_2.angular_velocity - vm_1.angular_velocity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::nature::MassMoments;

    fn servo() -> AngularServoConstraint {
        let mut system = System::new();
        let a = system.add_body(Body::new(MassMoments::cube(1.0, 0.1).unwrap()));
        let b = system.add_body(Body::new(MassMoments::cube(1.0, 0.1).unwrap()));
        let hinge = system.add_hinge(a, b, na::Vector3::zeros(), na::Vector3::z());
        AngularServoConstraint::standard(&system, hinge, 1.0)
    }

    #[test]
    fn setpoint_is_clamped_and_follows_orientation() {
        let mut servo = servo();
        servo.set_setpoint(120_f64.to_radians());
        assert!((servo.setpoint() - 90_f64.to_radians()).abs() < 1e-12);

        servo.set_setpoint(30_f64.to_radians());
        servo.set_orientation(ServoOrientation::Reverse);
        assert!((servo.setpoint() + 30_f64.to_radians()).abs() < 1e-12);
        servo.set_orientation(ServoOrientation::Normal);
        assert!((servo.setpoint() - 30_f64.to_radians()).abs() < 1e-12);
    }

    #[test]
    fn holds_inside_backlash() {
        let mut servo = servo();
        servo.set_setpoint(0.1);
        servo.update_pid_controller(0.1 + 0.2_f64.to_radians(), 1.0, 1e-3);
        assert_eq!(servo.motor().target_velocity(), 0.0);
        assert!(servo.motor().max_torque() > 0.0);

        servo.update_pid_controller(0.0, 0.0, 1e-3);
        assert!(servo.motor().target_velocity() > 0.0);
    }
}
