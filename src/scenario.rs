//! Demo scenarios and the fixed-step physics driver.

use std::time::Duration;

use anyhow::{Result, ensure};
use bevy::log::debug;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use sim_physics::nature::STANDARD_GRAVITY;
use sim_physics::{
    AngularServoConstraint, Atmosphere, Body, FixedConstraint, ForceContributor, ForceMoments,
    ForceTorque, HingeConstraint, ImpulseSolver, MassMoments, Placement, SolverSettings, System,
};

/// Pulls down along −y with standard gravity.
struct Weight;

impl ForceContributor for Weight {
    fn force_moments(&mut self, body: &Body, _: Option<&dyn Atmosphere>, _: f64) -> ForceMoments {
        let mass = body.mass_moments().mass();
        ForceMoments::from_force(na::Vector3::new(0.0, -mass * STANDARD_GRAVITY, 0.0))
    }
}

/// Constant world force, e.g. thrust.
struct Thrust(na::Vector3<f64>);

impl ForceContributor for Thrust {
    fn force_moments(&mut self, _: &Body, _: Option<&dyn Atmosphere>, _: f64) -> ForceMoments {
        ForceMoments::from_force(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioKind {
    /// A 10 kg craft carrying a 1 kg payload on a fixed joint, thrust
    /// balancing both weights.
    Hover,
    /// A standard servo swinging a light arm on a heavy base.
    Servo,
}

#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub kind: ScenarioKind,
    /// s
    pub time_step: f64,
    /// s
    pub duration: f64,
    /// s
    pub report_interval: f64,
    /// Servo target angle, degrees.
    pub servo_setpoint: f64,
    /// V
    pub servo_voltage: f64,
    pub solver: SolverSettings,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self::servo()
    }
}

impl ScenarioConfig {
    pub fn hover() -> Self {
        Self {
            kind: ScenarioKind::Hover,
            time_step: 0.01,
            duration: 5.0,
            report_interval: 1.0,
            servo_setpoint: 0.0,
            servo_voltage: 6.0,
            solver: SolverSettings::default(),
        }
    }

    pub fn servo() -> Self {
        Self {
            kind: ScenarioKind::Servo,
            time_step: 0.001,
            duration: 2.0,
            report_interval: 0.25,
            servo_setpoint: 45.0,
            servo_voltage: 6.0,
            solver: SolverSettings {
                required_precision: Some(ForceTorque::new(1e-6, 1e-6)),
                ..SolverSettings::default()
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.time_step.is_finite() && self.time_step > 0.0,
            "time step must be positive, got {}",
            self.time_step
        );
        ensure!(
            self.duration.is_finite() && self.duration >= self.time_step,
            "duration must cover at least one step, got {}",
            self.duration
        );
        ensure!(
            self.report_interval > 0.0,
            "report interval must be positive, got {}",
            self.report_interval
        );
        self.solver.validate()?;
        Ok(())
    }

    pub fn fixed_step(&self) -> Duration {
        Duration::from_secs_f64(self.time_step)
    }

    /// The timestep as the scheduler delivers it.
    pub fn dt(&self) -> f64 {
        self.fixed_step().as_secs_f64()
    }

    /// Fresh system in the scenario's initial state.
    pub fn build(&self) -> Result<System> {
        let mut system = System::new();
        match self.kind {
            ScenarioKind::Hover => {
                let lift = na::Vector3::new(0.0, 11.0 * STANDARD_GRAVITY, 0.0);
                let craft = system.add_body(
                    Body::new(MassMoments::cube(10.0, 0.2)?)
                        .with_label("craft")
                        .with_contributor(Weight)
                        .with_contributor(Thrust(lift)),
                );
                let payload = system.add_body(
                    Body::new(MassMoments::cube(1.0, 0.1)?)
                        .with_label("payload")
                        .with_placement(Placement::at(na::Vector3::new(0.0, -0.5, 0.0)))
                        .with_contributor(Weight),
                );
                let joint = FixedConstraint::new(&system, craft, payload);
                system.add_constraint(joint);
            }
            ScenarioKind::Servo => {
                let base = system.add_body(
                    Body::new(MassMoments::cube(100.0, 0.5)?).with_label("base"),
                );
                let arm = system.add_body(
                    Body::new(MassMoments::cuboid(0.02, na::Vector3::new(0.1, 0.02, 0.02))?)
                        .with_label("arm")
                        .with_placement(Placement::at(na::Vector3::new(0.05, 0.0, 0.0))),
                );
                let hinge = system.add_hinge(base, arm, na::Vector3::zeros(), na::Vector3::z());
                system.add_constraint(HingeConstraint::new(&system, hinge));
                let mut servo = AngularServoConstraint::standard(&system, hinge, 1.0);
                servo.set_voltage(self.servo_voltage);
                servo.set_setpoint(self.servo_setpoint.to_radians());
                system.add_constraint(servo);
            }
        }
        Ok(system)
    }
}

/// How far the run has got.
#[derive(Resource, Debug, Default)]
pub struct Progress {
    pub steps: usize,
    /// s
    pub elapsed: f64,
    pub unconverged_steps: usize,
}

pub struct ScenarioPlugin {
    pub config: ScenarioConfig,
}

impl Plugin for ScenarioPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.config.clone());
        app.init_resource::<Progress>();
        app.add_systems(FixedUpdate, step_physics);
    }
}

/// Advance the physics by one fixed step.
pub fn step_physics(
    time: Res<Time>,
    mut system: ResMut<System>,
    mut solver: ResMut<ImpulseSolver>,
    mut progress: ResMut<Progress>,
) {
    let dt = time.delta_secs_f64();
    let details = solver.evolve(&mut system, dt);
    if !details.converged {
        progress.unconverged_steps += 1;
        debug!(
            "step {} did not converge in {} iterations, residual {:?}",
            progress.steps, details.iterations_run, details.residual
        );
    }
    progress.steps += 1;
    progress.elapsed += dt;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scenarios_are_valid() {
        for config in [ScenarioConfig::hover(), ScenarioConfig::servo()] {
            config.validate().unwrap();
            let system = config.build().unwrap();
            assert_eq!(system.bodies().len(), 2);
        }
    }

    #[test]
    fn config_from_json() {
        let config: ScenarioConfig =
            serde_json::from_str(r#"{"kind":"Hover","duration":1.5}"#).unwrap();
        assert_eq!(config.kind, ScenarioKind::Hover);
        assert_eq!(config.duration, 1.5);
        assert_eq!(config.time_step, 0.001);
        config.validate().unwrap();

        let bad = ScenarioConfig {
            time_step: 0.0,
            ..ScenarioConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn hover_stays_put() {
        let config = ScenarioConfig::hover();
        let mut system = config.build().unwrap();
        let mut solver = ImpulseSolver::with_settings(config.solver.clone());
        for _ in 0..100 {
            solver.evolve(&mut system, config.dt());
        }
        for body in system.bodies() {
            assert!(body.velocity_moments().velocity.norm() < 1e-9);
        }
    }
}
