//! Progress reports, the final state dump and the replay check.

use anyhow::{Context, Result, ensure};
use bevy::log::{error, info};
use bevy::prelude::*;
use sim_physics::{ImpulseSolver, System, SystemSnapshot};

use crate::scenario::{Progress, ScenarioConfig, step_physics};

/// CBOR encoding of the initial state.
#[derive(Resource, Debug, Default)]
struct Checkpoint(Vec<u8>);

#[derive(Default)]
pub struct ReportPlugin;

impl Plugin for ReportPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Checkpoint>();
        app.add_systems(Startup, take_checkpoint);
        app.add_systems(FixedUpdate, report_progress.after(step_physics));
        app.add_systems(Update, finish);
    }
}

fn take_checkpoint(
    system: Res<System>,
    mut checkpoint: ResMut<Checkpoint>,
    mut exit: MessageWriter<AppExit>,
) {
    match serde_cbor::to_vec(&system.snapshot()) {
        Ok(bytes) => checkpoint.0 = bytes,
        Err(e) => {
            error!("encoding checkpoint: {e}");
            exit.write(AppExit::error());
        }
    }
}

fn report_progress(
    config: Res<ScenarioConfig>,
    system: Res<System>,
    progress: Res<Progress>,
    mut next_report: Local<f64>,
) {
    if progress.elapsed + 0.5 * config.dt() < *next_report {
        return;
    }
    *next_report += config.report_interval;

    info!(
        "{:?} t={:.3} s: energy {:.6} J, {} unconverged steps",
        config.kind,
        progress.elapsed,
        system.total_energy(),
        progress.unconverged_steps
    );
    for body in system.bodies() {
        let p = body.position();
        info!(
            "  {:8} at ({:+.4}, {:+.4}, {:+.4}) m, |a| {:.3e} m/s²",
            body.label(),
            p.x,
            p.y,
            p.z,
            body.acceleration_moments().acceleration.norm()
        );
    }
    for constraint in system.constraints() {
        let (force, torque) = constraint.forces().max_magnitudes();
        match constraint.kind().as_servo() {
            Some(servo) => {
                let angle = system.hinge_data(servo.motor().hinge()).angle;
                info!(
                    "  {:8} angle {:+.3}°, {:.3} A, {:.4} N·m",
                    constraint.label(),
                    angle.to_degrees(),
                    servo.current(),
                    servo.arm_torque()
                );
            }
            None => info!(
                "  {:8} {:.4} N, {:.4} N·m{}",
                constraint.label(),
                force,
                torque,
                if constraint.broken() { " (broken)" } else { "" }
            ),
        }
    }
}

fn finish(
    config: Res<ScenarioConfig>,
    system: Res<System>,
    progress: Res<Progress>,
    checkpoint: Res<Checkpoint>,
    mut exit: MessageWriter<AppExit>,
) {
    if progress.elapsed + 0.5 * config.dt() < config.duration {
        return;
    }
    match finish_run(&config, &system, &progress, &checkpoint.0) {
        Ok(()) => {
            exit.write(AppExit::Success);
        }
        Err(e) => {
            error!("{:?}: {e:#}", config.kind);
            exit.write(AppExit::error());
        }
    }
}

fn finish_run(
    config: &ScenarioConfig,
    system: &System,
    progress: &Progress,
    checkpoint: &[u8],
) -> Result<()> {
    let snapshot = system.snapshot();
    let json = serde_json::to_string_pretty(&snapshot).context("encoding final state")?;
    info!("{:?} final state after {} steps:\n{json}", config.kind, progress.steps);

    verify_replay(config, checkpoint, progress.steps, &snapshot)?;
    info!("{:?} replay matches bit for bit", config.kind);
    Ok(())
}

/// Rebuild the scenario, restore the initial checkpoint and replay `steps`
/// steps with a fresh solver; the result must encode identically.
fn verify_replay(
    config: &ScenarioConfig,
    checkpoint: &[u8],
    steps: usize,
    expected: &SystemSnapshot,
) -> Result<()> {
    let initial: SystemSnapshot =
        serde_cbor::from_slice(checkpoint).context("decoding checkpoint")?;
    let mut system = config.build()?;
    system.restore(&initial)?;

    let mut solver = ImpulseSolver::with_settings(config.solver.clone());
    let dt = config.dt();
    for _ in 0..steps {
        solver.evolve(&mut system, dt);
    }

    let replayed = serde_cbor::to_vec(&system.snapshot()).context("encoding replay")?;
    let original = serde_cbor::to_vec(expected).context("encoding final state")?;
    ensure!(
        replayed == original,
        "replay of {steps} steps diverged from the original run"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioConfig;

    #[test]
    fn replay_matches_direct_run() {
        let config = ScenarioConfig {
            duration: 0.1,
            ..ScenarioConfig::servo()
        };
        let mut system = config.build().unwrap();
        let checkpoint = serde_cbor::to_vec(&system.snapshot()).unwrap();
        let mut solver = ImpulseSolver::with_settings(config.solver.clone());
        for _ in 0..100 {
            solver.evolve(&mut system, config.dt());
        }
        verify_replay(&config, &checkpoint, 100, &system.snapshot()).unwrap();
        assert!(verify_replay(&config, &checkpoint, 99, &system.snapshot()).is_err());
    }
}
