//! Headless rigid body scenario runner.
//!
//! Each demo scenario is advanced on a fixed timestep inside a bevy `App`
//! with no rendering.  At the end the final state is dumped and a replay from
//! the initial checkpoint has to reproduce it exactly.
//!
//! Y is up in the demo scenarios.

// Recommended alias.
extern crate nalgebra as na;

use std::time::Duration;

use anyhow::{Result, bail};
use bevy::{app::ScheduleRunnerPlugin, log::LogPlugin, prelude::*, time::TimeUpdateStrategy};
use sim_physics::ImpulseSolver;

mod report;
mod scenario;

use report::ReportPlugin;
use scenario::{ScenarioConfig, ScenarioPlugin};

fn main() -> Result<()> {
    for (i, config) in [ScenarioConfig::hover(), ScenarioConfig::servo()]
        .into_iter()
        .enumerate()
    {
        // The global log subscriber can only be installed once per process.
        run_scenario(config, i == 0)?;
    }
    Ok(())
}

fn run_scenario(config: ScenarioConfig, install_logging: bool) -> Result<()> {
    config.validate()?;
    let system = config.build()?;
    let solver = ImpulseSolver::with_settings(config.solver.clone());
    let step = config.fixed_step();

    let mut app = App::new();
    app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::ZERO)));
    if install_logging {
        app.add_plugins(LogPlugin::default());
    }
    // One fixed step per frame, independent of wall clock time.
    app.insert_resource(TimeUpdateStrategy::ManualDuration(step))
        .insert_resource(Time::<Fixed>::from_duration(step))
        .insert_resource(system)
        .insert_resource(solver)
        .add_plugins((ScenarioPlugin { config }, ReportPlugin));

    match app.run() {
        AppExit::Success => Ok(()),
        AppExit::Error(code) => bail!("scenario failed with exit code {code}"),
    }
}
