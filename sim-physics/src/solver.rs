//! Impulse-based solver advancing a [`System`] by one fixed timestep.
//!
//! Each call to [`ImpulseSolver::evolve`] runs, in order:
//!
//! 1. fresh per-body scratch (inverse mass, world inverse inertia, velocity),
//! 2. reset of the frame precalculations,
//! 3. the gravity pass,
//! 4. the external force pass (contributors, one-shot impulses, gyroscopic
//!    torque),
//! 5. the Gauss–Seidel relaxation over all active constraints, in
//!    registration order,
//! 6. acceptance of the constraint forces (breakage) and accelerations,
//! 7. semi-implicit Euler integration,
//! 8. renormalization of one body's orientation, round robin,
//! 9. another precalculation reset, so joint geometry read between steps
//!    matches the new poses.

use std::fmt;

use bevy::log::{trace, warn};
use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::attitude::gyroscopic_torque;
use crate::body::Body;
use crate::constraint::Constraint;
use crate::error::{PhysicsError, PhysicsResult};
use crate::nature::{AccelerationMoments, ForceMoments, G, VelocityMoments, length_limited};
use crate::system::System;

/// Separations are floored to this in the gravity pass, m.
pub const MINIMUM_DISTANCE: f64 = 1e-9;

/// Below this separation the direction between two bodies is meaningless and
/// an arbitrary one is used, m.
pub const ZERO_DISTANCE: f64 = 1e-15;

/// Default cap on relaxation passes per step.
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

/// A force and a torque magnitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ForceTorque {
    /// N
    pub force: f64,
    /// N·m
    pub torque: f64,
}

impl ForceTorque {
    pub fn new(force: f64, torque: f64) -> Self {
        Self { force, torque }
    }

    fn max(self, other: Self) -> Self {
        Self::new(self.force.max(other.force), self.torque.max(other.torque))
    }

    fn within(&self, required: &ForceTorque) -> bool {
        self.force <= required.force && self.torque <= required.torque
    }
}

impl fmt::Display for ForceTorque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:e} N, {:e} N·m", self.force, self.torque)
    }
}

/// Clamps applied during integration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    /// N
    pub max_force: f64,
    /// N·m
    pub max_torque: f64,
    /// m/s
    pub max_velocity: f64,
    /// rad/s
    pub max_angular_velocity: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_force: 1e3,
            max_torque: 1e3,
            max_velocity: 1e3,
            max_angular_velocity: 1e3,
        }
    }
}

/// Solver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub max_iterations: usize,
    /// Largest change of any constraint force between two relaxation passes
    /// still considered converged.  Without it one pass is always enough.
    pub required_precision: Option<ForceTorque>,
    pub limits: Option<Limits>,
    /// Seed each step's convergence test with the previous step's forces.
    pub warm_starting: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            required_precision: None,
            limits: None,
            warm_starting: true,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> PhysicsResult<()> {
        if self.max_iterations == 0 {
            return Err(PhysicsError::InvalidSettings(
                "max_iterations must be at least 1".into(),
            ));
        }
        if let Some(p) = &self.required_precision {
            if !(p.force >= 0.0 && p.torque >= 0.0) {
                return Err(PhysicsError::InvalidSettings(format!(
                    "required precision must be non-negative, got {p}"
                )));
            }
        }
        if let Some(l) = &self.limits {
            let all = [l.max_force, l.max_torque, l.max_velocity, l.max_angular_velocity];
            if all.iter().any(|v| !(*v >= 0.0)) {
                return Err(PhysicsError::InvalidSettings(
                    "limits must be non-negative".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Outcome of one [`ImpulseSolver::evolve`] call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvolutionDetails {
    pub iterations_run: usize,
    pub converged: bool,
    /// Largest force and torque change in the last pass, when a precision is
    /// configured.
    pub residual: Option<ForceTorque>,
}

/// Per-body scratch for one step.
#[derive(Debug, Clone)]
pub struct BodyFrameCache {
    active: bool,
    inverse_mass: f64,
    /// World frame.
    inverse_inertia: na::Matrix3<f64>,
    gravitational: ForceMoments,
    /// Contributors, one-shot impulses and the gyroscopic torque.
    external: ForceMoments,
    constraint: ForceMoments,
    /// Velocity at the start of the step.
    initial_velocity: VelocityMoments,
    /// Velocity with gravity and external forces applied.
    base_velocity: VelocityMoments,
    /// Velocity with every force found so far applied.
    velocity: VelocityMoments,
}

impl BodyFrameCache {
    pub(crate) fn prepare(body: &Body) -> Self {
        let mass_moments = body.mass_moments();
        let vm = *body.velocity_moments();
        let gyroscopic = gyroscopic_torque(&body.world_inertia(), &vm.angular_velocity);
        Self {
            active: !body.broken(),
            inverse_mass: 1.0 / mass_moments.mass(),
            inverse_inertia: body.world_inverse_inertia(),
            gravitational: ForceMoments::zero(),
            external: ForceMoments::from_torque(gyroscopic),
            constraint: ForceMoments::zero(),
            initial_velocity: vm,
            base_velocity: vm,
            velocity: vm,
        }
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn inverse_mass(&self) -> f64 {
        self.inverse_mass
    }

    pub fn inverse_inertia(&self) -> &na::Matrix3<f64> {
        &self.inverse_inertia
    }

    /// Predicted end-of-step velocity given the forces found so far.
    pub fn velocity_moments(&self) -> &VelocityMoments {
        &self.velocity
    }

    pub fn gravitational_forces(&self) -> &ForceMoments {
        &self.gravitational
    }

    pub fn external_forces(&self) -> &ForceMoments {
        &self.external
    }

    pub fn constraint_forces(&self) -> &ForceMoments {
        &self.constraint
    }

    fn acceleration_for(&self, forces: &ForceMoments) -> AccelerationMoments {
        AccelerationMoments::new(
            forces.force * self.inverse_mass,
            self.inverse_inertia * forces.torque,
        )
    }

    /// Fold gravity and external forces into the base velocity once; the
    /// relaxation reuses it every pass.
    fn precompute(&mut self, dt: f64) {
        let fixed = self.gravitational + self.external;
        self.base_velocity = self.initial_velocity + self.acceleration_for(&fixed).over(dt);
        self.velocity = self.base_velocity;
    }

    fn add_constraint_forces(&mut self, delta: ForceMoments, dt: f64) {
        self.constraint += delta;
        self.velocity = self.base_velocity + self.acceleration_for(&self.constraint).over(dt);
    }

    fn total_forces(&self) -> ForceMoments {
        self.gravitational + self.external + self.constraint
    }
}

/// Gravitational force on `body_1` from `body_2`, N.
///
/// Coincident bodies are pushed apart along +x at the minimum distance rather
/// than producing infinities.
pub fn gravitational_force(body_1: &Body, body_2: &Body) -> na::Vector3<f64> {
    let r = body_2.position() - body_1.position();
    let distance = r.norm();
    let (direction, distance) = if distance < ZERO_DISTANCE {
        (na::Vector3::x(), MINIMUM_DISTANCE)
    } else {
        (r / distance, distance.max(MINIMUM_DISTANCE))
    };
    let m1 = body_1.mass_moments().mass();
    let m2 = body_2.mass_moments().mass();
    direction * (G * m1 * m2 / (distance * distance))
}

/// Advances a [`System`] with Baumgarte-stabilised sequential impulses.
#[derive(Resource, Debug, Default)]
pub struct ImpulseSolver {
    settings: SolverSettings,
    frames: Vec<BodyFrameCache>,
    processed_frames: u64,
}

impl ImpulseSolver {
    pub fn new(max_iterations: usize) -> Self {
        Self::with_settings(SolverSettings {
            max_iterations,
            ..SolverSettings::default()
        })
    }

    pub fn with_settings(settings: SolverSettings) -> Self {
        Self {
            settings,
            frames: Vec::new(),
            processed_frames: 0,
        }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        self.settings.max_iterations = max_iterations;
    }

    /// Converge until no constraint force changes by more than `force` (N)
    /// and no torque by more than `torque` (N·m) between passes.
    pub fn set_required_precision(&mut self, force: f64, torque: f64) {
        self.settings.required_precision = Some(ForceTorque::new(force, torque));
    }

    pub fn clear_required_precision(&mut self) {
        self.settings.required_precision = None;
    }

    pub fn set_limits(&mut self, limits: Option<Limits>) {
        self.settings.limits = limits;
    }

    pub fn set_warm_starting(&mut self, enabled: bool) {
        self.settings.warm_starting = enabled;
    }

    /// Number of completed `evolve` calls.
    pub fn processed_frames(&self) -> u64 {
        self.processed_frames
    }

    /// Scratch of the last step, indexed like the system's bodies.
    pub fn frames(&self) -> &[BodyFrameCache] {
        &self.frames
    }

    /// Advance the system by `dt` seconds.
    ///
    /// Non-convergence is reported in the result, never fatal.  A
    /// non-positive or non-finite `dt` leaves the system untouched.
    pub fn evolve(&mut self, system: &mut System, dt: f64) -> EvolutionDetails {
        if !(dt.is_finite() && dt > 0.0) {
            warn!("ignoring evolve with invalid time step {dt} s");
            return EvolutionDetails {
                iterations_run: 0,
                converged: false,
                residual: None,
            };
        }

        self.frames.clear();
        self.frames
            .extend(system.bodies().iter().map(BodyFrameCache::prepare));
        system.reset_precalculations();
        self.update_gravitational_forces(system);
        self.update_external_forces(system, dt);
        for frame in &mut self.frames {
            frame.precompute(dt);
        }
        self.begin_constraints(system, dt);

        let details = self.relax(system, dt);

        self.accept_constraint_forces(system, dt);
        self.update_accelerations(system);
        self.integrate(system, dt);
        self.renormalize_next(system);
        system.reset_precalculations();
        self.processed_frames += 1;

        trace!(
            "frame {}: {} iterations, converged: {}",
            self.processed_frames, details.iterations_run, details.converged
        );
        details
    }

    /// Like [`evolve`](Self::evolve), but an unreached precision is an error
    /// carrying the achieved and required accuracy.  The step is still taken.
    pub fn evolve_strict(
        &mut self,
        system: &mut System,
        dt: f64,
    ) -> PhysicsResult<EvolutionDetails> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(PhysicsError::InvalidTimeStep(dt));
        }
        let details = self.evolve(system, dt);
        match (details.converged, self.settings.required_precision) {
            (false, Some(required)) => {
                let achieved = details
                    .residual
                    .unwrap_or(ForceTorque::new(f64::INFINITY, f64::INFINITY));
                warn!("relaxation did not converge: achieved {achieved}, required {required}");
                Err(PhysicsError::NotConverged {
                    iterations: details.iterations_run,
                    achieved,
                    required,
                })
            }
            _ => Ok(details),
        }
    }

    fn update_gravitational_forces(&mut self, system: &System) {
        let bodies = system.bodies();
        let gravitating = system.gravitating_bodies();
        let mut pair = |a: usize, b: usize| {
            if !(self.frames[a].active && self.frames[b].active) {
                return;
            }
            let force = gravitational_force(&bodies[a], &bodies[b]);
            self.frames[a].gravitational.force += force;
            self.frames[b].gravitational.force -= force;
        };
        for (i, a) in gravitating.iter().enumerate() {
            for b in &gravitating[i + 1..] {
                pair(a.index(), b.index());
            }
            for b in system.non_gravitating_bodies() {
                pair(a.index(), b.index());
            }
        }
    }

    fn update_external_forces(&mut self, system: &mut System, dt: f64) {
        let (bodies, atmosphere) = system.bodies_and_atmosphere();
        for (body, frame) in bodies.iter_mut().zip(&mut self.frames) {
            let impulses = body.take_applied_impulses();
            if frame.active {
                frame.external += body.contributed_forces(atmosphere, dt) + impulses;
            }
        }
    }

    fn is_active(&self, constraint: &Constraint) -> bool {
        constraint.enabled()
            && !constraint.broken()
            && self.frames[constraint.body_1().index()].active
            && self.frames[constraint.body_2().index()].active
    }

    fn begin_constraints(&mut self, system: &mut System, dt: f64) {
        let warm_starting = self.settings.warm_starting;
        let (ctx, constraints) = system.constraint_parts();
        for constraint in constraints.iter_mut() {
            if self.is_active(constraint) {
                constraint.begin_step(&ctx, dt, warm_starting);
            } else {
                constraint.clear_forces();
            }
        }
    }

    /// Gauss–Seidel passes until every constraint force settles or the
    /// iteration cap is hit.
    fn relax(&mut self, system: &mut System, dt: f64) -> EvolutionDetails {
        let max_iterations = self.settings.max_iterations.max(1);
        let precision = self.settings.required_precision;
        let (ctx, constraints) = system.constraint_parts();
        let active: Vec<bool> = constraints.iter().map(|c| self.is_active(c)).collect();
        let frames = &mut self.frames;

        let mut details = EvolutionDetails {
            iterations_run: 0,
            converged: false,
            residual: None,
        };
        while details.iterations_run < max_iterations {
            details.iterations_run += 1;
            let mut residual = ForceTorque::default();
            let mut precise = true;

            for (constraint, _) in constraints.iter_mut().zip(&active).filter(|(_, a)| **a) {
                let (i1, i2) = (constraint.body_1().index(), constraint.body_2().index());
                let before = constraint.step_forces();
                let reference = constraint.previous_forces();
                let after = constraint.constraint_forces(&ctx, &frames[i1], &frames[i2], dt);

                let delta = after - before;
                frames[i1].add_constraint_forces(delta.body_1, dt);
                frames[i2].add_constraint_forces(delta.body_2, dt);

                if precision.is_some() {
                    match reference {
                        Some(reference) => {
                            let (force, torque) = (after - reference).max_magnitudes();
                            residual = residual.max(ForceTorque::new(force, torque));
                        }
                        None => precise = false,
                    }
                }
            }

            let Some(required) = precision else {
                details.converged = true;
                break;
            };
            details.residual = Some(residual);
            if precise && residual.within(&required) {
                details.converged = true;
                break;
            }
        }
        details
    }

    fn accept_constraint_forces(&mut self, system: &mut System, dt: f64) {
        let (mut ctx, constraints) = system.constraint_parts();
        ctx.frames = &self.frames;
        for constraint in constraints.iter_mut() {
            if self.is_active(constraint) {
                constraint.accept_forces(&ctx, dt);
            }
        }
    }

    fn update_accelerations(&mut self, system: &mut System) {
        let limits = self.settings.limits;
        for (body, frame) in system.bodies_mut().iter_mut().zip(&self.frames) {
            if !frame.active {
                continue;
            }
            let mut total = frame.total_forces();
            if let Some(l) = &limits {
                total.force = length_limited(total.force, l.max_force);
                total.torque = length_limited(total.torque, l.max_torque);
            }
            let except_gravity = total - frame.gravitational;
            body.set_acceleration_moments(
                frame.acceleration_for(&total),
                frame.acceleration_for(&except_gravity),
            );
        }
    }

    fn integrate(&mut self, system: &mut System, dt: f64) {
        let limits = self.settings.limits;
        for (body, frame) in system.bodies_mut().iter_mut().zip(&self.frames) {
            if !frame.active {
                continue;
            }
            let mut vm = frame.initial_velocity + body.acceleration_moments().over(dt);
            if let Some(l) = &limits {
                vm.velocity = length_limited(vm.velocity, l.max_velocity);
                vm.angular_velocity = length_limited(vm.angular_velocity, l.max_angular_velocity);
            }
            body.set_velocity_moments(vm);
            body.placement_mut()
                .advance(&vm.velocity, &vm.angular_velocity, dt);

            if !body.state_is_finite() {
                warn!("body '{}' state became non-finite, marking broken", body.label());
                body.set_broken();
            }
        }
    }

    fn renormalize_next(&mut self, system: &mut System) {
        let count = system.bodies().len();
        if count > 0 {
            let index = (self.processed_frames % count as u64) as usize;
            system.bodies_mut()[index].placement_mut().renormalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyId;
    use crate::constraint::{ConstraintKind, Jacobian, JacobianRow, JointContext, JointModel};
    use crate::nature::MassMoments;
    use crate::placement::Placement;

    fn ball(mass: f64, position: na::Vector3<f64>) -> Body {
        Body::new(MassMoments::sphere(mass, 0.1).unwrap()).with_placement(Placement::at(position))
    }

    /// Drives the relative x velocity of two bodies to `target`.
    struct Pushing {
        bodies: (BodyId, BodyId),
        target: f64,
    }

    impl JointModel for Pushing {
        fn name(&self) -> &str {
            "pushing"
        }

        fn bodies(&self) -> (BodyId, BodyId) {
            self.bodies
        }

        fn jacobian(&mut self, _: &JointContext<'_>, _: f64) -> Jacobian {
            let x = na::Vector3::x();
            let zero = na::Vector3::zeros();
            [JacobianRow::new(-x, zero, x, zero, 0.0).with_target_velocity(self.target)]
                .into_iter()
                .collect()
        }
    }

    /// Two hard constraints demanding opposite velocities never settle.
    fn fighting_pair() -> System {
        let mut system = System::new();
        let a = system.add_body(ball(1.0, na::Vector3::zeros()));
        let b = system.add_body(ball(1.0, na::Vector3::new(1.0, 0.0, 0.0)));
        for target in [1.0, -1.0] {
            system.add_constraint(ConstraintKind::Custom(Box::new(Pushing {
                bodies: (a, b),
                target,
            })));
        }
        system
    }

    #[test]
    fn gravity_is_antisymmetric() {
        let mut system = System::new();
        let a = system.add_gravitating_body(ball(5.0e10, na::Vector3::new(0.3, -1.0, 2.0)));
        let b = system.add_gravitating_body(ball(7.0, na::Vector3::new(-4.0, 0.5, 0.25)));
        let c = system.add_body(ball(1.0, na::Vector3::new(10.0, 0.0, 0.0)));
        let mut solver = ImpulseSolver::default();
        solver.evolve(&mut system, 1e-3);

        let frames = solver.frames();
        let total = frames[a.index()].gravitational.force
            + frames[b.index()].gravitational.force
            + frames[c.index()].gravitational.force;
        assert!(total.norm() < 1e-12 * frames[a.index()].gravitational.force.norm());

        let f_ab = gravitational_force(system.body(a), system.body(b));
        let f_ba = gravitational_force(system.body(b), system.body(a));
        assert!((f_ab + f_ba).norm() <= 1e-15 * f_ab.norm());
    }

    #[test]
    fn coincident_bodies_use_minimum_distance() {
        let a = ball(1.0, na::Vector3::zeros());
        let b = ball(1.0, na::Vector3::zeros());
        let f = gravitational_force(&a, &b);
        assert!(f.iter().all(|c| c.is_finite()));
        assert!((f.x - G / (MINIMUM_DISTANCE * MINIMUM_DISTANCE)).abs() < 1e-6 * f.x);
        assert_eq!(f.y, 0.0);
    }

    #[test]
    fn non_gravitating_bodies_ignore_each_other() {
        let mut system = System::new();
        let a = system.add_body(ball(1e12, na::Vector3::zeros()));
        system.add_body(ball(1e12, na::Vector3::new(1.0, 0.0, 0.0)));
        let mut solver = ImpulseSolver::default();
        solver.evolve(&mut system, 0.01);
        assert_eq!(solver.frames()[a.index()].gravitational.force, na::Vector3::zeros());
    }

    #[test]
    fn one_pass_without_precision() {
        let mut system = fighting_pair();
        let mut solver = ImpulseSolver::new(50);
        let details = solver.evolve(&mut system, 0.01);
        assert_eq!(details.iterations_run, 1);
        assert!(details.converged);
        assert_eq!(details.residual, None);
    }

    #[test]
    fn iteration_cap_is_respected() {
        let mut system = fighting_pair();
        let mut solver = ImpulseSolver::new(7);
        solver.set_required_precision(1e-12, 1e-12);
        for _ in 0..3 {
            let details = solver.evolve(&mut system, 0.01);
            assert_eq!(details.iterations_run, 7);
            assert!(!details.converged);
        }
        assert_eq!(solver.processed_frames(), 3);
    }

    #[test]
    fn strict_evolve_reports_accuracy() {
        let mut system = fighting_pair();
        let mut solver = ImpulseSolver::new(3);
        solver.set_required_precision(1e-12, 1e-12);
        match solver.evolve_strict(&mut system, 0.01) {
            Err(PhysicsError::NotConverged {
                iterations,
                achieved,
                required,
            }) => {
                assert_eq!(iterations, 3);
                assert_eq!(required, ForceTorque::new(1e-12, 1e-12));
                assert!(achieved.force > required.force);
            }
            other => panic!("expected NotConverged, got {other:?}"),
        }
        assert_eq!(
            solver.evolve_strict(&mut system, -1.0),
            Err(PhysicsError::InvalidTimeStep(-1.0))
        );
    }

    #[test]
    fn invalid_time_step_leaves_system_alone() {
        let mut system = System::new();
        let a = system.add_body(ball(1.0, na::Vector3::zeros()).with_velocity_moments(
            VelocityMoments::new(na::Vector3::x(), na::Vector3::zeros()),
        ));
        let mut solver = ImpulseSolver::default();
        for dt in [0.0, -0.1, f64::NAN] {
            let details = solver.evolve(&mut system, dt);
            assert_eq!(details.iterations_run, 0);
        }
        assert_eq!(system.body(a).position(), na::Vector3::zeros());
        assert_eq!(solver.processed_frames(), 0);
    }

    #[test]
    fn impulses_last_one_step() {
        let mut system = System::new();
        let a = system.add_body(ball(2.0, na::Vector3::zeros()));
        system
            .body_mut(a)
            .apply_impulse(ForceMoments::from_force(na::Vector3::new(4.0, 0.0, 0.0)));
        let mut solver = ImpulseSolver::default();
        solver.evolve(&mut system, 0.5);
        assert!((system.body(a).velocity_moments().velocity.x - 1.0).abs() < 1e-12);
        assert!((system.body(a).acceleration_moments().acceleration.x - 2.0).abs() < 1e-12);
        solver.evolve(&mut system, 0.5);
        assert!((system.body(a).velocity_moments().velocity.x - 1.0).abs() < 1e-12);
        // Semi-implicit Euler: position uses the updated velocity.
        assert!((system.body(a).position().x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn limits_clamp_force_and_velocity() {
        let mut system = System::new();
        let a = system.add_body(ball(1.0, na::Vector3::zeros()));
        let mut solver = ImpulseSolver::default();
        solver.set_limits(Some(Limits {
            max_force: 10.0,
            max_velocity: 0.5,
            ..Limits::default()
        }));
        system
            .body_mut(a)
            .apply_impulse(ForceMoments::from_force(na::Vector3::new(0.0, 100.0, 0.0)));
        solver.evolve(&mut system, 0.01);
        assert!((system.body(a).acceleration_moments().acceleration.y - 10.0).abs() < 1e-12);
        for _ in 0..100 {
            system
                .body_mut(a)
                .apply_impulse(ForceMoments::from_force(na::Vector3::new(0.0, 100.0, 0.0)));
            solver.evolve(&mut system, 0.01);
        }
        assert!((system.body(a).velocity_moments().velocity.norm() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn accelerometer_excludes_gravity() {
        let mut system = System::new();
        system.add_gravitating_body(ball(5.972e24, na::Vector3::zeros()));
        let satellite = system.add_body(ball(1.0, na::Vector3::new(0.0, 0.0, 6.371e6)));
        let mut solver = ImpulseSolver::default();
        solver.evolve(&mut system, 0.01);
        let body = system.body(satellite);
        assert!((body.acceleration_moments().acceleration.z + 9.82).abs() < 0.01);
        assert!(body.acceleration_moments_except_gravity().acceleration.norm() < 1e-12);
    }

    #[test]
    fn non_finite_body_is_marked_broken_and_skipped() {
        let mut system = System::new();
        let a = system.add_body(ball(1.0, na::Vector3::zeros()));
        system
            .body_mut(a)
            .apply_impulse(ForceMoments::from_force(na::Vector3::new(f64::NAN, 0.0, 0.0)));
        let mut solver = ImpulseSolver::default();
        solver.evolve(&mut system, 0.01);
        assert!(system.body(a).broken());
        let before = *system.body(a).placement();
        solver.evolve(&mut system, 0.01);
        assert!(!solver.frames()[a.index()].active());
        assert_eq!(before.q_bw, system.body(a).placement().q_bw);
    }

    #[test]
    fn renormalizes_round_robin() {
        let mut system = System::new();
        let skewed = na::UnitQuaternion::new_unchecked(na::Quaternion::new(1.0 + 1e-6, 0.0, 0.0, 0.0));
        let a = system.add_body(ball(1.0, na::Vector3::zeros()));
        let b = system.add_body(ball(1.0, na::Vector3::x()));
        for id in [a, b] {
            system.body_mut(id).placement_mut().q_bw = skewed;
        }
        let mut solver = ImpulseSolver::default();
        solver.evolve(&mut system, 0.01);
        assert!((system.body(a).placement().q_bw.coords.norm() - 1.0).abs() < 1e-15);
        assert!((system.body(b).placement().q_bw.coords.norm() - 1.0).abs() > 1e-7);
        solver.evolve(&mut system, 0.01);
        assert!((system.body(b).placement().q_bw.coords.norm() - 1.0).abs() < 1e-15);
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: SolverSettings =
            serde_json::from_str(r#"{"required_precision":{"force":0.01,"torque":0.001}}"#)
                .unwrap();
        assert_eq!(settings.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert!(settings.warm_starting);
        assert_eq!(settings.required_precision, Some(ForceTorque::new(0.01, 0.001)));
        settings.validate().unwrap();

        let bad = SolverSettings {
            max_iterations: 0,
            ..SolverSettings::default()
        };
        assert!(matches!(bad.validate(), Err(PhysicsError::InvalidSettings(_))));
    }
}
