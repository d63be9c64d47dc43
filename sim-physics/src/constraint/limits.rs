//! One-sided angle and translation limits.
//!
//! A limit contributes nothing while the joint is within its range.  Once the
//! range is exceeded it adds a single row that may only push back towards the
//! range, never pull.

use serde::{Deserialize, Serialize};

use crate::body::BodyId;
use crate::control::Range;
use crate::precalculation::{HingeId, SliderId};
use crate::system::System;

use super::slider::translation_row;
use super::{Jacobian, JacobianRow, JointContext, JointModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitSide {
    Lower,
    Upper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LimitState {
    #[default]
    Inactive,
    Active(LimitSide),
}

impl LimitState {
    fn evaluate(value: f64, range: &Range) -> (Self, f64) {
        if value < range.min {
            (LimitState::Active(LimitSide::Lower), value - range.min)
        } else if value > range.max {
            (LimitState::Active(LimitSide::Upper), value - range.max)
        } else {
            (LimitState::Inactive, 0.0)
        }
    }

    /// Multiplier bounds that only let the row push back into range.
    fn bounds(&self) -> (f64, f64) {
        match self {
            LimitState::Active(LimitSide::Lower) => (0.0, f64::INFINITY),
            LimitState::Active(LimitSide::Upper) => (f64::NEG_INFINITY, 0.0),
            LimitState::Inactive => (0.0, 0.0),
        }
    }
}

/// Keeps a hinge angle within a range, rad.
#[derive(Debug, Clone)]
pub struct AngularLimitsConstraint {
    hinge: HingeId,
    bodies: (BodyId, BodyId),
    range: Range,
    state: LimitState,
}

impl AngularLimitsConstraint {
    pub fn new(system: &System, hinge: HingeId, range: Range) -> Self {
        Self {
            hinge,
            bodies: system.hinge(hinge).bodies(),
            range,
            state: LimitState::Inactive,
        }
    }

    pub fn range(&self) -> &Range {
        &self.range
    }

    pub fn set_range(&mut self, range: Range) {
        self.range = range;
    }

    pub fn state(&self) -> LimitState {
        self.state
    }
}

impl JointModel for AngularLimitsConstraint {
    fn name(&self) -> &str {
        "angular limits"
    }

    fn bodies(&self) -> (BodyId, BodyId) {
        self.bodies
    }

    fn jacobian(&mut self, ctx: &JointContext<'_>, _dt: f64) -> Jacobian {
        let h = ctx.hinge(self.hinge);
        let (state, error) = LimitState::evaluate(h.angle, &self.range);
        self.state = state;
        if state == LimitState::Inactive {
            return Jacobian::empty();
        }
        let (lower, upper) = state.bounds();
        [JacobianRow::angular(h.a1, error).with_bounds(lower, upper)]
            .into_iter()
            .collect()
    }
}

/// Keeps a slider translation within a range, m.
#[derive(Debug, Clone)]
pub struct LinearLimitsConstraint {
    slider: SliderId,
    bodies: (BodyId, BodyId),
    range: Range,
    state: LimitState,
}

impl LinearLimitsConstraint {
    pub fn new(system: &System, slider: SliderId, range: Range) -> Self {
        Self {
            slider,
            bodies: system.slider(slider).bodies(),
            range,
            state: LimitState::Inactive,
        }
    }

    pub fn range(&self) -> &Range {
        &self.range
    }

    pub fn set_range(&mut self, range: Range) {
        self.range = range;
    }

    pub fn state(&self) -> LimitState {
        self.state
    }
}

impl JointModel for LinearLimitsConstraint {
    fn name(&self) -> &str {
        "linear limits"
    }

    fn bodies(&self) -> (BodyId, BodyId) {
        self.bodies
    }

    fn jacobian(&mut self, ctx: &JointContext<'_>, _dt: f64) -> Jacobian {
        let s = ctx.slider(self.slider);
        let (state, error) = LimitState::evaluate(s.translation, &self.range);
        self.state = state;
        if state == LimitState::Inactive {
            return Jacobian::empty();
        }
        let (lower, upper) = state.bounds();
        [translation_row(s.axis, &s.r1, &s.u, error).with_bounds(lower, upper)]
            .into_iter()
            .collect()
    }
}
