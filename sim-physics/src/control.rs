//! PID controller used by the servo constraint.

use serde::{Deserialize, Serialize};

/// Gains of a [`PidController`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidSettings {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

/// Closed interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Symmetric range around zero.
    pub fn symmetric(half_width: f64) -> Self {
        Self::new(-half_width, half_width)
    }

    /// Inverted or NaN bounds don't panic: the lower bound is applied first,
    /// then the upper one, and a NaN bound is ignored.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    /// Both bounds are numbers and `min <= max`.
    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }

    pub fn includes(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn midpoint(&self) -> f64 {
        0.5 * (self.min + self.max)
    }
}

/// Discrete PID controller.
///
/// The error is measured − setpoint and the output drives it back to zero, so
/// a positive error yields a negative output.
///
/// The derivative either comes from the error history or, with
/// [`PidController::process_with_rate`], from a measured rate.  Either can be
/// passed through a first order low-pass filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidController {
    settings: PidSettings,
    setpoint: f64,
    integral: f64,
    integral_limit: Option<Range>,
    output_limit: Option<Range>,
    /// s
    #[serde(default)]
    derivative_time_constant: Option<f64>,
    #[serde(default)]
    derivative: f64,
    previous_error: Option<f64>,
    output: f64,
}

impl PidController {
    pub fn new(settings: PidSettings, setpoint: f64) -> Self {
        Self {
            settings,
            setpoint,
            integral: 0.0,
            integral_limit: None,
            output_limit: None,
            derivative_time_constant: None,
            derivative: 0.0,
            previous_error: None,
            output: 0.0,
        }
    }

    pub fn settings(&self) -> &PidSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: PidSettings) {
        self.settings = settings;
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    pub fn set_integral_limit(&mut self, limit: Range) {
        self.integral_limit = Some(limit);
    }

    pub fn set_output_limit(&mut self, limit: Range) {
        self.output_limit = Some(limit);
    }

    /// Low-pass the derivative with time constant `time_constant`, s.
    /// `None` uses the raw derivative.
    pub fn set_derivative_filter(&mut self, time_constant: Option<f64>) {
        self.derivative_time_constant = time_constant.filter(|t| t.is_finite() && *t > 0.0);
    }

    /// Derivative term input after filtering, error units per second.
    pub fn derivative(&self) -> f64 {
        self.derivative
    }

    pub fn output(&self) -> f64 {
        self.output
    }

    /// Forget the integral and the derivative history.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.derivative = 0.0;
        self.previous_error = None;
        self.output = 0.0;
    }

    /// Feed a measurement taken `dt` after the previous one and return the
    /// new output.
    pub fn process(&mut self, measured: f64, dt: f64) -> f64 {
        let error = measured - self.setpoint;
        let rate = match self.previous_error {
            Some(previous) if dt > 0.0 => (error - previous) / dt,
            _ => 0.0,
        };
        self.update(error, rate, dt)
    }

    /// Like [`PidController::process`], with the derivative taken from
    /// `rate`, the measured rate of change of `measured`.  Unlike a difference
    /// of errors this doesn't kick when the setpoint moves.
    pub fn process_with_rate(&mut self, measured: f64, rate: f64, dt: f64) -> f64 {
        self.update(measured - self.setpoint, rate, dt)
    }

    fn update(&mut self, error: f64, rate: f64, dt: f64) -> f64 {
        self.integral += error * dt;
        if let Some(limit) = self.integral_limit {
            self.integral = limit.clamp(self.integral);
        }
        let rate = if rate.is_finite() { rate } else { 0.0 };
        self.derivative = match self.derivative_time_constant {
            Some(tau) if dt > 0.0 => self.derivative + (rate - self.derivative) * dt / (tau + dt),
            _ => rate,
        };
        self.previous_error = Some(error);

        let s = &self.settings;
        let mut output = -(s.p * error + s.i * self.integral + s.d * self.derivative);
        if let Some(limit) = self.output_limit {
            output = limit.clamp(output);
        }
        self.output = output;
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proportional_output_opposes_error() {
        let mut pid = PidController::new(PidSettings { p: 2.0, i: 0.0, d: 0.0 }, 1.0);
        assert_eq!(pid.process(0.0, 0.1), 2.0);
        assert_eq!(pid.process(1.5, 0.1), -1.0);
    }

    #[test]
    fn output_and_integral_are_clamped() {
        let mut pid = PidController::new(PidSettings { p: 0.0, i: 1.0, d: 0.0 }, 0.0);
        pid.set_integral_limit(Range::symmetric(0.5));
        pid.set_output_limit(Range::symmetric(0.25));
        for _ in 0..100 {
            pid.process(-1.0, 0.1);
        }
        // Integral saturates at -0.5, output at +0.25.
        assert_eq!(pid.output(), 0.25);
        pid.set_output_limit(Range::symmetric(10.0));
        assert_eq!(pid.process(0.0, 0.1), 0.5);
    }

    #[test]
    fn derivative_uses_error_history() {
        let mut pid = PidController::new(PidSettings { p: 0.0, i: 0.0, d: 1.0 }, 0.0);
        assert_eq!(pid.process(1.0, 0.5), 0.0);
        assert_eq!(pid.process(2.0, 0.5), -2.0);
        pid.reset();
        assert_eq!(pid.process(5.0, 0.5), 0.0);
    }

    #[test]
    fn filtered_rate_derivative() {
        let mut pid = PidController::new(PidSettings { p: 0.0, i: 0.0, d: 1.0 }, 0.0);
        assert_eq!(pid.process_with_rate(0.0, 2.0, 0.1), -2.0);

        // Half of the change gets through when dt equals the time constant.
        pid.reset();
        pid.set_derivative_filter(Some(0.1));
        assert_eq!(pid.process_with_rate(0.0, 2.0, 0.1), -1.0);
        assert_eq!(pid.process_with_rate(0.0, 2.0, 0.1), -1.5);
        assert!(pid.process_with_rate(0.0, f64::NAN, 0.1).is_finite());
    }

    #[test]
    fn inverted_range_does_not_panic() {
        let range = Range::new(1.0, -1.0);
        assert!(!range.is_valid());
        assert_eq!(range.clamp(0.0), -1.0);
        assert!(!Range::new(f64::NAN, 1.0).is_valid());
        assert_eq!(Range::new(f64::NAN, 1.0).clamp(5.0), 1.0);
    }
}
