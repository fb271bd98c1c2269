//! PID regulator for the relay duty cycle.
//!
//! - `f32` math
//! - One update per elapsed second; the 1 s tick interval is implicit in
//!   the integral and derivative terms
//! - Output clamped to 0..=100; the relay has no cooling authority, so
//!   negative demand clamps to 0
//! - Anti-windup via integral clamping: the accumulator is bounded so its
//!   term alone stays inside the output span; unconditional accumulation
//!   would overshoot badly after a long stretch of saturated output.

use crate::ReflowParameters;

const OUT_MIN: f32 = 0.0;
const OUT_MAX: f32 = 100.0;

#[derive(Debug, Clone)]
pub struct PidController {
    kp: f32,
    ki: f32,
    kd: f32,
    last_error: f32,
    integral: f32,
}

impl PidController {
    pub fn new(params: ReflowParameters) -> Self {
        Self {
            kp: params.kp,
            ki: params.ki,
            kd: params.kd,
            last_error: 0.0,
            integral: 0.0,
        }
    }

    /// Replace the gains and clear accumulated state. Stale windup must
    /// not be carried across a retune.
    pub fn set_gains(&mut self, params: ReflowParameters) {
        self.kp = params.kp;
        self.ki = params.ki;
        self.kd = params.kd;
        self.reset();
    }

    pub fn gains(&self) -> ReflowParameters {
        ReflowParameters {
            kp: self.kp,
            ki: self.ki,
            kd: self.kd,
        }
    }

    /// Clear integral and derivative memory. Invoked at the start of
    /// every fresh run.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
    }

    /// Run one compute step against the current setpoint and measurement,
    /// returning the relay duty percentage.
    pub fn update(&mut self, setpoint: f32, measurement: f32) -> u8 {
        let error = setpoint - measurement;

        self.integral += error;
        if self.ki > 0.0 {
            self.integral = self.integral.clamp(OUT_MIN / self.ki, OUT_MAX / self.ki);
        }

        let derivative = error - self.last_error;
        self.last_error = error;

        let raw = self.kp * error + self.ki * self.integral + self.kd * derivative;
        raw.clamp(OUT_MIN, OUT_MAX) as u8
    }
}
