// MIT License
//
// Copyright (c) 2025 Ronan LE MEILLAT for SCTG Development
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! PID evaluator with feed-forward for fan control

use crate::gains::GainTriple;

/// Bound of the accumulated error (anti-windup)
pub const INTEGRAL_LIMIT: f32 = 50.0;

/// Running PID memory
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlState {
    pub integral_error: f32, // Accumulated error, within ±INTEGRAL_LIMIT
    pub previous_error: f32, // Previous error for derivative calculation
}

/// PID controller for cooling fans.
///
/// Error is measured as temperature above target, so a positive error asks for
/// more airflow. Output is an integer actuation level bounded to
/// `[min_level, max_level]`.
#[derive(Debug, Clone)]
pub struct PidController {
    pub setpoint: f32,           // Target temperature
    pub feed_forward_scale: f32, // Level added per °C above target
    min_level: u32,              // Minimum output value
    max_level: u32,              // Maximum output value
    state: ControlState,
}

impl PidController {
    /// Create a new controller. Bounds are swapped if given in reverse.
    pub fn new(setpoint: f32, feed_forward_scale: f32, min_level: u32, max_level: u32) -> Self {
        PidController {
            setpoint,
            feed_forward_scale,
            min_level: min_level.min(max_level),
            max_level: max_level.max(min_level),
            state: ControlState::default(),
        }
    }

    /// Calculate the level to command for the current temperature.
    ///
    /// Called once per tick; updates the integral and derivative memory.
    pub fn compute(&mut self, temperature: f32, gains: &GainTriple) -> u32 {
        if !temperature.is_finite() {
            return self.max_level;
        }
        let error = temperature - self.setpoint;

        // Integral term with anti-windup
        self.state.integral_error =
            (self.state.integral_error + error).clamp(-INTEGRAL_LIMIT, INTEGRAL_LIMIT);

        let derivative = error - self.state.previous_error;
        self.state.previous_error = error;

        // Pre-position the fan in proportion to how far above target we already are
        let feed_forward = self.min_level as f32 + error.max(0.0) * self.feed_forward_scale;

        let output = feed_forward
            + gains.kp * error
            + gains.ki * self.state.integral_error
            + gains.kd * derivative;

        self.clamp_level(output)
    }

    fn clamp_level(&self, output: f32) -> u32 {
        if !output.is_finite() {
            return self.max_level;
        }
        output
            .clamp(self.min_level as f32, self.max_level as f32)
            .round() as u32
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn min_level(&self) -> u32 {
        self.min_level
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_output_within_bounds_for_any_input() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut pid = PidController::new(60.0, 8.0, 20, 100);
        for _ in 0..5_000 {
            let temp = rng.gen_range(-50.0..200.0);
            let gains = GainTriple::new(
                rng.gen_range(0.0..100.0),
                rng.gen_range(0.0..10.0),
                rng.gen_range(0.0..50.0),
            );
            let level = pid.compute(temp, &gains);
            assert!((20..=100).contains(&level), "level {} out of bounds", level);
        }
    }

    #[test]
    fn test_integral_never_leaves_limit() {
        let gains = GainTriple::new(1.0, 1.0, 1.0);
        let mut pid = PidController::new(60.0, 8.0, 0, 100);

        for _ in 0..200 {
            pid.compute(1000.0, &gains);
            assert!(pid.state().integral_error <= INTEGRAL_LIMIT);
        }
        assert_eq!(pid.state().integral_error, INTEGRAL_LIMIT);

        for _ in 0..200 {
            pid.compute(-1000.0, &gains);
            assert!(pid.state().integral_error >= -INTEGRAL_LIMIT);
        }
        assert_eq!(pid.state().integral_error, -INTEGRAL_LIMIT);
    }

    #[test]
    fn test_terms() {
        let mut pid = PidController::new(60.0, 2.0, 0, 100);
        let gains = GainTriple::new(3.0, 0.5, 1.0);

        // error 5: ff = 0 + 5*2 = 10, p = 15, i = 0.5*5 = 2.5, d = 5
        assert_eq!(pid.compute(65.0, &gains), 33);
        assert_eq!(
            *pid.state(),
            ControlState {
                integral_error: 5.0,
                previous_error: 5.0
            }
        );

        // error 2: ff = 4, p = 6, i = 0.5*7 = 3.5, d = -3 -> 10.5 rounds to 11
        assert_eq!(pid.compute(62.0, &gains), 11);
    }

    #[test]
    fn test_steady_state_at_target_is_feed_forward_only() {
        let mut pid = PidController::new(60.0, 8.0, 20, 100);
        let gains = GainTriple::new(5.0, 0.1, 2.0);
        for _ in 0..50 {
            assert_eq!(pid.compute(60.0, &gains), 20);
        }
        assert_eq!(pid.state().integral_error, 0.0);
        assert_eq!(pid.state().previous_error, 0.0);
    }

    #[test]
    fn test_sustained_overheat_pins_max_level() {
        let mut pid = PidController::new(60.0, 8.0, 20, 100);
        for gains in [
            GainTriple::new(0.0, 0.0, 0.0),
            GainTriple::new(5.0, 0.1, 2.0),
            GainTriple::new(0.5, 0.0, 20.0),
        ] {
            for _ in 0..20 {
                assert_eq!(pid.compute(70.0, &gains), 100);
            }
        }
    }

    #[test]
    fn test_non_finite_reading_commands_max() {
        let mut pid = PidController::new(60.0, 8.0, 20, 100);
        assert_eq!(pid.compute(f32::NAN, &GainTriple::new(1.0, 0.0, 0.0)), 100);
        assert_eq!(*pid.state(), ControlState::default());
    }
}
