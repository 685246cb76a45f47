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

//! Online gain tuning by single-gain perturbation.
//!
//! At every window boundary the tuner concludes the experiment in flight
//! (keeping the perturbed gain only if the window's cost beat the baseline),
//! then takes that same window as the baseline for a new experiment on one
//! randomly chosen gain. Once tuning has begun an experiment is always in
//! flight.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cost::{CostWeights, SampleWindow};
use crate::gains::{Gain, GainTriple};

/// Magnitude used in place of a gain that is exactly zero.
const ZERO_GAIN_FALLBACK: f32 = 1.0;

/// An experiment in flight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExperimentRecord {
    pub gain: Gain,
    pub baseline_gains: GainTriple,
    pub baseline_cost: f32,
}

/// How a finished experiment was judged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// The perturbed gain beat the baseline and was kept.
    Accepted {
        gain: Gain,
        cost: f32,
        baseline_cost: f32,
        gains: GainTriple,
    },
    /// The perturbed gain did not beat the baseline and was undone.
    Reverted {
        gain: Gain,
        cost: f32,
        baseline_cost: f32,
    },
}

/// A perturbation applied at a window boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trial {
    pub gain: Gain,
    pub from: f32,
    pub to: f32,
    pub baseline_cost: f32,
}

/// What happened at a window boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuneOutcome {
    /// Judgement of the previous experiment, absent on the first boundary.
    pub verdict: Option<Verdict>,
    pub started: Trial,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TunerStats {
    pub windows: u64,
    pub experiments: u64,
    pub accepted: u64,
    pub reverted: u64,
}

/// Baseline/experiment state machine owning the live gains.
pub struct AdaptiveTuner<R = StdRng> {
    gains: GainTriple,
    weights: CostWeights,
    perturbation_scale: f32,
    experiment: Option<ExperimentRecord>,
    last_cost: f32,
    rng: R,
    stats: TunerStats,
}

impl AdaptiveTuner<StdRng> {
    pub fn new(gains: GainTriple, weights: CostWeights, perturbation_scale: f32) -> Self {
        Self::with_rng(gains, weights, perturbation_scale, StdRng::from_entropy())
    }
}

impl<R: Rng> AdaptiveTuner<R> {
    pub fn with_rng(gains: GainTriple, weights: CostWeights, perturbation_scale: f32, rng: R) -> Self {
        AdaptiveTuner {
            gains,
            weights,
            perturbation_scale,
            experiment: None,
            last_cost: f32::INFINITY,
            rng,
            stats: TunerStats::default(),
        }
    }

    /// Gains the controller should use for the next window.
    pub fn gains(&self) -> &GainTriple {
        &self.gains
    }

    pub fn experiment(&self) -> Option<&ExperimentRecord> {
        self.experiment.as_ref()
    }

    pub fn is_experimenting(&self) -> bool {
        self.experiment.is_some()
    }

    pub fn last_cost(&self) -> f32 {
        self.last_cost
    }

    pub fn stats(&self) -> &TunerStats {
        &self.stats
    }

    /// Consume a completed window and advance the state machine.
    ///
    /// The experiment in flight, if any, is judged on the window's cost and
    /// the next one starts from the resulting gains with that cost as its
    /// baseline. The window is cleared so the next one starts fresh.
    pub fn evaluate(&mut self, window: &mut SampleWindow) -> TuneOutcome {
        let cost = self.weights.cost(window);
        self.stats.windows += 1;

        let verdict = self
            .experiment
            .take()
            .map(|record| self.conclude(record, cost));
        let started = self.start_experiment(cost);

        window.clear();
        TuneOutcome { verdict, started }
    }

    fn conclude(&mut self, record: ExperimentRecord, cost: f32) -> Verdict {
        // Strict comparison: a tie keeps the baseline
        if cost < record.baseline_cost {
            self.last_cost = cost;
            self.stats.accepted += 1;
            Verdict::Accepted {
                gain: record.gain,
                cost,
                baseline_cost: record.baseline_cost,
                gains: self.gains,
            }
        } else {
            self.gains = record.baseline_gains;
            self.stats.reverted += 1;
            Verdict::Reverted {
                gain: record.gain,
                cost,
                baseline_cost: record.baseline_cost,
            }
        }
    }

    fn start_experiment(&mut self, baseline_cost: f32) -> Trial {
        self.last_cost = baseline_cost;
        let baseline_gains = self.gains;

        let gain = Gain::ALL[self.rng.gen_range(0..Gain::ALL.len())];
        let from = baseline_gains.get(gain);
        let to = self.perturb(from);
        self.gains.set(gain, to);

        self.experiment = Some(ExperimentRecord {
            gain,
            baseline_gains,
            baseline_cost,
        });
        self.stats.experiments += 1;

        Trial {
            gain,
            from,
            to: self.gains.get(gain),
            baseline_cost,
        }
    }

    /// Trial value for one gain, never negative.
    ///
    /// A zero gain is always stepped up by the fallback magnitude.
    fn perturb(&mut self, value: f32) -> f32 {
        let sign = if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let (magnitude, sign) = if value == 0.0 {
            (ZERO_GAIN_FALLBACK, 1.0)
        } else {
            (value, sign)
        };
        (value + magnitude * self.perturbation_scale * sign).max(0.0)
    }
}
