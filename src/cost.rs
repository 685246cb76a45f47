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

//! Evaluation window and cost function

use std::collections::VecDeque;

use serde::Deserialize;

/// One control tick as seen by the cost function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub error: f32,      // Temperature minus target (°C)
    pub level: u32,      // Commanded actuation level
}

/// Fixed-capacity FIFO of the most recent samples.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl SampleWindow {
    /// Create an empty window. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        SampleWindow {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, dropping the oldest once full.
    pub fn push(&mut self, error: f32, level: u32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { error, level });
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
}

/// Fixed weights of the three cost terms.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CostWeights {
    pub error: f32,     // Weight of mean squared error
    pub power: f32,     // Weight of mean actuation level
    pub overshoot: f32, // Weight of mean positive error
}

impl Default for CostWeights {
    fn default() -> Self {
        CostWeights {
            error: 1.0,
            power: 0.05,
            overshoot: 2.0,
        }
    }
}

impl CostWeights {
    /// Reduce a window to a scalar cost; lower is better.
    ///
    /// Squared error penalizes deviation either way, the power term penalizes
    /// fan effort and the overshoot term adds a one-sided penalty for running
    /// hotter than target. An empty window costs `+inf`.
    pub fn cost(&self, window: &SampleWindow) -> f32 {
        if window.is_empty() {
            return f32::INFINITY;
        }
        let n = window.len() as f32;

        let mut squared_error = 0.0;
        let mut actuation = 0.0;
        let mut overshoot = 0.0;
        for sample in window.iter() {
            squared_error += sample.error * sample.error;
            actuation += sample.level as f32;
            overshoot += sample.error.max(0.0);
        }

        self.error * squared_error / n + self.power * actuation / n + self.overshoot * overshoot / n
    }
}
