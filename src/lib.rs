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

//! Cooling fan controller that tunes its own PID gains while running.
//!
//! Every tick the [`pid::PidController`] turns the hottest sensor reading into
//! a fan level. Every `window_size` ticks the [`tuner::AdaptiveTuner`] scores
//! the window with [`cost::CostWeights::cost`], keeps or reverts the
//! single-gain experiment in flight and starts the next one. Accepted gains
//! are written to a [`gains::GainStore`] so learning survives restarts.

pub mod config;
pub mod control;
pub mod cost;
pub mod error;
pub mod gains;
pub mod hardware;
pub mod logging;
pub mod pid;
pub mod shutdown;
pub mod tuner;

pub use config::{Config, ConfigError};
pub use control::{ControlEngine, Daemon, TickReport};
pub use cost::{CostWeights, SampleWindow};
pub use error::{FanError, Result};
pub use gains::{initialize_gains, Gain, GainStore, GainTriple, JsonGainStore};
pub use hardware::{FanHardware, ManualMode};
pub use pid::{ControlState, PidController};
pub use tuner::{AdaptiveTuner, ExperimentRecord, Trial, TuneOutcome, Verdict};
