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

//! Error types for the fan controller

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias using FanError
pub type Result<T> = std::result::Result<T, FanError>;

/// Faults raised at the hardware, persistence and configuration boundaries.
#[derive(Debug, Error)]
pub enum FanError {
    #[error("insufficient privileges: {0}")]
    Privilege(String),

    #[error("failed to read sensor {sensor}: {reason}")]
    SensorRead { sensor: String, reason: String },

    #[error("failed to write level {level} to actuator {actuator}: {reason}")]
    ActuatorWrite {
        actuator: String,
        level: u32,
        reason: String,
    },

    #[error("failed to switch {actuator} to {mode} mode: {reason}")]
    ModeSwitch {
        actuator: String,
        mode: FanMode,
        reason: String,
    },

    #[error("gain store {path}: {reason}")]
    Persistence { path: String, reason: String },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl FanError {
    /// Whether this fault must stop the control loop.
    ///
    /// Persistence is best-effort: the running controller stays correct on its
    /// in-memory gains, so only durability is lost.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FanError::Persistence { .. })
    }
}

/// Fan control mode, used for mode-switch error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanMode {
    Manual,
    Automatic,
}

impl std::fmt::Display for FanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FanMode::Manual => write!(f, "manual"),
            FanMode::Automatic => write!(f, "automatic"),
        }
    }
}
