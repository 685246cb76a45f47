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

//! PID gains and their durable store

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FanError, Result};

/// The controller's tunable parameters. Never negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainTriple {
    pub kp: f32, // Proportional gain
    pub ki: f32, // Integral gain
    pub kd: f32, // Derivative gain
}

impl GainTriple {
    /// Create a gain triple, clamping negative values to zero.
    pub fn new(kp: f32, ki: f32, kd: f32) -> Self {
        GainTriple {
            kp: kp.max(0.0),
            ki: ki.max(0.0),
            kd: kd.max(0.0),
        }
    }

    pub fn get(&self, gain: Gain) -> f32 {
        match gain {
            Gain::Kp => self.kp,
            Gain::Ki => self.ki,
            Gain::Kd => self.kd,
        }
    }

    /// Set one gain. Negative values are stored as zero.
    pub fn set(&mut self, gain: Gain, value: f32) {
        let value = value.max(0.0);
        match gain {
            Gain::Kp => self.kp = value,
            Gain::Ki => self.ki = value,
            Gain::Kd => self.kd = value,
        }
    }

    /// Replace anything that would break the gain invariant.
    ///
    /// Non-finite values fall back to the matching `fallback` gain.
    pub fn sanitized(self, fallback: &GainTriple) -> Self {
        let mut clean = self;
        for gain in Gain::ALL {
            let value = self.get(gain);
            if value.is_finite() {
                clean.set(gain, value);
            } else {
                clean.set(gain, fallback.get(gain));
            }
        }
        clean
    }
}

impl std::fmt::Display for GainTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "kp={:.4} ki={:.4} kd={:.4}", self.kp, self.ki, self.kd)
    }
}

/// Selector for one of the three gains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gain {
    Kp,
    Ki,
    Kd,
}

impl Gain {
    pub const ALL: [Gain; 3] = [Gain::Kp, Gain::Ki, Gain::Kd];

    pub fn name(&self) -> &'static str {
        match self {
            Gain::Kp => "kp",
            Gain::Ki => "ki",
            Gain::Kd => "kd",
        }
    }
}

impl std::fmt::Display for Gain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Durable record of the gain triple.
pub trait GainStore {
    /// Load the stored gains, `Ok(None)` when nothing has been stored yet.
    fn load(&mut self) -> Result<Option<GainTriple>>;

    fn save(&mut self, gains: &GainTriple) -> Result<()>;
}

/// Gain store backed by a flat JSON file: `{"kp": .., "ki": .., "kd": ..}`.
pub struct JsonGainStore {
    path: PathBuf,
}

impl JsonGainStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonGainStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, reason: impl std::fmt::Display) -> FanError {
        FanError::Persistence {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl GainStore for JsonGainStore {
    fn load(&mut self) -> Result<Option<GainTriple>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| self.error(format!("corrupt gain record: {}", e)))
    }

    fn save(&mut self, gains: &GainTriple) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.error(e))?;
            }
        }
        let json = serde_json::to_string_pretty(gains).map_err(|e| self.error(e))?;

        // Write beside the target then rename, so a crash never leaves a torn record
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).map_err(|e| self.error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.error(e))
    }
}

/// Gains for a fresh run: the stored record, or `defaults` persisted at once.
///
/// Persistence faults are logged and never stop startup; a corrupt record
/// falls back to `defaults` as well.
pub fn initialize_gains<S: GainStore>(store: &mut S, defaults: GainTriple) -> GainTriple {
    match store.load() {
        Ok(Some(stored)) => {
            let gains = stored.sanitized(&defaults);
            if gains != stored {
                tracing::warn!(%stored, %gains, "stored gains violated invariants, sanitized");
            }
            tracing::info!(%gains, "loaded stored gains");
            gains
        }
        Ok(None) => {
            tracing::info!(gains = %defaults, "no stored gains, using defaults");
            if let Err(e) = store.save(&defaults) {
                tracing::warn!(error = %e, "failed to persist default gains");
            }
            defaults
        }
        Err(e) => {
            tracing::warn!(error = %e, gains = %defaults, "could not load gains, using defaults");
            defaults
        }
    }
}
