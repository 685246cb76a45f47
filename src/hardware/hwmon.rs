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

//! Linux hwmon sysfs backend.
//!
//! Sensors are `tempN_input` files holding millidegrees Celsius. The fan is a
//! `pwmN` file taking raw duty values 0-255, with its control mode in the
//! sibling `pwmN_enable` file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FanError, FanMode, Result};
use crate::hardware::{parse_reading, FanHardware};

const PWM_MAX: u32 = 255;
const ENABLE_MANUAL: &str = "1";
const ENABLE_AUTOMATIC: &str = "2";

pub struct HwmonFan {
    pwm_path: PathBuf,
    enable_path: PathBuf,
}

impl HwmonFan {
    /// Drive the fan behind a `pwmN` sysfs file.
    pub fn new(pwm_path: impl Into<PathBuf>) -> Self {
        let pwm_path = pwm_path.into();
        let mut enable = pwm_path.clone().into_os_string();
        enable.push("_enable");
        HwmonFan {
            pwm_path,
            enable_path: PathBuf::from(enable),
        }
    }

    pub fn pwm_path(&self) -> &Path {
        &self.pwm_path
    }

    fn write_mode(&self, mode: FanMode) -> Result<()> {
        let value = match mode {
            FanMode::Manual => ENABLE_MANUAL,
            FanMode::Automatic => ENABLE_AUTOMATIC,
        };
        fs::write(&self.enable_path, value).map_err(|e| FanError::ModeSwitch {
            actuator: self.enable_path.display().to_string(),
            mode,
            reason: e.to_string(),
        })
    }
}

/// Convert a percent level to a raw duty value.
fn level_to_raw(level: u32) -> u32 {
    (level.min(100) * PWM_MAX + 50) / 100
}

impl FanHardware for HwmonFan {
    fn check_privileges(&self) -> Result<()> {
        let uid = rustix::process::geteuid();
        if uid.is_root() {
            Ok(())
        } else {
            Err(FanError::Privilege(format!(
                "writing {} requires root, running as uid {}",
                self.pwm_path.display(),
                uid.as_raw()
            )))
        }
    }

    fn read_temperature(&mut self, sensor: &str) -> Result<f32> {
        let raw = fs::read_to_string(sensor).map_err(|e| FanError::SensorRead {
            sensor: sensor.to_string(),
            reason: e.to_string(),
        })?;
        let millidegrees = parse_reading(sensor, &raw)?;
        Ok(millidegrees / 1000.0)
    }

    fn set_actuation(&mut self, level: u32) -> Result<()> {
        let raw = level_to_raw(level);
        tracing::trace!(level, raw, "writing pwm duty");
        fs::write(&self.pwm_path, raw.to_string()).map_err(|e| FanError::ActuatorWrite {
            actuator: self.pwm_path.display().to_string(),
            level,
            reason: e.to_string(),
        })
    }

    fn enable_manual_mode(&mut self) -> Result<()> {
        self.write_mode(FanMode::Manual)
    }

    fn restore_automatic_mode(&mut self) -> Result<()> {
        self.write_mode(FanMode::Automatic)
    }
}
