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

//! Hardware access port for temperature sensing and fan actuation

pub mod hwmon;
#[cfg(feature = "rpi")]
pub mod rpi;
pub mod simulated;

use std::ops::{Deref, DerefMut};

use crate::error::{FanError, Result};

pub use hwmon::HwmonFan;
pub use simulated::{CoolingRig, SimulatedFan};

/// Sensor reads, fan writes and the manual/automatic mode switch.
///
/// Levels passed to [`set_actuation`](FanHardware::set_actuation) are already
/// clamped by the caller. Mode switches must be idempotent.
pub trait FanHardware {
    /// Fail fast when the process cannot drive the hardware.
    fn check_privileges(&self) -> Result<()>;

    /// Temperature of one sensor in °C.
    fn read_temperature(&mut self, sensor: &str) -> Result<f32>;

    fn set_actuation(&mut self, level: u32) -> Result<()>;

    fn enable_manual_mode(&mut self) -> Result<()>;

    fn restore_automatic_mode(&mut self) -> Result<()>;

    /// Hottest reading across `sensors`.
    fn read_max_temperature(&mut self, sensors: &[String]) -> Result<f32> {
        let mut hottest: Option<f32> = None;
        for sensor in sensors {
            let temp = self.read_temperature(sensor)?;
            hottest = Some(hottest.map_or(temp, |h| h.max(temp)));
        }
        hottest.ok_or_else(|| FanError::SensorRead {
            sensor: "<none>".to_string(),
            reason: "no sensors configured".to_string(),
        })
    }
}

/// Parse a sensor reading, rejecting anything that is not a finite number.
pub(crate) fn parse_reading(sensor: &str, raw: &str) -> Result<f32> {
    let value: f32 = raw.trim().parse().map_err(|_| FanError::SensorRead {
        sensor: sensor.to_string(),
        reason: format!("non-numeric reading {:?}", raw.trim()),
    })?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FanError::SensorRead {
            sensor: sensor.to_string(),
            reason: format!("non-finite reading {}", value),
        })
    }
}

/// Manual fan control held for the guard's lifetime.
///
/// Automatic mode is restored when the guard is released or dropped, which
/// covers early returns, faults and unwinding.
pub struct ManualMode<'a, H: FanHardware> {
    hardware: &'a mut H,
    released: bool,
}

impl<'a, H: FanHardware> ManualMode<'a, H> {
    /// Switch the fan to manual control.
    pub fn engage(hardware: &'a mut H) -> Result<Self> {
        hardware.enable_manual_mode()?;
        tracing::info!("manual fan control enabled");
        Ok(ManualMode {
            hardware,
            released: false,
        })
    }

    /// Restore automatic mode, reporting a failure to the caller.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        let result = self.hardware.restore_automatic_mode();
        match &result {
            Ok(()) => tracing::info!("automatic fan control restored"),
            Err(e) => tracing::error!(error = %e, "failed to restore automatic fan control"),
        }
        result
    }
}

impl<H: FanHardware> Deref for ManualMode<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        &*self.hardware
    }
}

impl<H: FanHardware> DerefMut for ManualMode<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        &mut *self.hardware
    }
}

impl<H: FanHardware> Drop for ManualMode<'_, H> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.hardware.restore_automatic_mode() {
            Ok(()) => tracing::warn!("automatic fan control restored on abnormal exit"),
            Err(e) => tracing::error!(error = %e, "failed to restore automatic fan control"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Fake port replaying scripted temperatures and recording every call.
    #[derive(Default)]
    pub(crate) struct ScriptedFan {
        pub temperatures: VecDeque<f32>,
        pub fallback_temp: f32,
        pub writes: Vec<u32>,
        pub manual: bool,
        pub mode_switches: Vec<&'static str>,
        pub fail_read_after: Option<usize>,
        pub reads: usize,
        pub privileged: bool,
    }

    impl ScriptedFan {
        pub fn with_temperatures(temps: impl IntoIterator<Item = f32>) -> Self {
            let temperatures: VecDeque<f32> = temps.into_iter().collect();
            ScriptedFan {
                fallback_temp: temperatures.back().copied().unwrap_or(60.0),
                temperatures,
                privileged: true,
                ..Default::default()
            }
        }
    }

    impl FanHardware for ScriptedFan {
        fn check_privileges(&self) -> Result<()> {
            if self.privileged {
                Ok(())
            } else {
                Err(FanError::Privilege("scripted".into()))
            }
        }

        fn read_temperature(&mut self, sensor: &str) -> Result<f32> {
            if self.fail_read_after.is_some_and(|limit| self.reads >= limit) {
                return Err(FanError::SensorRead {
                    sensor: sensor.into(),
                    reason: "scripted failure".into(),
                });
            }
            self.reads += 1;
            Ok(self.temperatures.pop_front().unwrap_or(self.fallback_temp))
        }

        fn set_actuation(&mut self, level: u32) -> Result<()> {
            self.writes.push(level);
            Ok(())
        }

        fn enable_manual_mode(&mut self) -> Result<()> {
            self.manual = true;
            self.mode_switches.push("manual");
            Ok(())
        }

        fn restore_automatic_mode(&mut self) -> Result<()> {
            self.manual = false;
            self.mode_switches.push("automatic");
            Ok(())
        }
    }

    #[test]
    fn test_parse_reading() {
        assert_eq!(parse_reading("t", " 42.5\n").unwrap(), 42.5);
        assert!(matches!(
            parse_reading("t", "hot"),
            Err(FanError::SensorRead { .. })
        ));
        assert!(parse_reading("t", "NaN").is_err());
        assert!(parse_reading("t", "inf").is_err());
    }

    #[test]
    fn test_read_max_temperature_takes_hottest() {
        let mut fan = ScriptedFan::with_temperatures([41.0, 57.5, 49.0]);
        let sensors = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(fan.read_max_temperature(&sensors).unwrap(), 57.5);
        assert!(fan.read_max_temperature(&[]).is_err());
    }

    #[test]
    fn test_guard_release_restores_automatic() {
        let mut fan = ScriptedFan::with_temperatures([60.0]);
        let guard = ManualMode::engage(&mut fan).unwrap();
        assert!(guard.manual);
        guard.release().unwrap();
        assert!(!fan.manual);
        assert_eq!(fan.mode_switches, vec!["manual", "automatic"]);
    }

    #[test]
    fn test_guard_drop_restores_automatic() {
        let mut fan = ScriptedFan::with_temperatures([60.0]);
        {
            let mut guard = ManualMode::engage(&mut fan).unwrap();
            guard.set_actuation(70).unwrap();
        }
        assert!(!fan.manual);
        assert_eq!(fan.mode_switches, vec!["manual", "automatic"]);
    }

    #[test]
    fn test_guard_restores_during_unwind() {
        let mut fan = ScriptedFan::with_temperatures([60.0]);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ManualMode::engage(&mut fan).unwrap();
            panic!("fault inside the control loop");
        }));
        assert!(result.is_err());
        assert!(!fan.manual);
    }
}
