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

//! Raspberry Pi backend: NTC thermistors on an ADS1115 and a hardware PWM fan.
//!
//! Sensor ids are ADC inputs `A0`-`A3`. A bare PWM fan has no firmware
//! controller to hand back to, so automatic mode means full speed.

use ads1x1x::{channel, ic, mode, Ads1x1x, FullScaleRange, TargetAddr};
use linux_embedded_hal::I2cdev;
use nb::block;
use rppal::pwm::{Channel, Polarity, Pwm};

use crate::error::{FanError, FanMode, Result};
use crate::hardware::FanHardware;

// NTC thermistor parameters
const NTC_R25: f32 = 10_000.0;  // NTC resistance at 25°C (10k)
const NTC_BETA: f32 = 3950.0;   // NTC beta value (typical for 10k NTC)
const NTC_SERIES_RESISTOR: f32 = 10_000.0; // Series resistor value (10k)
const REF_VOLTAGE: f32 = 4.096; // Reference voltage (V)
const ABS_ZERO: f32 = 273.15;   // Absolute zero in Celsius
const T25_KELVIN: f32 = 25.0 + ABS_ZERO; // 25°C in Kelvin

const PWM_FREQUENCY: f64 = 25_000.0; // Standard 4-pin fan PWM frequency (Hz)

type Adc = Ads1x1x<I2cdev, ic::Ads1115, ic::Resolution16Bit, mode::OneShot>;

pub struct RpiFan {
    adc: Adc,
    pwm: Pwm,
    actuator: String,
}

impl RpiFan {
    /// Open the ADC on `i2c_bus` and the fan on PWM channel `actuator` (`pwm0`/`pwm1`).
    ///
    /// The fan starts at full speed until manual mode is engaged.
    pub fn open(i2c_bus: &str, actuator: &str) -> Result<Self> {
        let channel = match actuator {
            "pwm0" => Channel::Pwm0,
            "pwm1" => Channel::Pwm1,
            other => {
                return Err(FanError::ModeSwitch {
                    actuator: other.to_string(),
                    mode: FanMode::Automatic,
                    reason: "unknown PWM channel, expected pwm0 or pwm1".to_string(),
                })
            }
        };

        let i2c_dev = I2cdev::new(i2c_bus).map_err(|e| FanError::SensorRead {
            sensor: i2c_bus.to_string(),
            reason: e.to_string(),
        })?;
        let mut adc = Ads1x1x::new_ads1115(i2c_dev, TargetAddr::default());
        adc.set_full_scale_range(FullScaleRange::Within4_096V)
            .map_err(|e| FanError::SensorRead {
                sensor: i2c_bus.to_string(),
                reason: format!("{:?}", e),
            })?;

        let pwm = Pwm::with_frequency(channel, PWM_FREQUENCY, 1.0, Polarity::Normal, true)
            .map_err(|e| FanError::ModeSwitch {
                actuator: actuator.to_string(),
                mode: FanMode::Automatic,
                reason: e.to_string(),
            })?;

        Ok(RpiFan {
            adc,
            pwm,
            actuator: actuator.to_string(),
        })
    }

    fn read_raw(&mut self, sensor: &str) -> Result<i16> {
        let reading = match sensor {
            "A0" => block!(self.adc.read(channel::SingleA0)),
            "A1" => block!(self.adc.read(channel::SingleA1)),
            "A2" => block!(self.adc.read(channel::SingleA2)),
            "A3" => block!(self.adc.read(channel::SingleA3)),
            _ => {
                return Err(FanError::SensorRead {
                    sensor: sensor.to_string(),
                    reason: "unknown ADC input, expected A0-A3".to_string(),
                })
            }
        };
        reading.map_err(|e| FanError::SensorRead {
            sensor: sensor.to_string(),
            reason: format!("{:?}", e),
        })
    }

    fn set_duty(&mut self, duty: f64, level: u32) -> Result<()> {
        self.pwm
            .set_duty_cycle(duty)
            .map_err(|e| FanError::ActuatorWrite {
                actuator: self.actuator.clone(),
                level,
                reason: e.to_string(),
            })
    }
}

/// Convert a raw ADS1115 reading to °C through the NTC divider.
fn ntc_temperature(raw_value: i16) -> Option<f32> {
    // ADS1115 is 16-bit signed, -32768 to +32767
    let voltage = (raw_value as f32 / 32768.0) * REF_VOLTAGE;

    // NTC between ADC input and GND, series resistor between ADC input and VREF
    if voltage <= 0.0 || voltage >= REF_VOLTAGE {
        return None;
    }
    let ntc_resistance = NTC_SERIES_RESISTOR * voltage / (REF_VOLTAGE - voltage);

    // Simplified Steinhart-Hart: 1/T = 1/T0 + (1/B) * ln(R/R0)
    let temp_kelvin = 1.0 / (1.0 / T25_KELVIN + (1.0 / NTC_BETA) * (ntc_resistance / NTC_R25).ln());
    Some(temp_kelvin - ABS_ZERO)
}

impl FanHardware for RpiFan {
    fn check_privileges(&self) -> Result<()> {
        let uid = rustix::process::geteuid();
        if uid.is_root() {
            Ok(())
        } else {
            Err(FanError::Privilege(format!(
                "PWM and I2C access requires root, running as uid {}",
                uid.as_raw()
            )))
        }
    }

    fn read_temperature(&mut self, sensor: &str) -> Result<f32> {
        let raw = self.read_raw(sensor)?;
        ntc_temperature(raw).ok_or_else(|| FanError::SensorRead {
            sensor: sensor.to_string(),
            reason: format!("invalid voltage reading (raw {})", raw),
        })
    }

    fn set_actuation(&mut self, level: u32) -> Result<()> {
        self.set_duty(level.min(100) as f64 / 100.0, level)
    }

    fn enable_manual_mode(&mut self) -> Result<()> {
        self.pwm.enable().map_err(|e| FanError::ModeSwitch {
            actuator: self.actuator.clone(),
            mode: FanMode::Manual,
            reason: e.to_string(),
        })
    }

    fn restore_automatic_mode(&mut self) -> Result<()> {
        self.pwm
            .set_duty_cycle(1.0)
            .and_then(|_| self.pwm.enable())
            .map_err(|e| FanError::ModeSwitch {
                actuator: self.actuator.clone(),
                mode: FanMode::Automatic,
                reason: e.to_string(),
            })
    }
}
