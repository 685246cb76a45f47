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

//! Simulated cooling rig for demos and tests

use crate::error::{FanError, Result};
use crate::hardware::FanHardware;

/// Lumped thermal model of a heat source cooled by a fan
pub struct CoolingRig {
    temperature: f32,           // Current temperature (°C)
    pub ambient_temp: f32,      // Ambient temperature (°C)
    pub thermal_capacity: f32,  // Thermal capacity (J/°C)
    pub heat_load: f32,         // Power dissipated by the source (W)
    pub passive_loss_coeff: f32, // Heat loss with the fan stopped (W/°C)
    pub fan_loss_coeff: f32,    // Extra heat loss at full fan speed (W/°C)
}

impl CoolingRig {
    pub fn new(
        initial_temp: f32,
        ambient_temp: f32,
        thermal_capacity: f32,
        heat_load: f32,
        passive_loss_coeff: f32,
        fan_loss_coeff: f32,
    ) -> Self {
        CoolingRig {
            temperature: initial_temp,
            ambient_temp,
            thermal_capacity,
            heat_load,
            passive_loss_coeff,
            fan_loss_coeff,
        }
    }

    /// Update temperature for `dt` seconds at the given fan fraction (0-1)
    pub fn update(&mut self, fan_fraction: f32, dt: f32) {
        let fan_fraction = fan_fraction.clamp(0.0, 1.0);

        // Heat produced by the source (J)
        let heat_added = self.heat_load * dt;

        // Heat removed by convection, boosted by airflow (J)
        let loss_coeff = self.passive_loss_coeff + self.fan_loss_coeff * fan_fraction;
        let heat_lost = loss_coeff * (self.temperature - self.ambient_temp) * dt;

        self.temperature += (heat_added - heat_lost) / self.thermal_capacity;
    }

    pub fn get_temperature(&self) -> f32 {
        self.temperature
    }
}

/// Fan port over a [`CoolingRig`], with one or more offset sensors.
///
/// In automatic mode the fan runs at full speed and writes are refused, the
/// way firmware-controlled fans ignore manual duty values.
pub struct SimulatedFan {
    rig: CoolingRig,
    sensors: Vec<(String, f32)>, // (sensor id, offset from rig temperature)
    level: u32,
    manual: bool,
    writes: u64,
}

impl SimulatedFan {
    pub fn new(rig: CoolingRig, sensors: Vec<(String, f32)>) -> Self {
        SimulatedFan {
            rig,
            sensors,
            level: 100,
            manual: false,
            writes: 0,
        }
    }

    /// Let `dt` seconds of simulated time pass at the current fan level.
    pub fn advance(&mut self, dt: f32) {
        self.rig.update(self.level as f32 / 100.0, dt);
    }

    pub fn rig(&self) -> &CoolingRig {
        &self.rig
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn is_manual(&self) -> bool {
        self.manual
    }

    /// Number of actuation writes accepted so far.
    pub fn writes(&self) -> u64 {
        self.writes
    }
}

impl FanHardware for SimulatedFan {
    fn check_privileges(&self) -> Result<()> {
        Ok(())
    }

    fn read_temperature(&mut self, sensor: &str) -> Result<f32> {
        self.sensors
            .iter()
            .find(|(id, _)| id == sensor)
            .map(|(_, offset)| self.rig.get_temperature() + offset)
            .ok_or_else(|| FanError::SensorRead {
                sensor: sensor.to_string(),
                reason: "no such simulated sensor".to_string(),
            })
    }

    fn set_actuation(&mut self, level: u32) -> Result<()> {
        if !self.manual {
            return Err(FanError::ActuatorWrite {
                actuator: "simulated".to_string(),
                level,
                reason: "fan is under automatic control".to_string(),
            });
        }
        self.level = level.min(100);
        self.writes += 1;
        Ok(())
    }

    fn enable_manual_mode(&mut self) -> Result<()> {
        self.manual = true;
        Ok(())
    }

    fn restore_automatic_mode(&mut self) -> Result<()> {
        self.manual = false;
        self.level = 100;
        Ok(())
    }
}
