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

//! Controller configuration.
//!
//! Loaded once at process start from a TOML file and validated before use.
//! The resulting [`Config`] is immutable for the lifetime of the run and is
//! passed by reference to the components that need it.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::cost::CostWeights;
use crate::gains::GainTriple;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/adaptive-fan/config.toml";

/// Errors arising from configuration parsing, validation, or I/O.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("field '{field}' has invalid value {value}: {reason}")]
    InvalidField {
        field: String,
        value: String,
        reason: String,
    },

    #[error("validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub control: ControlSettings,
    pub tuning: TuningSettings,
    pub cost: CostWeights,
    pub actuator: ActuatorSettings,
    pub sensors: SensorSettings,
    pub gains: GainSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlSettings {
    /// Target temperature (°C)
    pub target_temp: f32,
    /// Feed-forward level added per °C above target
    pub feed_forward_scale: f32,
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TuningSettings {
    /// Ticks per evaluation window
    pub window_size: usize,
    /// Relative size of one gain perturbation
    pub perturbation_scale: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActuatorSettings {
    pub id: String,
    /// Lowest commanded level (percent)
    pub min_level: u32,
    /// Highest commanded level (percent)
    pub max_level: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SensorSettings {
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GainSettings {
    /// Where accepted gains are persisted
    pub path: PathBuf,
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Default for ControlSettings {
    fn default() -> Self {
        ControlSettings {
            target_temp: 60.0,
            feed_forward_scale: 8.0,
            tick_interval_ms: 1000,
        }
    }
}

impl Default for TuningSettings {
    fn default() -> Self {
        TuningSettings {
            window_size: 30,
            perturbation_scale: 0.1,
        }
    }
}

impl Default for ActuatorSettings {
    fn default() -> Self {
        ActuatorSettings {
            id: "/sys/class/hwmon/hwmon2/pwm1".to_string(),
            min_level: 20,
            max_level: 100,
        }
    }
}

impl Default for SensorSettings {
    fn default() -> Self {
        SensorSettings {
            ids: vec!["/sys/class/hwmon/hwmon0/temp1_input".to_string()],
        }
    }
}

impl Default for GainSettings {
    fn default() -> Self {
        GainSettings {
            path: PathBuf::from("/var/lib/adaptive-fan/gains.json"),
            kp: 5.0,
            ki: 0.1,
            kd: 2.0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            control: ControlSettings::default(),
            tuning: TuningSettings::default(),
            cost: CostWeights::default(),
            actuator: ActuatorSettings::default(),
            sensors: SensorSettings::default(),
            gains: GainSettings::default(),
        }
    }
}

impl Config {
    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            file: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content, &path.display().to_string())
    }

    /// Parse and validate TOML content. `source_name` only appears in errors.
    pub fn from_toml(content: &str, source_name: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|e| ConfigError::Parse {
            file: source_name.to_string(),
            source: e,
        })?;

        config.validate().map_err(|errors| {
            ConfigError::Validation(
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        })?;

        Ok(config)
    }

    /// Check every semantic constraint, collecting all violations.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();
        let mut invalid = |field: &str, value: String, reason: &str| {
            errors.push(ConfigError::InvalidField {
                field: field.into(),
                value,
                reason: reason.into(),
            });
        };

        if !self.control.target_temp.is_finite() {
            invalid(
                "control.target_temp",
                self.control.target_temp.to_string(),
                "must be finite",
            );
        }
        if !self.control.feed_forward_scale.is_finite() || self.control.feed_forward_scale < 0.0 {
            invalid(
                "control.feed_forward_scale",
                self.control.feed_forward_scale.to_string(),
                "must be finite and >= 0",
            );
        }
        if self.control.tick_interval_ms == 0 {
            invalid("control.tick_interval_ms", "0".into(), "must be at least 1");
        }

        if self.tuning.window_size == 0 {
            invalid("tuning.window_size", "0".into(), "must be at least 1");
        }
        let scale = self.tuning.perturbation_scale;
        if !scale.is_finite() || scale <= 0.0 {
            invalid(
                "tuning.perturbation_scale",
                scale.to_string(),
                "must be finite and > 0",
            );
        }

        for (field, weight) in [
            ("cost.error", self.cost.error),
            ("cost.power", self.cost.power),
            ("cost.overshoot", self.cost.overshoot),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                invalid(field, weight.to_string(), "must be finite and >= 0");
            }
        }

        if self.actuator.max_level > 100 {
            invalid(
                "actuator.max_level",
                self.actuator.max_level.to_string(),
                "must be <= 100",
            );
        }
        if self.actuator.min_level > self.actuator.max_level {
            invalid(
                "actuator.min_level",
                self.actuator.min_level.to_string(),
                "must be <= actuator.max_level",
            );
        }
        if self.actuator.id.is_empty() {
            invalid("actuator.id", "\"\"".into(), "must not be empty");
        }

        if self.sensors.ids.is_empty() {
            invalid("sensors.ids", "[]".into(), "at least one sensor is required");
        }

        for (field, gain) in [
            ("gains.kp", self.gains.kp),
            ("gains.ki", self.gains.ki),
            ("gains.kd", self.gains.kd),
        ] {
            if !gain.is_finite() || gain < 0.0 {
                invalid(field, gain.to_string(), "must be finite and >= 0");
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Gains used when the store holds no record.
    pub fn default_gains(&self) -> GainTriple {
        GainTriple::new(self.gains.kp, self.gains.ki, self.gains.kd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID_TOML: &str = r#"
[control]
target_temp = 55.0
feed_forward_scale = 4.0
tick_interval_ms = 500

[tuning]
window_size = 12
perturbation_scale = 0.2

[cost]
error = 1.0
power = 0.1
overshoot = 3.0

[actuator]
id = "/sys/class/hwmon/hwmon3/pwm2"
min_level = 10
max_level = 90

[sensors]
ids = ["/sys/class/hwmon/hwmon0/temp1_input", "/sys/class/hwmon/hwmon0/temp2_input"]

[gains]
path = "/tmp/gains.json"
kp = 4.0
ki = 0.2
kd = 1.0
"#;

    #[test]
    fn test_parses_full_file() {
        let config = Config::from_toml(VALID_TOML, "test").unwrap();
        assert_eq!(config.control.target_temp, 55.0);
        assert_eq!(config.tuning.window_size, 12);
        assert_eq!(config.actuator.max_level, 90);
        assert_eq!(config.sensors.ids.len(), 2);
        assert_eq!(config.cost.overshoot, 3.0);
        assert_eq!(config.default_gains(), GainTriple::new(4.0, 0.2, 1.0));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("", "empty").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(VALID_TOML.as_bytes()).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.actuator.id, "/sys/class/hwmon/hwmon3/pwm2");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = Config::from_toml("[tuning\nwindow_size = 3", "bad").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Config::from_toml("[tuning]\nwindow = 3\n", "typo").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validation_collects_every_violation() {
        let mut config = Config::default();
        config.tuning.window_size = 0;
        config.tuning.perturbation_scale = 0.0;
        config.actuator.min_level = 80;
        config.actuator.max_level = 50;
        config.sensors.ids.clear();
        config.cost.power = -1.0;

        let errors = config.validate().unwrap_err();
        let fields: Vec<String> = errors
            .iter()
            .filter_map(|e| match e {
                ConfigError::InvalidField { field, .. } => Some(field.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            fields,
            vec![
                "tuning.window_size",
                "tuning.perturbation_scale",
                "cost.power",
                "actuator.min_level",
                "sensors.ids",
            ]
        );
    }

    #[test]
    fn test_max_level_above_100_rejected() {
        let err = Config::from_toml("[actuator]\nmax_level = 255\n", "pwm").unwrap_err();
        assert!(err.to_string().contains("actuator.max_level"));
    }
}
