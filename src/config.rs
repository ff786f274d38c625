//! Session configuration.
//!
//! Nothing the device firmware decides is defaulted here: the baud rate and
//! the wire format must always be supplied, either in a TOML file or by the
//! caller. Only the axis calibration carries documented defaults.

use std::fs;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Full-scale value of a 10-bit ADC axis; center sits at half of it.
pub const DEFAULT_AXIS_MAX: u32 = 1024;

/// Displacement (in percent of half-travel) under which the stick counts as centered.
/// Firmware variants in the field use 10 or 20.
pub const DEFAULT_DEADZONE: f32 = 10.0;

/// Baud rates shipped by known joystick firmware builds.
pub const COMMON_BAUD_RATES: [u32; 2] = [9600, 115200];

/// Textual encoding used by the device firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// `X:<int> Y:<int> BTN:<0|1>`, tokens in any order.
    Tagged,
    /// `<int>,<int>,<0|1>`, fixed field order.
    Delimited,
}

/// Device-native axis range and deadzone used by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAxisConfig")]
pub struct AxisConfig {
    device_axis_max: u32,
    deadzone: f32,
}

#[derive(Deserialize)]
struct RawAxisConfig {
    #[serde(default = "default_axis_max")]
    device_axis_max: u32,
    #[serde(default = "default_deadzone")]
    deadzone: f32,
}

fn default_axis_max() -> u32 {
    DEFAULT_AXIS_MAX
}

fn default_deadzone() -> f32 {
    DEFAULT_DEADZONE
}

impl TryFrom<RawAxisConfig> for AxisConfig {
    type Error = ConfigError;

    fn try_from(raw: RawAxisConfig) -> Result<Self, Self::Error> {
        AxisConfig::new(raw.device_axis_max, raw.deadzone)
    }
}

impl AxisConfig {
    /// Build an axis configuration, rejecting ranges that cannot be centered
    /// and deadzones outside the normalized output range.
    pub fn new(device_axis_max: u32, deadzone: f32) -> Result<Self, ConfigError> {
        if device_axis_max < 2 {
            return Err(ConfigError::InvalidAxisMax(device_axis_max));
        }
        if !deadzone.is_finite() || !(0.0..=100.0).contains(&deadzone) {
            return Err(ConfigError::InvalidDeadzone(deadzone));
        }
        Ok(Self {
            device_axis_max,
            deadzone,
        })
    }

    pub fn device_axis_max(&self) -> u32 {
        self.device_axis_max
    }

    pub fn deadzone(&self) -> f32 {
        self.deadzone
    }

    /// Raw value that maps to 0%.
    pub fn center(&self) -> f32 {
        self.device_axis_max as f32 / 2.0
    }
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            device_axis_max: DEFAULT_AXIS_MAX,
            deadzone: DEFAULT_DEADZONE,
        }
    }
}

/// Everything `ConnectionManager::connect` needs to start a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoystickConfig {
    pub baud_rate: u32,
    pub wire_format: WireFormat,
    #[serde(default)]
    pub axis: AxisConfig,
}

impl JoystickConfig {
    pub fn new(baud_rate: u32, wire_format: WireFormat, axis: AxisConfig) -> Self {
        Self {
            baud_rate,
            wire_format,
            axis,
        }
    }

    /// Check every field. Unusual baud rates are allowed but logged.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::InvalidBaudRate);
        }
        if !COMMON_BAUD_RATES.contains(&self.baud_rate) {
            warn!(
                "baud rate {} is not one of the known firmware rates {:?}",
                self.baud_rate, COMMON_BAUD_RATES
            );
        }
        AxisConfig::new(self.axis.device_axis_max, self.axis.deadzone)?;
        Ok(())
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: JoystickConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("loading config: path={}", path.display());
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}
