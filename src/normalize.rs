//! Mapping from raw ADC axis values to a centered percentage signal.

use serde::{Deserialize, Serialize};

use crate::config::AxisConfig;
use crate::frame::RawReading;

/// Bounds of the normalized axis signal, in percent of half-travel.
pub const AXIS_LIMIT: f32 = 100.0;

/// A reading ready for a control loop or UI.
///
/// `pos_x`/`pos_y` are in `[-100, 100]`, 0 at the device center. `active`
/// is set once either axis leaves the configured deadzone.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedReading {
    pub pos_x: f32,
    pub pos_y: f32,
    pub button: bool,
    pub active: bool,
}

/// Normalize one raw reading. Out-of-range raw values are clamped.
pub fn normalize(raw: &RawReading, config: &AxisConfig) -> NormalizedReading {
    let center = config.center();
    let pos_x = axis_percent(raw.x, center);
    let pos_y = axis_percent(raw.y, center);
    let deadzone = config.deadzone();

    NormalizedReading {
        pos_x,
        pos_y,
        button: raw.button,
        active: pos_x.abs() > deadzone || pos_y.abs() > deadzone,
    }
}

fn axis_percent(value: i32, center: f32) -> f32 {
    (((value as f32 - center) / center) * AXIS_LIMIT).clamp(-AXIS_LIMIT, AXIS_LIMIT)
}
