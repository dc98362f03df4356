//! # Raw Input Frame
//!
//! The per-frame snapshot of physical input handed to the pipeline by the
//! platform layer. A frame is immutable once captured; every field defaults
//! to "nothing happening" so sparse JSON frames deserialize cleanly.
//!
//! ## Fields
//!
//! | Field | Description |
//! |-------|-------------|
//! | `touches` | Active touch points (a listed touch is a finger down) |
//! | `coordinates` | Whether touch positions are `normalized` or `pixels` |
//! | `gyro` | Angular rates (pitch/roll/yaw) |
//! | `accel` | Accelerometer x/y/z |
//! | `buttons` | Digital hardware buttons (name → pressed) |
//! | `gamepad_axes` | Gamepad axes (name → value) |
//! | `gamepad_buttons` | Gamepad buttons (name → pressed) |
//!
//! ## Usage
//!
//! ```
//! use control_mapper::capture::frame::{RawInputFrame, TouchPoint};
//!
//! let frame = RawInputFrame::default().with_touch(TouchPoint::new(0, 0.15, 0.75));
//! assert_eq!(frame.touches.len(), 1);
//! assert!(frame.any_touch());
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;

/// Coordinate space of the touch positions in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSpace {
    /// Positions already in `[0, 1]` screen space.
    #[default]
    Normalized,
    /// Positions in screen pixels; normalized with [`LayoutMetrics`].
    Pixels,
}

/// Screen dimensions used to normalize pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutMetrics {
    /// Screen width in pixels.
    pub width_px: f32,
    /// Screen height in pixels.
    pub height_px: f32,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            width_px: 1920.0,
            height_px: 1080.0,
        }
    }
}

impl LayoutMetrics {
    /// Creates layout metrics for a screen of the given size.
    #[must_use]
    pub fn new(width_px: f32, height_px: f32) -> Self {
        Self { width_px, height_px }
    }
}

/// A single finger contact.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TouchPoint {
    /// Pointer identifier assigned by the platform.
    #[serde(default)]
    pub id: u32,
    /// Horizontal position.
    pub x: f32,
    /// Vertical position (0 = top).
    pub y: f32,
    /// Contact pressure (0.0 to 1.0).
    #[serde(default = "default_pressure")]
    pub pressure: f32,
}

fn default_pressure() -> f32 { 1.0 }

impl TouchPoint {
    /// Creates a touch point with full pressure.
    #[must_use]
    pub fn new(id: u32, x: f32, y: f32) -> Self {
        Self {
            id,
            x,
            y,
            pressure: default_pressure(),
        }
    }

    /// Returns this touch in normalized screen space.
    #[must_use]
    pub fn normalized(&self, space: CoordinateSpace, metrics: &LayoutMetrics) -> (f32, f32) {
        match space {
            CoordinateSpace::Normalized => (self.x, self.y),
            CoordinateSpace::Pixels => {
                let w = if metrics.width_px > 0.0 { metrics.width_px } else { 1.0 };
                let h = if metrics.height_px > 0.0 { metrics.height_px } else { 1.0 };
                (self.x / w, self.y / h)
            }
        }
    }
}

/// Gyroscope angular rates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct GyroSample {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
}

/// Accelerometer reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct AccelSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Complete raw input for one frame.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct RawInputFrame {
    /// Capture timestamp in milliseconds.
    pub timestamp_ms: u64,
    /// Active touch points.
    pub touches: Vec<TouchPoint>,
    /// Coordinate space of `touches`.
    pub coordinates: CoordinateSpace,
    /// Gyroscope rates.
    pub gyro: GyroSample,
    /// Accelerometer reading.
    pub accel: AccelSample,
    /// Digital hardware buttons.
    pub buttons: BTreeMap<String, bool>,
    /// Gamepad axes.
    pub gamepad_axes: BTreeMap<String, f32>,
    /// Gamepad buttons.
    pub gamepad_buttons: BTreeMap<String, bool>,
}

impl RawInputFrame {
    /// Creates an empty frame captured at `timestamp_ms`.
    #[must_use]
    pub fn at(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            ..Self::default()
        }
    }

    /// Adds a touch point.
    #[must_use]
    pub fn with_touch(mut self, touch: TouchPoint) -> Self {
        self.touches.push(touch);
        self
    }

    /// Sets the gyroscope rates.
    #[must_use]
    pub fn with_gyro(mut self, pitch: f32, roll: f32, yaw: f32) -> Self {
        self.gyro = GyroSample { pitch, roll, yaw };
        self
    }

    /// Sets the accelerometer reading.
    #[must_use]
    pub fn with_accel(mut self, x: f32, y: f32, z: f32) -> Self {
        self.accel = AccelSample { x, y, z };
        self
    }

    #[must_use]
    pub fn with_button(mut self, name: impl Into<String>, pressed: bool) -> Self {
        self.buttons.insert(name.into(), pressed);
        self
    }

    #[must_use]
    pub fn with_gamepad_axis(mut self, name: impl Into<String>, value: f32) -> Self {
        self.gamepad_axes.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with_gamepad_button(mut self, name: impl Into<String>, pressed: bool) -> Self {
        self.gamepad_buttons.insert(name.into(), pressed);
        self
    }

    /// Returns true if any finger is down.
    #[must_use]
    pub fn any_touch(&self) -> bool {
        !self.touches.is_empty()
    }

    /// Iterates over touches in normalized screen space.
    pub fn normalized_touches<'a>(
        &'a self,
        metrics: &'a LayoutMetrics,
    ) -> impl Iterator<Item = (f32, f32)> + 'a {
        self.touches
            .iter()
            .map(move |t| t.normalized(self.coordinates, metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_frame_is_idle() {
        let frame = RawInputFrame::default();
        assert!(!frame.any_touch());
        assert_eq!(frame.gyro, GyroSample::default());
        assert!(frame.buttons.is_empty());
        assert_eq!(frame.coordinates, CoordinateSpace::Normalized);
    }

    #[test]
    fn test_pixel_normalization() {
        let metrics = LayoutMetrics::new(1000.0, 500.0);
        let touch = TouchPoint::new(0, 250.0, 250.0);
        assert_eq!(touch.normalized(CoordinateSpace::Pixels, &metrics), (0.25, 0.5));
        assert_eq!(
            touch.normalized(CoordinateSpace::Normalized, &metrics),
            (250.0, 250.0)
        );
    }

    #[test]
    fn test_pixel_normalization_zero_metrics() {
        let metrics = LayoutMetrics::new(0.0, 0.0);
        let touch = TouchPoint::new(0, 0.5, 0.5);
        assert_eq!(touch.normalized(CoordinateSpace::Pixels, &metrics), (0.5, 0.5));
    }

    #[test]
    fn test_deserialize_sparse_json() {
        let json = r#"{"timestamp_ms": 42, "touches": [{"x": 0.1, "y": 0.2}]}"#;
        let frame: RawInputFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.timestamp_ms, 42);
        assert_eq!(frame.touches[0].pressure, 1.0);
        assert_eq!(frame.touches[0].id, 0);
        assert_eq!(frame.coordinates, CoordinateSpace::Normalized);
    }

    #[test]
    fn test_deserialize_full_json() {
        let json = r#"{
            "timestamp_ms": 7,
            "coordinates": "pixels",
            "touches": [{"id": 3, "x": 100, "y": 200, "pressure": 0.4}],
            "gyro": {"pitch": 0.1, "yaw": -0.2},
            "accel": {"z": 9.8},
            "buttons": {"volume_up": true},
            "gamepad_axes": {"left_x": 0.5},
            "gamepad_buttons": {"a": true}
        }"#;
        let frame: RawInputFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.coordinates, CoordinateSpace::Pixels);
        assert_eq!(frame.touches[0].id, 3);
        assert_eq!(frame.gyro.roll, 0.0);
        assert_eq!(frame.gyro.yaw, -0.2);
        assert_eq!(frame.accel.z, 9.8);
        assert_eq!(frame.buttons.get("volume_up"), Some(&true));
        assert_eq!(frame.gamepad_axes.get("left_x"), Some(&0.5));
        assert_eq!(frame.gamepad_buttons.get("a"), Some(&true));
    }

    #[test]
    fn test_builders() {
        let frame = RawInputFrame::at(10)
            .with_touch(TouchPoint::new(1, 0.5, 0.5))
            .with_gyro(1.0, 2.0, 3.0);
        assert_eq!(frame.timestamp_ms, 10);
        assert_eq!(frame.touches.len(), 1);
        assert_eq!(frame.gyro.yaw, 3.0);
    }
}
