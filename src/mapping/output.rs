//! # Output State
//!
//! The per-frame result handed to the transport layer. Field names and
//! nesting are a stable contract:
//!
//! ```json
//! {
//!   "frameId": 12,
//!   "keyboard": ["KeyW", "Space"],
//!   "mouse": {"x": 0.0, "y": 0.0, "left": false, "right": false, "middle": false},
//!   "joystick": {"x": 0.0, "y": 0.0, "deadzone": 0.0, "smoothing": 0.0},
//!   "gyroscope": {"pitch": 0.0, "roll": 0.0, "yaw": 0.0, "deadzone": 0.0, "smoothing": 0.0},
//!   "gamepad": {"buttons": [], "throttle": 0.0, "brake": 0.0},
//!   "axes": {},
//!   "runtimeStatus": "ok"
//! }
//! ```

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Health of the pipeline as seen by the remote target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeStatus {
    #[default]
    Ok,
    /// Degraded: a profile faulted and a rollback is pending.
    Warning,
    /// Nothing could be resolved: no profile and no mapping.
    Error,
}

/// Mouse sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MouseState {
    pub x: f32,
    pub y: f32,
    pub left: bool,
    pub right: bool,
    pub middle: bool,
}

/// Virtual joystick sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct JoystickState {
    pub x: f32,
    pub y: f32,
    pub deadzone: f32,
    pub smoothing: f32,
}

/// Gyroscope sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct GyroscopeState {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
    pub deadzone: f32,
    pub smoothing: f32,
}

/// Gamepad buttons and triggers.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GamepadState {
    pub buttons: BTreeSet<String>,
    pub throttle: f32,
    pub brake: f32,
}

/// The externally visible result of one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputState {
    pub frame_id: u64,
    pub keyboard: BTreeSet<String>,
    pub mouse: MouseState,
    pub joystick: JoystickState,
    pub gyroscope: GyroscopeState,
    pub gamepad: GamepadState,
    /// Generic axis set written by custom mappings.
    pub axes: BTreeMap<String, f32>,
    pub runtime_status: RuntimeStatus,
}

impl OutputState {
    /// Creates a neutral state tagged with `frame_id`.
    #[must_use]
    pub fn new(frame_id: u64) -> Self {
        Self {
            frame_id,
            ..Self::default()
        }
    }

    /// True when no key, button or axis is asserted.
    ///
    /// # Examples
    ///
    /// ```
    /// use control_mapper::mapping::output::OutputState;
    ///
    /// let mut state = OutputState::new(1);
    /// assert!(state.is_neutral());
    ///
    /// state.keyboard.insert("Space".to_string());
    /// assert!(!state.is_neutral());
    /// ```
    #[must_use]
    pub fn is_neutral(&self) -> bool {
        self.keyboard.is_empty()
            && self.gamepad.buttons.is_empty()
            && self.gamepad.throttle == 0.0
            && self.gamepad.brake == 0.0
            && self.joystick.x == 0.0
            && self.joystick.y == 0.0
            && self.gyroscope.pitch == 0.0
            && self.gyroscope.roll == 0.0
            && self.gyroscope.yaw == 0.0
            && !self.mouse.left
            && !self.mouse.right
            && !self.mouse.middle
            && self.mouse.x == 0.0
            && self.mouse.y == 0.0
            && self.axes.values().all(|v| *v == 0.0)
    }

    /// Encodes the state as a single JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
