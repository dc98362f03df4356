//! # Device Mapping
//!
//! Resolves processed actions to concrete [`OutputState`] fields.
//!
//! ## Per-frame Clear
//!
//! | MappingType | Fields cleared at frame start |
//! |-------------|-------------------------------|
//! | Keyboard | key set |
//! | Gamepad | gamepad buttons, throttle/brake, joystick x/y, gyroscope pitch/roll/yaw |
//! | Mouse | mouse position and button flags |
//! | Custom | generic axis set |
//!
//! ## Axis Families
//!
//! | Axis names | Field |
//! |------------|-------|
//! | `steering`, `joystick_x`, `left_x` | `joystick.x` |
//! | `joystick_y`, `left_y` | `joystick.y` |
//! | `throttle`, `right_trigger` | `gamepad.throttle` |
//! | `brake`, `left_trigger` | `gamepad.brake` |
//! | `gyro_x`, `pitch` | `gyroscope.pitch` |
//! | `gyro_y`, `roll` | `gyroscope.roll` |
//! | `gyro_z`, `yaw` | `gyroscope.yaw` |
//! | `mouse_x`, `mouse_y` | `mouse.x`, `mouse.y` |
//!
//! Unrecognized axis names land in the generic axis set under a `Custom`
//! mapping and are dropped otherwise. Unrecognized key names, by contrast,
//! are passed through verbatim.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tracing::trace;

use super::keys::normalize_key;
use super::output::OutputState;
use crate::capture::action::{ActionKind, ControlAction};
use crate::error::ControlMapperError;

/// Magnitude a composite stick must exceed before it contributes throttle or brake.
pub const COMPOSITE_THROTTLE_THRESHOLD: f32 = 0.5;

/// Which family of output fields a mapping owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingType {
    Keyboard,
    Gamepad,
    Mouse,
    Custom,
}

impl std::fmt::Display for MappingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MappingType::Keyboard => write!(f, "Keyboard"),
            MappingType::Gamepad => write!(f, "Gamepad"),
            MappingType::Mouse => write!(f, "Mouse"),
            MappingType::Custom => write!(f, "Custom"),
        }
    }
}

/// Concrete output field an axis name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisTarget {
    JoystickX,
    JoystickY,
    Throttle,
    Brake,
    GyroPitch,
    GyroRoll,
    GyroYaw,
    MouseX,
    MouseY,
}

impl AxisTarget {
    /// Resolves an axis name (case-insensitive) to its field family.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "steering" | "joystick_x" | "left_x" => Some(AxisTarget::JoystickX),
            "joystick_y" | "left_y" => Some(AxisTarget::JoystickY),
            "throttle" | "right_trigger" => Some(AxisTarget::Throttle),
            "brake" | "left_trigger" => Some(AxisTarget::Brake),
            "gyro_x" | "pitch" => Some(AxisTarget::GyroPitch),
            "gyro_y" | "roll" => Some(AxisTarget::GyroRoll),
            "gyro_z" | "yaw" => Some(AxisTarget::GyroYaw),
            "mouse_x" => Some(AxisTarget::MouseX),
            "mouse_y" => Some(AxisTarget::MouseY),
            _ => None,
        }
    }

    fn write(self, state: &mut OutputState, value: f32) {
        match self {
            AxisTarget::JoystickX => state.joystick.x = value,
            AxisTarget::JoystickY => state.joystick.y = value,
            AxisTarget::Throttle => state.gamepad.throttle = value,
            AxisTarget::Brake => state.gamepad.brake = value,
            AxisTarget::GyroPitch => state.gyroscope.pitch = value,
            AxisTarget::GyroRoll => state.gyroscope.roll = value,
            AxisTarget::GyroYaw => state.gyroscope.yaw = value,
            AxisTarget::MouseX => state.mouse.x = value,
            AxisTarget::MouseY => state.mouse.y = value,
        }
    }
}

/// Deadzone/smoothing hints stamped into the output for the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StickHints {
    pub deadzone: f32,
    pub smoothing: f32,
}

/// A named table resolving operation types to keys, axes and buttons.
///
/// # Examples
///
/// ```
/// use control_mapper::mapping::device::{DeviceMapping, MappingType};
///
/// let mapping = DeviceMapping::new("wasd", MappingType::Keyboard)
///     .with_key("forward", "w")
///     .with_key("jump", "space");
/// assert_eq!(mapping.key_for("forward"), Some("w"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMapping {
    name: String,
    mapping_type: MappingType,
    keys: HashMap<String, String>,
    axes: HashMap<String, String>,
    buttons: HashMap<String, String>,
    toggles: HashSet<String>,
    joystick: StickHints,
    gyroscope: StickHints,
}

impl DeviceMapping {
    #[must_use]
    pub fn new(name: impl Into<String>, mapping_type: MappingType) -> Self {
        Self {
            name: name.into(),
            mapping_type,
            keys: HashMap::new(),
            axes: HashMap::new(),
            buttons: HashMap::new(),
            toggles: HashSet::new(),
            joystick: StickHints::default(),
            gyroscope: StickHints::default(),
        }
    }

    #[must_use]
    pub fn with_key(mut self, operation: impl Into<String>, key: impl Into<String>) -> Self {
        self.keys.insert(operation.into(), key.into());
        self
    }

    #[must_use]
    pub fn with_axis(mut self, operation: impl Into<String>, axis: impl Into<String>) -> Self {
        self.axes.insert(operation.into(), axis.into());
        self
    }

    #[must_use]
    pub fn with_button(mut self, operation: impl Into<String>, button: impl Into<String>) -> Self {
        self.buttons.insert(operation.into(), button.into());
        self
    }

    /// Marks an operation as a toggle: each press flips a latched state.
    #[must_use]
    pub fn with_toggle(mut self, operation: impl Into<String>) -> Self {
        self.toggles.insert(operation.into());
        self
    }

    #[must_use]
    pub fn with_joystick_hints(mut self, deadzone: f32, smoothing: f32) -> Self {
        self.joystick = StickHints { deadzone, smoothing };
        self
    }

    #[must_use]
    pub fn with_gyroscope_hints(mut self, deadzone: f32, smoothing: f32) -> Self {
        self.gyroscope = StickHints { deadzone, smoothing };
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn mapping_type(&self) -> MappingType {
        self.mapping_type
    }

    #[must_use]
    pub fn key_for(&self, operation: &str) -> Option<&str> {
        self.keys.get(operation).map(String::as_str)
    }

    #[must_use]
    pub fn axis_for(&self, operation: &str) -> Option<&str> {
        self.axes.get(operation).map(String::as_str)
    }

    #[must_use]
    pub fn button_for(&self, operation: &str) -> Option<&str> {
        self.buttons.get(operation).map(String::as_str)
    }

    #[must_use]
    pub fn is_toggle(&self, operation: &str) -> bool {
        self.toggles.contains(operation)
    }

    /// Clears exactly the fields owned by this mapping's type and stamps the
    /// configured joystick/gyroscope hints.
    pub fn clear_for_frame(&self, state: &mut OutputState) {
        match self.mapping_type {
            MappingType::Keyboard => state.keyboard.clear(),
            MappingType::Gamepad => {
                state.gamepad.buttons.clear();
                state.gamepad.throttle = 0.0;
                state.gamepad.brake = 0.0;
                state.joystick.x = 0.0;
                state.joystick.y = 0.0;
                state.gyroscope.pitch = 0.0;
                state.gyroscope.roll = 0.0;
                state.gyroscope.yaw = 0.0;
            }
            MappingType::Mouse => {
                state.mouse.x = 0.0;
                state.mouse.y = 0.0;
                state.mouse.left = false;
                state.mouse.right = false;
                state.mouse.middle = false;
            }
            MappingType::Custom => state.axes.clear(),
        }

        state.joystick.deadzone = self.joystick.deadzone;
        state.joystick.smoothing = self.joystick.smoothing;
        state.gyroscope.deadzone = self.gyroscope.deadzone;
        state.gyroscope.smoothing = self.gyroscope.smoothing;
    }
}

/// Extra keys and axes a profile script asserts on top of the mapped result.
///
/// Axis names resolve through [`AxisTarget`] first. Anything else follows the
/// same rule as mapped actions: written to the generic axis set under a
/// `Custom` mapping, dropped otherwise.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputDelta {
    pub keys: Vec<String>,
    pub axes: Vec<(String, f32)>,
}

impl OutputDelta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.axes.is_empty()
    }

    /// Writes the delta into a state already mapped by a mapping of
    /// `mapping_type`, if any.
    pub fn apply_to(&self, mapping_type: Option<MappingType>, state: &mut OutputState) {
        for key in &self.keys {
            state.keyboard.insert(normalize_key(key));
        }
        for (axis, value) in &self.axes {
            match AxisTarget::parse(axis) {
                Some(target) => target.write(state, *value),
                None if mapping_type == Some(MappingType::Custom) => {
                    state.axes.insert(axis.clone(), *value);
                }
                None => {
                    let e = ControlMapperError::UnknownMappingTarget(axis.clone());
                    trace!("Dropped script axis: {}", e);
                }
            }
        }
    }
}

/// Writes a named button. Mouse button names drive the mouse flags.
fn set_button(state: &mut OutputState, button: &str, pressed: bool) {
    match button.trim().to_ascii_lowercase().as_str() {
        "mouse_left" => state.mouse.left = pressed,
        "mouse_right" => state.mouse.right = pressed,
        "mouse_middle" => state.mouse.middle = pressed,
        _ => {
            if pressed {
                state.gamepad.buttons.insert(button.to_string());
            } else {
                state.gamepad.buttons.remove(button);
            }
        }
    }
}

/// The mapping stage: applies the active mapping to processed actions.
///
/// Toggle latches are the only state it carries between frames.
#[derive(Debug, Clone, Default)]
pub struct MappingStage {
    latched: HashMap<String, bool>,
    last_pressed: HashMap<String, bool>,
}

impl MappingStage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears `state` for `mapping`, then applies `actions` in order.
    pub fn apply(&mut self, mapping: &DeviceMapping, actions: &[ControlAction], state: &mut OutputState) {
        mapping.clear_for_frame(state);
        for action in actions {
            if let Err(e) = self.apply_action(mapping, action, state) {
                trace!("Dropped action: {}", e);
            }
        }
    }

    /// Forgets all toggle latches.
    pub fn reset(&mut self) {
        self.latched.clear();
        self.last_pressed.clear();
    }

    fn apply_action(
        &mut self,
        mapping: &DeviceMapping,
        action: &ControlAction,
        state: &mut OutputState,
    ) -> Result<(), ControlMapperError> {
        let op = action.operation_type();

        match action.kind() {
            ActionKind::Digital => {
                let pressed = if mapping.is_toggle(op) {
                    self.latch(op, action.pressed())
                } else {
                    action.pressed()
                };

                let key = mapping.key_for(op);
                let button = mapping.button_for(op);
                if key.is_none() && button.is_none() {
                    return Err(ControlMapperError::UnknownMappingTarget(op.to_string()));
                }
                if let Some(key) = key {
                    let key = normalize_key(key);
                    if pressed {
                        state.keyboard.insert(key);
                    } else {
                        state.keyboard.remove(&key);
                    }
                }
                if let Some(button) = button {
                    set_button(state, button, pressed);
                }
            }
            ActionKind::Analog => {
                let axis = mapping
                    .axis_for(op)
                    .ok_or_else(|| ControlMapperError::UnknownMappingTarget(op.to_string()))?;
                match AxisTarget::parse(axis) {
                    Some(target) => target.write(state, action.value()),
                    None if mapping.mapping_type() == MappingType::Custom => {
                        state.axes.insert(axis.to_string(), action.value());
                    }
                    None => {
                        return Err(ControlMapperError::UnknownMappingTarget(axis.to_string()));
                    }
                }
            }
            ActionKind::Gyro { roll } => {
                state.gyroscope.yaw = action.value();
                state.gyroscope.pitch = action.secondary().unwrap_or(0.0);
                state.gyroscope.roll = roll;
            }
            ActionKind::Gesture => {
                state.gyroscope.yaw = action.value();
                state.gyroscope.pitch = action.secondary().unwrap_or(0.0);
            }
            ActionKind::Composite => {
                let steering = action.value();
                let forward = action.secondary().unwrap_or(0.0);
                state.joystick.x = steering;

                let magnitude = steering.hypot(forward);
                if magnitude > COMPOSITE_THROTTLE_THRESHOLD {
                    if forward >= 0.0 {
                        state.gamepad.throttle = magnitude;
                    } else {
                        state.gamepad.brake = magnitude;
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns the latched state after observing `pressed` for a toggle operation.
    fn latch(&mut self, op: &str, pressed: bool) -> bool {
        let was_pressed = self.last_pressed.insert(op.to_string(), pressed).unwrap_or(false);
        let latched = self.latched.entry(op.to_string()).or_insert(false);
        if pressed && !was_pressed {
            *latched = !*latched;
        }
        *latched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyboard() -> DeviceMapping {
        DeviceMapping::new("kb", MappingType::Keyboard)
            .with_key("fire", "space")
            .with_key("raw", "MediaPlayPause")
    }

    fn gamepad() -> DeviceMapping {
        DeviceMapping::new("pad", MappingType::Gamepad)
            .with_axis("steer", "steering")
            .with_axis("gas", "throttle")
            .with_axis("odd", "warp_drive")
            .with_button("jump", "a")
            .with_button("click", "mouse_left")
    }

    // ==================== Clear Tests ====================

    #[test]
    fn test_keyboard_clear_only_touches_keys() {
        let mut state = OutputState::new(1);
        state.keyboard.insert("KeyW".to_string());
        state.gamepad.buttons.insert("a".to_string());
        state.mouse.left = true;

        keyboard().clear_for_frame(&mut state);
        assert!(state.keyboard.is_empty());
        assert!(state.gamepad.buttons.contains("a"));
        assert!(state.mouse.left);
    }

    #[test]
    fn test_gamepad_clear() {
        let mut state = OutputState::new(1);
        state.keyboard.insert("KeyW".to_string());
        state.gamepad.buttons.insert("a".to_string());
        state.gamepad.throttle = 1.0;
        state.joystick.x = 0.5;
        state.gyroscope.yaw = 0.2;

        gamepad().clear_for_frame(&mut state);
        assert!(state.gamepad.buttons.is_empty());
        assert_eq!(state.gamepad.throttle, 0.0);
        assert_eq!(state.joystick.x, 0.0);
        assert_eq!(state.gyroscope.yaw, 0.0);
        assert!(state.keyboard.contains("KeyW"));
    }

    #[test]
    fn test_mouse_and_custom_clear() {
        let mut state = OutputState::new(1);
        state.mouse.x = 0.3;
        state.mouse.right = true;
        state.axes.insert("rudder".to_string(), 1.0);

        DeviceMapping::new("m", MappingType::Mouse).clear_for_frame(&mut state);
        assert_eq!(state.mouse.x, 0.0);
        assert!(!state.mouse.right);
        assert_eq!(state.axes.len(), 1);

        DeviceMapping::new("c", MappingType::Custom).clear_for_frame(&mut state);
        assert!(state.axes.is_empty());
    }

    #[test]
    fn test_clear_stamps_hints() {
        let mapping = gamepad()
            .with_joystick_hints(0.1, 0.2)
            .with_gyroscope_hints(0.05, 0.3);
        let mut state = OutputState::new(1);
        mapping.clear_for_frame(&mut state);
        assert_eq!(state.joystick.deadzone, 0.1);
        assert_eq!(state.joystick.smoothing, 0.2);
        assert_eq!(state.gyroscope.deadzone, 0.05);
        assert_eq!(state.gyroscope.smoothing, 0.3);
    }

    // ==================== Digital Tests ====================

    #[test]
    fn test_digital_press_and_release() {
        let mut stage = MappingStage::new();
        let mut state = OutputState::new(1);
        stage.apply(&keyboard(), &[ControlAction::digital("fire", true, 0)], &mut state);
        assert!(state.keyboard.contains("Space"));

        let mut state = OutputState::new(2);
        stage.apply(
            &keyboard(),
            &[
                ControlAction::digital("fire", true, 0),
                ControlAction::digital("fire", false, 0),
            ],
            &mut state,
        );
        assert!(state.keyboard.is_empty(), "last writer wins");
    }

    #[test]
    fn test_unknown_key_passes_through() {
        let mut stage = MappingStage::new();
        let mut state = OutputState::new(1);
        stage.apply(&keyboard(), &[ControlAction::digital("raw", true, 0)], &mut state);
        assert!(state.keyboard.contains("MediaPlayPause"));
    }

    #[test]
    fn test_unmapped_operation_is_dropped() {
        let mut stage = MappingStage::new();
        let mut state = OutputState::new(1);
        stage.apply(&keyboard(), &[ControlAction::digital("nothing", true, 0)], &mut state);
        assert!(state.is_neutral());
    }

    #[test]
    fn test_buttons_and_mouse_buttons() {
        let mut stage = MappingStage::new();
        let mut state = OutputState::new(1);
        stage.apply(
            &gamepad(),
            &[
                ControlAction::digital("jump", true, 0),
                ControlAction::digital("click", true, 0),
            ],
            &mut state,
        );
        assert!(state.gamepad.buttons.contains("a"));
        assert!(state.mouse.left);
    }

    #[test]
    fn test_toggle_latches_on_rising_edge() {
        let mapping = keyboard().with_toggle("fire");
        let mut stage = MappingStage::new();

        let frames = [true, true, false, false, true, false];
        let expected = [true, true, true, true, false, false];
        for (pressed, expect) in frames.iter().zip(expected.iter()) {
            let mut state = OutputState::new(1);
            stage.apply(&mapping, &[ControlAction::digital("fire", *pressed, 0)], &mut state);
            assert_eq!(state.keyboard.contains("Space"), *expect);
        }

        stage.reset();
        let mut state = OutputState::new(1);
        stage.apply(&mapping, &[ControlAction::digital("fire", false, 0)], &mut state);
        assert!(state.keyboard.is_empty());
    }

    // ==================== Analog Tests ====================

    #[test]
    fn test_analog_axis_families() {
        let mut stage = MappingStage::new();
        let mut state = OutputState::new(1);
        stage.apply(
            &gamepad(),
            &[
                ControlAction::analog("steer", -0.4, 0),
                ControlAction::analog("gas", 0.9, 0),
            ],
            &mut state,
        );
        assert_eq!(state.joystick.x, -0.4);
        assert_eq!(state.gamepad.throttle, 0.9);
    }

    #[test]
    fn test_unrecognized_axis_dropped_outside_custom() {
        let mut stage = MappingStage::new();
        let mut state = OutputState::new(1);
        stage.apply(&gamepad(), &[ControlAction::analog("odd", 0.7, 0)], &mut state);
        assert!(state.is_neutral());
        assert!(state.axes.is_empty());
    }

    #[test]
    fn test_unrecognized_axis_written_under_custom() {
        let mapping = DeviceMapping::new("c", MappingType::Custom).with_axis("odd", "warp_drive");
        let mut stage = MappingStage::new();
        let mut state = OutputState::new(1);
        stage.apply(&mapping, &[ControlAction::analog("odd", 0.7, 0)], &mut state);
        assert_eq!(state.axes.get("warp_drive"), Some(&0.7));
    }

    #[test]
    fn test_axis_target_parse() {
        assert_eq!(AxisTarget::parse("Steering"), Some(AxisTarget::JoystickX));
        assert_eq!(AxisTarget::parse("gyro_z"), Some(AxisTarget::GyroYaw));
        assert_eq!(AxisTarget::parse("left_trigger"), Some(AxisTarget::Brake));
        assert_eq!(AxisTarget::parse("mouse_y"), Some(AxisTarget::MouseY));
        assert_eq!(AxisTarget::parse("nonsense"), None);
    }

    // ==================== OutputDelta Tests ====================

    fn sample_delta() -> OutputDelta {
        OutputDelta {
            keys: vec!["space".to_string(), "F13".to_string()],
            axes: vec![("throttle".to_string(), 0.8), ("rudder".to_string(), -0.2)],
        }
    }

    #[test]
    fn test_delta_applies_keys_and_known_axes() {
        let mut state = OutputState::new(1);
        sample_delta().apply_to(Some(MappingType::Gamepad), &mut state);
        assert!(state.keyboard.contains("Space"));
        assert!(state.keyboard.contains("F13"));
        assert_eq!(state.gamepad.throttle, 0.8);
        assert!(OutputDelta::default().is_empty());
    }

    #[test]
    fn test_delta_unknown_axis_only_under_custom() {
        for mapping_type in [
            None,
            Some(MappingType::Keyboard),
            Some(MappingType::Gamepad),
            Some(MappingType::Mouse),
        ] {
            let mut state = OutputState::new(1);
            sample_delta().apply_to(mapping_type, &mut state);
            assert!(state.axes.is_empty(), "leaked under {:?}", mapping_type);
        }

        let mut state = OutputState::new(1);
        sample_delta().apply_to(Some(MappingType::Custom), &mut state);
        assert_eq!(state.axes.get("rudder"), Some(&-0.2));
        assert_eq!(state.gamepad.throttle, 0.8);
    }

    // ==================== Fan-out Tests ====================

    #[test]
    fn test_gyro_and_gesture_fan_out() {
        let mut stage = MappingStage::new();
        let mut state = OutputState::new(1);
        stage.apply(&gamepad(), &[ControlAction::gyro("aim", 0.1, 0.2, 0.3, 0)], &mut state);
        assert_eq!(state.gyroscope.yaw, 0.1);
        assert_eq!(state.gyroscope.pitch, 0.2);
        assert_eq!(state.gyroscope.roll, 0.3);

        let mut state = OutputState::new(2);
        stage.apply(
            &gamepad(),
            &[ControlAction::gesture("look", -0.5, 0.25, true, 0)],
            &mut state,
        );
        assert_eq!(state.gyroscope.yaw, -0.5);
        assert_eq!(state.gyroscope.pitch, 0.25);
        assert_eq!(state.gyroscope.roll, 0.0);
    }

    #[test]
    fn test_composite_below_threshold_has_no_throttle() {
        let mut stage = MappingStage::new();
        let mut state = OutputState::new(1);
        stage.apply(
            &gamepad(),
            &[ControlAction::composite("drive", 0.3, 0.3, true, 0)],
            &mut state,
        );
        assert_eq!(state.joystick.x, 0.3);
        assert_eq!(state.gamepad.throttle, 0.0);
        assert_eq!(state.gamepad.brake, 0.0);
    }

    #[test]
    fn test_composite_threshold_is_exclusive() {
        let mut stage = MappingStage::new();
        let mut state = OutputState::new(1);
        stage.apply(
            &gamepad(),
            &[ControlAction::composite("drive", 0.0, 0.5, true, 0)],
            &mut state,
        );
        assert_eq!(state.gamepad.throttle, 0.0);
    }

    #[test]
    fn test_composite_above_threshold() {
        let mut stage = MappingStage::new();
        let mut state = OutputState::new(1);
        stage.apply(
            &gamepad(),
            &[ControlAction::composite("drive", 0.6, 0.8, true, 0)],
            &mut state,
        );
        assert!((state.gamepad.throttle - 1.0).abs() < 1e-6);
        assert_eq!(state.gamepad.brake, 0.0);

        let mut state = OutputState::new(2);
        stage.apply(
            &gamepad(),
            &[ControlAction::composite("drive", 0.0, -0.75, true, 0)],
            &mut state,
        );
        assert_eq!(state.gamepad.throttle, 0.0);
        assert!((state.gamepad.brake - 0.75).abs() < 1e-6);
    }
}
