//! # Input Sources
//!
//! What a control node reads each frame: touches inside its region, or a
//! named sensor entry of the raw frame.
//!
//! ## Binding Syntax
//!
//! | Binding | Reads | Valid for |
//! |---------|-------|-----------|
//! | `touch` | touches inside the node region | every node kind |
//! | `gamepad:<name>` | `gamepad_axes[name]` / `gamepad_buttons[name]` | Axis / Button |
//! | `button:<name>` | `buttons[name]` | Button |
//! | `accel:x`, `accel:y`, `accel:z` | accelerometer component | Axis |
//!
//! A missing entry reads as released (buttons) or neutral (axes).

use super::frame::RawInputFrame;
use super::node::NodeKind;

/// Accelerometer component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelAxis {
    X,
    Y,
    Z,
}

/// Where a node takes its input from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InputSource {
    /// Touches inside the node region.
    #[default]
    Touch,
    /// A named gamepad axis or button.
    Gamepad(String),
    /// A named hardware button.
    Button(String),
    Accel(AccelAxis),
}

impl InputSource {
    /// Parses a binding such as `gamepad:left_x` or `accel:z`.
    ///
    /// # Examples
    ///
    /// ```
    /// use control_mapper::capture::source::{AccelAxis, InputSource};
    ///
    /// assert_eq!(InputSource::parse("touch"), Some(InputSource::Touch));
    /// assert_eq!(InputSource::parse("gamepad:a"), Some(InputSource::Gamepad("a".into())));
    /// assert_eq!(InputSource::parse("accel:Z"), Some(InputSource::Accel(AccelAxis::Z)));
    /// assert_eq!(InputSource::parse("gamepad:"), None);
    /// ```
    #[must_use]
    pub fn parse(binding: &str) -> Option<Self> {
        let binding = binding.trim();
        if binding.eq_ignore_ascii_case("touch") {
            return Some(InputSource::Touch);
        }

        let (family, name) = binding.split_once(':')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        match family.trim().to_ascii_lowercase().as_str() {
            "gamepad" => Some(InputSource::Gamepad(name.to_string())),
            "button" => Some(InputSource::Button(name.to_string())),
            "accel" => match name.to_ascii_lowercase().as_str() {
                "x" => Some(InputSource::Accel(AccelAxis::X)),
                "y" => Some(InputSource::Accel(AccelAxis::Y)),
                "z" => Some(InputSource::Accel(AccelAxis::Z)),
                _ => None,
            },
            _ => None,
        }
    }

    /// True if a node of `kind` can read this source.
    #[must_use]
    pub fn accepts(&self, kind: NodeKind) -> bool {
        match self {
            InputSource::Touch => true,
            InputSource::Gamepad(_) => matches!(kind, NodeKind::Button | NodeKind::Axis { .. }),
            InputSource::Button(_) => matches!(kind, NodeKind::Button),
            InputSource::Accel(_) => matches!(kind, NodeKind::Axis { .. }),
        }
    }

    /// Digital reading. Touch and accelerometer sources never read pressed.
    #[must_use]
    pub fn pressed(&self, raw: &RawInputFrame) -> bool {
        match self {
            InputSource::Gamepad(name) => raw.gamepad_buttons.get(name).copied().unwrap_or(false),
            InputSource::Button(name) => raw.buttons.get(name).copied().unwrap_or(false),
            InputSource::Touch | InputSource::Accel(_) => false,
        }
    }

    /// Analog reading in the sensor's own units, or `None` when there is none.
    #[must_use]
    pub fn analog(&self, raw: &RawInputFrame) -> Option<f32> {
        match self {
            InputSource::Gamepad(name) => raw.gamepad_axes.get(name).copied(),
            InputSource::Accel(AccelAxis::X) => Some(raw.accel.x),
            InputSource::Accel(AccelAxis::Y) => Some(raw.accel.y),
            InputSource::Accel(AccelAxis::Z) => Some(raw.accel.z),
            InputSource::Touch | InputSource::Button(_) => None,
        }
    }
}

impl std::fmt::Display for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputSource::Touch => write!(f, "touch"),
            InputSource::Gamepad(name) => write!(f, "gamepad:{}", name),
            InputSource::Button(name) => write!(f, "button:{}", name),
            InputSource::Accel(AccelAxis::X) => write!(f, "accel:x"),
            InputSource::Accel(AccelAxis::Y) => write!(f, "accel:y"),
            InputSource::Accel(AccelAxis::Z) => write!(f, "accel:z"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::node::GestureKind;

    fn frame() -> RawInputFrame {
        RawInputFrame::at(0)
            .with_gamepad_axis("left_x", -0.25)
            .with_gamepad_button("a", true)
            .with_button("volume_up", true)
            .with_accel(0.5, -9.81, 1.0)
    }

    // ==================== Parse Tests ====================

    #[test]
    fn test_parse_bindings() {
        assert_eq!(InputSource::parse(" Touch "), Some(InputSource::Touch));
        assert_eq!(
            InputSource::parse("gamepad:left_x"),
            Some(InputSource::Gamepad("left_x".to_string()))
        );
        assert_eq!(
            InputSource::parse("BUTTON:volume_up"),
            Some(InputSource::Button("volume_up".to_string()))
        );
        assert_eq!(InputSource::parse("accel:y"), Some(InputSource::Accel(AccelAxis::Y)));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(InputSource::parse("gamepad"), None);
        assert_eq!(InputSource::parse("button: "), None);
        assert_eq!(InputSource::parse("accel:w"), None);
        assert_eq!(InputSource::parse("mouse:left"), None);
    }

    #[test]
    fn test_display_round_trips_parse() {
        for binding in ["touch", "gamepad:left_x", "button:home", "accel:z"] {
            assert_eq!(InputSource::parse(binding).unwrap().to_string(), binding);
        }
    }

    // ==================== Compatibility Tests ====================

    #[test]
    fn test_accepts_by_node_kind() {
        let axis = NodeKind::Axis { min: -1.0, max: 1.0 };
        let gyro = NodeKind::Gyroscope { sensitivity: 1.0, touch_gated: false };

        assert!(InputSource::Touch.accepts(gyro));
        assert!(InputSource::Gamepad("a".into()).accepts(NodeKind::Button));
        assert!(InputSource::Gamepad("left_x".into()).accepts(axis));
        assert!(InputSource::Button("home".into()).accepts(NodeKind::Button));
        assert!(!InputSource::Button("home".into()).accepts(axis));
        assert!(InputSource::Accel(AccelAxis::X).accepts(axis));
        assert!(!InputSource::Accel(AccelAxis::X).accepts(NodeKind::Button));
        assert!(!InputSource::Gamepad("a".into()).accepts(NodeKind::Gesture(GestureKind::Drag)));
    }

    // ==================== Reading Tests ====================

    #[test]
    fn test_digital_readings() {
        let raw = frame();
        assert!(InputSource::Gamepad("a".into()).pressed(&raw));
        assert!(!InputSource::Gamepad("b".into()).pressed(&raw));
        assert!(InputSource::Button("volume_up".into()).pressed(&raw));
        assert!(!InputSource::Touch.pressed(&raw));
    }

    #[test]
    fn test_analog_readings() {
        let raw = frame();
        assert_eq!(InputSource::Gamepad("left_x".into()).analog(&raw), Some(-0.25));
        assert_eq!(InputSource::Gamepad("right_x".into()).analog(&raw), None);
        assert_eq!(InputSource::Accel(AccelAxis::Y).analog(&raw), Some(-9.81));
        assert_eq!(InputSource::Button("volume_up".into()).analog(&raw), None);
    }
}
