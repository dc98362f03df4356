//! # Control Actions
//!
//! One frame's semantic output from a control node or a profile script,
//! prior to device mapping. Actions are rebuilt every frame and never
//! mutated after construction; transforms produce new instances.

/// Tag describing how an action's payload is interpreted downstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionKind {
    /// Pressed/released input (buttons).
    Digital,
    /// Single-axis analog input.
    Analog,
    /// Angular rates. `value` is yaw, `secondary` is pitch.
    Gyro {
        /// Roll rate.
        roll: f32,
    },
    /// Two-finger gesture. `value`/`secondary` are the horizontal/vertical offsets.
    Gesture,
    /// Combined steering/throttle stick.
    Composite,
}

impl ActionKind {
    /// Stable lowercase name, as seen by profile scripts.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Digital => "digital",
            ActionKind::Analog => "analog",
            ActionKind::Gyro { .. } => "gyro",
            ActionKind::Gesture => "gesture",
            ActionKind::Composite => "composite",
        }
    }
}

/// A single semantic action.
///
/// # Examples
///
/// ```
/// use control_mapper::capture::action::{ActionKind, ControlAction};
///
/// let fire = ControlAction::digital("fire", true, 16);
/// assert_eq!(fire.kind(), ActionKind::Digital);
/// assert!(fire.pressed());
/// assert_eq!(fire.value(), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ControlAction {
    kind: ActionKind,
    operation_type: String,
    value: f32,
    secondary: Option<f32>,
    pressed: bool,
    timestamp_ms: u64,
}

impl ControlAction {
    /// Creates an action from all of its parts.
    #[must_use]
    pub fn new(
        kind: ActionKind,
        operation_type: impl Into<String>,
        value: f32,
        secondary: Option<f32>,
        pressed: bool,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            kind,
            operation_type: operation_type.into(),
            value,
            secondary,
            pressed,
            timestamp_ms,
        }
    }

    /// Digital action. Value is 1.0 when pressed, 0.0 otherwise.
    #[must_use]
    pub fn digital(operation_type: impl Into<String>, pressed: bool, timestamp_ms: u64) -> Self {
        let value = if pressed { 1.0 } else { 0.0 };
        Self::new(ActionKind::Digital, operation_type, value, None, pressed, timestamp_ms)
    }

    /// Analog action on a single axis.
    #[must_use]
    pub fn analog(operation_type: impl Into<String>, value: f32, timestamp_ms: u64) -> Self {
        Self::new(ActionKind::Analog, operation_type, value, None, value != 0.0, timestamp_ms)
    }

    /// Gyro action from scaled angular rates.
    #[must_use]
    pub fn gyro(
        operation_type: impl Into<String>,
        yaw: f32,
        pitch: f32,
        roll: f32,
        timestamp_ms: u64,
    ) -> Self {
        Self::new(
            ActionKind::Gyro { roll },
            operation_type,
            yaw,
            Some(pitch),
            true,
            timestamp_ms,
        )
    }

    /// Two-value gesture action.
    #[must_use]
    pub fn gesture(
        operation_type: impl Into<String>,
        x: f32,
        y: f32,
        pressed: bool,
        timestamp_ms: u64,
    ) -> Self {
        Self::new(ActionKind::Gesture, operation_type, x, Some(y), pressed, timestamp_ms)
    }

    /// Steering/throttle composite action.
    #[must_use]
    pub fn composite(
        operation_type: impl Into<String>,
        steering: f32,
        throttle: f32,
        pressed: bool,
        timestamp_ms: u64,
    ) -> Self {
        Self::new(
            ActionKind::Composite,
            operation_type,
            steering,
            Some(throttle),
            pressed,
            timestamp_ms,
        )
    }

    #[must_use]
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Key into the processing and mapping tables.
    #[must_use]
    pub fn operation_type(&self) -> &str {
        &self.operation_type
    }

    #[must_use]
    pub fn value(&self) -> f32 {
        self.value
    }

    #[must_use]
    pub fn secondary(&self) -> Option<f32> {
        self.secondary
    }

    #[must_use]
    pub fn pressed(&self) -> bool {
        self.pressed
    }

    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Returns a new action whose numeric payload has been passed through `f`.
    ///
    /// The digital flag, operation type and timestamp are carried over.
    #[must_use]
    pub fn reshaped(&self, mut f: impl FnMut(f32) -> f32) -> Self {
        let kind = match self.kind {
            ActionKind::Gyro { roll } => ActionKind::Gyro { roll: f(roll) },
            other => other,
        };
        let value = f(self.value);
        let secondary = self.secondary.map(&mut f);
        Self {
            kind,
            operation_type: self.operation_type.clone(),
            value,
            secondary,
            pressed: self.pressed,
            timestamp_ms: self.timestamp_ms,
        }
    }

    /// Replaces the roll payload of a gyro action; other kinds are unchanged.
    #[must_use]
    pub fn with_roll(mut self, roll: f32) -> Self {
        if let ActionKind::Gyro { .. } = self.kind {
            self.kind = ActionKind::Gyro { roll };
        }
        self
    }

    /// Returns a copy carrying explicit payload values.
    #[must_use]
    pub fn with_values(&self, value: f32, secondary: Option<f32>) -> Self {
        Self {
            kind: self.kind,
            operation_type: self.operation_type.clone(),
            value,
            secondary,
            pressed: self.pressed,
            timestamp_ms: self.timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digital_values() {
        let pressed = ControlAction::digital("jump", true, 1);
        assert_eq!(pressed.value(), 1.0);
        assert!(pressed.pressed());

        let released = ControlAction::digital("jump", false, 1);
        assert_eq!(released.value(), 0.0);
        assert!(!released.pressed());
        assert_eq!(released.secondary(), None);
    }

    #[test]
    fn test_gyro_layout() {
        let action = ControlAction::gyro("aim", 0.1, 0.2, 0.3, 5);
        assert_eq!(action.value(), 0.1);
        assert_eq!(action.secondary(), Some(0.2));
        assert_eq!(action.kind(), ActionKind::Gyro { roll: 0.3 });
        assert_eq!(action.kind().name(), "gyro");
    }

    #[test]
    fn test_reshaped_applies_to_every_value() {
        let action = ControlAction::gyro("aim", 1.0, 2.0, 3.0, 5);
        let doubled = action.reshaped(|v| v * 2.0);

        assert_eq!(doubled.value(), 2.0);
        assert_eq!(doubled.secondary(), Some(4.0));
        assert_eq!(doubled.kind(), ActionKind::Gyro { roll: 6.0 });
        assert_eq!(doubled.operation_type(), "aim");
        assert_eq!(doubled.timestamp_ms(), 5);

        // Original untouched
        assert_eq!(action.value(), 1.0);
    }

    #[test]
    fn test_reshaped_keeps_pressed_flag() {
        let action = ControlAction::digital("fire", true, 0);
        let zeroed = action.reshaped(|_| 0.0);
        assert!(zeroed.pressed());
        assert_eq!(zeroed.value(), 0.0);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ActionKind::Digital.name(), "digital");
        assert_eq!(ActionKind::Analog.name(), "analog");
        assert_eq!(ActionKind::Gesture.name(), "gesture");
        assert_eq!(ActionKind::Composite.name(), "composite");
    }
}
