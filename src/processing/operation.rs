//! # Operation Processing
//!
//! Semantic stage: reshapes each action's numeric payload according to the
//! [`ProcessingConfig`] registered for its operation type. Actions are never
//! added or dropped here, and actions without a config pass through
//! unchanged.
//!
//! ## Usage
//!
//! ```
//! use control_mapper::capture::action::ControlAction;
//! use control_mapper::processing::operation::{OperationProcessor, ProcessingConfig};
//!
//! let mut processor = OperationProcessor::new();
//! processor.set_config("steer", ProcessingConfig::new(0.2, 2.0));
//!
//! let out = processor.process(vec![ControlAction::analog("steer", 0.3, 0)]);
//! assert!((out[0].value() - 0.015625).abs() < 0.001);
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use tracing::trace;

use super::signal::{curve, deadzone, invert, range_map, smooth};
use crate::capture::action::{ActionKind, ControlAction};
use crate::error::{ControlMapperError, Result};

/// Per-operation processing parameters.
///
/// The chain is always deadzone → curve → invert → range map, followed by
/// exponential smoothing across frames.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Deadzone threshold (0.0 to <1.0).
    pub deadzone: f32,
    /// Curve exponent (> 0.0). 1.0 = linear.
    pub curve: f32,
    /// Smoothing weight of the previous output (0.0 to <1.0).
    pub smoothing: f32,
    /// Input range `[min, max]` of the final remap.
    pub input_range: [f32; 2],
    /// Output range `[min, max]` of the final remap.
    pub output_range: [f32; 2],
    /// Negate before remapping.
    pub invert: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            deadzone: 0.0,
            curve: 1.0,
            smoothing: 0.0,
            input_range: [-1.0, 1.0],
            output_range: [-1.0, 1.0],
            invert: false,
        }
    }
}

impl ProcessingConfig {
    /// Creates a config with the given deadzone and curve exponent.
    #[must_use]
    pub fn new(deadzone: f32, curve: f32) -> Self {
        Self {
            deadzone,
            curve,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    #[must_use]
    pub fn with_ranges(mut self, input: [f32; 2], output: [f32; 2]) -> Self {
        self.input_range = input;
        self.output_range = output;
        self
    }

    #[must_use]
    pub fn with_smoothing(mut self, smoothing: f32) -> Self {
        self.smoothing = smoothing;
        self
    }

    /// Applies deadzone → curve → invert → range map to one value.
    ///
    /// # Examples
    ///
    /// ```
    /// use control_mapper::processing::operation::ProcessingConfig;
    ///
    /// let config = ProcessingConfig::new(0.2, 2.0)
    ///     .with_invert(true)
    ///     .with_ranges([-1.0, 1.0], [0.0, 100.0]);
    /// assert!((config.apply(0.3) - 49.21875).abs() < 0.001);
    /// ```
    #[must_use]
    pub fn apply(&self, value: f32) -> f32 {
        let v = deadzone(value, self.deadzone);
        let v = curve(v, self.curve);
        let v = invert(v, self.invert);
        if self.input_range == self.output_range {
            v
        } else {
            range_map(
                v,
                self.input_range[0],
                self.input_range[1],
                self.output_range[0],
                self.output_range[1],
            )
        }
    }

    /// Checks parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first out-of-range parameter.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.deadzone) {
            return Err(ControlMapperError::invalid_config(
                "deadzone must be in [0.0, 1.0)",
            ));
        }
        if !(self.curve > 0.0 && self.curve.is_finite()) {
            return Err(ControlMapperError::invalid_config(
                "curve exponent must be greater than 0.0",
            ));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(ControlMapperError::invalid_config(
                "smoothing must be in [0.0, 1.0)",
            ));
        }
        if self.input_range[0] == self.input_range[1] {
            return Err(ControlMapperError::invalid_config(
                "input_range bounds must differ",
            ));
        }
        if self.output_range[0] == self.output_range[1] {
            return Err(ControlMapperError::invalid_config(
                "output_range bounds must differ",
            ));
        }
        Ok(())
    }
}

/// Previous smoothed output for one operation type.
#[derive(Debug, Clone, Copy)]
struct SmoothingMemory {
    value: f32,
    secondary: Option<f32>,
    roll: Option<f32>,
}

/// The semantic stage.
#[derive(Debug, Clone, Default)]
pub struct OperationProcessor {
    configs: HashMap<String, ProcessingConfig>,
    memory: HashMap<String, SmoothingMemory>,
}

impl OperationProcessor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a processor from a table of operation configs.
    #[must_use]
    pub fn with_configs(configs: HashMap<String, ProcessingConfig>) -> Self {
        Self {
            configs,
            memory: HashMap::new(),
        }
    }

    /// Registers the config for an operation type.
    pub fn set_config(&mut self, operation_type: impl Into<String>, config: ProcessingConfig) {
        let operation_type = operation_type.into();
        self.memory.remove(&operation_type);
        self.configs.insert(operation_type, config);
    }

    #[must_use]
    pub fn config(&self, operation_type: &str) -> Option<&ProcessingConfig> {
        self.configs.get(operation_type)
    }

    /// Reshapes every action. Output order and length match the input.
    #[must_use]
    pub fn process(&mut self, actions: Vec<ControlAction>) -> Vec<ControlAction> {
        actions
            .into_iter()
            .map(|action| self.process_one(action))
            .collect()
    }

    fn process_one(&mut self, action: ControlAction) -> ControlAction {
        let Some(config) = self.configs.get(action.operation_type()).copied() else {
            return action;
        };

        let shaped = action.reshaped(|v| config.apply(v));
        if config.smoothing <= 0.0 {
            return shaped;
        }

        let op = shaped.operation_type().to_string();
        let roll = match shaped.kind() {
            ActionKind::Gyro { roll } => Some(roll),
            _ => None,
        };
        let optional = |cur: Option<f32>, prev: Option<f32>| match (cur, prev) {
            (Some(cur), Some(p)) => Some(smooth(cur, p, config.smoothing)),
            (cur, _) => cur,
        };
        let (value, secondary, roll) = match self.memory.get(&op) {
            Some(prev) => (
                smooth(shaped.value(), prev.value, config.smoothing),
                optional(shaped.secondary(), prev.secondary),
                optional(roll, prev.roll),
            ),
            None => (shaped.value(), shaped.secondary(), roll),
        };
        trace!("Smoothed '{}' to {}", op, value);
        self.memory.insert(op, SmoothingMemory { value, secondary, roll });

        let smoothed = shaped.with_values(value, secondary);
        match roll {
            Some(roll) => smoothed.with_roll(roll),
            None => smoothed,
        }
    }

    /// Forgets all cross-frame smoothing state.
    pub fn reset(&mut self) {
        self.memory.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== ProcessingConfig Tests ====================

    #[test]
    fn test_default_config_is_identity() {
        let config = ProcessingConfig::default();
        for &x in &[-1.0f32, -0.3, 0.0, 0.123, 1.0] {
            assert_eq!(config.apply(x), x);
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chain_order() {
        let config = ProcessingConfig::new(0.2, 2.0)
            .with_invert(true)
            .with_ranges([-1.0, 1.0], [0.0, 100.0]);
        assert!((config.apply(0.3) - 49.21875).abs() < 0.001);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ProcessingConfig::new(1.0, 1.0).validate().is_err());
        assert!(ProcessingConfig::new(-0.1, 1.0).validate().is_err());
        assert!(ProcessingConfig::new(0.1, 0.0).validate().is_err());
        assert!(ProcessingConfig::new(0.1, -2.0).validate().is_err());
        assert!(ProcessingConfig::default().with_smoothing(1.0).validate().is_err());
        assert!(ProcessingConfig::default()
            .with_ranges([0.0, 0.0], [0.0, 1.0])
            .validate()
            .is_err());
        assert!(ProcessingConfig::default()
            .with_ranges([0.0, 1.0], [2.0, 2.0])
            .validate()
            .is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ProcessingConfig = toml::from_str("deadzone = 0.1\ninvert = true").unwrap();
        assert_eq!(config.deadzone, 0.1);
        assert!(config.invert);
        assert_eq!(config.curve, 1.0);
        assert_eq!(config.output_range, [-1.0, 1.0]);
    }

    // ==================== OperationProcessor Tests ====================

    #[test]
    fn test_unconfigured_actions_pass_through() {
        let mut processor = OperationProcessor::new();
        let action = ControlAction::analog("unknown", 0.37, 9);
        let out = processor.process(vec![action.clone()]);
        assert_eq!(out, vec![action]);
    }

    #[test]
    fn test_process_preserves_count_and_order() {
        let mut processor = OperationProcessor::new();
        processor.set_config("steer", ProcessingConfig::new(0.5, 1.0));

        let out = processor.process(vec![
            ControlAction::analog("steer", 0.2, 0),
            ControlAction::digital("fire", true, 0),
            ControlAction::analog("steer", 1.0, 0),
        ]);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].value(), 0.0);
        assert_eq!(out[1].operation_type(), "fire");
        assert!((out[2].value() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_secondary_and_roll_are_processed() {
        let mut processor = OperationProcessor::new();
        processor.set_config("aim", ProcessingConfig::default().with_invert(true));

        let out = processor.process(vec![ControlAction::gyro("aim", 0.1, 0.2, 0.3, 0)]);
        assert_eq!(out[0].value(), -0.1);
        assert_eq!(out[0].secondary(), Some(-0.2));
        assert_eq!(out[0].kind(), ActionKind::Gyro { roll: -0.3 });
    }

    #[test]
    fn test_smoothing_across_frames() {
        let mut processor = OperationProcessor::new();
        processor.set_config("steer", ProcessingConfig::default().with_smoothing(0.5));

        let first = processor.process(vec![ControlAction::analog("steer", 1.0, 0)]);
        assert_eq!(first[0].value(), 1.0);

        let second = processor.process(vec![ControlAction::analog("steer", 0.0, 1)]);
        assert!((second[0].value() - 0.5).abs() < 1e-6);

        let third = processor.process(vec![ControlAction::analog("steer", 0.0, 2)]);
        assert!((third[0].value() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_gyro_roll_is_smoothed() {
        let mut processor = OperationProcessor::new();
        processor.set_config("aim", ProcessingConfig::default().with_smoothing(0.5));

        let _ = processor.process(vec![ControlAction::gyro("aim", 1.0, 1.0, 1.0, 0)]);
        let out = processor.process(vec![ControlAction::gyro("aim", 0.0, 0.0, 0.0, 1)]);
        assert!((out[0].value() - 0.5).abs() < 1e-6);
        assert!((out[0].secondary().unwrap() - 0.5).abs() < 1e-6);
        match out[0].kind() {
            ActionKind::Gyro { roll } => assert!((roll - 0.5).abs() < 1e-6),
            other => panic!("expected gyro, got {:?}", other),
        }
    }

    #[test]
    fn test_reset_clears_smoothing() {
        let mut processor = OperationProcessor::new();
        processor.set_config("steer", ProcessingConfig::default().with_smoothing(0.5));

        let _ = processor.process(vec![ControlAction::analog("steer", 1.0, 0)]);
        processor.reset();

        let out = processor.process(vec![ControlAction::analog("steer", 0.0, 1)]);
        assert_eq!(out[0].value(), 0.0);
    }
}
