//! # Script Engine
//!
//! Capability interface the profile runtime drives, plus the rhai-backed
//! implementation.
//!
//! ## Script Contract
//!
//! A profile declares `fn update(input)` and may declare `fn init()`, which
//! runs once on load. `input` is a map:
//!
//! | Key | Value |
//! |-----|-------|
//! | `timestamp` | frame timestamp in ms |
//! | `touches` | array of `#{id, x, y, pressure}` |
//! | `gyro` | `#{pitch, roll, yaw}` |
//! | `accel` | `#{x, y, z}` |
//! | `buttons`, `gamepad_buttons` | name → bool |
//! | `gamepad_axes` | name → float |
//! | `actions` | default-processed actions as `#{op, kind, value, secondary, pressed}` |
//!
//! `update` returns `()` to keep the default actions, an array of action maps
//! to replace them, or `#{actions, keys, axes}` to also assert keys and axes
//! after mapping.
//!
//! ## Limits
//!
//! rhai's operation counter is the only cooperative bound on a running
//! script. The wall-clock budget is checked after `update` returns; a runaway
//! script is not interrupted by it.

use rhai::{Array, CallFnOptions, Dynamic, Engine, Map, Scope, AST};
use std::time::{Duration, Instant};
use tracing::{debug, error};

use super::Profile;
use crate::capture::action::{ActionKind, ControlAction};
use crate::capture::frame::RawInputFrame;
use crate::error::{ControlMapperError, Result};
use crate::mapping::device::OutputDelta;
use crate::processing::signal;

/// Default cap on rhai operations per call.
pub const DEFAULT_MAX_OPERATIONS: u64 = 100_000;

/// Lifecycle of a script engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Initialized, no script loaded.
    Idle,
    /// Script compiled and ready for `update`.
    Loaded,
    /// Last call faulted; further updates are refused until reset.
    Error,
    Shutdown,
}

/// What a profile's `update` produced for one frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScriptOutput {
    /// Replacement action list, or `None` to keep the default actions.
    pub actions: Option<Vec<ControlAction>>,
    /// Keys and axes asserted after mapping.
    pub delta: OutputDelta,
}

/// Capability interface for an embeddable transform engine.
#[cfg_attr(test, mockall::automock)]
pub trait ScriptEngine: Send {
    /// Prepares the engine for a first load.
    fn init(&mut self) -> Result<()>;

    /// Compiles and installs `profile`. A failure leaves no script loaded.
    fn load_script(&mut self, profile: &Profile) -> Result<()>;

    /// Runs the profile's entry point for one frame.
    ///
    /// `budget` is the caller's wall-clock allowance; exceeding it is
    /// reported as a fault once the call returns.
    fn update(
        &mut self,
        raw: &RawInputFrame,
        actions: &[ControlAction],
        budget: Duration,
    ) -> Result<ScriptOutput>;

    /// Clears any fault and per-script state, keeping the loaded script.
    fn reset(&mut self);

    fn shutdown(&mut self);

    fn state(&self) -> EngineState;

    fn last_error(&self) -> Option<String>;
}

/// [`ScriptEngine`] backed by rhai.
pub struct RhaiScriptEngine {
    engine: Engine,
    ast: Option<AST>,
    entry_point: String,
    state: EngineState,
    last_error: Option<String>,
}

impl RhaiScriptEngine {
    #[must_use]
    pub fn new(max_operations: u64) -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine, max_operations);
        Self {
            engine,
            ast: None,
            entry_point: super::DEFAULT_ENTRY_POINT.to_string(),
            state: EngineState::Idle,
            last_error: None,
        }
    }

    /// Safety limits and the processor helpers scripts may call.
    fn configure_engine(engine: &mut Engine, max_operations: u64) {
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_operations(max_operations);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(1_000);
        engine.set_max_map_size(1_000);

        engine.register_fn("deadzone", |value: f64, threshold: f64| -> f64 {
            f64::from(signal::deadzone(value as f32, threshold as f32))
        });
        engine.register_fn("curve", |value: f64, exponent: f64| -> f64 {
            f64::from(signal::curve(value as f32, exponent as f32))
        });
        engine.register_fn(
            "range_map",
            |value: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64| -> f64 {
                f64::from(signal::range_map(
                    value as f32,
                    in_min as f32,
                    in_max as f32,
                    out_min as f32,
                    out_max as f32,
                ))
            },
        );
        engine.register_fn("clamp", |value: f64, min: f64, max: f64| -> f64 {
            f64::from(signal::clamp(value as f32, min as f32, max as f32))
        });
        engine.register_fn("invert", |value: f64, flag: bool| -> f64 {
            f64::from(signal::invert(value as f32, flag))
        });
    }

    /// Records a fault and hands it back for propagation.
    fn fault(&mut self, err: ControlMapperError) -> ControlMapperError {
        error!("Profile script fault: {}", err);
        self.state = EngineState::Error;
        self.last_error = Some(err.to_string());
        err
    }

    /// Records a load failure. The engine is left with no script.
    fn load_failure(&mut self, message: String) -> ControlMapperError {
        self.ast = None;
        self.state = EngineState::Idle;
        self.last_error = Some(message.clone());
        ControlMapperError::Script(message)
    }
}

impl Default for RhaiScriptEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OPERATIONS)
    }
}

impl std::fmt::Debug for RhaiScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhaiScriptEngine")
            .field("entry_point", &self.entry_point)
            .field("loaded", &self.ast.is_some())
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl ScriptEngine for RhaiScriptEngine {
    fn init(&mut self) -> Result<()> {
        self.ast = None;
        self.state = EngineState::Idle;
        self.last_error = None;
        Ok(())
    }

    fn load_script(&mut self, profile: &Profile) -> Result<()> {
        let ast = match self.engine.compile(profile.source()) {
            Ok(ast) => ast,
            Err(e) => return Err(self.load_failure(format!("compile error in '{}': {}", profile, e))),
        };

        let entry_point = profile.entry_point().to_string();
        let has_entry = ast
            .iter_functions()
            .any(|f| f.name == entry_point && f.params.len() == 1);
        if !has_entry {
            return Err(self.load_failure(format!(
                "'{}' must declare fn {}(input)",
                profile, entry_point
            )));
        }

        let has_init = ast
            .iter_functions()
            .any(|f| f.name == "init" && f.params.is_empty());
        if has_init {
            let mut scope = Scope::new();
            if let Err(e) = self.engine.call_fn::<Dynamic>(&mut scope, &ast, "init", ()) {
                return Err(self.load_failure(format!("init failed in '{}': {}", profile, e)));
            }
        }

        debug!("Loaded profile script '{}'", profile);
        self.ast = Some(ast);
        self.entry_point = entry_point;
        self.state = EngineState::Loaded;
        self.last_error = None;
        Ok(())
    }

    fn update(
        &mut self,
        raw: &RawInputFrame,
        actions: &[ControlAction],
        budget: Duration,
    ) -> Result<ScriptOutput> {
        if self.state == EngineState::Error {
            return Err(ControlMapperError::EngineFault(
                self.last_error.clone().unwrap_or_else(|| "engine in error state".into()),
            ));
        }

        let input = build_input(raw, actions);
        let start = Instant::now();
        let result = match self.ast.as_ref() {
            Some(ast) => {
                let mut scope = Scope::new();
                self.engine.call_fn_with_options::<Dynamic>(
                    CallFnOptions::new().eval_ast(false),
                    &mut scope,
                    ast,
                    &self.entry_point,
                    (Dynamic::from_map(input),),
                )
            }
            None => return Err(ControlMapperError::EngineFault("no script loaded".into())),
        };
        let elapsed = start.elapsed();

        let value = match result {
            Ok(value) => value,
            Err(e) => return Err(self.fault(ControlMapperError::from_rhai(e))),
        };
        if elapsed > budget {
            return Err(self.fault(ControlMapperError::EngineFault(format!(
                "update took {:?}, budget is {:?}",
                elapsed, budget
            ))));
        }

        parse_output(value, raw.timestamp_ms)
            .map_err(|msg| self.fault(ControlMapperError::EngineFault(msg)))
    }

    fn reset(&mut self) {
        self.state = if self.ast.is_some() {
            EngineState::Loaded
        } else {
            EngineState::Idle
        };
        self.last_error = None;
    }

    fn shutdown(&mut self) {
        self.ast = None;
        self.state = EngineState::Shutdown;
    }

    fn state(&self) -> EngineState {
        self.state
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}

// ==================== Conversions ====================

fn action_to_map(action: &ControlAction) -> Map {
    let mut map = Map::new();
    map.insert("op".into(), Dynamic::from(action.operation_type().to_string()));
    map.insert("kind".into(), Dynamic::from(action.kind().name().to_string()));
    map.insert("value".into(), Dynamic::from(f64::from(action.value())));
    map.insert(
        "secondary".into(),
        action
            .secondary()
            .map_or(Dynamic::UNIT, |s| Dynamic::from(f64::from(s))),
    );
    map.insert("pressed".into(), Dynamic::from(action.pressed()));
    if let ActionKind::Gyro { roll } = action.kind() {
        map.insert("roll".into(), Dynamic::from(f64::from(roll)));
    }
    map
}

fn float_map<'a>(entries: impl IntoIterator<Item = (&'a str, f32)>) -> Dynamic {
    let map: Map = entries
        .into_iter()
        .map(|(k, v)| (k.into(), Dynamic::from(f64::from(v))))
        .collect();
    Dynamic::from_map(map)
}

fn bool_map<'a>(entries: impl IntoIterator<Item = (&'a String, &'a bool)>) -> Dynamic {
    let map: Map = entries
        .into_iter()
        .map(|(k, v)| (k.as_str().into(), Dynamic::from(*v)))
        .collect();
    Dynamic::from_map(map)
}

fn build_input(raw: &RawInputFrame, actions: &[ControlAction]) -> Map {
    let touches: Array = raw
        .touches
        .iter()
        .map(|t| {
            let mut map = Map::new();
            map.insert("id".into(), Dynamic::from(rhai::INT::from(t.id)));
            map.insert("x".into(), Dynamic::from(f64::from(t.x)));
            map.insert("y".into(), Dynamic::from(f64::from(t.y)));
            map.insert("pressure".into(), Dynamic::from(f64::from(t.pressure)));
            Dynamic::from_map(map)
        })
        .collect();

    let mut input = Map::new();
    input.insert(
        "timestamp".into(),
        Dynamic::from(rhai::INT::try_from(raw.timestamp_ms).unwrap_or(rhai::INT::MAX)),
    );
    input.insert("touches".into(), Dynamic::from_array(touches));
    input.insert(
        "gyro".into(),
        float_map([
            ("pitch", raw.gyro.pitch),
            ("roll", raw.gyro.roll),
            ("yaw", raw.gyro.yaw),
        ]),
    );
    input.insert(
        "accel".into(),
        float_map([("x", raw.accel.x), ("y", raw.accel.y), ("z", raw.accel.z)]),
    );
    input.insert("buttons".into(), bool_map(&raw.buttons));
    input.insert("gamepad_buttons".into(), bool_map(&raw.gamepad_buttons));
    input.insert(
        "gamepad_axes".into(),
        float_map(raw.gamepad_axes.iter().map(|(k, v)| (k.as_str(), *v))),
    );
    input.insert(
        "actions".into(),
        Dynamic::from_array(
            actions
                .iter()
                .map(|a| Dynamic::from_map(action_to_map(a)))
                .collect(),
        ),
    );
    input
}

fn as_number(value: &Dynamic) -> Option<f32> {
    value
        .as_float()
        .ok()
        .or_else(|| value.as_int().ok().map(|i| i as f64))
        .map(|v| v as f32)
}

fn field_number(map: &Map, key: &str) -> std::result::Result<Option<f32>, String> {
    match map.get(key) {
        None => Ok(None),
        Some(v) if v.is_unit() => Ok(None),
        Some(v) => as_number(v)
            .map(Some)
            .ok_or_else(|| format!("'{}' must be a number, got {}", key, v.type_name())),
    }
}

fn map_to_action(map: &Map, timestamp_ms: u64) -> std::result::Result<ControlAction, String> {
    let op = map
        .get("op")
        .and_then(|v| v.clone().into_string().ok())
        .ok_or_else(|| "action is missing a string 'op'".to_string())?;
    let kind_name = match map.get("kind") {
        Some(v) => v
            .clone()
            .into_string()
            .map_err(|t| format!("action '{}': 'kind' must be a string, got {}", op, t))?,
        None => "analog".to_string(),
    };

    let value = field_number(map, "value")?.unwrap_or(0.0);
    let secondary = field_number(map, "secondary")?;
    let kind = match kind_name.as_str() {
        "digital" => ActionKind::Digital,
        "analog" => ActionKind::Analog,
        "gyro" => ActionKind::Gyro {
            roll: field_number(map, "roll")?.unwrap_or(0.0),
        },
        "gesture" => ActionKind::Gesture,
        "composite" => ActionKind::Composite,
        other => return Err(format!("action '{}': unknown kind '{}'", op, other)),
    };
    let pressed = match map.get("pressed") {
        Some(v) => v
            .as_bool()
            .map_err(|t| format!("action '{}': 'pressed' must be a bool, got {}", op, t))?,
        None => value != 0.0,
    };

    Ok(ControlAction::new(kind, op, value, secondary, pressed, timestamp_ms))
}

fn parse_actions(array: Array, timestamp_ms: u64) -> std::result::Result<Vec<ControlAction>, String> {
    array
        .into_iter()
        .map(|item| {
            let type_name = item.type_name();
            item.try_cast::<Map>()
                .ok_or_else(|| format!("action must be a map, got {}", type_name))
                .and_then(|map| map_to_action(&map, timestamp_ms))
        })
        .collect()
}

fn parse_output(value: Dynamic, timestamp_ms: u64) -> std::result::Result<ScriptOutput, String> {
    if value.is_unit() {
        return Ok(ScriptOutput::default());
    }
    if value.is_array() {
        let array = value.cast::<Array>();
        return Ok(ScriptOutput {
            actions: Some(parse_actions(array, timestamp_ms)?),
            delta: OutputDelta::default(),
        });
    }
    let type_name = value.type_name();
    let Some(map) = value.try_cast::<Map>() else {
        return Err(format!(
            "update must return (), an array or a map, got {}",
            type_name
        ));
    };

    let actions = match map.get("actions") {
        None => None,
        Some(v) if v.is_unit() => None,
        Some(v) => {
            let array = v
                .clone()
                .try_cast::<Array>()
                .ok_or_else(|| format!("'actions' must be an array, got {}", v.type_name()))?;
            Some(parse_actions(array, timestamp_ms)?)
        }
    };

    let mut delta = OutputDelta::default();
    if let Some(keys) = map.get("keys") {
        let keys = keys
            .clone()
            .try_cast::<Array>()
            .ok_or_else(|| format!("'keys' must be an array, got {}", keys.type_name()))?;
        for key in keys {
            let key = key
                .into_string()
                .map_err(|t| format!("key must be a string, got {}", t))?;
            delta.keys.push(key);
        }
    }
    if let Some(axes) = map.get("axes") {
        let axes = axes
            .clone()
            .try_cast::<Map>()
            .ok_or_else(|| format!("'axes' must be a map, got {}", axes.type_name()))?;
        for (name, v) in &axes {
            let value = as_number(v)
                .ok_or_else(|| format!("axis '{}' must be a number, got {}", name, v.type_name()))?;
            delta.axes.push((name.to_string(), value));
        }
    }

    Ok(ScriptOutput { actions, delta })
}
