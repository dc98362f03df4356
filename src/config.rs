//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files, and
//! building the pipeline parts the configuration declares.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::frame::LayoutMetrics;
use crate::capture::node::{ControlNode, GestureKind, NodeKind, Region, DEFAULT_GYRO_SENSITIVITY};
use crate::capture::source::InputSource;
use crate::error::{ControlMapperError, Result};
use crate::mapping::{DeviceMapping, MappingRegistry, MappingType};
use crate::pipeline::{Pipeline, PipelineContext};
use crate::processing::ProcessingConfig;
use crate::profile::engine::ScriptEngine;
use crate::profile::{Profile, ProfileRuntime, RhaiScriptEngine, DEFAULT_ENTRY_POINT};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub layout: LayoutConfig,

    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    /// Processing parameters keyed by operation type
    #[serde(default)]
    pub processing: HashMap<String, ProcessingConfig>,

    #[serde(default)]
    pub mappings: Vec<MappingConfig>,

    /// Profile loaded at startup
    #[serde(default)]
    pub profile: Option<ProfileConfig>,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Frame loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_frame_rate_hz")]
    pub frame_rate_hz: u32,

    /// Wall-clock budget for one profile update call
    #[serde(default = "default_script_timeout_ms")]
    pub script_timeout_ms: u64,

    /// Cooperative bound on script work per call
    #[serde(default = "default_script_max_operations")]
    pub script_max_operations: u64,
}

/// Screen dimensions used to normalize pixel coordinates
#[derive(Debug, Deserialize, Clone)]
pub struct LayoutConfig {
    #[serde(default = "default_width_px")]
    pub width_px: f32,

    #[serde(default = "default_height_px")]
    pub height_px: f32,
}

/// Control node flavour
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeKindConfig {
    Button,
    Axis,
    Gyroscope,
    TwoFingerPan,
    Drag,
}

/// Control node declaration
#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    pub id: String,

    pub kind: NodeKindConfig,

    /// `[x, y, width, height]` in normalized screen space
    #[serde(default = "default_region")]
    pub region: [f32; 4],

    pub operation: String,

    /// Sensor read instead of touches: `gamepad:<name>`, `button:<name>`
    /// or `accel:<x|y|z>`
    #[serde(default)]
    pub source: Option<String>,

    #[serde(default = "default_axis_min")]
    pub min: f32,

    #[serde(default = "default_axis_max")]
    pub max: f32,

    #[serde(default = "default_sensitivity")]
    pub sensitivity: f32,

    #[serde(default)]
    pub touch_gated: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub visible: bool,
}

/// Device mapping declaration
#[derive(Debug, Deserialize, Clone)]
pub struct MappingConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub mapping_type: MappingType,

    #[serde(default)]
    pub active: bool,

    /// Operation → key
    #[serde(default)]
    pub keys: HashMap<String, String>,

    /// Operation → axis
    #[serde(default)]
    pub axes: HashMap<String, String>,

    /// Operation → button
    #[serde(default)]
    pub buttons: HashMap<String, String>,

    #[serde(default)]
    pub toggles: Vec<String>,

    #[serde(default)]
    pub joystick_deadzone: f32,

    #[serde(default)]
    pub joystick_smoothing: f32,

    #[serde(default)]
    pub gyro_deadzone: f32,

    #[serde(default)]
    pub gyro_smoothing: f32,
}

/// Startup profile
#[derive(Debug, Deserialize, Clone)]
pub struct ProfileConfig {
    pub file: PathBuf,

    pub name: String,

    #[serde(default = "default_profile_version")]
    pub version: String,

    #[serde(default)]
    pub author: Option<String>,

    #[serde(default = "default_entry_point")]
    pub entry_point: String,
}

/// Telemetry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_record_every_frames")]
    pub record_every_frames: u64,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Diagnostic logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Daily rolling log files are written here when set
    #[serde(default)]
    pub directory: Option<String>,

    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
}

// Default value functions
fn default_frame_rate_hz() -> u32 { 60 }
fn default_script_timeout_ms() -> u64 { 5 }
fn default_script_max_operations() -> u64 { 100_000 }

fn default_width_px() -> f32 { 1920.0 }
fn default_height_px() -> f32 { 1080.0 }

fn default_region() -> [f32; 4] { [0.0, 0.0, 1.0, 1.0] }
fn default_axis_min() -> f32 { -1.0 }
fn default_axis_max() -> f32 { 1.0 }
fn default_sensitivity() -> f32 { DEFAULT_GYRO_SENSITIVITY }
fn default_true() -> bool { true }

fn default_profile_version() -> String { "1.0".to_string() }
fn default_entry_point() -> String { DEFAULT_ENTRY_POINT.to_string() }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_record_every_frames() -> u64 { 1 }
fn default_log_format() -> String { "jsonl".to_string() }

fn default_log_level() -> String { "info".to_string() }
fn default_log_file_prefix() -> String { "control-mapper.log".to_string() }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: default_frame_rate_hz(),
            script_timeout_ms: default_script_timeout_ms(),
            script_max_operations: default_script_max_operations(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            width_px: default_width_px(),
            height_px: default_height_px(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            record_every_frames: default_record_every_frames(),
            format: default_log_format(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            file_prefix: default_log_file_prefix(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            layout: LayoutConfig::default(),
            nodes: Vec::new(),
            processing: HashMap::new(),
            mappings: Vec::new(),
            profile: None,
            telemetry: TelemetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl NodeConfig {
    fn node_kind(&self) -> NodeKind {
        match self.kind {
            NodeKindConfig::Button => NodeKind::Button,
            NodeKindConfig::Axis => NodeKind::Axis {
                min: self.min,
                max: self.max,
            },
            NodeKindConfig::Gyroscope => NodeKind::Gyroscope {
                sensitivity: self.sensitivity,
                touch_gated: self.touch_gated,
            },
            NodeKindConfig::TwoFingerPan => NodeKind::Gesture(GestureKind::TwoFingerPan),
            NodeKindConfig::Drag => NodeKind::Gesture(GestureKind::Drag),
        }
    }

    /// Parsed sensor binding; touch when none is declared.
    fn input_source(&self) -> Option<InputSource> {
        match &self.source {
            Some(binding) => InputSource::parse(binding),
            None => Some(InputSource::Touch),
        }
    }

    /// Builds the control node this declaration describes.
    #[must_use]
    pub fn to_node(&self) -> ControlNode {
        let [x, y, w, h] = self.region;
        ControlNode::new(&self.id, Region::new(x, y, w, h), &self.operation, self.node_kind())
            .with_source(self.input_source().unwrap_or_default())
            .with_enabled(self.enabled)
            .with_visible(self.visible)
    }
}

impl MappingConfig {
    /// Builds the device mapping this declaration describes.
    #[must_use]
    pub fn to_mapping(&self) -> DeviceMapping {
        let mut mapping = DeviceMapping::new(&self.name, self.mapping_type)
            .with_joystick_hints(self.joystick_deadzone, self.joystick_smoothing)
            .with_gyroscope_hints(self.gyro_deadzone, self.gyro_smoothing);
        for (op, key) in &self.keys {
            mapping = mapping.with_key(op, key);
        }
        for (op, axis) in &self.axes {
            mapping = mapping.with_axis(op, axis);
        }
        for (op, button) in &self.buttons {
            mapping = mapping.with_button(op, button);
        }
        for op in &self.toggles {
            mapping = mapping.with_toggle(op);
        }
        mapping
    }
}

impl ProfileConfig {
    /// Reads the profile source. Relative paths resolve against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub fn load_profile(&self, base_dir: &Path) -> Result<Profile> {
        let path = if self.file.is_relative() {
            base_dir.join(&self.file)
        } else {
            self.file.clone()
        };
        let mut profile = Profile::from_file(path, &self.name, &self.version)?
            .with_entry_point(&self.entry_point);
        if let Some(author) = &self.author {
            profile = profile.with_author(author);
        }
        Ok(profile)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use control_mapper::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns error if parsing or validation fails
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Validate pipeline timing
        if self.pipeline.frame_rate_hz == 0 || self.pipeline.frame_rate_hz > 1000 {
            return Err(ControlMapperError::invalid_config(
                "frame_rate_hz must be between 1 and 1000",
            ));
        }

        if self.pipeline.script_timeout_ms == 0 {
            return Err(ControlMapperError::invalid_config(
                "script_timeout_ms must be greater than 0",
            ));
        }

        if self.pipeline.script_max_operations == 0 {
            return Err(ControlMapperError::invalid_config(
                "script_max_operations must be greater than 0",
            ));
        }

        // Validate layout
        if !(self.layout.width_px > 0.0 && self.layout.height_px > 0.0) {
            return Err(ControlMapperError::invalid_config(
                "layout width_px and height_px must be greater than 0",
            ));
        }

        self.validate_nodes()?;

        // Validate processing parameters
        for (op, processing) in &self.processing {
            processing.validate().map_err(|e| match e {
                ControlMapperError::Config(inner) => ControlMapperError::invalid_config(format!(
                    "processing.{}: {}",
                    op,
                    inner.message()
                )),
                other => other,
            })?;
        }

        self.validate_mappings()?;

        // Validate profile
        if let Some(profile) = &self.profile {
            if profile.name.trim().is_empty() {
                return Err(ControlMapperError::invalid_config("profile name cannot be empty"));
            }
            if profile.file.as_os_str().is_empty() {
                return Err(ControlMapperError::invalid_config("profile file cannot be empty"));
            }
        }

        // Validate telemetry configuration
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(ControlMapperError::invalid_config(
                "telemetry log_dir cannot be empty when enabled",
            ));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(ControlMapperError::invalid_config(
                "max_records_per_file must be greater than 0",
            ));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(ControlMapperError::invalid_config(
                "max_files_to_keep must be greater than 0",
            ));
        }

        if self.telemetry.record_every_frames == 0 {
            return Err(ControlMapperError::invalid_config(
                "record_every_frames must be greater than 0",
            ));
        }

        if self.telemetry.format != "jsonl" {
            return Err(ControlMapperError::invalid_config(
                "log format must be 'jsonl' (only supported format)",
            ));
        }

        // Validate logging level
        if !["trace", "debug", "info", "warn", "error"]
            .contains(&self.logging.level.to_ascii_lowercase().as_str())
        {
            return Err(ControlMapperError::invalid_config(
                "logging level must be one of: trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }

    fn validate_nodes(&self) -> Result<()> {
        const EPSILON: f32 = 1e-6;
        let mut ids = HashSet::new();

        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(ControlMapperError::invalid_config("node id cannot be empty"));
            }
            if !ids.insert(node.id.as_str()) {
                return Err(ControlMapperError::invalid_config(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
            if node.operation.trim().is_empty() {
                return Err(ControlMapperError::invalid_config(format!(
                    "node '{}' has an empty operation",
                    node.id
                )));
            }

            let [x, y, w, h] = node.region;
            if !(w > 0.0 && h > 0.0) {
                return Err(ControlMapperError::invalid_config(format!(
                    "node '{}' region must have a positive width and height",
                    node.id
                )));
            }
            if x < 0.0 || y < 0.0 || x + w > 1.0 + EPSILON || y + h > 1.0 + EPSILON {
                return Err(ControlMapperError::invalid_config(format!(
                    "node '{}' region must lie within [0, 1]",
                    node.id
                )));
            }

            let Some(source) = node.input_source() else {
                return Err(ControlMapperError::invalid_config(format!(
                    "node '{}' has an invalid source '{}'",
                    node.id,
                    node.source.as_deref().unwrap_or_default()
                )));
            };
            if !source.accepts(node.node_kind()) {
                return Err(ControlMapperError::invalid_config(format!(
                    "{:?} node '{}' cannot read source '{}'",
                    node.kind, node.id, source
                )));
            }

            if node.kind == NodeKindConfig::Axis && node.min == node.max {
                return Err(ControlMapperError::invalid_config(format!(
                    "axis node '{}' min and max must differ",
                    node.id
                )));
            }
        }
        Ok(())
    }

    fn validate_mappings(&self) -> Result<()> {
        let mut names = HashSet::new();
        for mapping in &self.mappings {
            if mapping.name.trim().is_empty() {
                return Err(ControlMapperError::invalid_config("mapping name cannot be empty"));
            }
            if !names.insert(mapping.name.as_str()) {
                return Err(ControlMapperError::invalid_config(format!(
                    "duplicate mapping name '{}'",
                    mapping.name
                )));
            }
        }

        if self.mappings.iter().filter(|m| m.active).count() > 1 {
            return Err(ControlMapperError::invalid_config(
                "at most one mapping can be active",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn layout_metrics(&self) -> LayoutMetrics {
        LayoutMetrics::new(self.layout.width_px, self.layout.height_px)
    }

    #[must_use]
    pub fn script_budget(&self) -> Duration {
        Duration::from_millis(self.pipeline.script_timeout_ms)
    }

    #[must_use]
    pub fn control_nodes(&self) -> Vec<ControlNode> {
        self.nodes.iter().map(NodeConfig::to_node).collect()
    }

    /// Registers every declared mapping and activates the one marked
    /// `active`, or the first one if none is marked.
    #[must_use]
    pub fn mapping_registry(&self) -> MappingRegistry {
        let mut registry = MappingRegistry::new();
        for mapping in &self.mappings {
            registry.register(mapping.to_mapping());
        }
        let active = self
            .mappings
            .iter()
            .find(|m| m.active)
            .or_else(|| self.mappings.first());
        if let Some(active) = active {
            registry.activate(&active.name);
        }
        registry
    }

    /// A profile runtime whose engines honor `script_max_operations`.
    #[must_use]
    pub fn profile_runtime(&self) -> ProfileRuntime {
        let max_operations = self.pipeline.script_max_operations;
        ProfileRuntime::new(Box::new(move || {
            Box::new(RhaiScriptEngine::new(max_operations)) as Box<dyn ScriptEngine>
        }))
    }

    /// Builds the full pipeline this configuration declares, with no profile loaded.
    #[must_use]
    pub fn build_pipeline(&self) -> Pipeline {
        let mut context = PipelineContext::new(self.profile_runtime().shared());
        context.nodes = self.control_nodes();
        context.processing = self.processing.clone();
        context.mappings = self.mapping_registry();
        context.metrics = self.layout_metrics();
        context.script_budget = self.script_budget();
        Pipeline::new(context)
    }
}
