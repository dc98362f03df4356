//! # Pipeline Module
//!
//! Runs one frame through capture → semantic → mapping and returns the
//! frame's [`OutputState`].
//!
//! This module handles:
//! - Assembling the stages from an explicit [`PipelineContext`]
//! - Strictly increasing frame ids
//! - Serializing the semantic stage against profile commands through the
//!   shared [`ProfileRuntime`] lock
//! - Dropping held state (smoothing memory, toggle latches) whenever the
//!   runtime discards a profile
//!
//! Only the semantic stage runs under the profile lock; capture and mapping
//! touch frame-local data only.

use std::collections::HashMap;
use std::sync::{MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::capture::frame::{LayoutMetrics, RawInputFrame};
use crate::capture::node::ControlNode;
use crate::capture::CaptureStage;
use crate::mapping::{DeviceMapping, MappingRegistry, MappingStage, OutputState, RuntimeStatus};
use crate::processing::{OperationProcessor, ProcessingConfig};
use crate::profile::{ProfileRuntime, SharedProfileRuntime};

/// Default wall-clock allowance for a profile's `update` call.
pub const DEFAULT_SCRIPT_BUDGET: Duration = Duration::from_millis(5);

/// Everything the coordinator is built from.
pub struct PipelineContext {
    pub nodes: Vec<ControlNode>,
    pub processing: HashMap<String, ProcessingConfig>,
    pub mappings: MappingRegistry,
    pub profiles: SharedProfileRuntime,
    pub metrics: LayoutMetrics,
    pub script_budget: Duration,
}

impl PipelineContext {
    /// An empty context around an existing profile runtime.
    #[must_use]
    pub fn new(profiles: SharedProfileRuntime) -> Self {
        Self {
            nodes: Vec::new(),
            processing: HashMap::new(),
            mappings: MappingRegistry::new(),
            profiles,
            metrics: LayoutMetrics::default(),
            script_budget: DEFAULT_SCRIPT_BUDGET,
        }
    }
}

/// The frame coordinator.
pub struct Pipeline {
    capture: CaptureStage,
    processor: OperationProcessor,
    mappings: MappingRegistry,
    mapper: MappingStage,
    profiles: SharedProfileRuntime,
    metrics: LayoutMetrics,
    script_budget: Duration,
    last_frame_id: Option<u64>,
}

impl Pipeline {
    #[must_use]
    pub fn new(context: PipelineContext) -> Self {
        Self {
            capture: CaptureStage::new(context.nodes),
            processor: OperationProcessor::with_configs(context.processing),
            mappings: context.mappings,
            mapper: MappingStage::new(),
            profiles: context.profiles,
            metrics: context.metrics,
            script_budget: context.script_budget,
            last_frame_id: None,
        }
    }

    /// Replaces the control node graph.
    pub fn load_nodes(&mut self, nodes: Vec<ControlNode>) {
        debug!("Loaded {} control nodes", nodes.len());
        self.capture.load_nodes(nodes);
    }

    /// Installs `mapping` and makes it the active one.
    pub fn set_mapping(&mut self, mapping: DeviceMapping) {
        self.mappings.set_mapping(mapping);
    }

    /// Retains `mapping` without activating it.
    pub fn register_mapping(&mut self, mapping: DeviceMapping) {
        self.mappings.register(mapping);
    }

    /// Switches to a retained mapping by name.
    pub fn activate_mapping(&mut self, name: &str) -> bool {
        self.mappings.activate(name)
    }

    pub fn set_processing_config(&mut self, operation_type: impl Into<String>, config: ProcessingConfig) {
        self.processor.set_config(operation_type, config);
    }

    pub fn set_layout_metrics(&mut self, metrics: LayoutMetrics) {
        self.metrics = metrics;
    }

    #[must_use]
    pub fn mappings(&self) -> &MappingRegistry {
        &self.mappings
    }

    #[must_use]
    pub fn last_frame_id(&self) -> Option<u64> {
        self.last_frame_id
    }

    /// Handle to the shared profile runtime, for command sources on other threads.
    #[must_use]
    pub fn profiles(&self) -> SharedProfileRuntime {
        SharedProfileRuntime::clone(&self.profiles)
    }

    /// Runs `f` with the profile runtime locked.
    pub fn with_profiles<R>(&self, f: impl FnOnce(&mut ProfileRuntime) -> R) -> R {
        let mut runtime = lock_runtime(&self.profiles);
        f(&mut runtime)
    }

    /// Runs one frame.
    ///
    /// A `frame_id` that does not exceed the previous one is replaced by the
    /// previous id plus one.
    pub fn run_frame(&mut self, raw: &RawInputFrame, frame_id: u64) -> OutputState {
        let frame_id = match self.last_frame_id {
            Some(last) if frame_id <= last => {
                let next = last.saturating_add(1);
                warn!("Frame id {} is not after {}, using {}", frame_id, last, next);
                next
            }
            _ => frame_id,
        };
        self.last_frame_id = Some(frame_id);

        let actions = self.capture.capture(raw, &self.metrics);

        let (semantic, has_profile) = {
            let mut runtime = lock_runtime(&self.profiles);
            if runtime.take_reset_request() {
                debug!("Clearing held state");
                self.processor.reset();
                self.mapper.reset();
            }
            let processed = self.processor.process(actions);
            let frame = runtime.execute_frame(raw, processed, self.script_budget);
            (frame, runtime.current_profile().is_some())
        };

        let mut state = OutputState::new(frame_id);
        let active = self.mappings.active();
        if let Some(mapping) = active {
            self.mapper.apply(mapping, &semantic.actions, &mut state);
        }
        if let Some(delta) = &semantic.delta {
            delta.apply_to(active.map(DeviceMapping::mapping_type), &mut state);
        }

        state.runtime_status = if active.is_none() && !has_profile {
            RuntimeStatus::Error
        } else {
            semantic.status
        };
        trace!("Frame {} -> {:?}", frame_id, state.runtime_status);
        state
    }

    /// Runs one frame with the next frame id.
    pub fn next_frame(&mut self, raw: &RawInputFrame) -> OutputState {
        let frame_id = self.last_frame_id.map_or(1, |last| last.saturating_add(1));
        self.run_frame(raw, frame_id)
    }
}

/// Locks the runtime, recovering from a poisoned lock.
fn lock_runtime(profiles: &SharedProfileRuntime) -> MutexGuard<'_, ProfileRuntime> {
    profiles.lock().unwrap_or_else(PoisonError::into_inner)
}
