//! # Mapping Module
//!
//! Third pipeline stage: resolves processed actions to device output fields.
//!
//! This module handles:
//! - The externally visible per-frame result ([`output`])
//! - Mapping tables, per-frame clearing and fan-out rules ([`device`])
//! - Key alias normalization ([`keys`])
//! - Retaining every loaded mapping while exactly one is active ([`MappingRegistry`])

pub mod device;
pub mod keys;
pub mod output;

pub use device::{DeviceMapping, MappingStage, MappingType, OutputDelta};
pub use output::{OutputState, RuntimeStatus};

use std::collections::HashMap;
use tracing::{debug, info};

/// Every loaded mapping, with at most one active.
///
/// Switching the active mapping swaps an index; mappings are never rebuilt.
#[derive(Debug, Clone, Default)]
pub struct MappingRegistry {
    mappings: Vec<DeviceMapping>,
    by_name: HashMap<String, usize>,
    active: Option<usize>,
}

impl MappingRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a mapping without changing which one is active.
    pub fn register(&mut self, mapping: DeviceMapping) -> usize {
        match self.by_name.get(mapping.name()) {
            Some(&index) => {
                debug!("Replacing mapping '{}'", mapping.name());
                self.mappings[index] = mapping;
                index
            }
            None => {
                let index = self.mappings.len();
                self.by_name.insert(mapping.name().to_string(), index);
                self.mappings.push(mapping);
                index
            }
        }
    }

    /// Adds or replaces a mapping and makes it active.
    pub fn set_mapping(&mut self, mapping: DeviceMapping) {
        let name = mapping.name().to_string();
        let index = self.register(mapping);
        self.active = Some(index);
        info!("Active mapping: {}", name);
    }

    /// Activates a retained mapping by name. Returns false if unknown.
    pub fn activate(&mut self, name: &str) -> bool {
        match self.by_name.get(name) {
            Some(&index) => {
                self.active = Some(index);
                info!("Active mapping: {}", name);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn active(&self) -> Option<&DeviceMapping> {
        self.active.and_then(|index| self.mappings.get(index))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DeviceMapping> {
        self.by_name.get(name).map(|&index| &self.mappings[index])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
