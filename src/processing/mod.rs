//! # Processing Module
//!
//! Deterministic numeric processing for the semantic stage.
//!
//! This module handles:
//! - Stateless signal processors: deadzone, curve, range remap, clamp, invert ([`signal`])
//! - Per-operation processing configs and the semantic stage itself ([`operation`])

pub mod operation;
pub mod signal;

pub use operation::{OperationProcessor, ProcessingConfig};
