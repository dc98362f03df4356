//! # Telemetry Module
//!
//! Frame telemetry logging to JSONL files with rotation.
//!
//! This module handles:
//! - Formatting output frames as JSONL (JSON Lines)
//! - Writing to rotating log files (max N records per file)
//! - Retaining only the last M files
//! - Sampling every Kth frame

pub mod recorder;

pub use recorder::FrameRecorder;
