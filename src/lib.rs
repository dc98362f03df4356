//! # Control Mapper Library
//!
//! Turn raw touch, gyroscope and gamepad samples into a device-agnostic
//! output state, one frame at a time.
//!
//! Every frame flows capture → semantic → mapping:
//! - [`capture`] turns the raw frame into semantic actions via control nodes
//! - [`processing`] reshapes action values (deadzone, curve, invert, remap, smoothing)
//! - [`profile`] optionally lets a user script override the semantic stage,
//!   with validation, atomic switching and rollback
//! - [`mapping`] resolves actions to keys, buttons and axes of the [`mapping::OutputState`]
//! - [`pipeline`] coordinates the stages for one frame

pub mod capture;
pub mod config;
pub mod error;
pub mod mapping;
pub mod pipeline;
pub mod processing;
pub mod profile;
pub mod telemetry;
