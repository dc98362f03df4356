//! # Signal Processors
//!
//! Pure numeric transforms shared by every stage of the pipeline.
//!
//! ## Deadzone
//!
//! A deadzone eliminates small movements near center to prevent drift.
//! Values within the deadzone are mapped to 0.0, while values outside
//! are rescaled so the output still reaches full magnitude at `|value| = 1`.
//!
//! Formula: `sign(value) * (|value| - threshold) / (1 - threshold)`
//!
//! ## Curves
//!
//! A sign-preserving power curve: `sign(value) * |value|^exponent`.
//!
//! - `exponent = 1.0`: Linear passthrough (bit-exact)
//! - `exponent > 1.0`: Finer control near center
//! - `exponent < 1.0`: More aggressive response near center
//!
//! ## Chaining
//!
//! When chained, the order is always deadzone → curve → invert → range map.
//!
//! ```
//! use control_mapper::processing::signal::{curve, deadzone, invert, range_map};
//!
//! let v = deadzone(0.3, 0.2);
//! let v = curve(v, 2.0);
//! let v = invert(v, true);
//! let v = range_map(v, -1.0, 1.0, 0.0, 100.0);
//! assert!((v - 49.21875).abs() < 0.001);
//! ```

/// Applies a rescaling deadzone to a value.
///
/// Thresholds below zero are treated as zero; thresholds of 1.0 or more
/// swallow the whole input range.
///
/// # Examples
///
/// ```
/// use control_mapper::processing::signal::deadzone;
///
/// assert_eq!(deadzone(0.1, 0.2), 0.0);
/// assert!((deadzone(0.3, 0.2) - 0.125).abs() < 1e-6);
/// assert!((deadzone(-1.0, 0.2) + 1.0).abs() < 1e-6);
/// ```
#[must_use]
pub fn deadzone(value: f32, threshold: f32) -> f32 {
    let threshold = threshold.max(0.0);
    if threshold >= 1.0 {
        return 0.0;
    }

    let magnitude = value.abs();
    if magnitude <= threshold {
        0.0
    } else {
        value.signum() * (magnitude - threshold) / (1.0 - threshold)
    }
}

/// Applies a sign-preserving power curve.
///
/// An exponent of exactly 1.0 returns the input untouched.
///
/// # Examples
///
/// ```
/// use control_mapper::processing::signal::curve;
///
/// assert_eq!(curve(0.37, 1.0), 0.37);
/// assert!((curve(-0.5, 2.0) + 0.25).abs() < 1e-6);
/// ```
#[must_use]
pub fn curve(value: f32, exponent: f32) -> f32 {
    if exponent == 1.0 {
        return value;
    }
    value.signum() * value.abs().powf(exponent)
}

/// Linearly remaps `value` from `[in_min, in_max]` into `[out_min, out_max]`.
///
/// Does not clamp. A degenerate input range maps everything to `out_min`.
///
/// # Examples
///
/// ```
/// use control_mapper::processing::signal::range_map;
///
/// assert_eq!(range_map(0.0, -1.0, 1.0, 0.0, 100.0), 50.0);
/// assert_eq!(range_map(2.0, 0.0, 1.0, 0.0, 10.0), 20.0);
/// ```
#[must_use]
pub fn range_map(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    let in_span = in_max - in_min;
    if in_span == 0.0 {
        return out_min;
    }
    out_min + (value - in_min) * (out_max - out_min) / in_span
}

/// Saturates `value` into `[min, max]` without interpolation.
///
/// Bounds given in the wrong order are swapped.
#[must_use]
pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    value.clamp(lo, hi)
}

/// Negates `value` when `flag` is set.
#[inline]
#[must_use]
pub fn invert(value: f32, flag: bool) -> f32 {
    if flag {
        -value
    } else {
        value
    }
}

/// Exponential smoothing between the previous output and the current sample.
///
/// `alpha` is the weight of the previous output (0.0 = no smoothing).
#[inline]
#[must_use]
pub fn smooth(current: f32, previous: f32, alpha: f32) -> f32 {
    let alpha = alpha.clamp(0.0, 1.0);
    if alpha == 0.0 {
        current
    } else {
        alpha * previous + (1.0 - alpha) * current
    }
}
