//! # Control Nodes
//!
//! Capture-stage entities binding a normalized screen region or a sensor to
//! a semantic operation. Each node turns one [`RawInputFrame`] into at most
//! one [`ControlAction`].
//!
//! ## Node Policies
//!
//! | Kind | Emits | When idle |
//! |------|-------|-----------|
//! | Button | Digital | Digital, `pressed = false` |
//! | Axis | Analog on the dominant axis | Analog at 0.0 (reset on release) |
//! | Gyroscope | Gyro rates × sensitivity | Gyro at 0.0 when gated and untouched |
//! | Gesture (two-finger pan) | Gesture offset of the touch centroid | nothing |
//! | Gesture (drag) | Composite steering/throttle stick | Composite at 0.0 |
//!
//! Button and Axis nodes may read a sensor binding ([`InputSource`]) instead
//! of touches; the region is then ignored.

use super::action::ControlAction;
use super::frame::{LayoutMetrics, RawInputFrame};
use super::source::InputSource;
use crate::processing::signal::{clamp, range_map};

/// Axis-aligned normalized rectangle `[x, y, w, h]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Region {
    #[must_use]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Region covering the whole screen.
    #[must_use]
    pub fn full_screen() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    /// Inclusive point-in-rectangle test.
    ///
    /// # Examples
    ///
    /// ```
    /// use control_mapper::capture::node::Region;
    ///
    /// let region = Region::new(0.1, 0.7, 0.2, 0.2);
    /// assert!(region.contains(0.15, 0.75));
    /// assert!(region.contains(0.1, 0.7)); // Edges count
    /// assert!(!region.contains(0.5, 0.5));
    /// ```
    #[must_use]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }

    /// Centre point of the region.
    #[must_use]
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Maps a point inside the region to an offset from centre in `[-1, 1]`.
    ///
    /// Screen y grows downward; the returned vertical offset is positive upward.
    #[must_use]
    pub fn centered_offset(&self, x: f32, y: f32) -> (f32, f32) {
        let (cx, cy) = self.center();
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        let dx = if half_w > 0.0 { (x - cx) / half_w } else { 0.0 };
        let dy = if half_h > 0.0 { (cy - y) / half_h } else { 0.0 };
        (clamp(dx, -1.0, 1.0), clamp(dy, -1.0, 1.0))
    }
}

/// Gesture recognized by a gesture node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    /// Two or more fingers; reports the centroid offset.
    TwoFingerPan,
    /// One-finger virtual stick driving a steering/throttle composite.
    Drag,
}

/// Closed set of node behaviours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    Button,
    /// `min`/`max` give the raw range of a sensor binding. For touch input
    /// the region itself is the range, so they do not change the output.
    Axis {
        min: f32,
        max: f32,
    },
    Gyroscope {
        /// Rate multiplier. Non-positive values fall back to 1.0.
        sensitivity: f32,
        /// Only active while a finger is inside the region.
        touch_gated: bool,
    },
    Gesture(GestureKind),
}

/// Sensitivity used when a gyroscope node is configured with a non-positive value.
pub const DEFAULT_GYRO_SENSITIVITY: f32 = 1.0;

/// A capture-stage control.
///
/// # Examples
///
/// ```
/// use control_mapper::capture::frame::{LayoutMetrics, RawInputFrame, TouchPoint};
/// use control_mapper::capture::node::{ControlNode, Region};
///
/// let node = ControlNode::button("fire", Region::new(0.1, 0.7, 0.2, 0.2), "fire");
/// let frame = RawInputFrame::default().with_touch(TouchPoint::new(0, 0.15, 0.75));
///
/// let action = node.process_input(&frame, &LayoutMetrics::default()).unwrap();
/// assert!(action.pressed());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ControlNode {
    id: String,
    region: Region,
    operation_type: String,
    kind: NodeKind,
    source: InputSource,
    enabled: bool,
    visible: bool,
}

impl ControlNode {
    /// Creates an enabled, visible node.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        region: Region,
        operation_type: impl Into<String>,
        kind: NodeKind,
    ) -> Self {
        let kind = match kind {
            NodeKind::Gyroscope { sensitivity, touch_gated } if sensitivity <= 0.0 => {
                NodeKind::Gyroscope {
                    sensitivity: DEFAULT_GYRO_SENSITIVITY,
                    touch_gated,
                }
            }
            other => other,
        };
        Self {
            id: id.into(),
            region,
            operation_type: operation_type.into(),
            kind,
            source: InputSource::Touch,
            enabled: true,
            visible: true,
        }
    }

    #[must_use]
    pub fn button(id: impl Into<String>, region: Region, operation_type: impl Into<String>) -> Self {
        Self::new(id, region, operation_type, NodeKind::Button)
    }

    #[must_use]
    pub fn axis(
        id: impl Into<String>,
        region: Region,
        operation_type: impl Into<String>,
        min: f32,
        max: f32,
    ) -> Self {
        Self::new(id, region, operation_type, NodeKind::Axis { min, max })
    }

    #[must_use]
    pub fn gyroscope(
        id: impl Into<String>,
        region: Region,
        operation_type: impl Into<String>,
        sensitivity: f32,
        touch_gated: bool,
    ) -> Self {
        Self::new(
            id,
            region,
            operation_type,
            NodeKind::Gyroscope { sensitivity, touch_gated },
        )
    }

    #[must_use]
    pub fn gesture(
        id: impl Into<String>,
        region: Region,
        operation_type: impl Into<String>,
        gesture: GestureKind,
    ) -> Self {
        Self::new(id, region, operation_type, NodeKind::Gesture(gesture))
    }

    /// Binds the node to a sensor instead of touches.
    #[must_use]
    pub fn with_source(mut self, source: InputSource) -> Self {
        self.source = source;
        self
    }

    /// Sets the activation flag. Inactive nodes emit nothing.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the visibility flag. Visibility only concerns rendering.
    #[must_use]
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn region(&self) -> Region {
        self.region
    }

    #[must_use]
    pub fn operation_type(&self) -> &str {
        &self.operation_type
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    #[must_use]
    pub fn source(&self) -> &InputSource {
        &self.source
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Inclusive hit test against the node's region.
    #[must_use]
    pub fn hit_test(&self, norm_x: f32, norm_y: f32) -> bool {
        self.region.contains(norm_x, norm_y)
    }

    /// Turns one frame of raw input into at most one action.
    #[must_use]
    pub fn process_input(&self, raw: &RawInputFrame, metrics: &LayoutMetrics) -> Option<ControlAction> {
        if !self.enabled {
            return None;
        }

        let ts = raw.timestamp_ms;
        let op = self.operation_type.as_str();

        match self.kind {
            NodeKind::Button => {
                let pressed = match &self.source {
                    InputSource::Touch => self.first_touch_inside(raw, metrics).is_some(),
                    source => source.pressed(raw),
                };
                Some(ControlAction::digital(op, pressed, ts))
            }
            NodeKind::Axis { min, max } => {
                let value = match &self.source {
                    InputSource::Touch => self
                        .first_touch_inside(raw, metrics)
                        .map_or(0.0, |(x, y)| self.axis_value(x, y)),
                    source => source
                        .analog(raw)
                        .map_or(0.0, |reading| clamp(range_map(reading, min, max, -1.0, 1.0), -1.0, 1.0)),
                };
                Some(ControlAction::analog(op, value, ts))
            }
            NodeKind::Gyroscope { sensitivity, touch_gated } => {
                let active = !touch_gated || self.first_touch_inside(raw, metrics).is_some();
                if active {
                    let gyro = raw.gyro;
                    Some(ControlAction::gyro(
                        op,
                        gyro.yaw * sensitivity,
                        gyro.pitch * sensitivity,
                        gyro.roll * sensitivity,
                        ts,
                    ))
                } else {
                    Some(ControlAction::gyro(op, 0.0, 0.0, 0.0, ts))
                }
            }
            NodeKind::Gesture(GestureKind::TwoFingerPan) => {
                let inside: Vec<(f32, f32)> = raw
                    .normalized_touches(metrics)
                    .filter(|&(x, y)| self.hit_test(x, y))
                    .collect();
                if inside.len() < 2 {
                    return None;
                }
                let count = inside.len() as f32;
                let cx = inside.iter().map(|p| p.0).sum::<f32>() / count;
                let cy = inside.iter().map(|p| p.1).sum::<f32>() / count;
                let (dx, dy) = self.region.centered_offset(cx, cy);
                Some(ControlAction::gesture(op, dx, dy, true, ts))
            }
            NodeKind::Gesture(GestureKind::Drag) => match self.first_touch_inside(raw, metrics) {
                Some((x, y)) => {
                    let (dx, dy) = self.region.centered_offset(x, y);
                    Some(ControlAction::composite(op, dx, dy, true, ts))
                }
                None => Some(ControlAction::composite(op, 0.0, 0.0, false, ts)),
            },
        }
    }

    fn first_touch_inside(&self, raw: &RawInputFrame, metrics: &LayoutMetrics) -> Option<(f32, f32)> {
        raw.normalized_touches(metrics)
            .find(|&(x, y)| self.hit_test(x, y))
    }

    /// Projects a touch onto the dominant axis and normalizes it to `[-1, 1]`.
    fn axis_value(&self, x: f32, y: f32) -> f32 {
        let r = self.region;
        // Screen y grows downward; up is positive on vertical axes
        let local = if r.width >= r.height {
            if r.width > 0.0 { (x - r.x) / r.width } else { 0.5 }
        } else if r.height > 0.0 {
            1.0 - (y - r.y) / r.height
        } else {
            0.5
        };
        range_map(clamp(local, 0.0, 1.0), 0.0, 1.0, -1.0, 1.0)
    }
}
