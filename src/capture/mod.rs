//! # Capture Module
//!
//! First pipeline stage: turns a raw input frame into semantic actions.
//!
//! This module handles:
//! - The immutable per-frame input snapshot ([`frame`])
//! - Control nodes bound to screen regions or sensors ([`node`])
//! - Sensor bindings a node can read instead of touches ([`source`])
//! - The semantic action type shared by every later stage ([`action`])
//!
//! Nodes are evaluated independently each frame, in insertion order, so that
//! two nodes targeting the same operation resolve last-writer-wins downstream.

pub mod action;
pub mod frame;
pub mod node;
pub mod source;

use action::ControlAction;
use frame::{LayoutMetrics, RawInputFrame};
use node::ControlNode;
use tracing::trace;

/// Ordered set of control nodes for the current layout.
#[derive(Debug, Clone, Default)]
pub struct CaptureStage {
    nodes: Vec<ControlNode>,
}

impl CaptureStage {
    #[must_use]
    pub fn new(nodes: Vec<ControlNode>) -> Self {
        Self { nodes }
    }

    /// Replaces the node graph. Called on layout change.
    pub fn load_nodes(&mut self, nodes: Vec<ControlNode>) {
        self.nodes = nodes;
    }

    #[must_use]
    pub fn nodes(&self) -> &[ControlNode] {
        &self.nodes
    }

    /// Runs every node against `raw`, preserving node order.
    #[must_use]
    pub fn capture(&self, raw: &RawInputFrame, metrics: &LayoutMetrics) -> Vec<ControlAction> {
        let actions: Vec<ControlAction> = self
            .nodes
            .iter()
            .filter_map(|node| node.process_input(raw, metrics))
            .collect();
        trace!(
            "Captured {} actions from {} nodes",
            actions.len(),
            self.nodes.len()
        );
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame::TouchPoint;
    use node::Region;

    #[test]
    fn test_capture_preserves_insertion_order() {
        let stage = CaptureStage::new(vec![
            ControlNode::button("first", Region::full_screen(), "jump"),
            ControlNode::axis("second", Region::full_screen(), "steer", -1.0, 1.0),
            ControlNode::button("third", Region::full_screen(), "jump").with_enabled(false),
            ControlNode::button("fourth", Region::new(0.0, 0.0, 0.1, 0.1), "fire"),
        ]);

        let frame = RawInputFrame::default().with_touch(TouchPoint::new(0, 0.5, 0.5));
        let actions = stage.capture(&frame, &LayoutMetrics::default());

        let ops: Vec<&str> = actions.iter().map(|a| a.operation_type()).collect();
        assert_eq!(ops, vec!["jump", "steer", "fire"]);
        assert!(actions[0].pressed());
        assert!(!actions[2].pressed());
    }

    #[test]
    fn test_load_nodes_replaces_layout() {
        let mut stage = CaptureStage::default();
        assert!(stage.capture(&RawInputFrame::default(), &LayoutMetrics::default()).is_empty());

        stage.load_nodes(vec![ControlNode::button("b", Region::full_screen(), "x")]);
        assert_eq!(stage.nodes().len(), 1);
        assert_eq!(
            stage.capture(&RawInputFrame::default(), &LayoutMetrics::default()).len(),
            1
        );
    }
}
