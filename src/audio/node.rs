//! AudioNode trait and core types

use super::buffer::AudioBuffer;
use crate::format::FormatDescriptor;
use std::any::Any;

/// Node の一意識別子
///
/// NodeHandle は不透明なIDであり、ノードの種類を示さない。
/// ノードの種類はノード自体が持つ。同じグラフ内でハンドルは再利用されない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(u32);

impl NodeHandle {
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl From<NodeHandle> for u32 {
    fn from(handle: NodeHandle) -> Self {
        handle.0
    }
}

/// ノードの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Source,
    Effect,
    Sink,
}

impl NodeType {
    /// Position in the processing order when nodes are otherwise unordered
    pub(crate) fn rank(&self) -> u8 {
        match self {
            NodeType::Source => 0,
            NodeType::Effect => 1,
            NodeType::Sink => 2,
        }
    }
}

/// Common interface for every node in the graph
///
/// A node owns one buffer per channel. The graph copies the upstream node's
/// buffers into this node's buffers before calling [`AudioNode::process`],
/// which then works in place.
pub trait AudioNode: Send {
    fn node_type(&self) -> NodeType;

    fn label(&self) -> &str;

    /// Format this node produces, `None` for nodes without output
    fn output_format(&self) -> Option<FormatDescriptor>;

    /// Format this node consumes, `None` for nodes without input
    fn input_format(&self) -> Option<FormatDescriptor>;

    fn buffers(&self) -> &[AudioBuffer];

    fn buffers_mut(&mut self) -> &mut [AudioBuffer];

    /// Render `frames` in place
    fn process(&mut self, frames: usize);

    fn clear_buffers(&mut self, frames: usize) {
        for buf in self.buffers_mut() {
            buf.clear(frames);
        }
    }

    /// Drop any processing history (filter state, scheduled data)
    fn reset(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
