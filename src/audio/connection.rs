//! Connection between two nodes

use super::node::NodeHandle;
use crate::format::FormatDescriptor;

/// Directed connection carrying one format from an upstream node to a
/// downstream node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Connection {
    pub from: NodeHandle,
    pub to: NodeHandle,
    pub format: FormatDescriptor,
}

impl Connection {
    pub fn new(from: NodeHandle, to: NodeHandle, format: FormatDescriptor) -> Self {
        Self { from, to, format }
    }

    /// Whether this connection links `from` to `to`
    pub fn links(&self, from: NodeHandle, to: NodeHandle) -> bool {
        self.from == from && self.to == to
    }
}
