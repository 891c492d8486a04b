//! Audio Graph - DAG-based routing with topological sort

use super::buffer::AudioBuffer;
use super::connection::Connection;
use super::node::{AudioNode, NodeHandle};
use super::MAX_CHANNELS;
use crate::error::GraphError;
use crate::format::FormatDescriptor;
use std::collections::{HashMap, VecDeque};
use tracing::warn;

/// オーディオグラフ
///
/// ノードと接続を管理し、構造が変わるたびに処理順序を再計算する。
/// 各ノードの入力は最大1本。
pub struct AudioGraph {
    nodes: HashMap<NodeHandle, Box<dyn AudioNode>>,
    connections: Vec<Connection>,
    /// 処理順序（トポロジカルソート済み）
    processing_order: Vec<NodeHandle>,
    next_handle: u32,
    /// Staging area used to move buffers between two nodes of the map
    scratch: Vec<AudioBuffer>,
}

impl AudioGraph {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            connections: Vec::new(),
            processing_order: Vec::new(),
            next_handle: 1,
            scratch: (0..MAX_CHANNELS).map(|_| AudioBuffer::new()).collect(),
        }
    }

    /// ノードを追加
    pub fn attach(&mut self, node: Box<dyn AudioNode>) -> NodeHandle {
        let handle = NodeHandle::new(self.next_handle);
        self.next_handle += 1;
        self.nodes.insert(handle, node);
        self.rebuild_order();
        handle
    }

    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.nodes.contains_key(&handle)
    }

    pub fn get_node(&self, handle: NodeHandle) -> Option<&dyn AudioNode> {
        self.nodes.get(&handle).map(|n| n.as_ref())
    }

    pub fn get_node_mut(&mut self, handle: NodeHandle) -> Option<&mut (dyn AudioNode + '_)> {
        match self.nodes.get_mut(&handle) {
            Some(boxed) => Some(&mut **boxed),
            None => None,
        }
    }

    /// Downcast a node to its concrete type
    pub fn node_as<T: 'static>(&self, handle: NodeHandle) -> Option<&T> {
        self.nodes.get(&handle)?.as_any().downcast_ref::<T>()
    }

    pub fn node_as_mut<T: 'static>(&mut self, handle: NodeHandle) -> Option<&mut T> {
        self.nodes.get_mut(&handle)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Connect `from` to `to` using `format`
    ///
    /// The format must be valid and equal to both the upstream node's output
    /// format and the downstream node's input format.
    pub fn connect(
        &mut self,
        from: NodeHandle,
        to: NodeHandle,
        format: FormatDescriptor,
    ) -> Result<(), GraphError> {
        format.validate()?;

        let upstream = self.nodes.get(&from).ok_or(GraphError::NodeNotAttached(from))?;
        let downstream = self.nodes.get(&to).ok_or(GraphError::NodeNotAttached(to))?;

        let produced = upstream.output_format().ok_or(GraphError::NoOutput(from))?;
        if produced != format {
            return Err(GraphError::FormatMismatch {
                from,
                to,
                expected: produced,
                actual: format,
            });
        }

        let consumed = downstream.input_format().ok_or(GraphError::NoInput(to))?;
        if consumed != format {
            return Err(GraphError::FormatMismatch {
                from,
                to,
                expected: consumed,
                actual: format,
            });
        }

        if self.connections.iter().any(|c| c.links(from, to)) {
            return Err(GraphError::DuplicateConnection { from, to });
        }
        if self.connections.iter().any(|c| c.to == to) {
            return Err(GraphError::InputOccupied(to));
        }

        self.connections.push(Connection::new(from, to, format));
        self.rebuild_order();
        Ok(())
    }

    /// 接続を削除
    pub fn disconnect(&mut self, from: NodeHandle, to: NodeHandle) -> bool {
        let len_before = self.connections.len();
        self.connections.retain(|c| !c.links(from, to));
        let removed = self.connections.len() < len_before;
        if removed {
            self.rebuild_order();
        }
        removed
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// ターゲットノードへの上流ノードを取得
    pub fn upstream_of(&self, target: NodeHandle) -> Option<NodeHandle> {
        self.connections
            .iter()
            .find(|c| c.to == target)
            .map(|c| c.from)
    }

    pub fn processing_order(&self) -> &[NodeHandle] {
        &self.processing_order
    }

    fn rebuild_order(&mut self) {
        self.processing_order = self.topological_sort();
    }

    /// Topological sort (Kahn's algorithm), sources first among ready nodes
    fn topological_sort(&self) -> Vec<NodeHandle> {
        let mut in_degree: HashMap<NodeHandle, usize> =
            self.nodes.keys().map(|&h| (h, 0)).collect();
        for connection in &self.connections {
            if let Some(deg) = in_degree.get_mut(&connection.to) {
                *deg += 1;
            }
        }

        let mut ready: Vec<NodeHandle> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&h, _)| h)
            .collect();
        ready.sort_by_key(|h| (self.nodes.get(h).map(|n| n.node_type().rank()), *h));
        let mut queue: VecDeque<NodeHandle> = ready.into();

        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some(handle) = queue.pop_front() {
            result.push(handle);
            for connection in self.connections.iter().filter(|c| c.from == handle) {
                if let Some(deg) = in_degree.get_mut(&connection.to) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        queue.push_back(connection.to);
                    }
                }
            }
        }

        if result.len() != self.nodes.len() {
            warn!(
                processed = result.len(),
                total = self.nodes.len(),
                "cycle detected in audio graph"
            );
        }

        result
    }

    /// Render one quantum through every node in processing order
    pub fn process(&mut self, frames: usize) {
        for index in 0..self.processing_order.len() {
            let handle = self.processing_order[index];

            let upstream = self.upstream_of(handle);
            let staged = match upstream.and_then(|h| self.nodes.get(&h)) {
                Some(node) => {
                    let mut count = 0;
                    for (slot, buf) in self.scratch.iter_mut().zip(node.buffers()) {
                        slot.copy_from(buf);
                        count += 1;
                    }
                    Some(count)
                }
                None => None,
            };

            let Some(node) = self.nodes.get_mut(&handle) else {
                continue;
            };
            match staged {
                Some(count) => {
                    for (buf, slot) in node.buffers_mut().iter_mut().zip(&self.scratch[..count]) {
                        buf.copy_from(slot);
                    }
                }
                None => node.clear_buffers(frames),
            }
            node.process(frames);
        }
    }
}

impl Default for AudioGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sink::SinkNode;
    use crate::audio::source::PlayerNode;
    use crate::format::SampleRepresentation;

    fn stereo() -> FormatDescriptor {
        FormatDescriptor::stereo_f32(44100.0).unwrap()
    }

    #[test]
    fn test_attach_node() {
        let mut graph = AudioGraph::new();
        let handle = graph.attach(Box::new(PlayerNode::new(stereo())));
        assert_eq!(graph.node_count(), 1);
        assert!(graph.contains(handle));
        assert!(graph.node_as::<PlayerNode>(handle).is_some());
        assert!(graph.node_as::<SinkNode>(handle).is_none());
    }

    #[test]
    fn test_connect_orders_source_before_sink() {
        let mut graph = AudioGraph::new();
        let sink = graph.attach(Box::new(SinkNode::new(stereo())));
        let src = graph.attach(Box::new(PlayerNode::new(stereo())));

        graph.connect(src, sink, stereo()).unwrap();
        assert_eq!(graph.processing_order(), &[src, sink]);
        assert_eq!(graph.upstream_of(sink), Some(src));
    }

    #[test]
    fn test_connect_rejects_mismatched_format() {
        let mut graph = AudioGraph::new();
        let src = graph.attach(Box::new(PlayerNode::new(stereo())));
        let mono = FormatDescriptor::new(44100.0, 1, SampleRepresentation::Float32).unwrap();
        let sink = graph.attach(Box::new(SinkNode::new(mono)));

        let err = graph.connect(src, sink, stereo()).unwrap_err();
        assert!(matches!(err, GraphError::FormatMismatch { .. }));
        assert!(graph.connections().is_empty());
    }

    #[test]
    fn test_connect_rejects_duplicates_and_second_input() {
        let mut graph = AudioGraph::new();
        let a = graph.attach(Box::new(PlayerNode::new(stereo())));
        let b = graph.attach(Box::new(PlayerNode::new(stereo())));
        let sink = graph.attach(Box::new(SinkNode::new(stereo())));

        graph.connect(a, sink, stereo()).unwrap();
        assert!(matches!(
            graph.connect(a, sink, stereo()),
            Err(GraphError::DuplicateConnection { .. })
        ));
        assert!(matches!(
            graph.connect(b, sink, stereo()),
            Err(GraphError::InputOccupied(_))
        ));
    }

    #[test]
    fn test_connect_into_source_fails() {
        let mut graph = AudioGraph::new();
        let a = graph.attach(Box::new(PlayerNode::new(stereo())));
        let b = graph.attach(Box::new(PlayerNode::new(stereo())));
        assert!(matches!(
            graph.connect(a, b, stereo()),
            Err(GraphError::NoInput(_))
        ));
    }

    #[test]
    fn test_disconnect_drops_connection() {
        let mut graph = AudioGraph::new();
        let src = graph.attach(Box::new(PlayerNode::new(stereo())));
        let sink = graph.attach(Box::new(SinkNode::new(stereo())));
        graph.connect(src, sink, stereo()).unwrap();

        assert!(graph.disconnect(src, sink));
        assert!(graph.connections().is_empty());
        assert!(!graph.disconnect(src, sink));
        assert_eq!(graph.upstream_of(sink), None);
    }
}
