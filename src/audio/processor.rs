//! Graph Processor - render entry point for output drivers

use super::graph::AudioGraph;
use super::node::NodeHandle;
use super::sink::SinkNode;
use super::MAX_FRAMES;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared handle to a graph
///
/// The control plane mutates the graph through [`GraphProcessor::lock`]; the
/// output context renders through [`GraphProcessor::render_interleaved`],
/// which only ever `try_lock`s and outputs silence on contention rather than
/// waiting.
#[derive(Clone)]
pub struct GraphProcessor {
    graph: Arc<Mutex<AudioGraph>>,
    sink: NodeHandle,
    channels: usize,
    rendered_frames: Arc<AtomicU64>,
    skipped_callbacks: Arc<AtomicU64>,
}

impl GraphProcessor {
    pub fn new(graph: AudioGraph, sink: NodeHandle, channels: usize) -> Self {
        Self {
            graph: Arc::new(Mutex::new(graph)),
            sink,
            channels,
            rendered_frames: Arc::new(AtomicU64::new(0)),
            skipped_callbacks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Lock the graph from the control plane
    pub fn lock(&self) -> MutexGuard<'_, AudioGraph> {
        self.graph.lock()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Render into an interleaved buffer of `channels()` channels
    pub fn render_interleaved(&self, out: &mut [f32]) {
        out.fill(0.0);
        if self.channels == 0 {
            return;
        }

        let Some(mut graph) = self.graph.try_lock() else {
            self.skipped_callbacks.fetch_add(1, Ordering::Relaxed);
            return;
        };

        for chunk in out.chunks_mut(MAX_FRAMES * self.channels) {
            let frames = chunk.len() / self.channels;
            graph.process(frames);
            if let Some(sink) = graph.node_as::<SinkNode>(self.sink) {
                sink.write_interleaved(chunk);
            }
            self.rendered_frames
                .fetch_add(frames as u64, Ordering::Relaxed);
        }
    }

    /// Frames rendered since creation
    pub fn rendered_frames(&self) -> u64 {
        self.rendered_frames.load(Ordering::Relaxed)
    }

    /// Render calls that found the graph locked
    pub fn skipped_callbacks(&self) -> u64 {
        self.skipped_callbacks.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::PcmData;
    use crate::audio::source::PlayerNode;
    use crate::format::FormatDescriptor;

    #[test]
    fn test_render_passes_player_to_output() {
        let format = FormatDescriptor::stereo_f32(44100.0).unwrap();
        let mut graph = AudioGraph::new();
        let src = graph.attach(Box::new(PlayerNode::new(format)));
        let sink = graph.attach(Box::new(SinkNode::new(format)));
        graph.connect(src, sink, format).unwrap();

        let data = PcmData::new(vec![vec![0.1, 0.2], vec![0.3, 0.4]]).unwrap();
        {
            let player = graph.node_as_mut::<PlayerNode>(src).unwrap();
            player.schedule(Arc::new(data), None);
            player.play();
        }

        let processor = GraphProcessor::new(graph, sink, 2);
        let mut out = [1.0; 8];
        processor.render_interleaved(&mut out);
        assert_eq!(out, [0.1, 0.3, 0.2, 0.4, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(processor.rendered_frames(), 4);
    }

    #[test]
    fn test_render_skips_when_locked() {
        let format = FormatDescriptor::stereo_f32(44100.0).unwrap();
        let mut graph = AudioGraph::new();
        let sink = graph.attach(Box::new(SinkNode::new(format)));
        let processor = GraphProcessor::new(graph, sink, 2);

        let _guard = processor.lock();
        let mut out = [1.0; 4];
        processor.render_interleaved(&mut out);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(processor.skipped_callbacks(), 1);
    }
}
