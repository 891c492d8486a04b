//! Sink Node - main output of the graph

use super::buffer::AudioBuffer;
use super::node::{AudioNode, NodeType};
use crate::format::FormatDescriptor;
use std::any::Any;

/// 出力ノード
///
/// チェーンの終端。出力ドライバが量子ごとにバッファを読み、
/// インターリーブしてデバイスへ渡す。
pub struct SinkNode {
    label: String,
    format: FormatDescriptor,
    buffers: Vec<AudioBuffer>,
}

impl SinkNode {
    pub fn new(format: FormatDescriptor) -> Self {
        Self {
            label: "Main Output".to_string(),
            format,
            buffers: (0..format.channels()).map(|_| AudioBuffer::new()).collect(),
        }
    }

    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    /// Interleave the last quantum into `out`, returning frames written
    pub fn write_interleaved(&self, out: &mut [f32]) -> usize {
        let channels = self.buffers.len();
        if channels == 0 {
            return 0;
        }
        let frames = self
            .buffers
            .iter()
            .map(|b| b.valid_frames())
            .min()
            .unwrap_or(0)
            .min(out.len() / channels);

        for (ch, buf) in self.buffers.iter().enumerate() {
            for (frame, sample) in buf.samples()[..frames].iter().enumerate() {
                out[frame * channels + ch] = *sample;
            }
        }
        frames
    }
}

impl AudioNode for SinkNode {
    fn node_type(&self) -> NodeType {
        NodeType::Sink
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn output_format(&self) -> Option<FormatDescriptor> {
        None
    }

    fn input_format(&self) -> Option<FormatDescriptor> {
        Some(self.format)
    }

    fn buffers(&self) -> &[AudioBuffer] {
        &self.buffers
    }

    fn buffers_mut(&mut self) -> &mut [AudioBuffer] {
        &mut self.buffers
    }

    fn process(&mut self, frames: usize) {
        for buf in &mut self.buffers {
            buf.set_valid_frames(frames);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
