//! Source Node - plays a scheduled asset into the graph

use super::buffer::AudioBuffer;
use super::node::{AudioNode, NodeType};
use crate::asset::PcmData;
use crate::format::FormatDescriptor;
use std::any::Any;
use std::sync::Arc;

/// Invoked once from the render context when scheduled data runs out
pub type CompletionHandler = Box<dyn FnOnce() + Send>;

struct Scheduled {
    data: Arc<PcmData>,
    position: usize,
    on_complete: Option<CompletionHandler>,
}

/// Player node
///
/// Holds at most one scheduled asset. While playing it copies the asset's
/// planar samples into its channel buffers; at end-of-data it fires the
/// completion handler exactly once and falls silent.
pub struct PlayerNode {
    label: String,
    format: FormatDescriptor,
    buffers: Vec<AudioBuffer>,
    scheduled: Option<Scheduled>,
    playing: bool,
}

impl PlayerNode {
    pub fn new(format: FormatDescriptor) -> Self {
        Self {
            label: "Player".to_string(),
            format,
            buffers: (0..format.channels()).map(|_| AudioBuffer::new()).collect(),
            scheduled: None,
            playing: false,
        }
    }

    /// Schedule `data` from its first frame, replacing anything scheduled
    ///
    /// A replaced schedule is dropped without firing its completion.
    pub fn schedule(&mut self, data: Arc<PcmData>, on_complete: Option<CompletionHandler>) {
        self.scheduled = Some(Scheduled {
            data,
            position: 0,
            on_complete,
        });
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    /// Halt and discard scheduled-but-unplayed audio
    pub fn stop(&mut self) {
        self.playing = false;
        self.scheduled = None;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn has_scheduled(&self) -> bool {
        self.scheduled.is_some()
    }

    /// Frame position within the scheduled asset
    pub fn position(&self) -> Option<usize> {
        self.scheduled.as_ref().map(|s| s.position)
    }

    fn render(&mut self, frames: usize) {
        let Some(scheduled) = self.scheduled.as_mut() else {
            return;
        };

        let remaining = scheduled.data.frames().saturating_sub(scheduled.position);
        let count = remaining.min(frames);
        for (index, buf) in self.buffers.iter_mut().enumerate() {
            if let Some(channel) = scheduled.data.channel(index) {
                let start = scheduled.position;
                buf.samples_mut()[..count].copy_from_slice(&channel[start..start + count]);
            }
        }
        scheduled.position += count;

        if scheduled.position >= scheduled.data.frames() {
            self.playing = false;
            if let Some(finished) = self.scheduled.take() {
                if let Some(on_complete) = finished.on_complete {
                    on_complete();
                }
            }
        }
    }
}

impl AudioNode for PlayerNode {
    fn node_type(&self) -> NodeType {
        NodeType::Source
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn output_format(&self) -> Option<FormatDescriptor> {
        Some(self.format)
    }

    fn input_format(&self) -> Option<FormatDescriptor> {
        None
    }

    fn buffers(&self) -> &[AudioBuffer] {
        &self.buffers
    }

    fn buffers_mut(&mut self) -> &mut [AudioBuffer] {
        &mut self.buffers
    }

    fn process(&mut self, frames: usize) {
        // Buffers arrive cleared; silence unless playing
        if self.playing {
            self.render(frames);
        }
    }

    fn reset(&mut self) {
        self.stop();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
