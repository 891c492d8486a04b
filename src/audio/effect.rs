//! Effect Node - hosts an effect unit inside the graph

use super::buffer::AudioBuffer;
use super::node::{AudioNode, NodeType};
use crate::effect::{EffectKind, EffectUnit};
use crate::error::{EffectError, GraphError};
use crate::format::FormatDescriptor;
use crate::params::ParameterSource;
use std::any::Any;
use std::sync::Arc;

/// Effect node
///
/// Input and output share one format; the unit transforms the buffers in
/// place.
pub struct EffectNode {
    label: String,
    format: FormatDescriptor,
    buffers: Vec<AudioBuffer>,
    unit: Box<dyn EffectUnit>,
}

impl EffectNode {
    /// Wrap `unit` and prepare it for `format`
    pub fn new(mut unit: Box<dyn EffectUnit>, format: FormatDescriptor) -> Result<Self, GraphError> {
        if !unit.supports_format(&format) {
            return Err(EffectError::UnsupportedFormat(format).into());
        }
        unit.allocate(&format)?;

        Ok(Self {
            label: unit.name().to_string(),
            format,
            buffers: (0..format.channels()).map(|_| AudioBuffer::new()).collect(),
            unit,
        })
    }

    pub fn kind(&self) -> EffectKind {
        self.unit.kind()
    }

    pub fn parameters(&self) -> Arc<dyn ParameterSource> {
        self.unit.parameters()
    }
}

impl AudioNode for EffectNode {
    fn node_type(&self) -> NodeType {
        NodeType::Effect
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn output_format(&self) -> Option<FormatDescriptor> {
        Some(self.format)
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
        self.unit.process(&mut self.buffers, frames);
    }

    fn reset(&mut self) {
        self.unit.reset();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
