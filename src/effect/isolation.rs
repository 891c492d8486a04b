//! Built-in isolation effect
//!
//! Low-cut filter followed by a downward expander that ducks material below
//! a fixed threshold, blended with the dry signal. Used where the host has no
//! native isolation component.

use super::{EffectKind, EffectUnit};
use crate::audio::AudioBuffer;
use crate::error::EffectError;
use crate::format::FormatDescriptor;
use crate::params::{
    Parameter, ParameterAddress, ParameterGroup, ParameterSlot, ParameterSource, ParameterTree,
};
use std::f32::consts::PI;
use std::sync::Arc;

pub const MIX: ParameterAddress = 0;
pub const REDUCTION: ParameterAddress = 1;
pub const LOW_CUT: ParameterAddress = 2;

/// Envelope level below which the expander starts reducing (about -34 dBFS)
const THRESHOLD: f32 = 0.02;
const RELEASE_SECONDS: f32 = 0.05;
const GAIN_SMOOTH_SECONDS: f32 = 0.01;

#[derive(Debug, Clone, Copy)]
struct ChannelState {
    x_prev: f32,
    y_prev: f32,
    envelope: f32,
    gain: f32,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            x_prev: 0.0,
            y_prev: 0.0,
            envelope: 0.0,
            gain: 1.0,
        }
    }
}

pub struct IsolationEffect {
    slot: ParameterSlot,
    tree: Arc<ParameterTree>,
    sample_rate: f32,
    channels: Vec<ChannelState>,
}

impl IsolationEffect {
    pub fn new() -> Self {
        let slot = ParameterSlot::new();
        let tree = slot.publish(Self::build_tree());
        Self {
            slot,
            tree,
            sample_rate: 48000.0,
            channels: Vec::new(),
        }
    }

    fn build_tree() -> ParameterTree {
        ParameterTree::new(vec![
            ParameterGroup::new(
                "isolation",
                "Isolation",
                vec![
                    Parameter::new(MIX, "mix", "Wet/Dry Mix", 0.0, 1.0, 1.0).into(),
                    Parameter::new(REDUCTION, "reduction", "Reduction", 0.0, 1.0, 0.5).into(),
                ],
            )
            .into(),
            ParameterGroup::new(
                "filter",
                "Filter",
                vec![Parameter::new(LOW_CUT, "low_cut", "Low Cut", 20.0, 20000.0, 80.0)
                    .with_unit("Hz")
                    .into()],
            )
            .into(),
        ])
    }

    fn value(&self, address: ParameterAddress) -> f32 {
        self.tree.parameter(address).map(|p| p.value()).unwrap_or(0.0)
    }
}

impl Default for IsolationEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectUnit for IsolationEffect {
    fn name(&self) -> &str {
        "Sound Isolation"
    }

    fn kind(&self) -> EffectKind {
        EffectKind::SOUND_ISOLATION
    }

    fn supports_format(&self, format: &FormatDescriptor) -> bool {
        format.is_valid()
    }

    fn allocate(&mut self, format: &FormatDescriptor) -> Result<(), EffectError> {
        if !self.supports_format(format) {
            return Err(EffectError::UnsupportedFormat(*format));
        }
        self.sample_rate = format.sample_rate as f32;
        self.channels = vec![ChannelState::default(); format.channels()];
        Ok(())
    }

    fn parameters(&self) -> Arc<dyn ParameterSource> {
        Arc::new(self.slot.clone())
    }

    fn process(&mut self, channels: &mut [AudioBuffer], frames: usize) {
        let mix = self.value(MIX);
        let reduction = self.value(REDUCTION);
        // keep the cutoff below Nyquist
        let cutoff = self.value(LOW_CUT).min(self.sample_rate * 0.45);

        let dt = 1.0 / self.sample_rate;
        let rc = 1.0 / (2.0 * PI * cutoff);
        let alpha = rc / (rc + dt);
        let release = (-1.0 / (RELEASE_SECONDS * self.sample_rate)).exp();
        let smooth = 1.0 - (-1.0 / (GAIN_SMOOTH_SECONDS * self.sample_rate)).exp();
        let floor = 1.0 - reduction;

        for (buf, state) in channels.iter_mut().zip(self.channels.iter_mut()) {
            let count = frames.min(buf.valid_frames());
            for sample in &mut buf.samples_mut()[..count] {
                let x = *sample;
                let y = alpha * (state.y_prev + x - state.x_prev);
                state.x_prev = x;
                state.y_prev = y;

                state.envelope = y.abs().max(state.envelope * release);
                let target = if state.envelope < THRESHOLD { floor } else { 1.0 };
                state.gain += (target - state.gain) * smooth;

                *sample = x * (1.0 - mix) + y * state.gain * mix;
            }
        }
    }

    fn reset(&mut self) {
        for state in &mut self.channels {
            *state = ChannelState::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared() -> IsolationEffect {
        let mut effect = IsolationEffect::new();
        effect
            .allocate(&FormatDescriptor::stereo_f32(44100.0).unwrap())
            .unwrap();
        effect
    }

    fn constant(value: f32, frames: usize) -> Vec<AudioBuffer> {
        (0..2)
            .map(|_| {
                let mut buf = AudioBuffer::new();
                buf.write_samples(&vec![value; frames]);
                buf
            })
            .collect()
    }

    #[test]
    fn test_exposes_three_parameters() {
        let effect = IsolationEffect::new();
        let tree = effect.parameters().parameter_tree().unwrap();
        let ranges: Vec<_> = tree
            .all_parameters()
            .iter()
            .map(|p| (p.address(), p.min_value(), p.max_value()))
            .collect();
        assert_eq!(
            ranges,
            vec![(MIX, 0.0, 1.0), (REDUCTION, 0.0, 1.0), (LOW_CUT, 20.0, 20000.0)]
        );
    }

    #[test]
    fn test_dry_mix_passes_input() {
        let mut effect = prepared();
        effect.tree.parameter(MIX).unwrap().set_value(0.0);
        let mut bufs = constant(0.3, 64);
        effect.process(&mut bufs, 64);
        assert!(bufs[0].samples().iter().all(|s| (*s - 0.3).abs() < 1e-6));
    }

    #[test]
    fn test_wet_removes_dc() {
        let mut effect = prepared();
        let mut bufs = constant(0.5, 4096);
        effect.process(&mut bufs, 4096);
        let tail = bufs[0].samples()[4000];
        assert!(tail.abs() < 0.01, "dc leaked through: {}", tail);
    }

    #[test]
    fn test_rejects_invalid_format() {
        let mut effect = IsolationEffect::new();
        let bad = FormatDescriptor {
            sample_rate: 0.0,
            channel_count: 2,
            sample_representation: crate::format::SampleRepresentation::Float32,
        };
        assert!(effect.allocate(&bad).is_err());
    }
}
