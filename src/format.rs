//! Format Descriptor
//!
//! Sample rate, channel count and sample representation of a loaded asset.
//! Every connection in the graph carries one of these and the graph refuses
//! to connect nodes whose formats differ. There is no conversion stage.

use crate::audio::MAX_CHANNELS;
use crate::error::FormatError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest sample rate accepted by the graph
pub const MAX_SAMPLE_RATE: f64 = 384_000.0;

/// Sample encoding of the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleRepresentation {
    Int8,
    Int16,
    Int24,
    Int32,
    Float32,
}

impl SampleRepresentation {
    /// Bits per sample in the container
    pub fn bits(&self) -> u16 {
        match self {
            SampleRepresentation::Int8 => 8,
            SampleRepresentation::Int16 => 16,
            SampleRepresentation::Int24 => 24,
            SampleRepresentation::Int32 => 32,
            SampleRepresentation::Float32 => 32,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, SampleRepresentation::Float32)
    }

    fn as_str(&self) -> &'static str {
        match self {
            SampleRepresentation::Int8 => "i8",
            SampleRepresentation::Int16 => "i16",
            SampleRepresentation::Int24 => "i24",
            SampleRepresentation::Int32 => "i32",
            SampleRepresentation::Float32 => "f32",
        }
    }
}

/// Immutable description of an audio stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub sample_rate: f64,
    pub channel_count: u16,
    pub sample_representation: SampleRepresentation,
}

impl FormatDescriptor {
    /// Create a descriptor, validating rate and channel count
    pub fn new(
        sample_rate: f64,
        channel_count: u16,
        sample_representation: SampleRepresentation,
    ) -> Result<Self, FormatError> {
        let format = Self {
            sample_rate,
            channel_count,
            sample_representation,
        };
        format.validate()?;
        Ok(format)
    }

    /// 32-bit float stereo at the given rate
    pub fn stereo_f32(sample_rate: f64) -> Result<Self, FormatError> {
        Self::new(sample_rate, 2, SampleRepresentation::Float32)
    }

    pub fn validate(&self) -> Result<(), FormatError> {
        if !self.sample_rate.is_finite()
            || self.sample_rate <= 0.0
            || self.sample_rate > MAX_SAMPLE_RATE
        {
            return Err(FormatError::InvalidSampleRate(self.sample_rate));
        }
        if self.channel_count == 0 || self.channel_count as usize > MAX_CHANNELS {
            return Err(FormatError::InvalidChannelCount(self.channel_count));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn channels(&self) -> usize {
        self.channel_count as usize
    }

    /// Duration of `frames` at this rate, in seconds
    pub fn frames_to_seconds(&self, frames: usize) -> f64 {
        frames as f64 / self.sample_rate
    }
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {}",
            self.sample_rate,
            self.channel_count,
            self.sample_representation.as_str()
        )
    }
}
