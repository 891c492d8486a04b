//! Effect plumbing
//!
//! An effect kind names a processing component the host may or may not be
//! able to provide. The [`EffectInstantiator`] resolves a kind to a live
//! [`EffectUnit`]; how it does so (static registry, AudioComponent lookup)
//! is the instantiator's business.

mod registry;
pub mod isolation;

#[cfg(target_os = "macos")]
pub mod audio_unit;

pub use registry::{builtin_registry, default_instantiator, EffectFactory, EffectRegistry};

use crate::audio::AudioBuffer;
use crate::error::EffectError;
use crate::format::FormatDescriptor;
use crate::params::ParameterSource;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Four-character code, e.g. `aufx`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub u32);

impl FourCc {
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: String = self
            .0
            .to_be_bytes()
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
            .collect();
        f.write_str(&text)
    }
}

impl FromStr for FourCc {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| format!("four-character code must be 4 bytes: {:?}", s))?;
        Ok(Self::from_bytes(bytes))
    }
}

/// Identifies a kind of effect by component type, subtype and manufacturer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectKind {
    pub component_type: FourCc,
    pub sub_type: FourCc,
    pub manufacturer: FourCc,
}

impl EffectKind {
    /// The platform's sound isolation effect
    pub const SOUND_ISOLATION: EffectKind = EffectKind {
        component_type: FourCc::from_bytes(*b"aufx"),
        sub_type: FourCc::from_bytes(*b"vois"),
        manufacturer: FourCc::from_bytes(*b"appl"),
    };

    pub const fn new(component_type: FourCc, sub_type: FourCc, manufacturer: FourCc) -> Self {
        Self {
            component_type,
            sub_type,
            manufacturer,
        }
    }
}

impl Default for EffectKind {
    fn default() -> Self {
        Self::SOUND_ISOLATION
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.component_type, self.sub_type, self.manufacturer)
    }
}

impl FromStr for EffectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [ty, sub, manu] => Ok(Self::new(ty.parse()?, sub.parse()?, manu.parse()?)),
            _ => Err(format!("expected type:subtype:manufacturer, got {:?}", s)),
        }
    }
}

impl Serialize for EffectKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EffectKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// A live effect instance
///
/// Lives on the render context once attached to a graph. Control-plane access
/// goes through the [`ParameterSource`] returned by [`EffectUnit::parameters`].
pub trait EffectUnit: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> EffectKind;

    fn supports_format(&self, format: &FormatDescriptor) -> bool;

    /// Prepare render resources for `format`; called once before processing
    fn allocate(&mut self, format: &FormatDescriptor) -> Result<(), EffectError>;

    /// Parameter tree handle, possibly still empty after instantiation
    fn parameters(&self) -> Arc<dyn ParameterSource>;

    /// Transform `channels` in place
    fn process(&mut self, channels: &mut [AudioBuffer], frames: usize);

    fn reset(&mut self) {}
}

/// Resolves an effect kind to an instance
///
/// Never fails loudly: `None` covers both "nothing provides this kind" and
/// "the provider failed". The two are told apart only in the logs.
pub trait EffectInstantiator: Send + Sync {
    fn instantiate(&self, kind: &EffectKind) -> Option<Box<dyn EffectUnit>>;
}
