//! Isolator - effect-processed audio file player
//!
//! Loads a PCM file, plays it through a graph that inserts an effect between
//! the player and the output, and exposes the effect's parameters for live
//! tuning. The effect is resolved at runtime from an [`EffectKind`]; when the
//! host cannot provide it, playback continues without it and an advisory is
//! raised.
//!
//! [`PlaybackController`] is the entry point.

pub mod asset;
pub mod audio;
pub mod config;
pub mod effect;
pub mod error;
pub mod format;
pub mod params;
pub mod playback;

pub use asset::{AccessGrant, AudioAsset, DirectAccess, FileAccess};
pub use config::PlayerConfig;
pub use effect::{EffectInstantiator, EffectKind, EffectRegistry, EffectUnit};
pub use error::{AssetError, EffectError, EngineError, GraphError, PlayerError};
pub use format::{FormatDescriptor, SampleRepresentation};
pub use params::{ParameterAddress, ParameterInfo};
pub use playback::{ControllerEvent, ControllerSnapshot, PlaybackController, PlaybackState};

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING: OnceLock<()> = OnceLock::new();

/// Install a fmt subscriber honoring `RUST_LOG`
///
/// Only the first call in a process has an effect. Embedders with their own
/// subscriber should not call this.
pub fn init_tracing() {
    TRACING.get_or_init(|| {
        let fallback = if cfg!(debug_assertions) {
            "info,isolator_lib=debug"
        } else {
            "info"
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .try_init();
    });
}
