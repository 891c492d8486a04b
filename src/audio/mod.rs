//! Audio Graph Module
//!
//! A graph of source, effect and sink nodes rendered by an output driver.
//! Node ids are opaque [`NodeHandle`]s; connections carry the format they
//! were validated against.

mod buffer;
mod connection;
mod graph;
mod node;

pub mod chain;
pub mod effect;
pub mod engine;
pub mod output;
pub mod processor;
pub mod sink;
pub mod source;

#[cfg(target_os = "macos")]
pub mod coreaudio_output;

pub use buffer::AudioBuffer;
pub use chain::{EffectInfo, EffectUnavailable, GraphHandle, Topology};
pub use connection::Connection;
pub use effect::EffectNode;
pub use engine::AudioEngine;
pub use graph::AudioGraph;
pub use node::{AudioNode, NodeHandle, NodeType};
pub use output::{AudioOutput, CaptureTap, OfflineOutput, Pacing};
pub use processor::GraphProcessor;
pub use sink::SinkNode;
pub use source::{CompletionHandler, PlayerNode};

/// Maximum frames per render quantum
pub const MAX_FRAMES: usize = 4096;

/// Maximum channels per node
pub const MAX_CHANNELS: usize = 8;
