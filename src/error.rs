//! Error types

use crate::audio::NodeHandle;
use crate::format::FormatDescriptor;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(f64),
    #[error("invalid channel count: {0}")]
    InvalidChannelCount(u16),
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("access to {path:?} was denied: {reason}")]
    AccessDenied { path: PathBuf, reason: String },
    #[error("failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("failed to decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("unsupported sample format: {bits}-bit {kind}")]
    UnsupportedSampleFormat { bits: u16, kind: &'static str },
    #[error("channel data does not line up: expected {expected} channels")]
    ChannelMismatch { expected: usize },
    #[error(transparent)]
    Format(#[from] FormatError),
}

#[derive(Debug, Clone, Error)]
pub enum EffectError {
    #[error("effect factory failed: {0}")]
    Factory(String),
    #[error("effect does not support format {0}")]
    UnsupportedFormat(FormatDescriptor),
    #[error("host call {call} failed with status {status}")]
    Host { call: &'static str, status: i32 },
}

#[derive(Debug, Clone, Error)]
pub enum GraphError {
    #[error(transparent)]
    InvalidFormat(#[from] FormatError),
    #[error("format mismatch on {from:?} -> {to:?}: expected {expected}, got {actual}")]
    FormatMismatch {
        from: NodeHandle,
        to: NodeHandle,
        expected: FormatDescriptor,
        actual: FormatDescriptor,
    },
    #[error("node {0:?} is not attached")]
    NodeNotAttached(NodeHandle),
    #[error("connection {from:?} -> {to:?} already exists")]
    DuplicateConnection { from: NodeHandle, to: NodeHandle },
    #[error("node {0:?} already has an upstream connection")]
    InputOccupied(NodeHandle),
    #[error("node {0:?} has no output")]
    NoOutput(NodeHandle),
    #[error("node {0:?} takes no input")]
    NoInput(NodeHandle),
    #[error("effect could not be prepared: {0}")]
    Effect(#[from] EffectError),
    #[error("graph is not wired as exactly one of source -> effect -> sink or source -> sink")]
    TopologyViolation,
}

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("no graph installed")]
    NoGraph,
    #[error("output unavailable: {0}")]
    OutputUnavailable(String),
    #[error("output failed to start: {0}")]
    StartFailed(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level error returned by the playback controller
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("no audio asset loaded")]
    NoAssetLoaded,
    #[error("already playing")]
    AlreadyPlaying,
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("scheduler runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl PlayerError {
    /// Whether the error is a rejected call rather than a failed operation
    pub fn is_misuse(&self) -> bool {
        matches!(self, PlayerError::NoAssetLoaded | PlayerError::AlreadyPlaying)
    }
}
