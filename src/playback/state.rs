//! Controller state, events and the control-plane queue

use crate::format::FormatDescriptor;
use crate::params::{ParameterAddress, ParameterInfo};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Loaded,
    Playing,
    Stopped,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loaded => "loaded",
            PlaybackState::Playing => "playing",
            PlaybackState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Notification sent to every subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    StateChanged(PlaybackState),
    ErrorChanged(Option<String>),
    AdvisoryChanged(Option<String>),
    ParametersChanged(Vec<ParameterInfo>),
    ParameterValueChanged {
        address: ParameterAddress,
        value: f32,
    },
    /// Scheduled audio ran out
    PlaybackFinished,
}

/// Message posted to the control plane from another context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlMessage {
    /// From the render context at end-of-data
    PlaybackFinished { generation: u64, token: u64 },
    /// From the scheduler once the settle interval has passed
    SettleElapsed { generation: u64 },
}

/// Subscriber list; senders whose receiver is gone are dropped on emit
#[derive(Default)]
pub(crate) struct Observers {
    senders: Vec<Sender<ControllerEvent>>,
}

impl Observers {
    pub fn subscribe(&mut self) -> Receiver<ControllerEvent> {
        let (tx, rx) = unbounded();
        self.senders.push(tx);
        rx
    }

    pub fn emit(&mut self, event: ControllerEvent) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }
}

/// Every observable output in one value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub state: PlaybackState,
    pub file_name: Option<String>,
    pub format: Option<FormatDescriptor>,
    pub last_error: Option<String>,
    pub advisory: Option<String>,
    pub has_effect: bool,
    pub bypassed: bool,
    pub parameters: Vec<ParameterInfo>,
}
