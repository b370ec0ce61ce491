use std::sync::mpsc::{SendError, Sender};

use thiserror::Error;

use super::types::{RemoteCode, RemoteState};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("link disconnected")]
    Disconnected,
    #[error("link rejected the message: {0}")]
    Rejected(String),
}

/// The single ordered outbound stream. There is no acknowledgment.
pub trait OutboundLink: Send {
    fn send(&mut self, code: RemoteCode) -> Result<(), LinkError>;

    /// Re-establish a dropped link. Links that cannot reconnect keep failing.
    fn reconnect(&mut self) -> Result<(), LinkError> {
        Err(LinkError::Disconnected)
    }
}

/// Best-effort state feed. `None` means no snapshot is available right now.
pub trait StateFeed: Send {
    fn poll_state(&mut self) -> Option<RemoteState>;
}

/// Outbound link over an `mpsc` channel, for adapters that encode codes on
/// another thread (MIDI output, OSC socket, ...).
pub struct ChannelLink {
    tx: Sender<RemoteCode>,
}

impl ChannelLink {
    pub fn new(tx: Sender<RemoteCode>) -> Self {
        Self { tx }
    }
}

impl OutboundLink for ChannelLink {
    fn send(&mut self, code: RemoteCode) -> Result<(), LinkError> {
        self.tx
            .send(code)
            .map_err(|SendError(_)| LinkError::Disconnected)
    }
}
