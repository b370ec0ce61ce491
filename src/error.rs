//! Error types shared by every stage of the pipeline.
//!
//! Index building surfaces `Parse`/`Io` immediately; verification failures only
//! reach callers once the retry policy is exhausted.

use std::path::PathBuf;

use thiserror::Error;

use crate::dispatch::CommandId;
use crate::remote::{DeckId, LinkError};

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed index source (export, cache or tag data).
    #[error("parse error in {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// Unreadable file or unavailable channel.
    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The outbound link refused a transmit for a reason other than disconnect.
    #[error("outbound link failure: {0}")]
    Link(String),

    #[error("command {id} timed out waiting for a fresh snapshot after {attempts} attempt(s)")]
    CommandTimeout { id: CommandId, attempts: u32 },

    #[error("command {id} was not verified after {attempts} attempt(s): {reason}")]
    CommandVerificationFailed {
        id: CommandId,
        attempts: u32,
        reason: String,
    },

    #[error("no safe list position within {bound} of {index}")]
    NavigationDeadlock { index: usize, bound: usize },

    #[error("outbound channel disconnected")]
    ChannelDisconnected,

    /// Session state is stale after a disconnect; `resync` must run first.
    #[error("session state is stale, resync required")]
    SessionStale,

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("no track at {0}")]
    TrackNotFound(String),

    #[error("deck {0} has no verified track loaded")]
    DeckEmpty(DeckId),

    #[error("configuration error: {0}")]
    Config(String),

    /// The session worker is gone.
    #[error("session closed")]
    SessionClosed,
}

impl Error {
    pub(crate) fn parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::Disconnected => Self::ChannelDisconnected,
            LinkError::Rejected(msg) => Self::Link(msg),
        }
    }
}

impl From<::config::ConfigError> for Error {
    fn from(e: ::config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
