use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::dispatch::{Command, CommandRecord, CommandResult, CommandStatus};
use crate::error::Result;
use crate::library::{CompatibilityQuery, TrackRecord};
use crate::navigator::{CursorState, NavState, NavigationOutcome, NavigationTicket};
use crate::remote::DeckId;

use super::deck::DeckState;

/// Navigation plus the terminal load it led to.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub navigation: NavigationOutcome,
    /// Record under the cursor when the load was sent.
    pub track: Option<TrackRecord>,
    /// `None` when the navigation was superseded before the load.
    pub result: Option<CommandResult>,
}

impl LoadOutcome {
    pub fn verified(&self) -> bool {
        self.result
            .as_ref()
            .is_some_and(|r| r.status == CommandStatus::Verified)
    }
}

#[derive(Debug, Clone)]
pub struct Suggestion {
    pub track: TrackRecord,
    pub score: f64,
}

/// Read-only view published by the session worker after every request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    pub decks: Vec<DeckState>,
    pub cursor: CursorState,
    pub navigation: Option<NavState>,
    pub stale: bool,
    pub history_len: usize,
}

pub type SnapshotHandle = Arc<Mutex<SessionSnapshot>>;

pub(super) enum Request {
    Navigate {
        index: usize,
        ticket: NavigationTicket,
        reply: Sender<Result<NavigationOutcome>>,
    },
    Load {
        deck: DeckId,
        index: usize,
        ticket: NavigationTicket,
        reply: Sender<Result<LoadOutcome>>,
    },
    LoadTrack {
        deck: DeckId,
        path: PathBuf,
        ticket: NavigationTicket,
        reply: Sender<Result<LoadOutcome>>,
    },
    Execute {
        command: Command,
        reply: Sender<Result<CommandResult>>,
    },
    Resync {
        reply: Sender<Result<()>>,
    },
    Suggest {
        deck: DeckId,
        query: CompatibilityQuery,
        reply: Sender<Result<Vec<Suggestion>>>,
    },
    History {
        reply: Sender<Vec<CommandRecord>>,
    },
    Quit,
}
