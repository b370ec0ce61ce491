use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::dispatch::{Command, CommandRecord, CommandResult};
use crate::error::{Error, Result};
use crate::library::{CompatibilityQuery, LibraryIndex};
use crate::navigator::{NavigationClock, NavigationOutcome};
use crate::remote::DeckId;

use super::pipeline::Session;
use super::thread::spawn_session_thread;
use super::types::{LoadOutcome, Request, SessionSnapshot, SnapshotHandle, Suggestion};

/// Cloneable front for a session running on its own worker thread.
///
/// Every call queues one request and blocks on its reply, so commands from
/// all clones reach the link in the order they were queued. A navigation
/// request supersedes any navigation still in progress.
#[derive(Clone)]
pub struct SessionHandle {
    tx: Sender<Request>,
    snapshot: SnapshotHandle,
    clock: NavigationClock,
    index: Arc<LibraryIndex>,
    join: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionHandle {
    pub fn spawn(session: Session, reconcile_interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<Request>();
        let index = Arc::clone(session.index());
        let snapshot: SnapshotHandle = Arc::new(Mutex::new(session.snapshot()));
        let join = spawn_session_thread(session, rx, snapshot.clone(), reconcile_interval);
        Self {
            tx,
            snapshot,
            clock: NavigationClock::new(),
            index,
            join: Arc::new(Mutex::new(Some(join))),
        }
    }

    fn call<T>(&self, make: impl FnOnce(Sender<T>) -> Request) -> Result<T> {
        let (reply, rx) = mpsc::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| Error::SessionClosed)?;
        rx.recv().map_err(|_| Error::SessionClosed)
    }

    /// Read-only index queries do not wait for the worker.
    pub fn index(&self) -> &Arc<LibraryIndex> {
        &self.index
    }

    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.snapshot.clone()
    }

    /// State as of the last request the worker finished.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn navigate_to(&self, index: usize) -> Result<NavigationOutcome> {
        let ticket = self.clock.issue();
        self.call(|reply| Request::Navigate {
            index,
            ticket,
            reply,
        })?
    }

    pub fn load(&self, deck: DeckId, index: usize) -> Result<LoadOutcome> {
        let ticket = self.clock.issue();
        self.call(|reply| Request::Load {
            deck,
            index,
            ticket,
            reply,
        })?
    }

    pub fn load_track(&self, deck: DeckId, path: impl Into<PathBuf>) -> Result<LoadOutcome> {
        let ticket = self.clock.issue();
        let path = path.into();
        self.call(|reply| Request::LoadTrack {
            deck,
            path,
            ticket,
            reply,
        })?
    }

    pub fn execute(&self, command: Command) -> Result<CommandResult> {
        self.call(|reply| Request::Execute { command, reply })?
    }

    pub fn play(&self, deck: DeckId) -> Result<CommandResult> {
        self.execute(Command::Play(deck))
    }

    pub fn stop(&self, deck: DeckId) -> Result<CommandResult> {
        self.execute(Command::Stop(deck))
    }

    pub fn set_level(&self, deck: DeckId, value: f32) -> Result<CommandResult> {
        self.execute(Command::SetLevel { deck, value })
    }

    pub fn resync(&self) -> Result<()> {
        self.call(|reply| Request::Resync { reply })?
    }

    pub fn suggest_next(&self, deck: DeckId, query: CompatibilityQuery) -> Result<Vec<Suggestion>> {
        self.call(|reply| Request::Suggest { deck, query, reply })?
    }

    pub fn history(&self) -> Result<Vec<CommandRecord>> {
        self.call(|reply| Request::History { reply })
    }

    /// Stop the worker after the requests already queued and wait for it.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Request::Quit);
        if let Ok(mut j) = self.join.lock() {
            if let Some(h) = j.take() {
                let _ = h.join();
            }
        }
    }
}
