use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::dispatch::{Command, CommandRecord, CommandResult, CommandStatus, Dispatcher};
use crate::error::{Error, Result};
use crate::guard::AntiDuplicationGuard;
use crate::library::{CompatibilityQuery, LibraryIndex};
use crate::navigator::{
    CursorState, Divergence, NavigationOutcome, NavigationTicket, Navigator,
};
use crate::remote::DeckId;
use crate::scoring::Scorer;

use super::deck::DeckState;
use super::types::{LoadOutcome, SessionSnapshot, Suggestion};

/// The dispatch pipeline: one dispatcher, one cursor, one set of decks.
///
/// Every mutation goes through `&mut self`, so whoever owns the session
/// serializes access. [`super::SessionHandle`] runs it on a worker thread.
pub struct Session {
    dispatcher: Dispatcher,
    navigator: Navigator,
    decks: BTreeMap<DeckId, DeckState>,
    index: Arc<LibraryIndex>,
    scorer: Scorer,
    stale: bool,
}

impl Session {
    pub fn new(index: Arc<LibraryIndex>, dispatcher: Dispatcher, settings: &Settings) -> Self {
        let guard = AntiDuplicationGuard::new(&settings.guard);
        let navigator = Navigator::new(&settings.navigator, guard).with_list_len(index.len());
        let decks = DeckId::ALL.iter().map(|&d| (d, DeckState::new(d))).collect();
        Self {
            dispatcher,
            navigator,
            decks,
            index,
            scorer: Scorer::from_settings(&settings.scoring),
            stale: false,
        }
    }

    pub fn index(&self) -> &Arc<LibraryIndex> {
        &self.index
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn cursor(&self) -> &CursorState {
        self.navigator.cursor()
    }

    pub fn deck(&self, deck: DeckId) -> Option<&DeckState> {
        self.decks.get(&deck)
    }

    pub fn decks(&self) -> impl Iterator<Item = &DeckState> {
        self.decks.values()
    }

    /// Set after a disconnect; cleared only by [`Session::resync`].
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    fn ensure_live(&self) -> Result<()> {
        if self.stale {
            return Err(Error::SessionStale);
        }
        Ok(())
    }

    fn watch<T>(&mut self, r: Result<T>) -> Result<T> {
        if let Err(Error::ChannelDisconnected) = &r {
            if !self.stale {
                error!("link lost; session marked stale until resync");
            }
            self.stale = true;
        }
        r
    }

    pub fn navigate_to(
        &mut self,
        index: usize,
        ticket: &NavigationTicket,
    ) -> Result<NavigationOutcome> {
        self.ensure_live()?;
        let r = self.navigator.navigate_to(&mut self.dispatcher, index, ticket);
        self.watch(r)
    }

    /// Navigate to `index` and load the track there onto `deck`.
    ///
    /// The guard may move the target; the outcome names the record actually
    /// loaded. A superseded navigation sends no load.
    pub fn load(
        &mut self,
        deck: DeckId,
        index: usize,
        ticket: &NavigationTicket,
    ) -> Result<LoadOutcome> {
        let navigation = self.navigate_to(index, ticket)?;
        if navigation.cancelled {
            return Ok(LoadOutcome {
                navigation,
                track: None,
                result: None,
            });
        }

        let landed = navigation.final_index;
        let track = self.index.at(landed).cloned();
        let command = Command::Load {
            deck,
            expected_track: track.as_ref().map(|t| t.title.clone()),
        };
        let result = self.execute(command)?;
        if !result.verified {
            warn!(
                deck = %deck,
                index = landed,
                status = ?result.status,
                reason = result.reason.as_deref().unwrap_or(""),
                "load not verified"
            );
        }

        Ok(LoadOutcome {
            navigation,
            track,
            result: Some(result),
        })
    }

    pub fn load_track(
        &mut self,
        deck: DeckId,
        path: &Path,
        ticket: &NavigationTicket,
    ) -> Result<LoadOutcome> {
        let index = self
            .index
            .position_of(path)
            .ok_or_else(|| Error::TrackNotFound(path.display().to_string()))?;
        self.load(deck, index, ticket)
    }

    pub fn play(&mut self, deck: DeckId) -> Result<CommandResult> {
        self.execute(Command::Play(deck))
    }

    pub fn stop(&mut self, deck: DeckId) -> Result<CommandResult> {
        self.execute(Command::Stop(deck))
    }

    pub fn set_level(&mut self, deck: DeckId, value: f32) -> Result<CommandResult> {
        self.execute(Command::SetLevel { deck, value })
    }

    /// Run one command and fold the result into the deck it targets.
    ///
    /// Steps and resets must go through navigation so the cursor stays exact.
    /// A load that lands (verified or sent unverified) marks the believed
    /// cursor position as played.
    pub fn execute(&mut self, command: Command) -> Result<CommandResult> {
        self.ensure_live()?;
        if matches!(command, Command::Step(_) | Command::CursorReset) {
            return Err(Error::InvalidCommand(
                "cursor movement goes through navigation".to_string(),
            ));
        }

        let at = self.navigator.believed_index();
        let track = match command {
            Command::Load { .. } => self.index.at(at).cloned(),
            _ => None,
        };
        let r = self.dispatcher.execute(command.clone());
        let result = self.watch(r)?;

        if matches!(command, Command::Load { .. })
            && matches!(
                result.status,
                CommandStatus::Verified | CommandStatus::SentUnverified
            )
        {
            self.navigator.guard_mut().record(at);
        }

        if let Some(deck) = command.deck().and_then(|d| self.decks.get_mut(&d)) {
            if deck.apply(&command, &result, track.as_ref()) {
                debug!(deck = %deck.deck, play_state = ?deck.play_state, "deck state updated");
            }
        }
        Ok(result)
    }

    /// Recover from a disconnect: reconnect, send the cursor to the top, then
    /// take over what the feed reports for each deck.
    pub fn resync(&mut self) -> Result<()> {
        self.dispatcher.reconnect()?;
        let r = self.navigator.reset_to_baseline(&mut self.dispatcher);
        self.watch(r)?;
        self.stale = false;

        if let Some(snap) = self.dispatcher.observe() {
            let index = Arc::clone(&self.index);
            for (id, obs) in &snap.decks {
                if let Some(deck) = self.decks.get_mut(id) {
                    deck.adopt(obs, |title| index.iter().find(|t| t.title == title));
                }
            }
            self.navigator.reconcile(&snap);
        }
        info!(cursor = self.navigator.believed_index(), "session resynchronized");
        Ok(())
    }

    /// Poll once and reconcile the cursor. Called by the worker between requests.
    pub fn idle_reconcile(&mut self) -> Option<Divergence> {
        if self.stale {
            return None;
        }
        let snap = self.dispatcher.observe()?;
        self.navigator.reconcile(&snap)
    }

    /// Compatible candidates for the track verified on `deck`.
    pub fn suggest_next(&self, deck: DeckId, query: &CompatibilityQuery) -> Result<Vec<Suggestion>> {
        let loaded = self
            .decks
            .get(&deck)
            .and_then(|d| d.loaded.as_ref())
            .ok_or(Error::DeckEmpty(deck))?;
        let seed = self
            .index
            .lookup(&loaded.path)
            .ok_or_else(|| Error::TrackNotFound(loaded.path.display().to_string()))?;
        Ok(self
            .index
            .compatible(seed, query, &self.scorer)
            .into_iter()
            .map(|m| Suggestion {
                track: m.track.clone(),
                score: m.score,
            })
            .collect())
    }

    pub fn history(&self) -> Vec<CommandRecord> {
        self.dispatcher.history().records().cloned().collect()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            decks: self.decks.values().cloned().collect(),
            cursor: self.navigator.cursor().clone(),
            navigation: Some(self.navigator.state()),
            stale: self.stale,
            history_len: self.dispatcher.history().len(),
        }
    }
}
