//! In-memory stand-in for the controlled mixing application.
//!
//! Codes are applied as soon as they are sent; the feed reports the model as
//! of "now" unless a fault is injected (lag, frozen or absent feed). Used by the dry-run binary mode and by
//! tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::trace;

use super::link::{LinkError, OutboundLink, StateFeed};
use super::types::{DeckId, DeckObservation, RemoteCode, RemoteState};

/// Snapshots kept for replay under feed lag.
const LAG_HISTORY: usize = 256;

#[derive(Debug, Default, Clone)]
struct SimDeck {
    loaded: Option<usize>,
    playing: bool,
    position: f64,
    level: f32,
}

#[derive(Debug)]
struct SimState {
    titles: Vec<String>,
    cursor: usize,
    decks: BTreeMap<DeckId, SimDeck>,
    sent: Vec<RemoteCode>,

    connected: bool,
    can_reconnect: bool,
    feed_enabled: bool,
    report_cursor: bool,
    frozen: Option<RemoteState>,
    feed_lag: Duration,
    past: VecDeque<RemoteState>,
    stuck: Vec<DeckId>,
    dropped_steps: usize,
    disconnect_after: Option<usize>,
}

impl SimState {
    fn snapshot(&self) -> RemoteState {
        let decks = self
            .decks
            .iter()
            .map(|(&id, d)| {
                let obs = DeckObservation {
                    loaded: d.loaded.is_some(),
                    playing: d.playing,
                    position: d.position,
                    track: d.loaded.and_then(|i| self.titles.get(i).cloned()),
                };
                (id, obs)
            })
            .collect();
        RemoteState {
            decks,
            cursor: self.report_cursor.then_some(self.cursor),
            observed_at: Instant::now(),
        }
    }

    /// Remember the model as it is now so a lagging feed can replay it.
    fn record(&mut self) {
        if self.past.len() == LAG_HISTORY {
            self.past.pop_front();
        }
        let snap = self.snapshot();
        self.past.push_back(snap);
    }

    /// The model as it stood `feed_lag` ago.
    fn lagged(&self) -> Option<RemoteState> {
        let as_of = Instant::now().checked_sub(self.feed_lag)?;
        let mut snap = self
            .past
            .iter()
            .rev()
            .find(|p| p.observed_at <= as_of)
            .or(self.past.front())?
            .clone();
        snap.observed_at = as_of;
        Some(snap)
    }

    fn last_index(&self) -> usize {
        self.titles.len().saturating_sub(1)
    }

    fn apply(&mut self, code: RemoteCode) {
        match code {
            RemoteCode::StepUp | RemoteCode::StepDown if self.dropped_steps > 0 => {
                self.dropped_steps -= 1;
            }
            RemoteCode::StepUp => self.cursor = self.cursor.saturating_sub(1),
            RemoteCode::StepDown => self.cursor = (self.cursor + 1).min(self.last_index()),
            RemoteCode::CursorReset => self.cursor = 0,
            RemoteCode::Load(d) | RemoteCode::Play(d) | RemoteCode::Stop(d)
                if self.stuck.contains(&d) => {}
            RemoteCode::Load(d) => {
                let cursor = self.cursor;
                let deck = self.decks.entry(d).or_default();
                deck.loaded = Some(cursor);
                deck.playing = false;
                deck.position = 0.0;
            }
            RemoteCode::Play(d) => {
                let deck = self.decks.entry(d).or_default();
                // Play is a toggle on the hardware; an empty deck ignores it.
                if deck.loaded.is_some() {
                    deck.playing = !deck.playing;
                    if deck.playing && deck.position == 0.0 {
                        deck.position = 0.5;
                    }
                }
            }
            RemoteCode::Stop(d) => {
                self.decks.entry(d).or_default().playing = false;
            }
            RemoteCode::SetLevel(d, v) => {
                self.decks.entry(d).or_default().level = v;
            }
        }
    }
}

/// Shared handle to the simulated application. Cheap to clone.
#[derive(Clone)]
pub struct SimulatedRemote {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedRemote {
    /// A browser list whose entries report the given titles when loaded.
    pub fn with_titles(titles: Vec<String>) -> Self {
        let decks = DeckId::ALL
            .iter()
            .map(|&d| (d, SimDeck::default()))
            .collect();
        let mut state = SimState {
            titles,
            cursor: 0,
            decks,
            sent: Vec::new(),
            connected: true,
            can_reconnect: true,
            feed_enabled: true,
            report_cursor: true,
            frozen: None,
            feed_lag: Duration::ZERO,
            past: VecDeque::new(),
            stuck: Vec::new(),
            dropped_steps: 0,
            disconnect_after: None,
        };
        state.record();
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// A list of `len` entries titled `#0`, `#1`, ...
    pub fn new(len: usize) -> Self {
        Self::with_titles((0..len).map(|i| format!("#{i}")).collect())
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A panicking test thread must not wedge every other user of the model.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn link(&self) -> SimLink {
        SimLink {
            remote: self.clone(),
        }
    }

    pub fn feed(&self) -> SimFeed {
        SimFeed {
            remote: self.clone(),
        }
    }

    pub fn cursor(&self) -> usize {
        self.lock().cursor
    }

    pub fn set_cursor(&self, cursor: usize) {
        let mut s = self.lock();
        s.cursor = cursor.min(s.last_index());
        s.record();
    }

    /// Every code accepted so far, in order.
    pub fn sent(&self) -> Vec<RemoteCode> {
        self.lock().sent.clone()
    }

    pub fn clear_sent(&self) {
        self.lock().sent.clear();
    }

    pub fn deck(&self, deck: DeckId) -> DeckObservation {
        self.lock()
            .snapshot()
            .decks
            .remove(&deck)
            .unwrap_or_default()
    }

    pub fn level(&self, deck: DeckId) -> f32 {
        self.lock().decks.get(&deck).map(|d| d.level).unwrap_or(0.0)
    }

    /// Absent feed: `poll_state` returns `None`.
    pub fn set_feed_enabled(&self, enabled: bool) {
        self.lock().feed_enabled = enabled;
    }

    /// Stale feed: keep returning the snapshot captured now.
    pub fn freeze_feed(&self) {
        let mut s = self.lock();
        let snap = s.snapshot();
        s.frozen = Some(snap);
    }

    pub fn thaw_feed(&self) {
        self.lock().frozen = None;
    }

    pub fn set_report_cursor(&self, report: bool) {
        let mut s = self.lock();
        s.report_cursor = report;
        s.record();
    }

    /// Laggy feed: snapshots describe the model as it stood `lag` ago.
    pub fn set_feed_lag(&self, lag: Duration) {
        self.lock().feed_lag = lag;
    }

    /// Deck ignores load/play/stop.
    pub fn set_stuck(&self, deck: DeckId, stuck: bool) {
        let mut s = self.lock();
        s.stuck.retain(|&d| d != deck);
        if stuck {
            s.stuck.push(deck);
        }
    }

    /// Silently lose the next `n` step codes.
    pub fn drop_next_steps(&self, n: usize) {
        self.lock().dropped_steps = n;
    }

    pub fn disconnect(&self, can_reconnect: bool) {
        let mut s = self.lock();
        s.connected = false;
        s.can_reconnect = can_reconnect;
    }

    /// Drop the link once `n` more codes have been accepted.
    pub fn disconnect_after(&self, n: usize) {
        self.lock().disconnect_after = Some(n);
    }
}

pub struct SimLink {
    remote: SimulatedRemote,
}

impl OutboundLink for SimLink {
    fn send(&mut self, code: RemoteCode) -> Result<(), LinkError> {
        let mut s = self.remote.lock();
        if let Some(n) = s.disconnect_after {
            if n == 0 {
                s.connected = false;
                s.disconnect_after = None;
            } else {
                s.disconnect_after = Some(n - 1);
            }
        }
        if !s.connected {
            return Err(LinkError::Disconnected);
        }
        trace!(?code, "simulated remote received");
        s.sent.push(code);
        s.apply(code);
        s.record();
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), LinkError> {
        let mut s = self.remote.lock();
        if s.connected || s.can_reconnect {
            s.connected = true;
            Ok(())
        } else {
            Err(LinkError::Disconnected)
        }
    }
}

pub struct SimFeed {
    remote: SimulatedRemote,
}

impl StateFeed for SimFeed {
    fn poll_state(&mut self) -> Option<RemoteState> {
        let s = self.remote.lock();
        if !s.feed_enabled {
            return None;
        }
        if let Some(frozen) = &s.frozen {
            return Some(frozen.clone());
        }
        if s.feed_lag.is_zero() {
            Some(s.snapshot())
        } else {
            s.lagged()
        }
    }
}
