//! Codes and observations exchanged with the controlled application.
//!
//! The physical encoding of a code (MIDI, OSC, keystrokes) belongs to the link
//! implementation; the pipeline only deals in these opaque values.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DeckId {
    A,
    B,
    C,
    D,
}

impl DeckId {
    pub const ALL: [DeckId; 4] = [DeckId::A, DeckId::B, DeckId::C, DeckId::D];
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            DeckId::A => "A",
            DeckId::B => "B",
            DeckId::C => "C",
            DeckId::D => "D",
        };
        f.write_str(c)
    }
}

impl FromStr for DeckId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" | "1" => Ok(DeckId::A),
            "B" | "b" | "2" => Ok(DeckId::B),
            "C" | "c" | "3" => Ok(DeckId::C),
            "D" | "d" | "4" => Ok(DeckId::D),
            other => Err(format!("unknown deck {other:?}")),
        }
    }
}

/// Direction of one relative cursor step. `Down` moves to the next (higher) list index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepDirection {
    Up,
    Down,
}

impl StepDirection {
    pub fn delta(self) -> isize {
        match self {
            StepDirection::Up => -1,
            StepDirection::Down => 1,
        }
    }
}

/// One discrete message on the outbound stream.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteCode {
    StepUp,
    StepDown,
    /// Sends the browser cursor back to the top of the list.
    CursorReset,
    Load(DeckId),
    Play(DeckId),
    Stop(DeckId),
    SetLevel(DeckId, f32),
}

impl From<StepDirection> for RemoteCode {
    fn from(d: StepDirection) -> Self {
        match d {
            StepDirection::Up => RemoteCode::StepUp,
            StepDirection::Down => RemoteCode::StepDown,
        }
    }
}

/// What a snapshot says about one deck.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeckObservation {
    pub loaded: bool,
    pub playing: bool,
    /// Playhead position in seconds.
    pub position: f64,
    /// Track identity as reported by the application (usually its title), if any.
    pub track: Option<String>,
}

/// A best-effort, possibly stale, view of the application.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteState {
    pub decks: BTreeMap<DeckId, DeckObservation>,
    /// Browser cursor position, when the application reports it.
    pub cursor: Option<usize>,
    /// When the application captured this state.
    pub observed_at: Instant,
}

impl RemoteState {
    pub fn deck(&self, deck: DeckId) -> Option<&DeckObservation> {
        self.decks.get(&deck)
    }
}
