use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::remote::{DeckId, DeckObservation, RemoteCode, RemoteState, StepDirection};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A command the dispatcher can execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Step(StepDirection),
    CursorReset,
    /// Load the track under the cursor. `expected_track` is compared with the
    /// identity the application reports, when it reports one.
    Load {
        deck: DeckId,
        expected_track: Option<String>,
    },
    Play(DeckId),
    Stop(DeckId),
    /// Channel level in `[0, 1]`.
    SetLevel { deck: DeckId, value: f32 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandKind {
    NavigateStep,
    CursorReset,
    Load,
    Play,
    Stop,
    SetLevel,
}

impl Command {
    pub fn load(deck: DeckId) -> Self {
        Command::Load {
            deck,
            expected_track: None,
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Step(_) => CommandKind::NavigateStep,
            Command::CursorReset => CommandKind::CursorReset,
            Command::Load { .. } => CommandKind::Load,
            Command::Play(_) => CommandKind::Play,
            Command::Stop(_) => CommandKind::Stop,
            Command::SetLevel { .. } => CommandKind::SetLevel,
        }
    }

    pub fn deck(&self) -> Option<DeckId> {
        match self {
            Command::Step(_) | Command::CursorReset => None,
            Command::Load { deck, .. } | Command::SetLevel { deck, .. } => Some(*deck),
            Command::Play(d) | Command::Stop(d) => Some(*d),
        }
    }

    pub fn code(&self) -> RemoteCode {
        match self {
            Command::Step(d) => RemoteCode::from(*d),
            Command::CursorReset => RemoteCode::CursorReset,
            Command::Load { deck, .. } => RemoteCode::Load(*deck),
            Command::Play(d) => RemoteCode::Play(*d),
            Command::Stop(d) => RemoteCode::Stop(*d),
            Command::SetLevel { deck, value } => RemoteCode::SetLevel(*deck, *value),
        }
    }

    /// What a snapshot must show for the command to count as done.
    /// `None` for commands whose effect the feed cannot show.
    pub fn postcondition(&self) -> Option<Postcondition> {
        match self {
            Command::Load {
                deck,
                expected_track,
            } => Some(Postcondition::Loaded {
                deck: *deck,
                expected_track: expected_track.clone(),
            }),
            Command::Play(d) => Some(Postcondition::Playing(*d)),
            Command::Stop(d) => Some(Postcondition::Stopped(*d)),
            Command::Step(_) | Command::CursorReset | Command::SetLevel { .. } => None,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Command::SetLevel { value, .. } = self {
            if !(0.0..=1.0).contains(value) {
                return Err(Error::InvalidCommand(format!(
                    "level {value} outside [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Postcondition {
    Loaded {
        deck: DeckId,
        expected_track: Option<String>,
    },
    Playing(DeckId),
    Stopped(DeckId),
}

impl Postcondition {
    pub fn deck(&self) -> DeckId {
        match self {
            Postcondition::Loaded { deck, .. } => *deck,
            Postcondition::Playing(d) | Postcondition::Stopped(d) => *d,
        }
    }

    /// True when `state` already shows the effect of a toggle-style command.
    /// Sending the toggle again would undo it. Loads never count as satisfied
    /// in advance.
    pub fn already_holds(&self, state: &RemoteState) -> bool {
        let Some(obs) = state.deck(self.deck()) else {
            return false;
        };
        match self {
            Postcondition::Loaded { .. } => false,
            Postcondition::Playing(_) => obs.playing,
            Postcondition::Stopped(_) => !obs.playing,
        }
    }

    /// Compare `after` with `before`; `Err` carries the reason verification failed.
    pub fn verify(&self, before: Option<&RemoteState>, after: &RemoteState) -> std::result::Result<(), String> {
        let deck = self.deck();
        let Some(now) = after.deck(deck) else {
            return Err(format!("deck {deck} missing from snapshot"));
        };
        let was: Option<&DeckObservation> = before.and_then(|b| b.deck(deck));

        match self {
            Postcondition::Loaded { expected_track, .. } => {
                if !now.loaded {
                    return Err(format!("deck {deck} reports nothing loaded"));
                }
                if let (Some(expected), Some(got)) = (expected_track, &now.track) {
                    if expected != got {
                        return Err(format!("deck {deck} loaded {got:?}, expected {expected:?}"));
                    }
                }
                match was {
                    Some(w) if w.loaded => {
                        let track_changed = matches!((&w.track, &now.track), (Some(a), Some(b)) if a != b);
                        let rewound = now.position < w.position;
                        let halted = w.playing && !now.playing;
                        if track_changed || rewound || halted {
                            Ok(())
                        } else {
                            Err(format!("deck {deck} shows no change since the load was sent"))
                        }
                    }
                    Some(_) => Ok(()),
                    // Without a baseline only a confirmed title proves the load landed.
                    None => match (expected_track, &now.track) {
                        (Some(_), Some(_)) => Ok(()),
                        _ => Err(format!("deck {deck} had no earlier snapshot to compare against")),
                    },
                }
            }
            Postcondition::Playing(_) => {
                if !now.playing {
                    Err(format!("deck {deck} is not playing"))
                } else if was.is_some_and(|w| w.playing) {
                    Err(format!("deck {deck} was already playing"))
                } else {
                    Ok(())
                }
            }
            Postcondition::Stopped(_) => {
                if now.playing {
                    Err(format!("deck {deck} is still playing"))
                } else if was.is_some_and(|w| !w.playing) {
                    Err(format!("deck {deck} was already stopped"))
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl fmt::Display for Postcondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Postcondition::Loaded {
                deck,
                expected_track: Some(t),
            } => write!(f, "deck {deck} loaded with {t:?}"),
            Postcondition::Loaded { deck, .. } => write!(f, "deck {deck} loaded"),
            Postcondition::Playing(d) => write!(f, "deck {d} playing"),
            Postcondition::Stopped(d) => write!(f, "deck {d} stopped"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    /// The feed confirmed the postcondition.
    Verified,
    /// Transmitted; nothing could confirm it (no feed, or no observable effect).
    SentUnverified,
    /// The postcondition held before sending, so nothing was sent.
    AlreadySatisfied,
    /// A fresh snapshot contradicted the postcondition on every attempt.
    Failed,
    /// No fresh snapshot arrived before the verification timeout on the last attempt.
    Timeout,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verification {
    Pending,
    Verified,
    Unverified,
    AlreadySatisfied,
    Failed,
    TimedOut,
}

impl From<CommandStatus> for Verification {
    fn from(s: CommandStatus) -> Self {
        match s {
            CommandStatus::Verified => Verification::Verified,
            CommandStatus::SentUnverified => Verification::Unverified,
            CommandStatus::AlreadySatisfied => Verification::AlreadySatisfied,
            CommandStatus::Failed => Verification::Failed,
            CommandStatus::Timeout => Verification::TimedOut,
        }
    }
}

/// Outcome of [`crate::dispatch::Dispatcher::execute`].
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    pub id: CommandId,
    pub kind: CommandKind,
    pub deck: Option<DeckId>,
    pub status: CommandStatus,
    pub verified: bool,
    pub elapsed: Duration,
    pub retry_count: u32,
    /// Why the command is not verified, when it is not.
    pub reason: Option<String>,
    /// Last fresh observation of the target deck, if any.
    pub observed: Option<DeckObservation>,
}

impl CommandResult {
    /// `Failed`/`Timeout` become errors; everything else passes through.
    pub fn into_result(self) -> Result<Self> {
        let attempts = self.retry_count + 1;
        match self.status {
            CommandStatus::Failed => Err(Error::CommandVerificationFailed {
                id: self.id,
                attempts,
                reason: self.reason.unwrap_or_else(|| "postcondition not met".into()),
            }),
            CommandStatus::Timeout => Err(Error::CommandTimeout {
                id: self.id,
                attempts,
            }),
            _ => Ok(self),
        }
    }
}

/// Diagnostic record kept in the command history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: CommandId,
    pub kind: CommandKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deck: Option<DeckId>,
    pub issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postcondition: Option<String>,
    pub verification: Verification,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl CommandRecord {
    pub(crate) fn pending(id: CommandId, command: &Command) -> Self {
        Self {
            id,
            kind: command.kind(),
            deck: command.deck(),
            issued_at: Utc::now(),
            postcondition: command.postcondition().map(|p| p.to_string()),
            verification: Verification::Pending,
            retry_count: 0,
            reason: None,
            elapsed_ms: 0,
        }
    }
}
