use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dispatch::{Command, CommandId, CommandResult, CommandStatus};
use crate::library::TrackRecord;
use crate::remote::{DeckId, DeckObservation};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlayState {
    #[default]
    Stopped,
    Playing,
    /// Stopped with the playhead away from the start.
    Paused,
}

impl PlayState {
    fn from_observation(obs: &DeckObservation) -> Self {
        if obs.playing {
            PlayState::Playing
        } else if obs.position > 0.0 {
            PlayState::Paused
        } else {
            PlayState::Stopped
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedTrack {
    pub path: PathBuf,
    pub position: usize,
    pub title: String,
}

impl From<&TrackRecord> for LoadedTrack {
    fn from(t: &TrackRecord) -> Self {
        Self {
            path: t.path.clone(),
            position: t.position,
            title: t.title.clone(),
        }
    }
}

/// Last verified state of one deck.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeckState {
    pub deck: DeckId,
    pub loaded: Option<LoadedTrack>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub play_state: PlayState,
    /// Most recent command issued for this deck, verified or not.
    pub last_command: Option<CommandId>,
}

impl DeckState {
    pub fn new(deck: DeckId) -> Self {
        Self {
            deck,
            loaded: None,
            loaded_at: None,
            play_state: PlayState::Stopped,
            last_command: None,
        }
    }

    /// Fold a dispatcher result in. Load and play fields only change when the
    /// effect was observed (`Verified` or `AlreadySatisfied`); returns whether
    /// anything changed.
    pub(crate) fn apply(
        &mut self,
        command: &Command,
        result: &CommandResult,
        track: Option<&TrackRecord>,
    ) -> bool {
        self.last_command = Some(result.id);
        if !matches!(
            result.status,
            CommandStatus::Verified | CommandStatus::AlreadySatisfied
        ) {
            return false;
        }

        match command {
            Command::Load { .. } => {
                self.loaded = track.map(LoadedTrack::from);
                self.loaded_at = Some(Utc::now());
                self.play_state = result
                    .observed
                    .as_ref()
                    .map(PlayState::from_observation)
                    .unwrap_or(PlayState::Stopped);
            }
            Command::Play(_) => self.play_state = PlayState::Playing,
            Command::Stop(_) => {
                self.play_state = result
                    .observed
                    .as_ref()
                    .filter(|o| o.position > 0.0)
                    .map_or(PlayState::Stopped, |_| PlayState::Paused);
            }
            _ => return false,
        }
        true
    }

    /// Take over what a snapshot reports, after a resync.
    ///
    /// `resolve` maps the reported track identity back to an index record.
    pub(crate) fn adopt<'a>(
        &mut self,
        obs: &DeckObservation,
        resolve: impl Fn(&str) -> Option<&'a TrackRecord>,
    ) {
        self.play_state = PlayState::from_observation(obs);
        if !obs.loaded {
            self.loaded = None;
            self.loaded_at = None;
            return;
        }
        let same = match (&self.loaded, obs.track.as_deref()) {
            (Some(current), Some(reported)) => current.title == reported,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !same {
            self.loaded = obs.track.as_deref().and_then(&resolve).map(LoadedTrack::from);
            self.loaded_at = Some(Utc::now());
        }
    }
}
