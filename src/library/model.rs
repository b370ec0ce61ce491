use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::key::WheelKey;

/// One indexed track. Immutable once the index is built.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRecord {
    /// Unique id of the record.
    pub path: PathBuf,
    pub title: String,
    pub artist: Option<String>,
    /// Beats per minute; `None` when missing or zero in the source.
    pub tempo: Option<f64>,
    pub key: Option<WheelKey>,
    pub genre: Option<String>,
    /// Star rating in `0..=5`.
    pub rating: Option<u8>,
    pub duration: Option<Duration>,
    /// Absolute offset of this track in the remote browser list.
    pub position: usize,
}

impl TrackRecord {
    /// A record that is not part of any index, e.g. a track described by a caller.
    pub fn probe(path: impl Into<PathBuf>, tempo: Option<f64>, key: Option<WheelKey>) -> Self {
        let path = path.into();
        Self {
            title: default_title(&path),
            path,
            artist: None,
            tempo,
            key,
            genre: None,
            rating: None,
            duration: None,
            position: usize::MAX,
        }
    }

    /// "Artist - Title", or just the title when the artist is unknown.
    pub fn display(&self) -> String {
        match self.artist.as_deref().map(str::trim) {
            Some(a) if !a.is_empty() => format!("{} - {}", a, self.title.trim()),
            _ => self.title.trim().to_string(),
        }
    }
}

pub(crate) fn default_title(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("UNKNOWN")
        .to_string()
}

/// Wire shape of a track in the JSON export and the TOML cache.
///
/// Field aliases cover the spellings common in DJ software exports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackEntry {
    #[serde(alias = "location", alias = "file")]
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "name")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "bpm")]
    pub tempo: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "initial_key",
        alias = "musical_key",
        alias = "tonality"
    )]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u16>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "duration",
        alias = "length"
    )]
    pub duration_secs: Option<f64>,
}

impl TrackEntry {
    /// Validate and normalize into a record at `position`.
    pub(crate) fn into_record(self, position: usize, source_name: &str) -> Result<TrackRecord> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::parse(
                source_name,
                format!("track #{position} has an empty path"),
            ));
        }

        let tempo = match self.tempo {
            Some(t) if !t.is_finite() || t < 0.0 => {
                return Err(Error::parse(
                    source_name,
                    format!("{}: invalid tempo {t}", self.path.display()),
                ));
            }
            Some(t) if t == 0.0 => None,
            other => other,
        };

        let duration = self
            .duration_secs
            .map(|d| {
                Duration::try_from_secs_f64(d).map_err(|e| {
                    Error::parse(
                        source_name,
                        format!("{}: invalid duration {d}: {e}", self.path.display()),
                    )
                })
            })
            .transpose()?;

        // Unknown key spellings degrade to "missing" rather than failing the build.
        let key = self
            .key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(WheelKey::parse);

        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default_title(&self.path));

        Ok(TrackRecord {
            title,
            artist: non_empty(self.artist),
            tempo,
            key,
            genre: non_empty(self.genre),
            rating: self.rating.map(normalize_rating),
            duration,
            path: self.path,
            position,
        })
    }
}

impl From<&TrackRecord> for TrackEntry {
    fn from(r: &TrackRecord) -> Self {
        Self {
            path: r.path.clone(),
            title: Some(r.title.clone()),
            artist: r.artist.clone(),
            tempo: r.tempo,
            key: r.key.map(|k| k.to_string()),
            genre: r.genre.clone(),
            rating: r.rating.map(u16::from),
            duration_secs: r.duration.map(|d| d.as_secs_f64()),
        }
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Stars pass through; popularimeter-style 0..=255 values are scaled to stars.
fn normalize_rating(raw: u16) -> u8 {
    if raw <= 5 {
        raw as u8
    } else {
        let clamped = raw.min(255) as f64;
        (clamped * 5.0 / 255.0).round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefers_artist_dash_title() {
        let mut r = TrackRecord::probe("/music/Song.mp3", None, None);
        assert_eq!(r.display(), "Song");
        r.artist = Some("  Artist ".into());
        assert_eq!(r.display(), "Artist - Song");
        r.artist = Some("   ".into());
        assert_eq!(r.display(), "Song");
    }

    #[test]
    fn into_record_normalizes_fields() {
        let entry = TrackEntry {
            path: "/music/a.mp3".into(),
            title: Some("  ".into()),
            artist: Some(" DJ ".into()),
            tempo: Some(0.0),
            key: Some("Am".into()),
            genre: Some(String::new()),
            rating: Some(255),
            duration_secs: Some(90.5),
        };
        let r = entry.into_record(3, "test").unwrap();
        assert_eq!(r.title, "a");
        assert_eq!(r.artist.as_deref(), Some("DJ"));
        assert_eq!(r.tempo, None);
        assert_eq!(r.key.map(|k| k.to_string()).as_deref(), Some("8A"));
        assert_eq!(r.genre, None);
        assert_eq!(r.rating, Some(5));
        assert_eq!(r.duration, Some(Duration::from_secs_f64(90.5)));
        assert_eq!(r.position, 3);
    }

    #[test]
    fn into_record_rejects_negative_tempo_and_empty_path() {
        let bad_tempo = TrackEntry {
            path: "/music/a.mp3".into(),
            tempo: Some(-1.0),
            ..TrackEntry::default()
        };
        assert!(matches!(
            bad_tempo.into_record(0, "test"),
            Err(Error::Parse { .. })
        ));

        let no_path = TrackEntry::default();
        assert!(matches!(no_path.into_record(0, "test"), Err(Error::Parse { .. })));
    }

    #[test]
    fn into_record_rejects_unrepresentable_durations() {
        for secs in [-3.0, f64::NAN, f64::INFINITY, 1e20] {
            let entry = TrackEntry {
                path: "/music/a.mp3".into(),
                duration_secs: Some(secs),
                ..TrackEntry::default()
            };
            assert!(
                matches!(entry.into_record(0, "test"), Err(Error::Parse { .. })),
                "{secs}"
            );
        }
    }

    #[test]
    fn unknown_key_spelling_is_missing_not_an_error() {
        let entry = TrackEntry {
            path: "/music/a.mp3".into(),
            key: Some("weird".into()),
            ..TrackEntry::default()
        };
        assert_eq!(entry.into_record(0, "test").unwrap().key, None);
    }
}
