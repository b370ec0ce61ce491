use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use crate::config::{KeyStrictness, LibrarySettings};
use crate::error::{Error, Result};
use crate::scoring::Scorer;

use super::cache::{CACHE_VERSION, CacheFile, read_cache, write_cache};
use super::export::{parse_export, read_export};
use super::model::{TrackEntry, TrackRecord};
use super::scan::scan;

/// Where an index is built from.
#[derive(Debug, Clone)]
pub enum LibrarySource {
    /// JSON metadata export on disk.
    Export(PathBuf),
    /// In-memory JSON export text; `name` is used in error messages.
    ExportText { name: String, text: String },
    /// Directory of tagged audio files.
    Directory(PathBuf),
    /// Cache previously written by [`LibraryIndex::save_cache`].
    Cache(PathBuf),
}

impl LibrarySource {
    /// Directories are scanned, `.toml` files are caches, anything else is an export.
    pub fn detect(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            Self::Directory(path)
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"))
        {
            Self::Cache(path)
        } else {
            Self::Export(path)
        }
    }

    fn name(&self) -> String {
        match self {
            Self::Export(p) | Self::Directory(p) | Self::Cache(p) => p.display().to_string(),
            Self::ExportText { name, .. } => name.clone(),
        }
    }

    fn path(&self) -> Option<&Path> {
        match self {
            Self::Export(p) | Self::Directory(p) | Self::Cache(p) => Some(p),
            Self::ExportText { .. } => None,
        }
    }
}

/// Options for [`LibraryIndex::compatible`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompatibilityQuery {
    /// When set, candidates must be tempo-compatible within this many BPM
    /// (directly or by a mixable ratio). Candidates without tempo are excluded.
    pub tempo_tolerance: Option<f64>,
    /// Key filter. Anything but `Any` excludes candidates without a key.
    pub key_strictness: KeyStrictness,
    pub limit: Option<usize>,
}

impl Default for CompatibilityQuery {
    fn default() -> Self {
        Self {
            tempo_tolerance: None,
            key_strictness: KeyStrictness::Any,
            limit: None,
        }
    }
}

/// A compatibility result: the candidate and its blended score.
#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    pub track: &'a TrackRecord,
    pub score: f64,
}

/// Metadata-only filter for [`LibraryIndex::query`]. Never looks at tempo or key.
#[derive(Debug, Clone, Default)]
pub struct TrackFilter {
    pub genre: Option<String>,
    pub min_rating: Option<u8>,
    /// Case-insensitive substring over "artist - title".
    pub text: Option<String>,
}

impl TrackFilter {
    fn matches(&self, t: &TrackRecord) -> bool {
        if let Some(g) = &self.genre {
            if !t
                .genre
                .as_deref()
                .is_some_and(|tg| tg.trim().eq_ignore_ascii_case(g.trim()))
            {
                return false;
            }
        }
        if let Some(min) = self.min_rating {
            if t.rating.unwrap_or(0) < min {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let needle = text.trim().to_lowercase();
            if !needle.is_empty() && !t.display().to_lowercase().contains(&needle) {
                return false;
            }
        }
        true
    }
}

/// Immutable, read-only track index. Safe to share across threads.
#[derive(Debug, Clone, Default)]
pub struct LibraryIndex {
    tracks: Vec<TrackRecord>,
    by_path: HashMap<PathBuf, usize>,
    source: Option<PathBuf>,
}

impl LibraryIndex {
    pub fn build(source: &LibrarySource, settings: &LibrarySettings) -> Result<Self> {
        let name = source.name();
        let (entries, origin) = match source {
            LibrarySource::Export(p) => (read_export(p)?, Some(p.clone())),
            LibrarySource::ExportText { text, .. } => (parse_export(text, &name)?, None),
            LibrarySource::Directory(p) => (scan(p, settings)?, Some(p.clone())),
            LibrarySource::Cache(p) => {
                let file = read_cache(p)?;
                (file.tracks, file.source.or_else(|| Some(p.clone())))
            }
        };

        let index = Self::from_entries(entries, &name)?;
        info!(
            source = %name,
            tracks = index.len(),
            with_tempo = index.tracks.iter().filter(|t| t.tempo.is_some()).count(),
            with_key = index.tracks.iter().filter(|t| t.key.is_some()).count(),
            "library index built"
        );
        Ok(Self {
            source: origin.or_else(|| source.path().map(Path::to_path_buf)),
            ..index
        })
    }

    /// Build from already-parsed entries; list positions follow entry order.
    pub fn from_entries(entries: Vec<TrackEntry>, source_name: &str) -> Result<Self> {
        let mut tracks = Vec::with_capacity(entries.len());
        let mut by_path = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.into_iter().enumerate() {
            let record = entry.into_record(position, source_name)?;
            if by_path.insert(record.path.clone(), position).is_some() {
                return Err(Error::parse(
                    source_name,
                    format!("duplicate path {}", record.path.display()),
                ));
            }
            tracks.push(record);
        }
        Ok(Self {
            tracks,
            by_path,
            source: None,
        })
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackRecord> {
        self.tracks.iter()
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// O(1) lookup by path.
    pub fn lookup(&self, path: &Path) -> Option<&TrackRecord> {
        self.by_path.get(path).map(|&i| &self.tracks[i])
    }

    pub fn position_of(&self, path: &Path) -> Option<usize> {
        self.by_path.get(path).copied()
    }

    /// The track at an absolute list position.
    pub fn at(&self, position: usize) -> Option<&TrackRecord> {
        self.tracks.get(position)
    }

    /// Candidates for mixing after `seed`, best first.
    ///
    /// Recomputed on every call. The seed itself (same path) is never returned.
    /// Equal scores keep list order.
    pub fn compatible<'a>(
        &'a self,
        seed: &TrackRecord,
        query: &CompatibilityQuery,
        scorer: &Scorer,
    ) -> Vec<Match<'a>> {
        let scorer = match query.tempo_tolerance {
            Some(tol) => scorer.with_tempo_tolerance(tol),
            None => scorer.clone(),
        };
        // A seed without tempo/key cannot drive the corresponding filter.
        let tempo_filter = query.tempo_tolerance.is_some() && seed.tempo.is_some();
        let key_floor = match query.key_strictness {
            _ if seed.key.is_none() => None,
            KeyStrictness::Any => None,
            KeyStrictness::Harmonic => Some(crate::scoring::KEY_ADJACENT),
            KeyStrictness::Exact => Some(crate::scoring::KEY_IDENTICAL),
        };

        let mut out: Vec<Match<'a>> = self
            .tracks
            .iter()
            .filter(|t| t.path != seed.path)
            .filter_map(|t| {
                let b = scorer.breakdown(seed, t);
                if tempo_filter && b.tempo <= 0.0 {
                    return None;
                }
                if let Some(floor) = key_floor {
                    if b.key < floor {
                        return None;
                    }
                }
                Some(Match {
                    track: t,
                    score: b.combined,
                })
            })
            .collect();

        out.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.track.position.cmp(&b.track.position))
        });
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        debug!(seed = %seed.path.display(), results = out.len(), "compatibility query");
        out
    }

    /// Genre/rating/text query in list order. Missing tempo or key never excludes.
    pub fn query(&self, filter: &TrackFilter) -> Vec<&TrackRecord> {
        self.tracks.iter().filter(|t| filter.matches(t)).collect()
    }

    pub fn save_cache(&self, path: &Path) -> Result<()> {
        let file = CacheFile {
            version: CACHE_VERSION,
            built_at: Utc::now(),
            source: self.source.clone(),
            tracks: self.tracks.iter().map(TrackEntry::from).collect(),
        };
        write_cache(path, &file)?;
        debug!(path = %path.display(), tracks = self.len(), "index cache written");
        Ok(())
    }

    pub fn load_cache(path: &Path) -> Result<Self> {
        Self::build(
            &LibrarySource::Cache(path.to_path_buf()),
            &LibrarySettings::default(),
        )
    }
}
