use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level settings loaded from `config.toml`.
///
/// File format: TOML
/// Default path (Linux/XDG): `$XDG_CONFIG_HOME/decksync/config.toml` or `~/.config/decksync/config.toml`
///
/// Precedence (highest wins):
/// 1) Environment variables (prefix `DECKSYNC__`, `__` as nested separator)
/// 2) Config file (if present)
/// 3) Struct defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub library: LibrarySettings,
    pub scoring: ScoringSettings,
    pub navigator: NavigatorSettings,
    pub dispatcher: DispatcherSettings,
    pub guard: GuardSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// Export file or music directory to index when none is given on the command line.
    pub source: Option<PathBuf>,
    /// Where to write the rebuildable index cache. Disabled when unset.
    pub cache_path: Option<PathBuf>,
    /// File extensions to treat as audio when scanning a directory (case-insensitive, without dot).
    pub extensions: Vec<String>,
    /// Whether to follow symlinks during scanning.
    pub follow_links: bool,
    /// Whether to include hidden files/directories (dotfiles).
    pub include_hidden: bool,
    /// Optional cap on directory recursion depth.
    pub max_depth: Option<usize>,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            source: None,
            cache_path: None,
            extensions: vec![
                "mp3".into(),
                "flac".into(),
                "wav".into(),
                "ogg".into(),
                "m4a".into(),
                "aiff".into(),
            ],
            follow_links: true,
            include_hidden: false,
            max_depth: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    /// Weight of the key component in the blended score.
    pub key_weight: f64,
    /// Weight of the tempo component in the blended score.
    pub tempo_weight: f64,
    /// Absolute BPM difference that still counts as a direct tempo match.
    pub tempo_tolerance: f64,
    /// Percentage tolerance when matching half/double/third tempo ratios.
    pub ratio_tolerance_pct: f64,
    /// Default key filter for compatibility queries.
    pub key_strictness: KeyStrictness,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            key_weight: 0.5,
            tempo_weight: 0.5,
            tempo_tolerance: 6.0,
            ratio_tolerance_pct: 3.0,
            key_strictness: KeyStrictness::Harmonic,
        }
    }
}

/// How strictly compatibility queries filter on key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyStrictness {
    /// No key filter; key still contributes to the score.
    Any,
    /// Identical or adjacent wheel codes.
    #[default]
    #[serde(alias = "adjacent")]
    Harmonic,
    /// Identical wheel codes only.
    #[serde(alias = "strict")]
    Exact,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NavigatorSettings {
    /// Cost, in step-equivalents, of sending the cursor back to the top of the list.
    pub reset_cost: usize,
    /// Minimum spacing between two transmitted steps (milliseconds).
    pub step_interval_ms: u64,
    /// How often an idle session polls the feed to reconcile the cursor (milliseconds).
    pub reconcile_interval_ms: u64,
}

impl Default for NavigatorSettings {
    fn default() -> Self {
        Self {
            reset_cost: 5,
            step_interval_ms: 80,
            reconcile_interval_ms: 250,
        }
    }
}

impl NavigatorSettings {
    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_interval_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    /// Wait after transmit before the first `state_after` poll (milliseconds).
    pub verification_delay_ms: u64,
    /// Hard limit on waiting for a fresh snapshot, measured from transmit (milliseconds).
    pub verification_timeout_ms: u64,
    /// Re-poll spacing while the feed is absent or stale (milliseconds).
    pub poll_interval_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
    /// In-memory command history size.
    pub history_capacity: usize,
    /// Optional append-only JSON-lines file for the command history.
    pub history_path: Option<PathBuf>,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            verification_delay_ms: 500,
            verification_timeout_ms: 3000,
            poll_interval_ms: 100,
            max_retries: 2,
            backoff_min_ms: 300,
            backoff_max_ms: 500,
            history_capacity: 1000,
            history_path: None,
        }
    }
}

impl DispatcherSettings {
    pub fn verification_delay(&self) -> Duration {
        Duration::from_millis(self.verification_delay_ms)
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_millis(self.verification_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    /// Disable to let navigation reach any position.
    pub enabled: bool,
    /// Number of recently loaded positions remembered.
    pub history_size: usize,
    /// Positions within this distance of a remembered one are excluded.
    pub radius: usize,
    /// Largest distance scanned by `find_nearest_safe`.
    pub search_bound: usize,
    /// Consecutive failed searches before the history resets itself.
    pub deadlock_reset_threshold: u32,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            history_size: 10,
            radius: 3,
            search_bound: 50,
            deadlock_reset_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is not set.
    pub level: String,
    /// Include thread ids in log lines.
    pub thread_ids: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            thread_ids: false,
        }
    }
}
