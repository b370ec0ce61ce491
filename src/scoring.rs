//! Key/tempo compatibility between two tracks.
//!
//! Scores never fail: a field missing on either side contributes 0 to its
//! component and the pair is still compared.

use crate::config::ScoringSettings;
use crate::library::{TrackRecord, WheelKey};

pub const KEY_IDENTICAL: f64 = 1.0;
pub const KEY_ADJACENT: f64 = 0.7;
pub const TEMPO_DIRECT: f64 = 1.0;
pub const TEMPO_RATIO: f64 = 0.8;

/// Tempo ratios that still beat-match (half/double time, 3:4, 2:3 ...).
pub const MIX_RATIOS: [f64; 6] = [0.5, 0.667, 0.75, 1.333, 1.5, 2.0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub key: f64,
    pub tempo: f64,
    pub combined: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scorer {
    key_weight: f64,
    tempo_weight: f64,
    tempo_tolerance: f64,
    ratio_tolerance_pct: f64,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::from_settings(&ScoringSettings::default())
    }
}

impl Scorer {
    pub fn from_settings(s: &ScoringSettings) -> Self {
        Self {
            key_weight: s.key_weight.max(0.0),
            tempo_weight: s.tempo_weight.max(0.0),
            tempo_tolerance: s.tempo_tolerance.max(0.0),
            ratio_tolerance_pct: s.ratio_tolerance_pct.max(0.0),
        }
    }

    pub fn with_weights(mut self, key_weight: f64, tempo_weight: f64) -> Self {
        self.key_weight = key_weight.max(0.0);
        self.tempo_weight = tempo_weight.max(0.0);
        self
    }

    pub fn with_tempo_tolerance(&self, tolerance: f64) -> Self {
        Self {
            tempo_tolerance: tolerance.max(0.0),
            ..self.clone()
        }
    }

    pub fn tempo_tolerance(&self) -> f64 {
        self.tempo_tolerance
    }

    pub fn key_component(&self, a: Option<WheelKey>, b: Option<WheelKey>) -> f64 {
        match (a, b) {
            (Some(a), Some(b)) if a == b => KEY_IDENTICAL,
            (Some(a), Some(b)) if a.is_adjacent(&b) => KEY_ADJACENT,
            _ => 0.0,
        }
    }

    pub fn tempo_component(&self, a: Option<f64>, b: Option<f64>) -> f64 {
        let (Some(a), Some(b)) = (a, b) else {
            return 0.0;
        };
        if !(a > 0.0 && b > 0.0) {
            return 0.0;
        }
        if (a - b).abs() <= self.tempo_tolerance {
            return TEMPO_DIRECT;
        }
        let ratio = b / a;
        let tol = self.ratio_tolerance_pct / 100.0;
        if MIX_RATIOS
            .iter()
            .any(|m| ((ratio - m) / m).abs() <= tol)
        {
            TEMPO_RATIO
        } else {
            0.0
        }
    }

    pub fn breakdown(&self, a: &TrackRecord, b: &TrackRecord) -> ScoreBreakdown {
        let key = self.key_component(a.key, b.key);
        let tempo = self.tempo_component(a.tempo, b.tempo);
        let total = self.key_weight + self.tempo_weight;
        let combined = if total > 0.0 {
            ((self.key_weight * key + self.tempo_weight * tempo) / total).clamp(0.0, 1.0)
        } else {
            0.0
        };
        ScoreBreakdown {
            key,
            tempo,
            combined,
        }
    }

    /// Weighted blend of the key and tempo components, in `[0, 1]`.
    pub fn score(&self, a: &TrackRecord, b: &TrackRecord) -> f64 {
        self.breakdown(a, b).combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(tempo: Option<f64>, key: Option<&str>) -> TrackRecord {
        TrackRecord::probe("/t.mp3", tempo, key.and_then(WheelKey::parse))
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn identical_full_metadata_scores_one() {
        let s = Scorer::default();
        let a = t(Some(124.0), Some("5A"));
        assert_eq!(s.score(&a, &a), 1.0);
    }

    #[test]
    fn adjacent_key_within_tolerance_blends() {
        let s = Scorer::default();
        let b = s.breakdown(&t(Some(128.0), Some("8A")), &t(Some(132.0), Some("9A")));
        assert_eq!(b.key, KEY_ADJACENT);
        assert_eq!(b.tempo, TEMPO_DIRECT);
        assert!(close(b.combined, 0.85));
    }

    #[test]
    fn relative_key_counts_as_adjacent() {
        let s = Scorer::default();
        assert_eq!(
            s.key_component(WheelKey::parse("8A"), WheelKey::parse("8B")),
            KEY_ADJACENT
        );
        assert_eq!(s.key_component(WheelKey::parse("8A"), WheelKey::parse("3B")), 0.0);
    }

    #[test]
    fn half_and_double_time_match_by_ratio() {
        let s = Scorer::default();
        assert_eq!(s.tempo_component(Some(140.0), Some(70.0)), TEMPO_RATIO);
        assert_eq!(s.tempo_component(Some(85.0), Some(170.0)), TEMPO_RATIO);
        assert_eq!(s.tempo_component(Some(120.0), Some(180.0)), TEMPO_RATIO);
        assert_eq!(s.tempo_component(Some(120.0), Some(150.0)), 0.0);
    }

    #[test]
    fn missing_fields_are_neutral_not_errors() {
        let s = Scorer::default();
        let full = t(Some(128.0), Some("8A"));
        let no_tempo = t(None, Some("8A"));
        let no_key = t(Some(128.0), None);
        let bare = t(None, None);

        assert!(close(s.score(&full, &no_tempo), 0.5));
        assert!(close(s.score(&full, &no_key), 0.5));
        assert_eq!(s.score(&full, &bare), 0.0);
        assert_eq!(s.score(&bare, &bare), 0.0);
    }

    #[test]
    fn weights_are_normalized() {
        let s = Scorer::default().with_weights(3.0, 1.0);
        let b = s.breakdown(&t(Some(128.0), Some("8A")), &t(Some(60.0), Some("8A")));
        assert_eq!(b.tempo, 0.0);
        assert!(close(b.combined, 0.75));

        let zero = Scorer::default().with_weights(0.0, 0.0);
        let a = t(Some(128.0), Some("8A"));
        assert_eq!(zero.score(&a, &a), 0.0);
    }

    #[test]
    fn tolerance_override_widens_direct_match() {
        let s = Scorer::default();
        let a = t(Some(120.0), None);
        let b = t(Some(130.0), None);
        assert_eq!(s.tempo_component(a.tempo, b.tempo), 0.0);
        assert_eq!(
            s.with_tempo_tolerance(10.0).tempo_component(a.tempo, b.tempo),
            TEMPO_DIRECT
        );
    }
}
