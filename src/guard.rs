//! Anti-duplication guard: keeps navigation away from recently loaded list
//! positions and their neighbours.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::config::GuardSettings;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct AntiDuplicationGuard {
    enabled: bool,
    history: VecDeque<usize>,
    capacity: usize,
    radius: usize,
    search_bound: usize,
    reset_threshold: u32,
    consecutive_failures: u32,
    /// Highest valid list position, when the list length is known.
    max_index: Option<usize>,
}

impl AntiDuplicationGuard {
    pub fn new(settings: &GuardSettings) -> Self {
        Self {
            enabled: settings.enabled,
            history: VecDeque::with_capacity(settings.history_size),
            capacity: settings.history_size.max(1),
            radius: settings.radius,
            search_bound: settings.search_bound,
            reset_threshold: settings.deadlock_reset_threshold.max(1),
            consecutive_failures: 0,
            max_index: None,
        }
    }

    /// Restrict substitutes to `0..list_len`.
    pub fn with_list_len(mut self, list_len: usize) -> Self {
        self.set_list_len(list_len);
        self
    }

    pub fn set_list_len(&mut self, list_len: usize) {
        self.max_index = list_len.checked_sub(1);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn history(&self) -> impl Iterator<Item = usize> + '_ {
        self.history.iter().copied()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Remember a loaded position, forgetting the oldest beyond capacity.
    pub fn record(&mut self, index: usize) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(index);
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.consecutive_failures = 0;
    }

    /// `index` lies farther than the radius from every remembered position.
    pub fn is_safe(&self, index: usize) -> bool {
        !self.enabled || self.history.iter().all(|&h| h.abs_diff(index) > self.radius)
    }

    fn in_range(&self, index: usize) -> bool {
        self.max_index.is_none_or(|max| index <= max)
    }

    /// Nearest safe position to `index`, trying `index + d` before `index - d`
    /// for each distance `d` up to the search bound.
    ///
    /// A failed search returns `NavigationDeadlock`. After
    /// `deadlock_reset_threshold` consecutive failures the history is cleared
    /// and `index` itself is returned.
    pub fn find_nearest_safe(&mut self, index: usize) -> Result<usize> {
        if self.is_safe(index) {
            self.consecutive_failures = 0;
            return Ok(index);
        }

        for d in 1..=self.search_bound {
            let down = index.checked_add(d).filter(|&i| self.in_range(i));
            let up = index.checked_sub(d);
            for candidate in [down, up].into_iter().flatten() {
                if self.is_safe(candidate) {
                    self.consecutive_failures = 0;
                    debug!(requested = index, substitute = candidate, "guard redirected target");
                    return Ok(candidate);
                }
            }
        }

        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.reset_threshold {
            warn!(
                index,
                failures = self.consecutive_failures,
                radius = self.radius,
                "no safe position found repeatedly; clearing guard history"
            );
            self.reset();
            return Ok(index);
        }

        Err(Error::NavigationDeadlock {
            index,
            bound: self.search_bound,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(radius: usize, bound: usize, threshold: u32) -> AntiDuplicationGuard {
        AntiDuplicationGuard::new(&GuardSettings {
            enabled: true,
            history_size: 10,
            radius,
            search_bound: bound,
            deadlock_reset_threshold: threshold,
        })
    }

    #[test]
    fn is_safe_respects_radius() {
        let mut g = guard(3, 50, 3);
        g.record(20);
        assert!(!g.is_safe(17));
        assert!(!g.is_safe(20));
        assert!(!g.is_safe(23));
        assert!(g.is_safe(16));
        assert!(g.is_safe(24));
    }

    #[test]
    fn nearest_safe_prefers_higher_index_on_equal_distance() {
        let mut g = guard(3, 50, 3);
        g.record(20);
        assert_eq!(g.find_nearest_safe(20).unwrap(), 24);
        assert_eq!(g.find_nearest_safe(22).unwrap(), 24);
        assert_eq!(g.find_nearest_safe(18).unwrap(), 16);
        assert_eq!(g.find_nearest_safe(5).unwrap(), 5);
    }

    #[test]
    fn nearest_safe_never_lands_within_radius() {
        let mut g = guard(2, 100, 3);
        for h in [10, 15, 30, 33, 36] {
            g.record(h);
        }
        for start in 0..60 {
            let got = g.find_nearest_safe(start).unwrap();
            assert!(g.is_safe(got), "start {start} -> {got}");
        }
    }

    #[test]
    fn respects_list_bounds() {
        let mut g = guard(3, 10, 3).with_list_len(22);
        g.record(20);
        // 24 is past the end, so the search goes up the list.
        assert_eq!(g.find_nearest_safe(20).unwrap(), 16);
        // Near zero only the upward direction exists.
        let mut g = guard(3, 10, 3);
        g.record(0);
        assert_eq!(g.find_nearest_safe(0).unwrap(), 4);
    }

    #[test]
    fn history_is_bounded() {
        let mut g = AntiDuplicationGuard::new(&GuardSettings {
            history_size: 2,
            ..GuardSettings::default()
        });
        g.record(1);
        g.record(50);
        g.record(100);
        assert_eq!(g.history().collect::<Vec<_>>(), vec![50, 100]);
        assert!(g.is_safe(1));
    }

    #[test]
    fn repeated_deadlock_resets_history() {
        let mut g = guard(5, 3, 2).with_list_len(8);
        g.record(3);
        assert!(matches!(
            g.find_nearest_safe(3),
            Err(Error::NavigationDeadlock { index: 3, bound: 3 })
        ));
        assert_eq!(g.consecutive_failures(), 1);

        // Second consecutive failure crosses the threshold and self-heals.
        assert_eq!(g.find_nearest_safe(3).unwrap(), 3);
        assert_eq!(g.consecutive_failures(), 0);
        assert_eq!(g.history().count(), 0);
        assert!(g.is_safe(3));
    }

    #[test]
    fn a_success_clears_the_failure_streak() {
        let mut g = guard(5, 3, 2).with_list_len(100);
        g.record(3);
        assert!(g.find_nearest_safe(3).is_err());
        assert_eq!(g.find_nearest_safe(50).unwrap(), 50);
        assert_eq!(g.consecutive_failures(), 0);
        assert!(g.find_nearest_safe(3).is_err());
    }

    #[test]
    fn disabled_guard_allows_everything() {
        let mut g = AntiDuplicationGuard::new(&GuardSettings {
            enabled: false,
            ..GuardSettings::default()
        });
        g.record(7);
        assert!(g.is_safe(7));
        assert_eq!(g.find_nearest_safe(7).unwrap(), 7);
    }
}
