use serde::Serialize;

use crate::remote::StepDirection;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Route {
    /// Already there.
    Stay,
    Down,
    Up,
    /// Cursor reset to 0, then down to the target.
    Reset,
}

/// The cheapest way from the believed cursor position to a target.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationPlan {
    pub route: Route,
    pub from: usize,
    pub target: usize,
    /// Step-equivalents of the route, counting a reset as `reset_cost`.
    pub cost: usize,
}

impl NavigationPlan {
    /// Compare DOWN, UP and RESET and keep the cheapest.
    ///
    /// Ties go to DOWN, then UP, then RESET, so the same inputs always yield
    /// the same plan.
    pub fn compute(believed: usize, target: usize, reset_cost: usize) -> Self {
        if believed == target {
            return Self {
                route: Route::Stay,
                from: believed,
                target,
                cost: 0,
            };
        }

        let down = (target > believed).then(|| target - believed);
        let up = (believed > target).then(|| believed - target);
        let reset = reset_cost.saturating_add(target);

        let mut best = (Route::Reset, reset);
        // Visit in reverse tie-break order; `<=` lets earlier routes win ties.
        for (route, cost) in [(Route::Up, up), (Route::Down, down)] {
            if let Some(cost) = cost {
                if cost <= best.1 {
                    best = (route, cost);
                }
            }
        }

        Self {
            route: best.0,
            from: believed,
            target,
            cost: best.1,
        }
    }

    /// Relative steps to emit, after the reset when the route has one.
    pub fn steps(&self) -> (StepDirection, usize) {
        match self.route {
            Route::Stay => (StepDirection::Down, 0),
            Route::Down => (StepDirection::Down, self.target - self.from),
            Route::Up => (StepDirection::Up, self.from - self.target),
            Route::Reset => (StepDirection::Down, self.target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_wins_for_long_climbs() {
        let p = NavigationPlan::compute(50, 10, 5);
        assert_eq!(p.route, Route::Reset);
        assert_eq!(p.cost, 15);
        assert_eq!(p.steps(), (StepDirection::Down, 10));
    }

    #[test]
    fn cost_is_the_minimum_of_all_routes() {
        for reset_cost in [0usize, 1, 5, 20] {
            for believed in 0..40usize {
                for target in 0..40usize {
                    let p = NavigationPlan::compute(believed, target, reset_cost);
                    let direct = believed.abs_diff(target);
                    let expected = if direct == 0 {
                        0
                    } else {
                        direct.min(reset_cost + target)
                    };
                    assert_eq!(p.cost, expected, "b={believed} t={target} r={reset_cost}");
                }
            }
        }
    }

    #[test]
    fn ties_prefer_down_then_up_then_reset() {
        // UP 10 vs RESET 5 + 5.
        let p = NavigationPlan::compute(15, 5, 5);
        assert_eq!((p.route, p.cost), (Route::Up, 10));

        // DOWN 3 vs RESET 0 + 3.
        let p = NavigationPlan::compute(0, 3, 0);
        assert_eq!((p.route, p.cost), (Route::Down, 3));
    }

    #[test]
    fn same_position_stays() {
        let p = NavigationPlan::compute(7, 7, 0);
        assert_eq!(p.route, Route::Stay);
        assert_eq!(p.steps().1, 0);
    }
}
