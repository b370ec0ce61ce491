//! Virtual cursor: a believed position in the remote browser list, moved only
//! by relative steps and resets.

mod plan;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::NavigatorSettings;
use crate::dispatch::{Command, Dispatcher};
use crate::error::{Error, Result};
use crate::guard::AntiDuplicationGuard;
use crate::remote::{RemoteState, StepDirection};

pub use plan::{NavigationPlan, Route};

/// Steps kept for reconciliation when the feed never reports the cursor.
const MAX_PENDING_STEPS: usize = 4096;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CursorState {
    pub believed_index: usize,
    /// Cursor position from the most recent snapshot that reported one.
    pub last_confirmed_index: Option<usize>,
    /// Steps transmitted but not yet reflected in any snapshot.
    pub in_flight_steps: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NavState {
    Idle,
    Moving,
    Cancelled,
}

/// Issues navigation tickets; a newer ticket supersedes every older one.
#[derive(Debug, Clone, Default)]
pub struct NavigationClock {
    latest: Arc<AtomicU64>,
}

impl NavigationClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> NavigationTicket {
        let issued = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        NavigationTicket {
            latest: Arc::clone(&self.latest),
            issued,
        }
    }
}

/// Checked before every step; once superseded the navigation stops.
#[derive(Debug, Clone)]
pub struct NavigationTicket {
    latest: Arc<AtomicU64>,
    issued: u64,
}

impl NavigationTicket {
    /// A ticket nothing can supersede.
    pub fn detached() -> Self {
        NavigationClock::new().issue()
    }

    pub fn is_superseded(&self) -> bool {
        self.latest.load(Ordering::Acquire) != self.issued
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NavigationOutcome {
    pub requested: usize,
    /// Where the navigation aimed after clamping and guard substitution.
    pub target: usize,
    pub plan: NavigationPlan,
    pub reset_sent: bool,
    pub steps_sent: usize,
    pub cancelled: bool,
    pub final_index: usize,
}

impl NavigationOutcome {
    pub fn arrived(&self) -> bool {
        !self.cancelled && self.final_index == self.target
    }
}

/// A mismatch found by [`Navigator::reconcile`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Divergence {
    pub believed: usize,
    pub corrected: usize,
}

pub struct Navigator {
    cursor: CursorState,
    state: NavState,
    reset_cost: usize,
    step_interval: Duration,
    guard: AntiDuplicationGuard,
    list_len: Option<usize>,
    /// Transmit instant and delta of steps not yet seen in a snapshot.
    pending: VecDeque<(Instant, isize)>,
    last_transmit: Option<Instant>,
    reset_at: Option<Instant>,
}

impl Navigator {
    pub fn new(settings: &NavigatorSettings, guard: AntiDuplicationGuard) -> Self {
        Self {
            cursor: CursorState::default(),
            state: NavState::Idle,
            reset_cost: settings.reset_cost,
            step_interval: settings.step_interval(),
            guard,
            list_len: None,
            pending: VecDeque::new(),
            last_transmit: None,
            reset_at: None,
        }
    }

    pub fn with_list_len(mut self, list_len: usize) -> Self {
        self.set_list_len(list_len);
        self
    }

    pub fn set_list_len(&mut self, list_len: usize) {
        self.list_len = Some(list_len);
        self.guard.set_list_len(list_len);
    }

    pub fn cursor(&self) -> &CursorState {
        &self.cursor
    }

    pub fn believed_index(&self) -> usize {
        self.cursor.believed_index
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn guard(&self) -> &AntiDuplicationGuard {
        &self.guard
    }

    pub fn guard_mut(&mut self) -> &mut AntiDuplicationGuard {
        &mut self.guard
    }

    pub fn plan(&self, target: usize) -> NavigationPlan {
        NavigationPlan::compute(self.cursor.believed_index, target, self.reset_cost)
    }

    fn clamp(&self, index: usize) -> usize {
        match self.list_len {
            Some(len) => index.min(len.saturating_sub(1)),
            None => index,
        }
    }

    /// Move the remote cursor to `requested`, one transmitted step per unit of
    /// distance.
    ///
    /// The target is clamped to the list and passed through the guard first.
    /// The believed index follows every transmitted step, so it stays exact
    /// when `ticket` is superseded part way or a transmit fails.
    pub fn navigate_to(
        &mut self,
        dispatcher: &mut Dispatcher,
        requested: usize,
        ticket: &NavigationTicket,
    ) -> Result<NavigationOutcome> {
        let clamped = self.clamp(requested);
        let target = match self.guard.find_nearest_safe(clamped) {
            Ok(t) => t,
            Err(Error::NavigationDeadlock { index, bound }) => {
                warn!(index, bound, "guard found no safe position; using requested target");
                clamped
            }
            Err(e) => return Err(e),
        };

        let plan = self.plan(target);
        debug!(
            requested,
            target,
            from = plan.from,
            route = ?plan.route,
            cost = plan.cost,
            "navigation planned"
        );

        self.state = NavState::Moving;
        let mut outcome = NavigationOutcome {
            requested,
            target,
            plan,
            reset_sent: false,
            steps_sent: 0,
            cancelled: false,
            final_index: self.cursor.believed_index,
        };

        if plan.route == Route::Reset {
            if ticket.is_superseded() {
                return Ok(self.cancel(outcome));
            }
            self.send(dispatcher, Command::CursorReset)?;
            self.apply_reset();
            outcome.reset_sent = true;
        }

        let (direction, count) = plan.steps();
        for _ in 0..count {
            if ticket.is_superseded() {
                return Ok(self.cancel(outcome));
            }
            self.send(dispatcher, Command::Step(direction))?;
            self.apply_step(direction);
            outcome.steps_sent += 1;
        }

        self.state = NavState::Idle;
        outcome.final_index = self.cursor.believed_index;
        Ok(outcome)
    }

    /// Send the cursor to the top of the list and start counting from 0.
    pub fn reset_to_baseline(&mut self, dispatcher: &mut Dispatcher) -> Result<()> {
        self.send(dispatcher, Command::CursorReset)?;
        self.apply_reset();
        self.state = NavState::Idle;
        debug!("cursor reset to baseline");
        Ok(())
    }

    /// Compare the believed cursor with a snapshot that reports one.
    ///
    /// Steps sent before the snapshot was captured count as reflected; later
    /// ones are still in flight. Any mismatch is logged and corrected.
    pub fn reconcile(&mut self, snapshot: &RemoteState) -> Option<Divergence> {
        let observed = snapshot.cursor?;
        if self.reset_at.is_some_and(|at| at > snapshot.observed_at) {
            // Captured before the last reset; says nothing about the current position.
            return None;
        }

        while self
            .pending
            .front()
            .is_some_and(|&(at, _)| at <= snapshot.observed_at)
        {
            self.pending.pop_front();
        }
        let in_flight: isize = self.pending.iter().map(|&(_, d)| d).sum();
        let expected = self.clamp((observed as isize + in_flight).max(0) as usize);

        self.cursor.last_confirmed_index = Some(observed);
        self.cursor.in_flight_steps = self.pending.len();

        if expected == self.cursor.believed_index {
            return None;
        }
        let divergence = Divergence {
            believed: self.cursor.believed_index,
            corrected: expected,
        };
        warn!(
            believed = divergence.believed,
            observed,
            in_flight = self.pending.len(),
            corrected = expected,
            "cursor diverged from remote; correcting"
        );
        self.cursor.believed_index = expected;
        Some(divergence)
    }

    fn cancel(&mut self, mut outcome: NavigationOutcome) -> NavigationOutcome {
        self.state = NavState::Cancelled;
        outcome.cancelled = true;
        outcome.final_index = self.cursor.believed_index;
        debug!(
            target = outcome.target,
            steps_sent = outcome.steps_sent,
            believed = outcome.final_index,
            "navigation superseded"
        );
        outcome
    }

    fn send(&mut self, dispatcher: &mut Dispatcher, command: Command) -> Result<()> {
        if let Some(last) = self.last_transmit {
            let ready = last + self.step_interval;
            let now = Instant::now();
            if ready > now {
                thread::sleep(ready - now);
            }
        }
        let sent = dispatcher.execute(command);
        self.last_transmit = Some(Instant::now());
        if sent.is_err() {
            self.state = NavState::Idle;
        }
        sent.map(|_| ())
    }

    fn apply_step(&mut self, direction: StepDirection) {
        let delta = direction.delta();
        let next = (self.cursor.believed_index as isize + delta).max(0) as usize;
        self.cursor.believed_index = self.clamp(next);
        if self.pending.len() == MAX_PENDING_STEPS {
            self.pending.pop_front();
        }
        self.pending.push_back((Instant::now(), delta));
        self.cursor.in_flight_steps = self.pending.len();
    }

    fn apply_reset(&mut self) {
        self.cursor.believed_index = 0;
        self.cursor.last_confirmed_index = None;
        self.cursor.in_flight_steps = 0;
        self.pending.clear();
        self.reset_at = Some(Instant::now());
    }
}
