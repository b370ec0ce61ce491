use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::DispatcherSettings;
use crate::error::{Error, Result};
use crate::remote::{OutboundLink, RemoteState, StateFeed};

use super::command::{
    Command, CommandId, CommandRecord, CommandResult, CommandStatus, Postcondition,
};
use super::history::CommandHistory;

enum AfterCheck {
    Verified(RemoteState),
    Unmet(String, RemoteState),
    TimedOut,
}

/// Sends commands on the ordered outbound link and verifies their effect
/// against the state feed.
///
/// Owned by exactly one session; `&mut self` on every send keeps the stream
/// ordered.
pub struct Dispatcher {
    link: Box<dyn OutboundLink>,
    feed: Option<Box<dyn StateFeed>>,
    settings: DispatcherSettings,
    history: CommandHistory,
    next_id: u64,
    disconnected: bool,
    last_snapshot: Option<RemoteState>,
}

impl Dispatcher {
    pub fn new(link: Box<dyn OutboundLink>, settings: DispatcherSettings) -> Self {
        let history = CommandHistory::new(settings.history_capacity);
        Self {
            link,
            feed: None,
            settings,
            history,
            next_id: 1,
            disconnected: false,
            last_snapshot: None,
        }
    }

    /// Attach the state feed; without one every command is sent unverified.
    pub fn with_feed(mut self, feed: Box<dyn StateFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn with_history(mut self, history: CommandHistory) -> Self {
        self.history = history;
        self
    }

    pub fn has_feed(&self) -> bool {
        self.feed.is_some()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// Most recent snapshot seen by this dispatcher, fresh or not.
    pub fn last_snapshot(&self) -> Option<&RemoteState> {
        self.last_snapshot.as_ref()
    }

    /// Poll the feed once, outside any command.
    pub fn observe(&mut self) -> Option<RemoteState> {
        let snap = self.feed.as_mut()?.poll_state();
        if let Some(s) = &snap {
            self.last_snapshot = Some(s.clone());
        }
        snap
    }

    /// Re-establish the link after a disconnect.
    pub fn reconnect(&mut self) -> Result<()> {
        self.link.reconnect()?;
        if self.disconnected {
            info!("outbound link reconnected");
        }
        self.disconnected = false;
        Ok(())
    }

    /// Send `command`, then confirm its postcondition with fresh snapshots,
    /// retrying up to `max_retries` times.
    ///
    /// `Err` is reserved for problems that make the result meaningless
    /// (disconnected link, invalid command). Verification failures come back
    /// as `Ok` with `Failed`/`Timeout` status; see [`CommandResult::into_result`].
    pub fn execute(&mut self, command: Command) -> Result<CommandResult> {
        if self.disconnected {
            return Err(Error::ChannelDisconnected);
        }
        command.validate()?;

        let id = CommandId(self.next_id);
        self.next_id += 1;
        self.history.open(CommandRecord::pending(id, &command));
        let started = Instant::now();

        let post = match (command.postcondition(), self.feed.is_some()) {
            (Some(p), true) => p,
            _ => {
                self.transmit(id, &command, started)?;
                let reason = if self.feed.is_none() {
                    "no state feed attached"
                } else {
                    "effect is not observable"
                };
                return Ok(self.finish(
                    id,
                    &command,
                    CommandStatus::SentUnverified,
                    0,
                    started,
                    Some(reason.to_string()),
                    None,
                ));
            }
        };

        let mut attempt: u32 = 0;
        let mut last_failure: (CommandStatus, String) =
            (CommandStatus::Timeout, "no attempt completed".to_string());
        let mut last_seen: Option<RemoteState> = None;

        loop {
            let before = self.poll();
            if let Some(b) = &before {
                if post.already_holds(b) {
                    // On a retry this is the previous attempt's effect showing up late.
                    let (status, reason) = if attempt == 0 {
                        (
                            CommandStatus::AlreadySatisfied,
                            Some(format!("{post} already holds; not sent")),
                        )
                    } else {
                        (CommandStatus::Verified, None)
                    };
                    let observed = b.clone();
                    return Ok(self.finish(
                        id,
                        &command,
                        status,
                        attempt,
                        started,
                        reason,
                        Some(&observed),
                    ));
                }
            }

            let sent_at = self.transmit(id, &command, started)?;
            thread::sleep(self.settings.verification_delay());

            match self.await_after(&post, before.as_ref(), sent_at) {
                AfterCheck::Verified(after) => {
                    return Ok(self.finish(
                        id,
                        &command,
                        CommandStatus::Verified,
                        attempt,
                        started,
                        None,
                        Some(&after),
                    ));
                }
                AfterCheck::Unmet(reason, after) => {
                    last_failure = (CommandStatus::Failed, reason);
                    last_seen = Some(after);
                }
                AfterCheck::TimedOut => {
                    last_failure = (
                        CommandStatus::Timeout,
                        format!(
                            "no fresh snapshot within {:?}",
                            self.settings.verification_timeout()
                        ),
                    );
                }
            }

            if attempt >= self.settings.max_retries {
                break;
            }
            attempt += 1;
            let backoff = self.backoff();
            warn!(
                id = %id,
                kind = ?command.kind(),
                attempt,
                max_retries = self.settings.max_retries,
                reason = %last_failure.1,
                backoff_ms = backoff.as_millis() as u64,
                "command not verified, retrying"
            );
            thread::sleep(backoff);
        }

        let (status, reason) = last_failure;
        warn!(id = %id, kind = ?command.kind(), ?status, reason = %reason, "command gave up");
        Ok(self.finish(
            id,
            &command,
            status,
            attempt,
            started,
            Some(reason),
            last_seen.as_ref(),
        ))
    }

    fn poll(&mut self) -> Option<RemoteState> {
        self.observe()
    }

    fn transmit(&mut self, id: CommandId, command: &Command, started: Instant) -> Result<Instant> {
        let code = command.code();
        match self.link.send(code) {
            Ok(()) => {
                debug!(id = %id, ?code, "sent");
                Ok(Instant::now())
            }
            Err(e) => {
                let err = Error::from(e);
                if matches!(err, Error::ChannelDisconnected) {
                    self.disconnected = true;
                    error!(id = %id, ?code, "outbound link disconnected");
                }
                let reason = err.to_string();
                let elapsed = started.elapsed();
                self.history.close(id, |r| {
                    r.verification = super::command::Verification::Failed;
                    r.reason = Some(reason);
                    r.elapsed_ms = elapsed.as_millis() as u64;
                });
                Err(err)
            }
        }
    }

    /// Poll until a snapshot captured after `sent_at` arrives, or the timeout passes.
    fn await_after(
        &mut self,
        post: &Postcondition,
        before: Option<&RemoteState>,
        sent_at: Instant,
    ) -> AfterCheck {
        let deadline = sent_at + self.settings.verification_timeout();
        loop {
            if let Some(after) = self.poll() {
                if after.observed_at >= sent_at {
                    return match post.verify(before, &after) {
                        Ok(()) => AfterCheck::Verified(after),
                        Err(reason) => AfterCheck::Unmet(reason, after),
                    };
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return AfterCheck::TimedOut;
            }
            let wait = self.settings.poll_interval().min(deadline - now);
            thread::sleep(wait.max(Duration::from_millis(1)));
        }
    }

    fn backoff(&self) -> Duration {
        let lo = self.settings.backoff_min_ms;
        let hi = self.settings.backoff_max_ms.max(lo);
        Duration::from_millis(rand::random_range(lo..=hi))
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &mut self,
        id: CommandId,
        command: &Command,
        status: CommandStatus,
        retry_count: u32,
        started: Instant,
        reason: Option<String>,
        observed: Option<&RemoteState>,
    ) -> CommandResult {
        let elapsed = started.elapsed();
        let record_reason = reason.clone();
        self.history.close(id, |r| {
            r.verification = status.into();
            r.retry_count = retry_count;
            r.reason = record_reason;
            r.elapsed_ms = elapsed.as_millis() as u64;
        });

        if status == CommandStatus::Verified {
            info!(id = %id, kind = ?command.kind(), deck = ?command.deck(), retry_count, "command verified");
        }

        CommandResult {
            id,
            kind: command.kind(),
            deck: command.deck(),
            status,
            verified: status == CommandStatus::Verified,
            elapsed,
            retry_count,
            reason,
            observed: command
                .deck()
                .and_then(|d| observed.and_then(|s| s.deck(d)).cloned()),
        }
    }
}
