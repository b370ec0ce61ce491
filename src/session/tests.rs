use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::*;
use crate::config::{DispatcherSettings, Settings};
use crate::dispatch::{Command, CommandStatus, Dispatcher};
use crate::error::Error;
use crate::library::{CompatibilityQuery, LibraryIndex, LibrarySource};
use crate::navigator::NavigationTicket;
use crate::remote::{DeckId, RemoteCode, SimulatedRemote, StepDirection};

const LEN: usize = 30;

fn library() -> Arc<LibraryIndex> {
    let tracks: Vec<String> = (0..LEN)
        .map(|i| {
            let key = format!("{}A", i % 12 + 1);
            format!(
                r#"{{"path": "/crate/{i:02}.flac", "title": "Track {i}", "bpm": {}, "key": "{key}"}}"#,
                120 + i
            )
        })
        .collect();
    let text = format!("[{}]", tracks.join(","));
    let index = LibraryIndex::build(
        &LibrarySource::ExportText {
            name: "crate".into(),
            text,
        },
        &Default::default(),
    )
    .unwrap();
    Arc::new(index)
}

fn settings() -> Settings {
    let mut s = Settings::default();
    s.dispatcher = DispatcherSettings {
        verification_delay_ms: 1,
        verification_timeout_ms: 40,
        poll_interval_ms: 5,
        backoff_min_ms: 1,
        backoff_max_ms: 2,
        ..DispatcherSettings::default()
    };
    s.navigator.step_interval_ms = 0;
    s.navigator.reconcile_interval_ms = 10;
    s
}

fn remote_for(index: &LibraryIndex) -> SimulatedRemote {
    SimulatedRemote::with_titles(index.iter().map(|t| t.title.clone()).collect())
}

fn session(remote: &SimulatedRemote, index: Arc<LibraryIndex>, settings: &Settings) -> Session {
    let dispatcher = Dispatcher::new(Box::new(remote.link()), settings.dispatcher.clone())
        .with_feed(Box::new(remote.feed()));
    Session::new(index, dispatcher, settings)
}

fn fixture() -> (SimulatedRemote, Session) {
    let index = library();
    let remote = remote_for(&index);
    let s = session(&remote, index, &settings());
    (remote, s)
}

fn detached() -> NavigationTicket {
    NavigationTicket::detached()
}

#[test]
fn verified_load_updates_deck_and_guard() {
    let (remote, mut s) = fixture();
    let out = s.load(DeckId::A, 5, &detached()).unwrap();

    assert!(out.verified());
    assert_eq!(out.track.as_ref().unwrap().title, "Track 5");
    assert_eq!(remote.cursor(), 5);

    let a = s.deck(DeckId::A).unwrap();
    let loaded = a.loaded.as_ref().unwrap();
    assert_eq!(loaded.path, Path::new("/crate/05.flac"));
    assert_eq!(loaded.position, 5);
    assert!(a.loaded_at.is_some());
    assert_eq!(a.play_state, PlayState::Stopped);
    assert_eq!(a.last_command, out.result.as_ref().map(|r| r.id));
    assert_eq!(s.navigator().guard().history().collect::<Vec<_>>(), vec![5]);
}

#[test]
fn recent_load_neighbourhood_is_skipped() {
    let (remote, mut s) = fixture();
    s.load(DeckId::A, 10, &detached()).unwrap();
    let out = s.load(DeckId::B, 11, &detached()).unwrap();

    assert_eq!(out.navigation.requested, 11);
    assert_eq!(out.navigation.target, 14);
    assert_eq!(remote.deck(DeckId::B).track.as_deref(), Some("Track 14"));
    assert_eq!(
        s.deck(DeckId::B).unwrap().loaded.as_ref().unwrap().position,
        14
    );
}

#[test]
fn failed_load_keeps_last_verified_deck_state() {
    let (remote, mut s) = fixture();
    s.load(DeckId::A, 3, &detached()).unwrap();
    let before = s.deck(DeckId::A).unwrap().clone();

    remote.set_stuck(DeckId::A, true);
    let out = s.load(DeckId::A, 20, &detached()).unwrap();
    let result = out.result.unwrap();
    assert_eq!(result.status, CommandStatus::Failed);
    assert_eq!(result.retry_count, 2);

    let after = s.deck(DeckId::A).unwrap();
    assert_eq!(after.loaded, before.loaded);
    assert_eq!(after.loaded_at, before.loaded_at);
    assert_eq!(after.last_command, Some(result.id));
    // Unconfirmed positions are not remembered by the guard.
    assert_eq!(s.navigator().guard().history().collect::<Vec<_>>(), vec![3]);
}

#[test]
fn direct_load_command_is_remembered_by_guard() {
    let (remote, mut s) = fixture();
    s.navigate_to(12, &detached()).unwrap();
    let r = s.execute(Command::load(DeckId::A)).unwrap();
    assert_eq!(r.status, CommandStatus::Verified);
    assert_eq!(remote.deck(DeckId::A).track.as_deref(), Some("Track 12"));

    let guard = s.navigator().guard();
    assert_eq!(guard.history().collect::<Vec<_>>(), vec![12]);
    assert!(!guard.is_safe(12));

    let out = s.load(DeckId::B, 12, &detached()).unwrap();
    assert_ne!(out.navigation.final_index, 12);
}

#[test]
fn play_and_stop_track_play_state() {
    let (_remote, mut s) = fixture();
    s.load(DeckId::C, 2, &detached()).unwrap();

    assert!(s.play(DeckId::C).unwrap().verified);
    assert_eq!(s.deck(DeckId::C).unwrap().play_state, PlayState::Playing);

    let again = s.play(DeckId::C).unwrap();
    assert_eq!(again.status, CommandStatus::AlreadySatisfied);
    assert_eq!(s.deck(DeckId::C).unwrap().play_state, PlayState::Playing);

    assert!(s.stop(DeckId::C).unwrap().verified);
    // The playhead moved, so the deck is paused rather than stopped.
    assert_eq!(s.deck(DeckId::C).unwrap().play_state, PlayState::Paused);

    let level = s.set_level(DeckId::C, 0.8).unwrap();
    assert_eq!(level.status, CommandStatus::SentUnverified);
}

#[test]
fn without_feed_loads_are_unverified_and_deck_stays_empty() {
    let index = library();
    let remote = remote_for(&index);
    let settings = settings();
    let dispatcher = Dispatcher::new(Box::new(remote.link()), settings.dispatcher.clone());
    let mut s = Session::new(index, dispatcher, &settings);

    let out = s.load(DeckId::D, 7, &detached()).unwrap();
    let result = out.result.unwrap();
    assert_eq!(result.status, CommandStatus::SentUnverified);
    assert!(s.deck(DeckId::D).unwrap().loaded.is_none());
    assert_eq!(s.deck(DeckId::D).unwrap().last_command, Some(result.id));
    assert!(remote.deck(DeckId::D).loaded);
    assert_eq!(s.navigator().guard().history().collect::<Vec<_>>(), vec![7]);
}

#[test]
fn cursor_commands_are_rejected_outside_navigation() {
    let (remote, mut s) = fixture();
    assert!(matches!(
        s.execute(Command::Step(StepDirection::Down)),
        Err(Error::InvalidCommand(_))
    ));
    assert!(matches!(
        s.execute(Command::CursorReset),
        Err(Error::InvalidCommand(_))
    ));
    assert!(remote.sent().is_empty());
}

#[test]
fn unknown_path_is_reported() {
    let (_remote, mut s) = fixture();
    let err = s
        .load_track(DeckId::A, Path::new("/crate/none.flac"), &detached())
        .unwrap_err();
    assert!(matches!(err, Error::TrackNotFound(_)));

    let out = s
        .load_track(DeckId::A, Path::new("/crate/12.flac"), &detached())
        .unwrap();
    assert!(out.verified());
}

#[test]
fn disconnect_marks_stale_until_resync() {
    let (remote, mut s) = fixture();
    s.load(DeckId::A, 4, &detached()).unwrap();
    s.play(DeckId::A).unwrap();

    remote.disconnect(true);
    assert!(matches!(
        s.navigate_to(9, &detached()),
        Err(Error::ChannelDisconnected)
    ));
    assert!(s.is_stale());
    assert!(matches!(s.play(DeckId::B), Err(Error::SessionStale)));
    assert!(matches!(
        s.load(DeckId::B, 1, &detached()),
        Err(Error::SessionStale)
    ));

    s.resync().unwrap();
    assert!(!s.is_stale());
    assert_eq!(s.cursor().believed_index, 0);
    assert_eq!(remote.cursor(), 0);
    assert_eq!(remote.sent().last(), Some(&RemoteCode::CursorReset));

    let a = s.deck(DeckId::A).unwrap();
    assert_eq!(a.play_state, PlayState::Playing);
    assert_eq!(a.loaded.as_ref().unwrap().title, "Track 4");

    assert!(s.load(DeckId::B, 20, &detached()).unwrap().verified());
}

#[test]
fn resync_adopts_decks_changed_behind_our_back() {
    let (remote, mut s) = fixture();
    remote.disconnect(true);
    assert!(s.navigate_to(1, &detached()).is_err());

    // Someone loaded a track by hand while the link was down.
    remote.set_cursor(8);
    let mut link = remote.link();
    crate::remote::OutboundLink::reconnect(&mut link).unwrap();
    crate::remote::OutboundLink::send(&mut link, RemoteCode::Load(DeckId::B)).unwrap();

    s.resync().unwrap();
    let b = s.deck(DeckId::B).unwrap();
    assert_eq!(b.loaded.as_ref().unwrap().path, Path::new("/crate/08.flac"));
}

#[test]
fn resync_fails_while_link_stays_down() {
    let (remote, mut s) = fixture();
    remote.disconnect(false);
    assert!(s.navigate_to(3, &detached()).is_err());
    assert!(matches!(s.resync(), Err(Error::ChannelDisconnected)));
    assert!(s.is_stale());
}

#[test]
fn suggestions_follow_the_loaded_track() {
    let (_remote, mut s) = fixture();
    let query = CompatibilityQuery {
        tempo_tolerance: Some(3.0),
        ..CompatibilityQuery::default()
    };
    assert!(matches!(
        s.suggest_next(DeckId::A, &query),
        Err(Error::DeckEmpty(DeckId::A))
    ));

    s.load(DeckId::A, 10, &detached()).unwrap();
    let picks = s.suggest_next(DeckId::A, &query).unwrap();
    assert!(!picks.is_empty());
    assert!(picks.iter().all(|p| p.track.position != 10));
    assert!(picks.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(
        picks
            .iter()
            .all(|p| (p.track.tempo.unwrap() - 130.0).abs() <= 3.0)
    );
}

#[test]
fn snapshot_reports_cursor_and_decks() {
    let (_remote, mut s) = fixture();
    s.load(DeckId::A, 6, &detached()).unwrap();
    let snap = s.snapshot();
    assert_eq!(snap.cursor.believed_index, 6);
    assert_eq!(snap.decks.len(), 4);
    assert!(!snap.stale);
    assert!(snap.history_len >= 7);
    assert_eq!(s.history().len(), snap.history_len);
}

#[test]
fn handle_serializes_requests_and_publishes_snapshots() {
    let index = library();
    let remote = remote_for(&index);
    let handle = SessionHandle::spawn(session(&remote, index, &settings()), Duration::from_millis(10));

    let out = handle.load(DeckId::A, 9).unwrap();
    assert!(out.verified());
    assert!(handle.play(DeckId::A).unwrap().verified);

    let snap = handle.snapshot();
    assert_eq!(snap.cursor.believed_index, 9);
    let a = snap.decks.iter().find(|d| d.deck == DeckId::A).unwrap();
    assert_eq!(a.play_state, PlayState::Playing);

    assert_eq!(handle.index().len(), LEN);
    assert!(!handle.history().unwrap().is_empty());

    let other = handle.clone();
    handle.shutdown();
    assert!(matches!(other.play(DeckId::B), Err(Error::SessionClosed)));
}

#[test]
fn idle_worker_corrects_cursor_drift() {
    let index = library();
    let remote = remote_for(&index);
    let handle = SessionHandle::spawn(session(&remote, index, &settings()), Duration::from_millis(5));

    remote.drop_next_steps(3);
    handle.navigate_to(12).unwrap();
    assert_eq!(remote.cursor(), 9);

    thread::sleep(Duration::from_millis(100));
    let snap = handle.snapshot();
    assert_eq!(snap.cursor.believed_index, 9);
    assert_eq!(snap.cursor.last_confirmed_index, Some(9));
    handle.shutdown();
}

#[test]
fn newer_navigation_supersedes_one_in_progress() {
    let index = library();
    let remote = remote_for(&index);
    let mut settings = settings();
    settings.navigator.step_interval_ms = 20;
    let handle = SessionHandle::spawn(session(&remote, index, &settings), Duration::from_millis(50));

    let first = {
        let h = handle.clone();
        thread::spawn(move || h.navigate_to(29))
    };
    thread::sleep(Duration::from_millis(100));
    let second = handle.navigate_to(2).unwrap();
    let first = first.join().unwrap().unwrap();

    assert!(first.cancelled);
    assert!(first.steps_sent > 0 && first.steps_sent < 29);
    assert_eq!(first.final_index, first.steps_sent);
    assert!(second.arrived());
    assert_eq!(remote.cursor(), 2);
    assert_eq!(handle.snapshot().cursor.believed_index, 2);
    handle.shutdown();
}
