use std::sync::Arc;

use decksync::config::Settings;
use decksync::dispatch::{CommandHistory, Dispatcher};
use decksync::library::{CompatibilityQuery, LibraryIndex};
use decksync::remote::{DeckId, SimulatedRemote};
use decksync::session::{LoadOutcome, Session, SessionHandle};

/// Drive a session against the in-memory mixer: load `start` on deck A, play
/// it, then load the best suggestion on deck B.
pub fn run(
    index: Arc<LibraryIndex>,
    settings: &Settings,
    start: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let remote = SimulatedRemote::with_titles(index.iter().map(|t| t.title.clone()).collect());
    let mut dispatcher = Dispatcher::new(Box::new(remote.link()), settings.dispatcher.clone())
        .with_feed(Box::new(remote.feed()));
    if let Some(path) = &settings.dispatcher.history_path {
        dispatcher = dispatcher.with_history(CommandHistory::with_file(
            settings.dispatcher.history_capacity,
            path,
        )?);
    }

    let session = Session::new(index, dispatcher, settings);
    let handle = SessionHandle::spawn(session, settings.navigator.reconcile_interval());

    println!();
    let first = handle.load(DeckId::A, start)?;
    report(DeckId::A, &first);
    let play = handle.play(DeckId::A)?;
    println!("deck A play: {:?}", play.status);

    let query = CompatibilityQuery {
        tempo_tolerance: Some(settings.scoring.tempo_tolerance),
        key_strictness: settings.scoring.key_strictness,
        limit: Some(1),
    };
    match handle.suggest_next(DeckId::A, query)?.into_iter().next() {
        Some(next) => {
            let second = handle.load(DeckId::B, next.track.position)?;
            report(DeckId::B, &second);
        }
        None => println!("deck B: nothing compatible to load"),
    }

    println!("{}", serde_json::to_string_pretty(&handle.snapshot())?);
    handle.shutdown();
    Ok(())
}

fn report(deck: DeckId, out: &LoadOutcome) {
    let nav = &out.navigation;
    let title = out
        .track
        .as_ref()
        .map(|t| t.display())
        .unwrap_or_else(|| "-".to_string());
    let status = out
        .result
        .as_ref()
        .map(|r| format!("{:?}", r.status))
        .unwrap_or_else(|| "cancelled".to_string());
    println!(
        "deck {deck}: {title} (requested #{}, landed #{}, {:?} cost {}) {status}",
        nav.requested, nav.final_index, nav.plan.route, nav.plan.cost
    );
}
