use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace};

use super::pipeline::Session;
use super::types::{Request, SnapshotHandle};

pub(super) fn spawn_session_thread(
    mut session: Session,
    rx: Receiver<Request>,
    snapshot: SnapshotHandle,
    reconcile_interval: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        loop {
            match rx.recv_timeout(reconcile_interval) {
                Ok(Request::Quit) => break,
                Ok(request) => handle(&mut session, request, &snapshot),
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(d) = session.idle_reconcile() {
                        trace!(believed = d.believed, corrected = d.corrected, "idle reconcile");
                    }
                    publish(&session, &snapshot);
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("session worker stopped");
    })
}

fn handle(session: &mut Session, request: Request, snapshot: &SnapshotHandle) {
    match request {
        Request::Navigate {
            index,
            ticket,
            reply,
        } => {
            let r = session.navigate_to(index, &ticket);
            respond(session, snapshot, reply, r);
        }
        Request::Load {
            deck,
            index,
            ticket,
            reply,
        } => {
            let r = session.load(deck, index, &ticket);
            respond(session, snapshot, reply, r);
        }
        Request::LoadTrack {
            deck,
            path,
            ticket,
            reply,
        } => {
            let r = session.load_track(deck, &path, &ticket);
            respond(session, snapshot, reply, r);
        }
        Request::Execute { command, reply } => {
            let r = session.execute(command);
            respond(session, snapshot, reply, r);
        }
        Request::Resync { reply } => {
            let r = session.resync();
            respond(session, snapshot, reply, r);
        }
        Request::Suggest { deck, query, reply } => {
            let r = session.suggest_next(deck, &query);
            respond(session, snapshot, reply, r);
        }
        Request::History { reply } => {
            let r = session.history();
            respond(session, snapshot, reply, r);
        }
        Request::Quit => {}
    }
}

/// Publish first so a caller sees its own effect in the snapshot.
fn respond<T>(session: &Session, snapshot: &SnapshotHandle, reply: Sender<T>, value: T) {
    publish(session, snapshot);
    // A dropped receiver means the caller stopped waiting; the request still ran.
    let _ = reply.send(value);
}

fn publish(session: &Session, snapshot: &SnapshotHandle) {
    let next = session.snapshot();
    let mut guard = snapshot.lock().unwrap_or_else(|e| e.into_inner());
    *guard = next;
}
