//! Deck and session state, and the worker that serializes access to them.

mod deck;
mod handle;
mod pipeline;
mod thread;
mod types;

pub use deck::{DeckState, LoadedTrack, PlayState};
pub use handle::SessionHandle;
pub use pipeline::Session;
pub use types::{LoadOutcome, SessionSnapshot, SnapshotHandle, Suggestion};

#[cfg(test)]
mod tests;
