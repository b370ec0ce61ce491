//! Downstream contract with the controlled application: opaque codes on an
//! ordered outbound link, and an optional best-effort state feed.

mod link;
mod sim;
mod types;

pub use link::{ChannelLink, LinkError, OutboundLink, StateFeed};
pub use sim::{SimFeed, SimLink, SimulatedRemote};
pub use types::{DeckId, DeckObservation, RemoteCode, RemoteState, StepDirection};
