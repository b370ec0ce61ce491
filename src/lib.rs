//! Keeps a believed model of a remotely controlled DJ mixing application in
//! step with reality over a one-way, laggy control channel.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod guard;
pub mod library;
pub mod logging;
pub mod navigator;
pub mod remote;
pub mod scoring;
pub mod session;

pub use config::Settings;
pub use dispatch::{Command, CommandResult, CommandStatus, Dispatcher};
pub use error::{Error, Result};
pub use guard::AntiDuplicationGuard;
pub use library::{LibraryIndex, LibrarySource, TrackRecord};
pub use navigator::{NavigationPlan, Navigator};
pub use remote::{DeckId, OutboundLink, RemoteCode, RemoteState, StateFeed};
pub use scoring::Scorer;
pub use session::{DeckState, Session, SessionHandle};
