//! Command dispatch and verification over a one-way link.

mod command;
mod dispatcher;
mod history;

pub use command::{
    Command, CommandId, CommandKind, CommandRecord, CommandResult, CommandStatus, Postcondition,
    Verification,
};
pub use dispatcher::Dispatcher;
pub use history::CommandHistory;
