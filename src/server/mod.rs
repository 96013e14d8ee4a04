//! External server collaborators
//!
//! The engine never speaks DNS itself. Everything it does to the server goes
//! through a `CommandRunner`, which makes the update, control, transfer and
//! checker channels replaceable in tests.

pub mod checkzone;
pub mod command;
pub mod control;

pub use checkzone::ZoneChecker;
pub use command::{CommandOutput, CommandRunner, ProcessRunner};
pub use control::{ServerControl, ServerStatus};
