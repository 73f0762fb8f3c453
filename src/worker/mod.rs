//! Task execution on this node.
//!
//! - **Dispatch**: [`CommandDispatcher`] resolves a request into an
//!   [`AssembledCommand`]: strategy, command text, per-task log file and deadline
//! - **Execution**: [`Executor`] runs it with the matching strategy
//!
//! # Strategies
//!
//! - [`Strategy::Shell`]: `sh -c <command>` in its own process group, stdout
//!   teed into the log file
//! - [`Strategy::Fetch`]: HTTP GET of the command as a URL, body teed into the
//!   log file
//!
//! # Status codes
//!
//! A program's own exit code is reported as-is. [`STATUS_ERROR`] marks
//! commands that never ran, [`STATUS_TIMEOUT`] marks commands killed at their
//! deadline.

pub mod dispatcher;
pub mod executor;
pub mod fetch;
pub mod outcome;
pub mod shell;
pub mod strategy;

pub use dispatcher::{AssembledCommand, CommandDispatcher, LogLayout};
pub use executor::{Executor, CANCELLED};
pub use outcome::{ExecutionOutcome, STATUS_ERROR, STATUS_TIMEOUT};
pub use strategy::Strategy;
