//! Command execution and the engine entry point.

pub mod command;
pub mod engine;
pub mod options;

pub use command::CommandExecutor;
pub use engine::{ApiOutput, Command, RestEngine};
