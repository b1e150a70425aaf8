//! Command line interface for Quarry.

pub mod args;
pub mod commands;
pub mod output;

pub use args::{Command, OutputFormat, QuarryArgs};
pub use commands::execute_command;
