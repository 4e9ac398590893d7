//! Command-line front end for the mirror: sync, validation, cleanup and
//! scheduled-task management over a shared state directory.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands, ConfigCommand, TaskCommand};
pub use commands::run;
