pub mod cli;
pub mod commands;

pub use cli::{Args, Command};
pub use commands::execute_command;
