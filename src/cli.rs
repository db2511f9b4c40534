//! CLI domain: parse, route and output only.
//! No stage logic; the route table dispatches to the harness and presentation.

mod output;
mod parse;
mod route;

pub use output::{exit_code_for, map_error};
pub use parse::{Cli, Commands, OutputFormat};
pub use route::{CliContext, CommandOutput};
