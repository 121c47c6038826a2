//! Command dispatch: bridges CLI args -> controller and engines -> output formatting.

pub mod config_cmd;
pub mod feed;
pub mod get;
pub mod page;
pub mod query;
pub mod util;

use fireproof_core::Controller;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a database-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    controller: &Controller,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Page(args) => page::handle(controller, args, global).await,
        Command::Feed(args) => feed::handle(controller, args, global).await,
        Command::Query(args) => query::handle(controller, args, global).await,
        Command::Get(args) => get::handle(controller, args, global).await,
        Command::Config(args) => config_cmd::handle(args, global),
    }
}

/// Page size requested on the command line, if the command takes one.
pub fn page_size_override(cmd: &Command) -> Option<usize> {
    match cmd {
        Command::Page(args) => args.size,
        Command::Feed(args) => args.size,
        Command::Query(_) | Command::Get(_) | Command::Config(_) => None,
    }
}
