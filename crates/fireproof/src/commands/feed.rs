//! Feed command handler: runs rounds of a multi-source feed.

use tracing::debug;

use fireproof_core::{Controller, Snapshot};

use crate::cli::{FeedArgs, GlobalOpts};
use crate::error::CliError;
use crate::output::{self, SourcedRow};

pub async fn handle(
    controller: &Controller,
    args: FeedArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let feed = controller.feed(&args.paths, args.order)?;

    for round in 1..=args.rounds {
        let before = feed.len();
        feed.more().await?;
        let added = feed.len() - before;
        debug!(round, added, total = feed.len(), "feed round finished");
        if added == 0 {
            break;
        }
    }

    let items: Vec<Snapshot> = feed.items().iter().map(|s| (**s).clone()).collect();
    let out = output::render_list(
        &global.output,
        &items,
        SourcedRow::from_snapshot,
        |s| s.reference.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
