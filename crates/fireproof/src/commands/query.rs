//! Query command handler: decodes and runs a query descriptor.

use fireproof_core::Controller;

use crate::cli::{GlobalOpts, QueryArgs};
use crate::error::CliError;
use crate::output::{self, SnapshotRow};

pub async fn handle(
    controller: &Controller,
    args: QueryArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let rows = controller.query(&args.descriptor).await?;
    let out = output::render_list(
        &global.output,
        &rows,
        SnapshotRow::from_snapshot,
        |s| s.key.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
