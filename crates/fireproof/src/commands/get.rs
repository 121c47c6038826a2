//! Get command handler.

use fireproof_core::{Controller, Snapshot};

use crate::cli::{GetArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

fn detail(s: &Snapshot) -> String {
    let value = serde_json::to_string_pretty(&s.value).unwrap_or_else(|_| s.value.to_string());
    [
        format!("Reference: {}", s.reference),
        format!("Key:       {}", if s.key.is_empty() { "-" } else { s.key.as_str() }),
        format!(
            "Priority:  {}",
            s.priority
                .as_ref()
                .map_or_else(|| "-".into(), ToString::to_string)
        ),
        format!("Value:     {value}"),
    ]
    .join("\n")
}

pub async fn handle(
    controller: &Controller,
    args: GetArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let snapshot = controller.get(&args.path).await?;
    if !snapshot.exists() {
        return Err(CliError::NotFound {
            path: args.path.trim_matches('/').to_owned(),
        });
    }

    let out = output::render_single(&global.output, &snapshot, detail, |s| s.value.to_string())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
