//! Page command handler: walks a `Paginator` forward and prints each page.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use fireproof_core::{Controller, Snapshot};

use crate::cli::{GlobalOpts, OutputFormat, PageArgs};
use crate::error::CliError;
use crate::output::{self, SnapshotRow};

#[derive(Serialize)]
struct PageOut {
    page: usize,
    items: Arc<Vec<Snapshot>>,
}

pub async fn handle(
    controller: &Controller,
    args: PageArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let pager = controller.paginate(&args.path, args.order).await?;

    let mut pages = Vec::new();
    if pager.page_number() > 0 {
        pages.push(PageOut {
            page: pager.page_number(),
            items: pager.current_page(),
        });
    }
    while pages.len() < args.pages && pager.has_next() {
        let before = pager.page_number();
        pager.next().await?;
        if pager.page_number() == before {
            break;
        }
        pages.push(PageOut {
            page: pager.page_number(),
            items: pager.current_page(),
        });
    }
    debug!(pages = pages.len(), more = pager.has_next(), "paging finished");

    let out = render(&global.output, &pages, output::should_color(&global.color))?;
    output::print_output(&out, global.quiet);
    if pager.has_next() && !global.quiet && matches!(global.output, OutputFormat::Table) {
        eprintln!("More pages available; raise --pages to see them.");
    }
    Ok(())
}

fn render(format: &OutputFormat, pages: &[PageOut], color: bool) -> Result<String, CliError> {
    Ok(match format {
        OutputFormat::Table => {
            let mut blocks = Vec::with_capacity(pages.len());
            for page in pages {
                let table = output::render_list(
                    format,
                    page.items.as_slice(),
                    SnapshotRow::from_snapshot,
                    |s| s.key.clone(),
                )?;
                blocks.push(format!(
                    "{}\n{table}",
                    output::heading(&format!("Page {}", page.page), color)
                ));
            }
            blocks.join("\n\n")
        }
        OutputFormat::Json => serde_json::to_string_pretty(pages)?,
        OutputFormat::JsonCompact => serde_json::to_string(pages)?,
        OutputFormat::Plain => pages
            .iter()
            .flat_map(|page| page.items.iter().map(|s| s.key.clone()))
            .collect::<Vec<_>>()
            .join("\n"),
    })
}
