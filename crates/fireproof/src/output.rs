//! Output formatting: table, JSON, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one key per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use fireproof_core::Snapshot;

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Section heading shown above a table, e.g. `Page 2`.
pub fn heading(text: &str, color: bool) -> String {
    if color {
        text.bold().cyan().to_string()
    } else {
        text.to_owned()
    }
}

// ── Snapshot rows ────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct SnapshotRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Priority")]
    priority: String,
}

impl SnapshotRow {
    pub fn from_snapshot(s: &Snapshot) -> Self {
        Self {
            key: s.key.clone(),
            value: s.value.to_string(),
            priority: s
                .priority
                .as_ref()
                .map_or_else(|| "-".into(), ToString::to_string),
        }
    }
}

/// Wide row used when items come from several locations.
#[derive(Tabled)]
pub struct SourcedRow {
    #[tabled(rename = "Reference")]
    reference: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Priority")]
    priority: String,
}

impl SourcedRow {
    pub fn from_snapshot(s: &Snapshot) -> Self {
        let row = SnapshotRow::from_snapshot(s);
        Self {
            reference: s.reference.clone(),
            value: row.value,
            priority: row.priority,
        }
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
///
/// - `table`: uses the `Tabled` derive to build a pretty table
/// - `json` / `json-compact`: serializes the original data via serde
/// - `plain`: calls `id_fn` on each item to emit one identifier per line
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    Ok(match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Plain => data.iter().map(&id_fn).collect::<Vec<_>>().join("\n"),
    })
}

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses a custom `detail_fn` that returns a pre-formatted
/// string, since single-item views don't use `Tabled`.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    Ok(match format {
        OutputFormat::Table => detail_fn(data),
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Plain => id_fn(data),
    })
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use fireproof_core::Priority;
    use serde_json::json;

    fn sample() -> Vec<Snapshot> {
        vec![
            Snapshot {
                key: "a".into(),
                value: json!({"n": 1}),
                priority: Some(Priority::from(2)),
                reference: "memory://t/items/a".into(),
            },
            Snapshot {
                key: "b".into(),
                value: json!("two"),
                priority: None,
                reference: "memory://t/items/b".into(),
            },
        ]
    }

    #[test]
    fn plain_lists_one_key_per_line() {
        let out = render_list(
            &OutputFormat::Plain,
            &sample(),
            SnapshotRow::from_snapshot,
            |s| s.key.clone(),
        )
        .unwrap();
        assert_eq!(out, "a\nb");
    }

    #[test]
    fn compact_json_keeps_snapshot_fields() {
        let out = render_list(
            &OutputFormat::JsonCompact,
            &sample()[1..],
            SnapshotRow::from_snapshot,
            |s| s.key.clone(),
        )
        .unwrap();
        insta::assert_snapshot!(out, @r#"[{"key":"b","value":"two","priority":null,"reference":"memory://t/items/b"}]"#);
    }

    #[test]
    fn table_shows_missing_priority_as_dash() {
        let out = render_list(
            &OutputFormat::Table,
            &sample(),
            SourcedRow::from_snapshot,
            |s| s.key.clone(),
        )
        .unwrap();
        assert!(out.contains("memory://t/items/a"));
        assert!(out.contains("{\"n\":1}"));
        assert!(out.lines().any(|line| line.contains("items/b") && line.contains('-')));
    }

    #[test]
    fn heading_is_plain_without_color() {
        assert_eq!(heading("Page 1", false), "Page 1");
        assert_ne!(heading("Page 1", true), "Page 1");
    }
}
