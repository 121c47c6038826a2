//! Clap derive structures for the `fireproof` CLI.
//!
//! Defines the command tree, global flags, and shared argument types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use fireproof_core::OrderBy;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fireproof -- page, merge and query ordered realtime data
#[derive(Debug, Parser)]
#[command(
    name = "fireproof",
    version,
    about = "Page through and merge ordered realtime data from the command line",
    long_about = "Walks ordered collections with cursor pagination, merges several\n\
        collections into one deduplicated feed, and runs compact query\n\
        descriptors. Data is served from a JSON fixture loaded in memory.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Profile to use
    #[arg(long, short = 'p', env = "FIREPROOF_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (overrides the platform default location)
    #[arg(long, env = "FIREPROOF_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// JSON fixture to load as the database contents
    #[arg(long, short = 'f', env = "FIREPROOF_FIXTURE", global = true)]
    pub fixture: Option<PathBuf>,

    /// Database URL (overrides profile)
    #[arg(long, env = "FIREPROOF_URL", global = true)]
    pub url: Option<String>,

    /// Path every command is relative to (overrides profile)
    #[arg(long, short = 'r', global = true)]
    pub root: Option<String>,

    /// Auth token presented on attach
    #[arg(long, env = "FIREPROOF_TOKEN", global = true, hide_env = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "FIREPROOF_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one key per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Walk the children of a path page by page
    #[command(alias = "pg")]
    Page(PageArgs),

    /// Merge several paths into one deduplicated feed
    Feed(FeedArgs),

    /// Run a query descriptor, e.g. users.orderByChild:"age".limitToFirst:10
    #[command(alias = "q")]
    Query(QueryArgs),

    /// Print the value at a path
    Get(GetArgs),

    /// Manage the configuration file
    #[command(alias = "cfg")]
    Config(ConfigArgs),
}

// ── Data commands ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PageArgs {
    /// Path whose children are paged
    pub path: String,

    /// Ordering: key, priority, value, or child:<path>
    #[arg(long, default_value = "priority", value_parser = parse_order)]
    pub order: OrderBy,

    /// Children per page (overrides profile)
    #[arg(long, short = 'n')]
    pub size: Option<usize>,

    /// Maximum number of pages to walk
    #[arg(long, default_value = "1")]
    pub pages: usize,
}

#[derive(Debug, Args)]
pub struct FeedArgs {
    /// Source paths to merge
    #[arg(required = true, num_args = 1..)]
    pub paths: Vec<String>,

    /// Ordering used within each source: key, priority, value, or child:<path>
    #[arg(long, default_value = "priority", value_parser = parse_order)]
    pub order: OrderBy,

    /// Children fetched per source per round (overrides profile)
    #[arg(long, short = 'n')]
    pub size: Option<usize>,

    /// Number of rounds to run
    #[arg(long, default_value = "1")]
    pub rounds: usize,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Query descriptor, path first
    pub descriptor: String,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Path to read; empty reads the root
    #[arg(default_value = "")]
    pub path: String,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Show the effective configuration (tokens redacted)
    Show,

    /// Write a config file with a single profile
    Init {
        /// Profile name
        #[arg(long, default_value = "default")]
        name: String,

        /// Database URL for the profile
        #[arg(long, default_value = "memory://local")]
        profile_url: String,

        /// Root path for the profile
        #[arg(long, default_value = "")]
        profile_root: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ── Value parsers ────────────────────────────────────────────────────

/// Parse `key`, `priority`, `value` or `child:<path>` into an ordering.
pub fn parse_order(s: &str) -> Result<OrderBy, String> {
    match s {
        "key" => Ok(OrderBy::Key),
        "priority" => Ok(OrderBy::Priority),
        "value" => Ok(OrderBy::Value),
        other => match other.strip_prefix("child:") {
            Some(path) if !path.is_empty() => Ok(OrderBy::Child(path.into())),
            _ => Err(format!(
                "expected key, priority, value or child:<path>, got '{other}'"
            )),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn order_parses_child_paths() {
        assert_eq!(parse_order("key").unwrap(), OrderBy::Key);
        assert_eq!(
            parse_order("child:meta/age").unwrap(),
            OrderBy::Child("meta/age".into())
        );
        assert!(parse_order("child:").is_err());
        assert!(parse_order("size").is_err());
    }

    #[test]
    fn feed_requires_a_path() {
        assert!(Cli::try_parse_from(["fireproof", "feed"]).is_err());
        let cli = Cli::try_parse_from(["fireproof", "feed", "a", "b", "--rounds", "2"]).unwrap();
        match cli.command {
            Command::Feed(args) => {
                assert_eq!(args.paths, vec!["a", "b"]);
                assert_eq!(args.rounds, 2);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
