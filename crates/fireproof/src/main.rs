mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fireproof_core::{Backend, Controller};

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.global.verbose);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need a database
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        // All other commands run against an attached controller
        cmd => {
            let controller = open_controller(&cli.global, commands::page_size_override(&cmd)).await?;

            tracing::debug!(command = ?cmd, "dispatching command");
            let result = commands::dispatch(cmd, &controller, &cli.global).await;
            controller.detach().await;
            result
        }
    }
}

/// Load the fixture into an in-memory database and attach a controller to
/// it, using the active profile plus CLI overrides.
async fn open_controller(
    global: &cli::GlobalOpts,
    page_size: Option<usize>,
) -> Result<Controller, CliError> {
    let cfg = config::load(global)?;
    let (profile_name, profile) = config::active_profile(global, &cfg)?;
    let controller_config =
        config::resolve_controller_config(global, &cfg, &profile_name, &profile, page_size)?;
    let url = config::resolve_url(global, &profile)?;

    let fixture = global.fixture.as_deref().ok_or(CliError::NoFixture)?;
    let database = commands::util::load_fixture(fixture, url)?;
    let backend: Arc<dyn Backend> = Arc::new(database);

    let controller = Controller::new(backend, controller_config);
    controller.attach().await.map_err(|err| match CliError::from(err) {
        CliError::AuthFailed { message, .. } => CliError::AuthFailed {
            profile: profile_name.clone(),
            message,
        },
        other => other,
    })?;
    Ok(controller)
}
