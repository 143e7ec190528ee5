mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::sync::Arc;

use clap::Parser;
use secrecy::ExposeSecret;
use tracing_subscriber::EnvFilter;

use halink_core::{Controller, MemoryCredentialStore};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

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
        // Config commands don't need a session
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "halink", &mut std::io::stdout());
            Ok(())
        }

        // Login builds its own keyring-backed controller
        Command::Login(args) => commands::login::handle(&args, &cli.global).await,

        cmd => {
            let controller = connect(&cli.global).await?;

            tracing::debug!(command = ?cmd, "dispatching command");
            let result = commands::dispatch(cmd, &controller, &cli.global).await;
            controller.force_disconnect();
            result
        }
    }
}

/// Resolve the active profile and open an authenticated, synced session.
async fn connect(global: &GlobalOpts) -> Result<Controller, CliError> {
    let (conn, credentials) = config::resolve_connection(global)?;
    let controller = Controller::new(conn, Arc::new(MemoryCredentialStore::new()));
    controller
        .init_connection(credentials.url.as_str(), credentials.token.expose_secret())
        .await?;
    Ok(controller)
}
