//! Peer Review - task router and reviewing workers
//!
//! One binary, three roles: `serve` runs the router, `work` runs a worker
//! that writes and reviews, `monitor` prints the router's event stream.

mod cli;
mod config;
mod error;
mod logging;
mod monitor;
mod protocol;
mod router;
mod types;
mod version;
mod worker;

use std::future::Future;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::cli::{Cli, Commands, ConfigSubcommand, Endpoint};
use crate::config::PeerReviewConfig;
use crate::error::{Error, Result};
use crate::router::RouterServer;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            return handle_config_command(subcommand.clone());
        }
        _ => {}
    }

    let mut config = match load_config(&cli.command) {
        Ok(cfg) => cfg,
        Err(e) => exit_with(&e),
    };
    apply_cli_overrides(&mut config, &cli.command);
    if let Err(e) = config.validate() {
        exit_with(&e);
    }

    let _log_guards = match logging::init_logging(&config.logging, cli.verbose, cli.quiet) {
        Ok(guards) => guards,
        Err(e) => exit_with(&e),
    };

    let build = version::BuildInfo::current();
    info!(version = %build.short_version(), profile = %build.profile, "Starting peer-review");

    let outcome = match cli.command {
        Commands::Serve { .. } => block_on_with_shutdown(|shutdown| serve(config, shutdown)),
        Commands::Work { .. } => block_on_with_shutdown(|shutdown| async move {
            let stats = worker::run_worker(&config.worker, config.router.group_size, shutdown).await?;
            info!(
                accepted = stats.accepted,
                rejected = stats.rejected,
                reviews_given = stats.reviews_given,
                "Worker finished"
            );
            Ok(())
        }),
        Commands::Monitor { .. } => block_on_with_shutdown(|shutdown| async move {
            monitor::run_monitor(&config.worker, shutdown).await.map(|_| ())
        }),
        Commands::Version | Commands::Config { .. } => unreachable!(),
    };

    if let Err(e) = outcome {
        finish_with(&e);
    }
    Ok(())
}

/// End a run that stopped on `e`: fatal errors get the full terminal
/// message and hint, anything else is already a runtime event and is logged.
fn finish_with(e: &Error) -> ! {
    if e.is_fatal() {
        exit_with(e);
    }
    if e.is_connection_fault() {
        warn!(code = %e.code().as_str(), error = %e, "Connection to the router lost");
    } else {
        error!(code = %e.code().as_str(), error = %e, "Stopped");
    }
    std::process::exit(e.exit_code());
}

/// Print a coded error to stderr and exit with its exit code
fn exit_with(e: &Error) -> ! {
    eprint!("{}", e.format_for_terminal());
    std::process::exit(e.exit_code());
}

fn endpoint(command: &Commands) -> Option<&Endpoint> {
    match command {
        Commands::Serve { endpoint, .. }
        | Commands::Work { endpoint, .. }
        | Commands::Monitor { endpoint } => Some(endpoint),
        _ => None,
    }
}

fn load_config(command: &Commands) -> Result<PeerReviewConfig> {
    let path = endpoint(command).and_then(|e| e.config.as_deref());
    PeerReviewConfig::load(path)
}

/// CLI flags win over every other configuration source
fn apply_cli_overrides(config: &mut PeerReviewConfig, command: &Commands) {
    match command {
        Commands::Serve { endpoint, group_size } => {
            if let Some(host) = &endpoint.host {
                config.router.host = host.clone();
            }
            if let Some(port) = endpoint.port {
                config.router.port = port;
            }
            if let Some(n) = group_size {
                config.router.group_size = *n;
            }
        }
        Commands::Work {
            endpoint,
            id,
            seed,
            group_size,
        } => {
            apply_client_endpoint(config, endpoint);
            if id.is_some() {
                config.worker.reconnect_id = *id;
            }
            if seed.is_some() {
                config.worker.seed = *seed;
            }
            if let Some(n) = group_size {
                config.router.group_size = *n;
            }
        }
        Commands::Monitor { endpoint } => apply_client_endpoint(config, endpoint),
        Commands::Version | Commands::Config { .. } => {}
    }
}

fn apply_client_endpoint(config: &mut PeerReviewConfig, endpoint: &Endpoint) {
    if let Some(host) = &endpoint.host {
        config.worker.host = host.clone();
    }
    if let Some(port) = endpoint.port {
        config.worker.port = port;
    }
}

/// Build the runtime, run `task`, and flip the shutdown flag on Ctrl+C
fn block_on_with_shutdown<F, Fut>(task: F) -> Result<()>
where
    F: FnOnce(watch::Receiver<bool>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(num_cpus::get().clamp(1, 8))
        .thread_name("peer-review")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(async move {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown signal received");
                    let _ = shutdown_tx.send(true);
                }
                Err(e) => warn!(error = %e, "Cannot listen for Ctrl+C"),
            }
            // A dropped sender reads as shutdown to every loop
            std::future::pending::<()>().await;
        });
        task(shutdown_rx).await
    })
}

async fn serve(config: PeerReviewConfig, shutdown: watch::Receiver<bool>) -> Result<()> {
    let server = RouterServer::bind(config.router.clone()).await?;
    server.run(shutdown).await
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = PeerReviewConfig::load(config.as_deref()).unwrap_or_else(|e| exit_with(&e));
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force).unwrap_or_else(|e| exit_with(&e));
            println!("Configuration written to {}", written.display());
        }
        ConfigSubcommand::Validate { config } => match PeerReviewConfig::load(config.as_deref()) {
            Ok(_) => println!("Configuration is valid."),
            Err(e) => exit_with(&e),
        },
    }

    Ok(())
}
