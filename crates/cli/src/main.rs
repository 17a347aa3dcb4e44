use std::process::ExitCode;

use clap::Parser as _;
use cli::Cli;
use telemetry::{get_subscriber, init_subscriber};
use tokio::{
    select,
    signal::unix::{SignalKind, signal},
};
use toklist_core::config::Config;
use tracing::{error, info};

mod cli;
mod telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = color_eyre::install() {
        eprintln!("failed to install error hooks: {err}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    init_subscriber(get_subscriber());

    let cli = Cli::parse();
    let command_jh = tokio::spawn(cli.run(config));

    let mut sigterm = signal(SignalKind::terminate())
        .expect("setting sigterm listener on unix should always work");
    let mut sigint = signal(SignalKind::interrupt())
        .expect("setting sigint listener on unix should always work");

    select! {
        res = command_jh => match res {
            Ok(Ok(code)) => code,
            Ok(Err(e)) => {
                error!(error = %e, "validation aborted");
                println!("{}", cli::failure_message(&e));
                ExitCode::FAILURE
            }
            Err(e) => {
                error!(%e, "validation task panicked");
                ExitCode::FAILURE
            }
        },
        _ = sigterm.recv() => {
            info!("received SIGTERM signal");
            ExitCode::FAILURE
        }
        _ = sigint.recv() => {
            info!("received SIGINT signal");
            ExitCode::FAILURE
        }
    }
}
