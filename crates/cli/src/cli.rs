use std::{
    fmt::Display,
    io::{self, Write},
    path::PathBuf,
    pin::pin,
    process::ExitCode,
};

use clap::Parser;
use color_eyre::eyre::{self, Context as _};
use futures::StreamExt as _;
use toklist_core::{
    config::Config,
    error::DataDirNotFound,
    fetch::{Fetcher, RetryPolicy},
    reconcile::Reconciler,
    rpc::Endpoint,
    schema::SchemaValidator,
    validate::{RunReport, Validator, token_dirs},
};
use tracing::info;

/// Validate token descriptors and reconcile them with on-chain metadata
#[derive(Parser, Debug)]
#[command(name = "toklist", version, about)]
pub struct Cli {
    /// RPC endpoint; overrides TOKLIST_RPC_URL and the config file
    #[arg(long, value_name = "URL")]
    rpc_url: Option<String>,

    /// Directory holding one sub-directory per token
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Only run static checks, never contact an RPC endpoint
    #[arg(long)]
    offline: bool,
}

impl Cli {
    pub async fn run(self, config: Config) -> eyre::Result<ExitCode> {
        let data_dir = self.data_dir.unwrap_or_else(|| config.data_dir.clone());
        let mut stdout = io::stdout();

        let dirs = token_dirs(&data_dir).await?;
        if dirs.is_empty() {
            let report = RunReport {
                data_dir,
                tokens: Vec::new(),
            };
            emit(&mut stdout, &report)?;
            return Ok(report.exit_code());
        }

        let schema =
            SchemaValidator::new(config.expected_chain_id).with_logo_rule(config.require_logo);
        let reconciler = if self.offline || !config.onchain {
            info!("on-chain checks disabled");
            None
        } else {
            let endpoint = Endpoint::connect(
                self.rpc_url.as_deref(),
                config.rpc_url.as_deref(),
                config.network(),
                config.request_timeout,
            )
            .await?;
            info!(url = endpoint.url(), "reconciling against on-chain metadata");
            Some(Reconciler::new(Fetcher::new(
                endpoint,
                RetryPolicy::from(&config.retry),
            )))
        };
        let validator = Validator::new(schema, reconciler).with_concurrency(config.concurrency);

        info!(count = dirs.len(), "validating tokens");
        emit(&mut stdout, RunReport::header(dirs.len()))?;

        // each verdict is printed as soon as it and all earlier ones are known
        let mut tokens = Vec::with_capacity(dirs.len());
        let mut reports = pin!(validator.reports(dirs));
        while let Some(token) = reports.next().await {
            emit(&mut stdout, &token)?;
            tokens.push(token);
        }

        let report = RunReport { data_dir, tokens };
        emit(&mut stdout, report.summary())?;
        info!(
            total = report.tokens.len(),
            invalid = report.invalid_count(),
            "validation finished"
        );

        Ok(report.exit_code())
    }
}

/// Console line for an error that aborted the run.
pub fn failure_message(err: &eyre::Report) -> String {
    if err.downcast_ref::<DataDirNotFound>().is_some() {
        err.to_string()
    } else {
        format!("Unexpected error: {err}")
    }
}

fn emit(out: &mut impl Write, text: impl Display) -> eyre::Result<()> {
    write!(out, "{text}").wrap_err("failed to write report")?;
    out.flush().wrap_err("failed to write report")
}
