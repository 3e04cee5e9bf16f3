// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

mod cli;
pub mod config;
mod extract;
mod filter;
mod handlers;
mod kubernetes;
mod output;
pub mod progress;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufReader};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::prelude::*;

use cli::Args;
use config::Config;
use handlers::{ResourceHandler, Streams};
use kubernetes::{KubeResourceClient, discovery};

/// Initialize logging with file output and optional stderr
fn init_logging(verbose: bool) {
    use tracing_rolling_file::{RollingConditionBase, RollingFileAppenderBase};
    use tracing_subscriber::fmt::format::FmtSpan;

    let log_dir = config::base_dir()
        .map(|p| p.join("log"))
        .unwrap_or_else(|_| std::path::PathBuf::from("."));

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Could not create log directory: {}", e);
        return;
    }

    // Rotate daily or at 10MB, keeping 5 files
    let log_path = log_dir.join("kubectl-find.log");
    let condition = RollingConditionBase::new()
        .daily()
        .max_size(10 * 1024 * 1024);

    let file_appender = match RollingFileAppenderBase::new(log_path, condition, 5) {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!("Warning: Could not create log file: {}", e);
            return;
        }
    };

    let (non_blocking, guard) = file_appender.get_non_blocking_appender();
    // Keep the background writer alive for the whole run
    std::mem::forget(guard);

    let filter = if verbose {
        "kubectl_find=debug"
    } else {
        "kubectl_find=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_span_events(FmtSpan::NONE);

    let stderr_layer = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::NONE)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!(error = ?e, "Run failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    // Flag validation and pattern compilation happen before touching the cluster
    let mut options = args.to_options()?;
    let config = Config::load()?;

    let spinner = progress::create_spinner("Connecting to Kubernetes...");
    let resolved = async {
        let client = KubeResourceClient::connect(args.context.as_deref())
            .await
            .context("unable to create kubernetes client")?;
        spinner.set_message(format!("Resolving resource type {}...", args.resource));
        let kind = discovery::resolve_kind(client.client(), &args.resource)
            .await
            .with_context(|| format!("unable to find resource type {:?}", args.resource))?;
        anyhow::Ok((client, kind))
    }
    .await;
    spinner.finish_and_clear();
    let (client, kind) = resolved?;

    info!(
        resource = %kind.plural(),
        group = %kind.group(),
        namespaced = kind.namespaced,
        action = ?options.action,
        jq = ?options.filters.query.as_ref().map(|q| q.expression()),
        "Resolved resource kind"
    );

    let handler = ResourceHandler::for_kind(kind);
    config.apply(&mut options, handler.kind().is_pod());
    handler.validate(&options)?;

    let mut input = BufReader::new(io::stdin());
    let mut out = io::stdout();
    let mut err = io::stderr();
    let mut streams = Streams {
        input: &mut input,
        out: &mut out,
        err: &mut err,
    };
    handler.handle(&client, &options, &mut streams).await
}
