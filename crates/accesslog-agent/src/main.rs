// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod cli;
mod fs_store;

use anyhow::{anyhow, Context};
use clap::Parser;
use cli::{Cli, Command};
use fs_store::FsLogStore;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use accesslog_ingest::{
    BackfillWindow, HttpEventSink, HttpEventSinkConfig, IngestConfig, LineParser,
    ResourceDirectory, ResourceSelection, Supervisor,
};

const SINK_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    let env_filter = format!("hyper=off,reqwest=off,rustls=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("logging subsystem enabled");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> anyhow::Result<()> {
    let store = Arc::new(FsLogStore::new(args.source_root.clone()));

    match args.command {
        Command::Ls => {
            let resources = store
                .list_resources()
                .await
                .context("cannot list resources under the source root")?;
            for resource in resources {
                println!("{resource}");
            }
            Ok(())
        }
        Command::Ingest { resources } => ingest(args, store, resources).await,
    }
}

async fn ingest(
    args: Cli,
    store: Arc<FsLogStore>,
    resources: Vec<String>,
) -> anyhow::Result<()> {
    let write_key = args.write_key.ok_or_else(|| {
        anyhow!("--write-key must be set to the write key for your telemetry team")
    })?;
    let sink_url = args
        .sink_url
        .ok_or_else(|| anyhow!("--sink-url must point at the telemetry intake endpoint"))?;

    let backfill_window = BackfillWindow::from_hours(args.backfill)?;
    let config = IngestConfig {
        state_dir: args.state_dir,
        backfill_window,
        high_availability: args.highavail,
        ledger_url: args.ledger_url,
        poll_interval: Duration::from_secs(args.poll_interval_secs),
        ..Default::default()
    };
    config.validate()?;
    debug!(hours = backfill_window.hours(), "backfill window configured");

    let sink = Arc::new(HttpEventSink::new(HttpEventSinkConfig {
        endpoint: sink_url,
        write_key,
        timeout: SINK_TIMEOUT,
        max_attempts: config.retry_max_attempts,
        retry_backoff_base: config.retry_backoff_base,
    })?);

    let selection = if resources.is_empty() {
        ResourceSelection::Discovered
    } else {
        ResourceSelection::Explicit(resources)
    };

    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            signal_token.cancel();
        }
    });

    let supervisor = Supervisor::new(
        config,
        store.clone(),
        store,
        Arc::new(LineParser),
        sink,
    );
    supervisor
        .run(selection, cancel_token)
        .await
        .context("ingestion failed")?;
    Ok(())
}
