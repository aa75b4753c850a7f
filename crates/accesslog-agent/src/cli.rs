// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Ingest load-balancer access logs from an object store into a
/// telemetry sink, tracking processed objects so nothing is skipped or
/// duplicated across restarts.
#[derive(Parser, Debug)]
#[command(name = "accesslog-agent", version)]
pub struct Cli {
    /// Directory where single-node ingestion state is kept
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub state_dir: PathBuf,

    /// Hours of lookback for discovering log objects (1-168)
    #[arg(long, default_value_t = 1, value_name = "HOURS")]
    pub backfill: u64,

    /// Track state in a shared ledger store so several agent instances
    /// can cooperate without duplicate processing
    #[arg(long)]
    pub highavail: bool,

    /// Base URL of the shared ledger store (required with --highavail)
    #[arg(long, value_name = "URL")]
    pub ledger_url: Option<String>,

    /// Team write key used to authenticate against the telemetry sink
    #[arg(long, value_name = "KEY", env = "INGEST_WRITE_KEY")]
    pub write_key: Option<String>,

    /// Telemetry sink intake URL events are posted to
    #[arg(long, value_name = "URL")]
    pub sink_url: Option<String>,

    /// Root directory holding one subdirectory per resource, with that
    /// resource's log objects under `<resource>/logs/`
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub source_root: PathBuf,

    /// Seconds between discovery polls
    #[arg(long, default_value_t = 60, value_name = "SECS")]
    pub poll_interval_secs: u64,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the resources that can be ingested
    Ls,
    /// Ingest access logs for the named resources, or every discovered
    /// resource when none are named
    Ingest {
        #[arg(value_name = "RESOURCE")]
        resources: Vec<String>,
    },
}
