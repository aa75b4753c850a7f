// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! State-tracked, resumable ingestion of load-balancer access logs.
//!
//! The crate discovers access-log objects written to an object store,
//! downloads each object exactly once within a bounded backfill window,
//! and forwards the parsed events to a telemetry sink. Resumability is
//! provided by a processed-object ledger with two interchangeable
//! backends: a local file-based ledger for single-instance operation and
//! a conditionally-written remote ledger for cooperating instances.
//!
//! ```text
//!   ┌───────────────────┐
//!   │ ResourceMonitor×N │ (list → dedup via ledger → download → mark)
//!   └─────────┬─────────┘
//!             │ bounded mpsc
//!             v
//!   ┌───────────────────┐
//!   │  IngestPublisher  │ (parse → sink)
//!   └───────────────────┘
//! ```
//!
//! The object store, parsing transform, and sink are trait seams;
//! concrete implementations live with the embedding binary.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod error;
pub mod ledger;
pub mod monitor;
pub mod parse;
pub mod pipeline;
pub mod retry;
pub mod sink;
pub mod store;
pub mod supervisor;

pub use config::{BackfillWindow, IngestConfig};
pub use error::IngestError;
pub use ledger::{build_ledger, Ledger, LedgerEntry, LedgerError, MarkOutcome, ObjectKey};
pub use monitor::ResourceMonitor;
pub use parse::{EventParser, LineParser, ParseError, ParsedEvent};
pub use pipeline::{dispatch_channel, DownloadedObject, IngestPublisher};
pub use sink::{HttpEventSink, HttpEventSinkConfig, SinkError, TelemetrySink};
pub use store::{LogDestination, ObjectStore, RemoteObject, ResourceDirectory, StoreError, TimeRange};
pub use supervisor::{ResourceSelection, Supervisor};
