// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Durable record of which remote objects have already been ingested.
//!
//! The ledger is the only shared mutable state in the pipeline. Every
//! monitor consults it before downloading and commits to it before
//! emitting, so re-running discovery over the same window after a crash
//! re-derives the same candidate set and skips everything already
//! marked.
//!
//! Two backends implement the contract:
//! - [`FileLedger`]: local state files, exactly one ingestion process.
//! - [`RemoteLedger`]: conditional inserts against a shared store, for
//!   multiple cooperating instances. When two instances race to mark the
//!   same key, exactly one observes [`MarkOutcome::Recorded`].

mod file;
mod remote;

pub use file::FileLedger;
pub use remote::RemoteLedger;

use crate::config::{BackfillWindow, IngestConfig};
use crate::error::IngestError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Identifier of a remote log object, scoped to the resource that
/// produced it. Used as the ledger's dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub resource: String,
    pub key: String,
}

impl ObjectKey {
    pub fn new(resource: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource, self.key)
    }
}

/// A committed processed-object record. Never mutated; expires from the
/// backing store once older than the backfill window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub key: ObjectKey,
    /// Unix seconds at which the object was marked processed.
    pub processed_at: u64,
}

/// Result of a conditional mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// This caller committed the entry; it owns downstream publishing.
    Recorded,
    /// Another caller (or a previous run) already committed the entry.
    AlreadyProcessed,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger state io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger state is corrupted: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("state directory {0} does not exist; create it or pass --state-dir")]
    StateDirMissing(String),

    #[error("ledger store request failed: {0}")]
    Request(String),

    #[error("ledger store returned unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error(
        "ledger store at {url} is unavailable ({reason}); provision the shared ledger store and \
         point --ledger-url at it before enabling high-availability mode"
    )]
    StoreUnavailable { url: String, reason: String },
}

/// Contract shared by both ledger variants.
///
/// `mark_processed` must be conditional: for a given key, at most one
/// caller ever observes [`MarkOutcome::Recorded`].
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Whether the key has already been durably marked processed.
    async fn seen(&self, key: &ObjectKey) -> Result<bool, LedgerError>;

    /// Conditionally commit the key as processed.
    async fn mark_processed(&self, key: &ObjectKey) -> Result<MarkOutcome, LedgerError>;

    /// Keys marked within the backfill window, used to skip redundant
    /// per-key lookups during discovery.
    async fn recent(&self, window: BackfillWindow) -> Result<HashSet<ObjectKey>, LedgerError>;
}

/// Selects the ledger variant once, at construction time.
///
/// High-availability mode never falls back to the local ledger: a
/// missing or unreachable store would otherwise silently break the
/// at-most-once guarantee across instances.
pub async fn build_ledger(config: &IngestConfig) -> Result<Arc<dyn Ledger>, IngestError> {
    if config.high_availability {
        let url = config.ledger_url.clone().ok_or_else(|| {
            IngestError::InvalidConfig(
                "high-availability mode requires a ledger store URL".to_string(),
            )
        })?;
        let ledger = RemoteLedger::connect(url, config.backfill_window).await?;
        info!("state tracking with high availability enabled, using shared ledger store");
        Ok(Arc::new(ledger))
    } else {
        let ledger = FileLedger::open(&config.state_dir, config.backfill_window)?;
        info!("state tracking enabled, using local file system");
        Ok(Arc::new(ledger))
    }
}

pub(crate) fn unix_seconds(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
