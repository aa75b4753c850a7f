// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::IngestError;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_DISPATCH_CAPACITY: usize = 64;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BACKOFF_BASE_MS: u64 = 200;

/// Lookback bound, in hours, for discovering objects and retaining
/// ledger entries. Valid range is 1 through 168 (one week).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillWindow {
    hours: u64,
}

impl BackfillWindow {
    pub const MIN_HOURS: u64 = 1;
    pub const MAX_HOURS: u64 = 168;

    pub fn from_hours(hours: u64) -> Result<Self, IngestError> {
        if !(Self::MIN_HOURS..=Self::MAX_HOURS).contains(&hours) {
            return Err(IngestError::InvalidConfig(format!(
                "backfill requires an hour input between {} and {}, got {hours}",
                Self::MIN_HOURS,
                Self::MAX_HOURS
            )));
        }
        Ok(Self { hours })
    }

    pub fn hours(&self) -> u64 {
        self.hours
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.hours * 3600)
    }

    /// Oldest instant still inside the window, measured from `now`.
    pub fn cutoff(&self, now: SystemTime) -> SystemTime {
        now.checked_sub(self.duration()).unwrap_or(SystemTime::UNIX_EPOCH)
    }
}

impl Default for BackfillWindow {
    fn default() -> Self {
        Self { hours: Self::MIN_HOURS }
    }
}

/// Configuration for the ingestion pipeline.
///
/// Constructed once at startup and passed by reference to each
/// component; nothing here is mutated after validation.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Directory holding the single-node ledger state files.
    pub state_dir: PathBuf,
    /// Discovery lookback and ledger retention bound.
    pub backfill_window: BackfillWindow,
    /// Use the shared remote ledger so multiple instances can cooperate.
    pub high_availability: bool,
    /// Base URL of the remote ledger store. Required in high-availability mode.
    pub ledger_url: Option<String>,
    /// Cadence of the per-resource discovery loop.
    pub poll_interval: Duration,
    /// Capacity of the dispatch channel between monitors and the publisher.
    pub dispatch_capacity: usize,
    /// Attempts per transient listing/download/ledger operation.
    pub retry_max_attempts: u32,
    /// Base backoff between retry attempts, doubled per attempt.
    pub retry_backoff_base: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("."),
            backfill_window: BackfillWindow::default(),
            high_availability: false,
            ledger_url: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            dispatch_capacity: DEFAULT_DISPATCH_CAPACITY,
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            retry_backoff_base: Duration::from_millis(DEFAULT_RETRY_BACKOFF_BASE_MS),
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.high_availability && self.ledger_url.is_none() {
            return Err(IngestError::InvalidConfig(
                "high-availability mode requires a ledger store URL".to_string(),
            ));
        }
        if self.dispatch_capacity == 0 {
            return Err(IngestError::InvalidConfig(
                "dispatch channel capacity must be greater than 0".to_string(),
            ));
        }
        if self.retry_max_attempts == 0 {
            return Err(IngestError::InvalidConfig(
                "retry attempts must be greater than 0".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(IngestError::InvalidConfig(
                "poll interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
