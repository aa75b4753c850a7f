// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Distributed ledger backed by a shared, conditionally-writable store.
//!
//! Marks are conditional inserts: the store answers `201 Created` to the
//! caller that committed the entry and `409 Conflict` to everyone else,
//! so racing instances agree on a single owner per object without any
//! external locks. Entries carry a time-to-live equal to the backfill
//! window and the store self-prunes expired keys.
//!
//! The wire protocol is the crate's own small HTTP surface (vendor
//! compatibility is a non-goal):
//!
//! ```text
//!   PUT {base}/entry                  conditional insert, 201 | 409
//!   GET {base}/entry?resource&key     presence probe, 200 | 404
//!   GET {base}/entries?since_unix=N   entries within the window
//! ```

use super::{unix_seconds, BackfillWindow, Ledger, LedgerEntry, LedgerError, MarkOutcome, ObjectKey};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, SystemTime};
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct PutEntry<'a> {
    resource: &'a str,
    key: &'a str,
    processed_at: u64,
    ttl_seconds: u64,
}

#[derive(Deserialize)]
struct WireEntry {
    resource: String,
    key: String,
    processed_at: u64,
}

impl From<WireEntry> for LedgerEntry {
    fn from(wire: WireEntry) -> Self {
        LedgerEntry {
            key: ObjectKey::new(wire.resource, wire.key),
            processed_at: wire.processed_at,
        }
    }
}

pub struct RemoteLedger {
    client: reqwest::Client,
    base_url: String,
    window: BackfillWindow,
}

impl RemoteLedger {
    /// Connects to the shared store and verifies it is reachable.
    ///
    /// An unreachable store is fatal by contract: falling back to local
    /// state would silently break the cross-instance at-most-once
    /// guarantee, so the caller gets a provisioning hint instead.
    pub async fn connect(base_url: String, window: BackfillWindow) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Request(e.to_string()))?;

        let ledger = Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            window,
        };

        let probe = ledger
            .client
            .get(format!("{}/entries", ledger.base_url))
            .query(&[("since_unix", unix_seconds(SystemTime::now()).to_string())])
            .send()
            .await;

        match probe {
            Ok(resp) if resp.status().is_success() => Ok(ledger),
            Ok(resp) => Err(LedgerError::StoreUnavailable {
                url: ledger.base_url,
                reason: format!("status {}", resp.status()),
            }),
            Err(e) => Err(LedgerError::StoreUnavailable {
                url: ledger.base_url,
                reason: e.to_string(),
            }),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

#[async_trait]
impl Ledger for RemoteLedger {
    async fn seen(&self, key: &ObjectKey) -> Result<bool, LedgerError> {
        let resp = self
            .client
            .get(self.endpoint("entry"))
            .query(&[("resource", key.resource.as_str()), ("key", key.key.as_str())])
            .send()
            .await
            .map_err(|e| LedgerError::Request(e.to_string()))?;

        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(LedgerError::UnexpectedStatus {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn mark_processed(&self, key: &ObjectKey) -> Result<MarkOutcome, LedgerError> {
        let entry = PutEntry {
            resource: &key.resource,
            key: &key.key,
            processed_at: unix_seconds(SystemTime::now()),
            ttl_seconds: self.window.duration().as_secs(),
        };

        let resp = self
            .client
            .put(self.endpoint("entry"))
            .json(&entry)
            .send()
            .await
            .map_err(|e| LedgerError::Request(e.to_string()))?;

        match resp.status() {
            StatusCode::CREATED => {
                debug!(key = %key, "marked object processed in shared store");
                Ok(MarkOutcome::Recorded)
            }
            StatusCode::CONFLICT => {
                debug!(key = %key, "object already claimed by another instance");
                Ok(MarkOutcome::AlreadyProcessed)
            }
            status => Err(LedgerError::UnexpectedStatus {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn recent(&self, window: BackfillWindow) -> Result<HashSet<ObjectKey>, LedgerError> {
        let since = unix_seconds(window.cutoff(SystemTime::now()));
        let resp = self
            .client
            .get(self.endpoint("entries"))
            .query(&[("since_unix", since.to_string())])
            .send()
            .await
            .map_err(|e| LedgerError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(LedgerError::UnexpectedStatus {
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let entries: Vec<WireEntry> = resp
            .json()
            .await
            .map_err(|e| LedgerError::Request(e.to_string()))?;
        Ok(entries
            .into_iter()
            .map(|wire| LedgerEntry::from(wire).key)
            .collect())
    }
}
