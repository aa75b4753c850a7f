// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-resource discovery and download loop.
//!
//! On every poll the monitor lists objects inside the backfill window,
//! subtracts what the ledger already recorded, downloads each new
//! object, marks it processed, and only then hands it to the dispatch
//! channel. Mark-before-emit is the ordering that makes re-runs safe: a
//! crash between download and mark loses nothing (the object is
//! rediscovered next poll), and a crash after mark at worst drops an
//! unpublished object, never duplicates one.
//!
//! Transient listing, download, and ledger errors retry with backoff
//! within the iteration; an iteration that still fails is logged and
//! abandoned, and the next poll re-derives the same candidate set.

use crate::config::{BackfillWindow, IngestConfig};
use crate::error::IngestError;
use crate::ledger::{Ledger, MarkOutcome, ObjectKey};
use crate::pipeline::DownloadedObject;
use crate::retry::{with_retries, RetryPolicy};
use crate::store::{ObjectStore, TimeRange};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct ResourceMonitor {
    resource: String,
    store: Arc<dyn ObjectStore>,
    ledger: Arc<dyn Ledger>,
    window: BackfillWindow,
    poll_interval: Duration,
    retry: RetryPolicy,
    tx: mpsc::Sender<DownloadedObject>,
    cancel_token: CancellationToken,
}

impl ResourceMonitor {
    pub fn new(
        resource: impl Into<String>,
        store: Arc<dyn ObjectStore>,
        ledger: Arc<dyn Ledger>,
        tx: mpsc::Sender<DownloadedObject>,
        cancel_token: CancellationToken,
        config: &IngestConfig,
    ) -> Self {
        Self {
            resource: resource.into(),
            store,
            ledger,
            window: config.backfill_window,
            poll_interval: config.poll_interval,
            retry: RetryPolicy {
                max_attempts: config.retry_max_attempts,
                backoff_base: config.retry_backoff_base,
            },
            tx,
            cancel_token,
        }
    }

    /// Polls until cancelled. Iteration failures are logged, never
    /// fatal; other resources keep making progress.
    pub async fn run(self) {
        info!(resource = %self.resource, "monitor started");
        let mut poll = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    match self.poll_once(SystemTime::now()).await {
                        Ok(()) => {}
                        Err(IngestError::DispatchClosed(key)) => {
                            warn!(
                                resource = %self.resource,
                                object = %key,
                                "dispatch channel closed, monitor exiting"
                            );
                            break;
                        }
                        Err(e) => {
                            error!(
                                resource = %self.resource,
                                error = %e,
                                "discovery iteration failed, will retry on next poll"
                            );
                        }
                    }
                }
                () = self.cancel_token.cancelled() => {
                    debug!(resource = %self.resource, "monitor cancelled");
                    break;
                }
            }
        }
    }

    /// One discovery pass over the window ending at `now`.
    ///
    /// Re-running this for the same window after a crash re-derives the
    /// same candidates and the ledger filters out everything already
    /// marked, which is the resumability property the pipeline rests on.
    pub async fn poll_once(&self, now: SystemTime) -> Result<(), IngestError> {
        let range = TimeRange::looking_back(now, self.window.duration());

        let listed = with_retries(self.retry, "object listing", || {
            self.store.list_objects(&self.resource, &range)
        })
        .await?;

        let recent = with_retries(self.retry, "ledger read", || self.ledger.recent(self.window))
            .await?;

        debug!(
            resource = %self.resource,
            listed = listed.len(),
            "discovery pass"
        );

        for object in listed {
            if self.cancel_token.is_cancelled() {
                return Ok(());
            }
            if recent.contains(&object.key) {
                continue;
            }

            // A failure on one object abandons only that object for this
            // iteration; it stays unmarked and is rediscovered next poll.
            if let Err(e) = self.ingest_object(&object.key, now).await {
                if let IngestError::DispatchClosed(_) = e {
                    return Err(e);
                }
                warn!(
                    resource = %self.resource,
                    object = %object.key,
                    error = %e,
                    "object skipped this iteration"
                );
            }
        }

        Ok(())
    }

    async fn ingest_object(
        &self,
        key: &ObjectKey,
        discovered_at: SystemTime,
    ) -> Result<(), IngestError> {
        let seen = with_retries(self.retry, "ledger read", || self.ledger.seen(key)).await?;
        if seen {
            return Ok(());
        }

        let body = with_retries(self.retry, "object download", || self.store.fetch(key)).await?;

        let outcome =
            with_retries(self.retry, "ledger write", || self.ledger.mark_processed(key)).await?;
        match outcome {
            MarkOutcome::Recorded => {
                let download = DownloadedObject {
                    resource: self.resource.clone(),
                    key: key.clone(),
                    body,
                    discovered_at,
                };
                // Blocking send is the backpressure policy: a slow
                // publisher slows discovery rather than dropping objects.
                self.tx
                    .send(download)
                    .await
                    .map_err(|_| IngestError::DispatchClosed(key.clone()))?;
                debug!(resource = %self.resource, object = %key, "object queued for publishing");
            }
            MarkOutcome::AlreadyProcessed => {
                debug!(
                    resource = %self.resource,
                    object = %key,
                    "object claimed elsewhere, dropping download"
                );
            }
        }
        Ok(())
    }
}
