// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Dispatch channel and the single publishing consumer.
//!
//! Every resource monitor produces onto one bounded channel; one
//! [`IngestPublisher`] drains it, parses each downloaded object, and
//! forwards the events to the sink.
//!
//! ```text
//!   ResourceMonitor×N ──mpsc──> IngestPublisher ──> TelemetrySink
//! ```
//!
//! The channel carries only successful downloads, never errors. A full
//! channel blocks producers, which is the backpressure policy: discovery
//! slows down instead of dropping objects. Ordering is FIFO per monitor
//! with no cross-monitor guarantee; the ledger, not delivery order, is
//! what prevents duplicates.
//!
//! A parse or publish failure is isolated to its object. The object was
//! already marked processed before it entered the channel, so it is
//! logged with enough context for manual recovery and never retried.

use crate::ledger::ObjectKey;
use crate::parse::EventParser;
use crate::sink::TelemetrySink;
use bytes::Bytes;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// A freshly downloaded log object, owned by the channel until the
/// publisher receives it.
#[derive(Debug, Clone)]
pub struct DownloadedObject {
    pub resource: String,
    pub key: ObjectKey,
    pub body: Bytes,
    pub discovered_at: SystemTime,
}

/// Builds the bounded dispatch channel shared by all monitors.
pub fn dispatch_channel(
    capacity: usize,
) -> (mpsc::Sender<DownloadedObject>, mpsc::Receiver<DownloadedObject>) {
    mpsc::channel(capacity)
}

/// Single consumer draining the dispatch channel into the sink.
pub struct IngestPublisher {
    rx: mpsc::Receiver<DownloadedObject>,
    parser: Arc<dyn EventParser>,
    sink: Arc<dyn TelemetrySink>,
    cancel_token: CancellationToken,
}

impl IngestPublisher {
    pub fn new(
        rx: mpsc::Receiver<DownloadedObject>,
        parser: Arc<dyn EventParser>,
        sink: Arc<dyn TelemetrySink>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            rx,
            parser,
            sink,
            cancel_token,
        }
    }

    /// Consumes until the channel closes or cancellation fires. On
    /// cancellation, already-queued objects are drained best-effort;
    /// they were marked processed and would otherwise be lost outright.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                received = self.rx.recv() => {
                    match received {
                        Some(download) => self.publish(download).await,
                        None => {
                            debug!("all monitors stopped, publisher exiting");
                            break;
                        }
                    }
                }
                () = self.cancel_token.cancelled() => {
                    debug!("shutdown requested, draining queued downloads");
                    while let Ok(download) = self.rx.try_recv() {
                        self.publish(download).await;
                    }
                    break;
                }
            }
        }
    }

    async fn publish(&self, download: DownloadedObject) {
        let events = match self.parser.parse(&download.body) {
            Ok(events) => events,
            Err(e) => {
                error!(
                    resource = %download.resource,
                    object = %download.key,
                    error = %e,
                    "cannot parse downloaded object, skipping it"
                );
                return;
            }
        };

        let total = events.len();
        let mut failed = 0usize;
        for event in &events {
            if let Err(e) = self.sink.send(event).await {
                failed += 1;
                error!(
                    resource = %download.resource,
                    object = %download.key,
                    error = %e,
                    "cannot publish event from downloaded object"
                );
            }
        }

        if failed > 0 {
            error!(
                resource = %download.resource,
                object = %download.key,
                failed,
                total,
                "object published partially; it is already marked processed and will not be retried"
            );
        } else {
            debug!(
                resource = %download.resource,
                object = %download.key,
                events = total,
                "object published"
            );
        }
    }
}
