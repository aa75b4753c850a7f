// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Telemetry sink seam plus the bundled HTTP implementation.
//!
//! [`HttpEventSink`] posts one JSON document per event with a write-key
//! header. Network errors and 5xx responses retry with exponential
//! backoff; 4xx responses are treated as permanent and fail without
//! retry.

use crate::parse::ParsedEvent;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("event sink request failed: {0}")]
    Request(String),

    #[error("event sink rejected payload with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Destination for parsed events. Implementations may buffer or batch
/// internally; the publisher calls `send` synchronously per event.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn send(&self, event: &ParsedEvent) -> Result<(), SinkError>;
}

pub struct HttpEventSinkConfig {
    /// Full intake URL events are posted to.
    pub endpoint: String,
    /// Team write key, sent as the `X-Write-Key` header.
    pub write_key: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_backoff_base: Duration,
}

pub struct HttpEventSink {
    client: reqwest::Client,
    endpoint: String,
    write_key: String,
    timeout: Duration,
    max_attempts: u32,
    retry_backoff_base: Duration,
}

impl HttpEventSink {
    pub fn new(config: HttpEventSinkConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SinkError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint,
            write_key: config.write_key,
            timeout: config.timeout,
            max_attempts: config.max_attempts.max(1),
            retry_backoff_base: config.retry_backoff_base,
        })
    }
}

#[async_trait]
impl TelemetrySink for HttpEventSink {
    async fn send(&self, event: &ParsedEvent) -> Result<(), SinkError> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let resp = self
                .client
                .post(&self.endpoint)
                .timeout(self.timeout)
                .header("X-Write-Key", &self.write_key)
                .json(event)
                .send()
                .await;

            let retryable = match resp {
                Ok(resp) if resp.status().is_success() => {
                    debug!("event accepted by sink");
                    return Ok(());
                }
                Ok(resp) if resp.status().is_client_error() => {
                    // Permanent: re-sending the same payload cannot succeed.
                    return Err(SinkError::Rejected {
                        status: resp.status().as_u16(),
                        body: resp.text().await.unwrap_or_default(),
                    });
                }
                Ok(resp) => SinkError::Rejected {
                    status: resp.status().as_u16(),
                    body: resp.text().await.unwrap_or_default(),
                },
                Err(e) => SinkError::Request(e.to_string()),
            };

            if attempts >= self.max_attempts {
                error!("failed to send event after {attempts} attempts: {retryable}");
                return Err(retryable);
            }

            let backoff = self.retry_backoff_base * 2_u32.saturating_pow(attempts - 1);
            tokio::time::sleep(backoff).await;
        }
    }
}
