// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Object-store collaborator seams.
//!
//! The pipeline never talks to a concrete store API; it lists and
//! fetches through these traits. Listing is assumed eventually
//! consistent, so the same object may show up across polls; the ledger
//! is what dedups, not the store.

use crate::ledger::ObjectKey;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::{Duration, SystemTime};

/// Where a resource writes its access logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDestination {
    pub bucket: String,
    pub prefix: String,
}

/// Listing result: an object plus the metadata discovery filters on.
#[derive(Debug, Clone)]
pub struct RemoteObject {
    pub key: ObjectKey,
    pub last_modified: SystemTime,
    pub size: u64,
}

/// Half-open listing window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: SystemTime,
    pub end: SystemTime,
}

impl TimeRange {
    /// The window ending at `now` and reaching `lookback` into the past.
    pub fn looking_back(now: SystemTime, lookback: Duration) -> Self {
        Self {
            start: now.checked_sub(lookback).unwrap_or(SystemTime::UNIX_EPOCH),
            end: now,
        }
    }

    pub fn contains(&self, at: SystemTime) -> bool {
        at >= self.start && at < self.end
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("resource {0} not found")]
    ResourceNotFound(String),

    #[error(
        "access logs are not enabled for {resource}; enable access logging on the load balancer \
         and point it at an object store destination before ingesting"
    )]
    AccessLogsDisabled { resource: String },

    #[error("object {0} not found in store")]
    ObjectNotFound(ObjectKey),

    #[error("object store request failed: {0}")]
    Request(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Catalog of monitorable resources and their log destinations.
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// Every resource the directory knows about, whether or not logging
    /// is enabled for it.
    async fn list_resources(&self) -> Result<Vec<String>, StoreError>;

    /// The configured log destination for a resource.
    ///
    /// Returns [`StoreError::AccessLogsDisabled`] when the resource
    /// exists but has no log destination; callers must not treat that as
    /// an empty listing.
    async fn log_destination(&self, resource: &str) -> Result<LogDestination, StoreError>;
}

/// Listing and download capability over the log objects themselves.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Objects for `resource` whose timestamps fall inside `window`.
    async fn list_objects(
        &self,
        resource: &str,
        window: &TimeRange,
    ) -> Result<Vec<RemoteObject>, StoreError>;

    /// Full content of one object.
    async fn fetch(&self, key: &ObjectKey) -> Result<Bytes, StoreError>;
}
