// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::ledger::{LedgerError, ObjectKey};
use crate::store::StoreError;

/// Errors surfaced by the ingestion pipeline.
///
/// Configuration and ledger-provisioning variants are fatal at startup;
/// resource variants are fatal only when the resource was explicitly
/// requested. Everything else degrades to a logged iteration failure.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("resource {resource} cannot be ingested: {source}")]
    Resource {
        resource: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("dispatch channel closed before {0} could be queued")]
    DispatchClosed(ObjectKey),

    #[error("no resources available to ingest")]
    NoResources,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IngestError::InvalidConfig("missing write key".to_string());
        assert_eq!(err.to_string(), "invalid configuration: missing write key");
    }

    #[test]
    fn test_resource_error_names_the_resource() {
        let err = IngestError::Resource {
            resource: "edge-lb".to_string(),
            source: StoreError::AccessLogsDisabled {
                resource: "edge-lb".to_string(),
            },
        };
        assert!(err.to_string().contains("edge-lb"));
    }

    #[test]
    fn test_dispatch_closed_names_the_key() {
        let err = IngestError::DispatchClosed(ObjectKey::new("edge-lb", "2025/08/05/log.gz"));
        assert!(err.to_string().contains("edge-lb/2025/08/05/log.gz"));
    }
}
