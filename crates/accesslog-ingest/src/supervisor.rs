// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Top-level coordinator for the ingestion pipeline.
//!
//! The supervisor builds the ledger variant, preflights every requested
//! resource, spawns one monitor task per usable resource, runs the
//! single publisher, and owns the shutdown path. Cancellation fans out
//! to every task through one token; monitors stop polling, the
//! publisher drains what is already queued, and `run` returns.
//!
//! Resource failures follow the explicit-versus-discovered rule: a
//! resource the operator named must work or the whole run aborts, while
//! a resource that was merely discovered is logged and skipped so the
//! remaining resources keep making progress.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::ledger::build_ledger;
use crate::monitor::ResourceMonitor;
use crate::parse::EventParser;
use crate::pipeline::{dispatch_channel, IngestPublisher};
use crate::sink::TelemetrySink;
use crate::store::{ObjectStore, ResourceDirectory};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How the set of monitored resources was chosen.
#[derive(Debug, Clone)]
pub enum ResourceSelection {
    /// Operator-named resources; any preflight failure is fatal.
    Explicit(Vec<String>),
    /// Everything the directory knows about; failures are skipped.
    Discovered,
}

pub struct Supervisor {
    config: IngestConfig,
    directory: Arc<dyn ResourceDirectory>,
    store: Arc<dyn ObjectStore>,
    parser: Arc<dyn EventParser>,
    sink: Arc<dyn TelemetrySink>,
}

impl Supervisor {
    pub fn new(
        config: IngestConfig,
        directory: Arc<dyn ResourceDirectory>,
        store: Arc<dyn ObjectStore>,
        parser: Arc<dyn EventParser>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            config,
            directory,
            store,
            parser,
            sink,
        }
    }

    /// Runs the pipeline until `cancel_token` fires.
    ///
    /// Fatal before any polling starts: invalid configuration, an
    /// unreachable ledger store in high-availability mode, an explicitly
    /// named resource that cannot be ingested, or an empty resource set.
    pub async fn run(
        self,
        selection: ResourceSelection,
        cancel_token: CancellationToken,
    ) -> Result<(), IngestError> {
        self.config.validate()?;
        let ledger = build_ledger(&self.config).await?;

        let (resources, explicit) = match selection {
            ResourceSelection::Explicit(names) => (names, true),
            ResourceSelection::Discovered => (self.directory.list_resources().await?, false),
        };
        if resources.is_empty() {
            return Err(IngestError::NoResources);
        }

        let (tx, rx) = dispatch_channel(self.config.dispatch_capacity);
        let mut monitors = JoinSet::new();
        let mut started = 0usize;

        for resource in resources {
            match self.directory.log_destination(&resource).await {
                Ok(destination) => {
                    info!(
                        resource = %resource,
                        bucket = %destination.bucket,
                        prefix = %destination.prefix,
                        "access logs enabled, starting monitor"
                    );
                    let monitor = ResourceMonitor::new(
                        resource,
                        self.store.clone(),
                        ledger.clone(),
                        tx.clone(),
                        cancel_token.clone(),
                        &self.config,
                    );
                    monitors.spawn(monitor.run());
                    started += 1;
                }
                Err(e) if explicit => {
                    // Dropping the JoinSet aborts any monitor already spawned.
                    return Err(IngestError::Resource {
                        resource,
                        source: e,
                    });
                }
                Err(e) => {
                    error!(
                        resource = %resource,
                        error = %e,
                        "cannot ingest resource, skipping it"
                    );
                }
            }
        }

        if started == 0 {
            return Err(IngestError::NoResources);
        }
        // Monitors hold their own senders; the publisher must observe
        // channel closure once they all stop.
        drop(tx);

        let publisher = IngestPublisher::new(
            rx,
            self.parser.clone(),
            self.sink.clone(),
            cancel_token.clone(),
        );
        let publisher_task = tokio::spawn(publisher.run());

        info!(monitors = started, "ingestion running");

        while let Some(joined) = monitors.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "monitor task ended abnormally");
            }
        }

        if let Err(e) = publisher_task.await {
            warn!(error = %e, "publisher task ended abnormally");
        }
        info!("ingestion stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackfillWindow;
    use crate::ledger::ObjectKey;
    use crate::parse::{LineParser, ParsedEvent};
    use crate::sink::SinkError;
    use crate::store::{LogDestination, RemoteObject, StoreError, TimeRange};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    /// Directory/store over fixed in-memory resources. Resources listed
    /// in `disabled` exist but have no log destination.
    struct FakeFleet {
        destinations: HashMap<String, LogDestination>,
        disabled: Vec<String>,
        objects: Vec<RemoteObject>,
        bodies: HashMap<ObjectKey, Bytes>,
    }

    impl FakeFleet {
        fn new() -> Self {
            Self {
                destinations: HashMap::new(),
                disabled: Vec::new(),
                objects: Vec::new(),
                bodies: HashMap::new(),
            }
        }

        fn with_resource(mut self, resource: &str) -> Self {
            self.destinations.insert(
                resource.to_string(),
                LogDestination {
                    bucket: format!("{resource}-logs"),
                    prefix: String::new(),
                },
            );
            self
        }

        fn with_disabled_resource(mut self, resource: &str) -> Self {
            self.disabled.push(resource.to_string());
            self
        }

        fn with_object(mut self, resource: &str, key: &str, body: &str) -> Self {
            let key = ObjectKey::new(resource, key);
            self.objects.push(RemoteObject {
                key: key.clone(),
                last_modified: SystemTime::now() - Duration::from_secs(60),
                size: body.len() as u64,
            });
            self.bodies.insert(key, Bytes::from(body.to_string()));
            self
        }
    }

    #[async_trait]
    impl ResourceDirectory for FakeFleet {
        async fn list_resources(&self) -> Result<Vec<String>, StoreError> {
            let mut all: Vec<String> = self.destinations.keys().cloned().collect();
            all.extend(self.disabled.iter().cloned());
            all.sort();
            Ok(all)
        }

        async fn log_destination(&self, resource: &str) -> Result<LogDestination, StoreError> {
            if self.disabled.iter().any(|r| r == resource) {
                return Err(StoreError::AccessLogsDisabled {
                    resource: resource.to_string(),
                });
            }
            self.destinations
                .get(resource)
                .cloned()
                .ok_or_else(|| StoreError::ResourceNotFound(resource.to_string()))
        }
    }

    #[async_trait]
    impl ObjectStore for FakeFleet {
        async fn list_objects(
            &self,
            resource: &str,
            window: &TimeRange,
        ) -> Result<Vec<RemoteObject>, StoreError> {
            Ok(self
                .objects
                .iter()
                .filter(|o| o.key.resource == resource && window.contains(o.last_modified))
                .cloned()
                .collect())
        }

        async fn fetch(&self, key: &ObjectKey) -> Result<Bytes, StoreError> {
            self.bodies
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::ObjectNotFound(key.clone()))
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        messages: Mutex<Vec<String>>,
    }

    impl CollectingSink {
        fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TelemetrySink for CollectingSink {
        async fn send(&self, event: &ParsedEvent) -> Result<(), SinkError> {
            self.messages
                .lock()
                .unwrap()
                .push(event.fields["message"].as_str().unwrap_or_default().to_string());
            Ok(())
        }
    }

    struct TestHarness {
        supervisor: Supervisor,
        sink: Arc<CollectingSink>,
        _state_dir: TempDir,
    }

    fn test_harness(fleet: FakeFleet, mutate: impl FnOnce(&mut IngestConfig)) -> TestHarness {
        let state_dir = TempDir::new().unwrap();
        let mut config = IngestConfig {
            state_dir: state_dir.path().to_path_buf(),
            backfill_window: BackfillWindow::from_hours(24).unwrap(),
            poll_interval: Duration::from_millis(20),
            retry_backoff_base: Duration::from_millis(1),
            ..Default::default()
        };
        mutate(&mut config);

        let fleet = Arc::new(fleet);
        let sink = Arc::new(CollectingSink::default());
        let supervisor = Supervisor::new(
            config,
            fleet.clone(),
            fleet,
            Arc::new(LineParser),
            sink.clone(),
        );
        TestHarness {
            supervisor,
            sink,
            _state_dir: state_dir,
        }
    }

    async fn wait_for_messages(sink: &CollectingSink, count: usize) {
        for _ in 0..100 {
            if sink.messages().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("sink never received {count} messages, got {:?}", sink.messages());
    }

    #[tokio::test]
    async fn test_run_publishes_discovered_objects_and_stops_on_cancel() {
        let harness = test_harness(
            FakeFleet::new()
                .with_resource("edge-lb")
                .with_object("edge-lb", "a.log", "hello\n"),
            |_| {},
        );
        let cancel_token = CancellationToken::new();
        let sink = harness.sink.clone();

        let run = tokio::spawn(harness.supervisor.run(ResourceSelection::Discovered, cancel_token.clone()));

        wait_for_messages(&sink, 1).await;
        cancel_token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(sink.messages(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_disabled_resource_is_skipped_when_discovered() {
        let harness = test_harness(
            FakeFleet::new()
                .with_resource("good-lb")
                .with_disabled_resource("broken-lb")
                .with_object("good-lb", "a.log", "from the good one\n"),
            |_| {},
        );
        let cancel_token = CancellationToken::new();
        let sink = harness.sink.clone();

        let run = tokio::spawn(harness.supervisor.run(ResourceSelection::Discovered, cancel_token.clone()));

        // The broken resource must not stop the good one from flowing.
        wait_for_messages(&sink, 1).await;
        cancel_token.cancel();
        assert!(tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap()
            .is_ok());
    }

    #[tokio::test]
    async fn test_disabled_resource_is_fatal_when_explicitly_named() {
        let harness = test_harness(
            FakeFleet::new().with_disabled_resource("broken-lb"),
            |_| {},
        );

        let err = harness
            .supervisor
            .run(
                ResourceSelection::Explicit(vec!["broken-lb".to_string()]),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            IngestError::Resource { resource, source } => {
                assert_eq!(resource, "broken-lb");
                assert!(matches!(source, StoreError::AccessLogsDisabled { .. }));
            }
            other => panic!("expected resource error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_explicit_resource_is_fatal() {
        let harness = test_harness(FakeFleet::new().with_resource("edge-lb"), |_| {});

        let err = harness
            .supervisor
            .run(
                ResourceSelection::Explicit(vec!["no-such-lb".to_string()]),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Resource { .. }));
    }

    #[tokio::test]
    async fn test_empty_resource_set_is_fatal() {
        let harness = test_harness(FakeFleet::new(), |_| {});
        let err = harness
            .supervisor
            .run(ResourceSelection::Discovered, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::NoResources));
    }

    #[tokio::test]
    async fn test_all_resources_disabled_is_fatal_when_discovered() {
        let harness = test_harness(
            FakeFleet::new()
                .with_disabled_resource("one")
                .with_disabled_resource("two"),
            |_| {},
        );
        let err = harness
            .supervisor
            .run(ResourceSelection::Discovered, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::NoResources));
    }

    #[tokio::test]
    async fn test_ha_mode_with_unreachable_store_fails_before_polling() {
        let harness = test_harness(
            FakeFleet::new()
                .with_resource("edge-lb")
                .with_object("edge-lb", "a.log", "never published\n"),
            |config| {
                config.high_availability = true;
                config.ledger_url = Some("http://127.0.0.1:1".to_string());
            },
        );
        let sink = harness.sink.clone();

        let err = harness
            .supervisor
            .run(ResourceSelection::Discovered, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("provision"), "got: {err}");
        assert!(sink.messages().is_empty(), "no polling may happen before the fatal error");
    }
}
