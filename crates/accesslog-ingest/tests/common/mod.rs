// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared in-memory collaborators for integration tests.

use accesslog_ingest::{
    LogDestination, ObjectKey, ObjectStore, ParsedEvent, RemoteObject, ResourceDirectory,
    SinkError, StoreError, TelemetrySink, TimeRange,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

/// An in-memory fleet of load balancers and their log objects,
/// mutable from the outside while a supervisor is running against it.
#[derive(Default)]
pub struct FakeFleet {
    resources: Mutex<Vec<String>>,
    disabled: Mutex<Vec<String>>,
    objects: Mutex<Vec<RemoteObject>>,
    bodies: Mutex<HashMap<ObjectKey, Bytes>>,
}

impl FakeFleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resource(&self, resource: &str) {
        self.resources.lock().unwrap().push(resource.to_string());
    }

    #[allow(dead_code)]
    pub fn add_disabled_resource(&self, resource: &str) {
        self.disabled.lock().unwrap().push(resource.to_string());
    }

    pub fn add_object(&self, resource: &str, key: &str, last_modified: SystemTime, body: &str) {
        let key = ObjectKey::new(resource, key);
        self.objects.lock().unwrap().push(RemoteObject {
            key: key.clone(),
            last_modified,
            size: body.len() as u64,
        });
        self.bodies
            .lock()
            .unwrap()
            .insert(key, Bytes::from(body.to_string()));
    }
}

#[async_trait]
impl ResourceDirectory for FakeFleet {
    async fn list_resources(&self) -> Result<Vec<String>, StoreError> {
        let mut all = self.resources.lock().unwrap().clone();
        all.extend(self.disabled.lock().unwrap().iter().cloned());
        all.sort();
        Ok(all)
    }

    async fn log_destination(&self, resource: &str) -> Result<LogDestination, StoreError> {
        if self.disabled.lock().unwrap().iter().any(|r| r == resource) {
            return Err(StoreError::AccessLogsDisabled {
                resource: resource.to_string(),
            });
        }
        if !self.resources.lock().unwrap().iter().any(|r| r == resource) {
            return Err(StoreError::ResourceNotFound(resource.to_string()));
        }
        Ok(LogDestination {
            bucket: format!("{resource}-logs"),
            prefix: String::new(),
        })
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
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.key.resource == resource && window.contains(o.last_modified))
            .cloned()
            .collect())
    }

    async fn fetch(&self, key: &ObjectKey) -> Result<Bytes, StoreError> {
        self.bodies
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::ObjectNotFound(key.clone()))
    }
}

/// Sink that records the `message` field of everything it receives.
#[derive(Default)]
pub struct CollectingSink {
    messages: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
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
