// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Filesystem-backed object store for local operation and testing.
//!
//! The source root holds one subdirectory per resource; a resource with
//! a `logs/` subdirectory has access logging enabled and its log
//! objects live underneath it. A resource directory without `logs/`
//! models a load balancer whose access logging was never turned on.
//!
//! ```text
//!   <root>/<resource>/logs/2025/08/05/access-0001.log
//! ```

use accesslog_ingest::{
    LogDestination, ObjectKey, ObjectStore, RemoteObject, ResourceDirectory, StoreError, TimeRange,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

const LOGS_SUBDIR: &str = "logs";

pub struct FsLogStore {
    root: PathBuf,
}

impl FsLogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn logs_dir(&self, resource: &str) -> PathBuf {
        self.root.join(resource).join(LOGS_SUBDIR)
    }

    fn object_path(&self, key: &ObjectKey) -> PathBuf {
        self.logs_dir(&key.resource).join(&key.key)
    }
}

fn walk_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    Ok(files)
}

#[async_trait]
impl ResourceDirectory for FsLogStore {
    async fn list_resources(&self) -> Result<Vec<String>, StoreError> {
        let mut resources = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    resources.push(name.to_string());
                }
            }
        }
        resources.sort();
        Ok(resources)
    }

    async fn log_destination(&self, resource: &str) -> Result<LogDestination, StoreError> {
        if !self.root.join(resource).is_dir() {
            return Err(StoreError::ResourceNotFound(resource.to_string()));
        }
        let logs = self.logs_dir(resource);
        if !logs.is_dir() {
            return Err(StoreError::AccessLogsDisabled {
                resource: resource.to_string(),
            });
        }
        Ok(LogDestination {
            bucket: logs.display().to_string(),
            prefix: String::new(),
        })
    }
}

#[async_trait]
impl ObjectStore for FsLogStore {
    async fn list_objects(
        &self,
        resource: &str,
        window: &TimeRange,
    ) -> Result<Vec<RemoteObject>, StoreError> {
        let logs = self.logs_dir(resource);
        if !logs.is_dir() {
            return Err(StoreError::AccessLogsDisabled {
                resource: resource.to_string(),
            });
        }

        let mut objects = Vec::new();
        for path in walk_files(&logs)? {
            let metadata = std::fs::metadata(&path)?;
            let modified = metadata.modified()?;
            if !window.contains(modified) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&logs) else {
                continue;
            };
            objects.push(RemoteObject {
                key: ObjectKey::new(resource, relative.to_string_lossy()),
                last_modified: modified,
                size: metadata.len(),
            });
        }
        Ok(objects)
    }

    async fn fetch(&self, key: &ObjectKey) -> Result<Bytes, StoreError> {
        match tokio::fs::read(self.object_path(key)).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::ObjectNotFound(key.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
