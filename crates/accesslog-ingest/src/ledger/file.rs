// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Single-node ledger backed by per-resource state files.
//!
//! Each resource gets one JSON map file (`<resource>-processed.json`)
//! under the state directory, mapping object keys to the unix time they
//! were marked. Writes go through a temp file and an atomic rename, and
//! every write prunes entries that have aged out of the backfill window
//! so the files stay bounded. Safe for exactly one ingestion process.

use super::{unix_seconds, BackfillWindow, Ledger, LedgerError, MarkOutcome, ObjectKey};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::debug;

const STATE_FILE_SUFFIX: &str = "-processed.json";

pub struct FileLedger {
    dir: PathBuf,
    window: BackfillWindow,
    // Serializes load-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileLedger {
    /// Opens the ledger over an existing state directory.
    ///
    /// The directory must already exist; refusing to create it catches
    /// typos in `--state-dir` before any state is silently written
    /// somewhere unexpected.
    pub fn open(dir: &Path, window: BackfillWindow) -> Result<Self, LedgerError> {
        if !dir.is_dir() {
            return Err(LedgerError::StateDirMissing(dir.display().to_string()));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            window,
            write_lock: Mutex::new(()),
        })
    }

    fn state_path(&self, resource: &str) -> PathBuf {
        // Resource names come from the load-balancer API and are flat,
        // but never let a separator escape the state directory.
        let safe = resource.replace(['/', '\\'], "_");
        self.dir.join(format!("{safe}{STATE_FILE_SUFFIX}"))
    }

    async fn load(&self, resource: &str) -> Result<HashMap<String, u64>, LedgerError> {
        let path = self.state_path(resource);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(
        &self,
        resource: &str,
        entries: &HashMap<String, u64>,
    ) -> Result<(), LedgerError> {
        let path = self.state_path(resource);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(entries)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    fn prune(&self, entries: &mut HashMap<String, u64>, now: SystemTime) {
        let cutoff = unix_seconds(self.window.cutoff(now));
        entries.retain(|_, marked_at| *marked_at >= cutoff);
    }
}

#[async_trait]
impl Ledger for FileLedger {
    async fn seen(&self, key: &ObjectKey) -> Result<bool, LedgerError> {
        let entries = self.load(&key.resource).await?;
        Ok(entries.contains_key(&key.key))
    }

    async fn mark_processed(&self, key: &ObjectKey) -> Result<MarkOutcome, LedgerError> {
        let _guard = self.write_lock.lock().await;

        let now = SystemTime::now();
        let mut entries = self.load(&key.resource).await?;
        if entries.contains_key(&key.key) {
            return Ok(MarkOutcome::AlreadyProcessed);
        }

        entries.insert(key.key.clone(), unix_seconds(now));
        self.prune(&mut entries, now);
        self.persist(&key.resource, &entries).await?;

        debug!(key = %key, "marked object processed");
        Ok(MarkOutcome::Recorded)
    }

    async fn recent(&self, window: BackfillWindow) -> Result<HashSet<ObjectKey>, LedgerError> {
        let cutoff = unix_seconds(window.cutoff(SystemTime::now()));
        let mut keys = HashSet::new();

        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(resource) = name.strip_suffix(STATE_FILE_SUFFIX) else {
                continue;
            };
            let entries = self.load(resource).await?;
            for (object, marked_at) in entries {
                if marked_at >= cutoff {
                    keys.insert(ObjectKey::new(resource, object));
                }
            }
        }
        Ok(keys)
    }
}
