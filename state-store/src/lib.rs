// Copyright 2026 The Supervision Core Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! State Store (C5): versioned, per-plugin opaque payload storage with a
//! pluggable serializer (JSON by default), atomic file writes, and a
//! migration registry consulted by the hot-swap coordinator.

pub mod backend;
pub mod migration;
pub mod serializer;

pub use backend::{FileBackend, MemoryBackend, StateBackend, VersionInfo};
pub use migration::Migrator;
pub use serializer::{JsonSerializer, StateSerializer};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use supervision_common::{SupervisionError, SupervisionResult};

/// A bundle of every running plugin's latest snapshot, produced by
/// `create_snapshot` and consumed by `restore_snapshot` — used to
/// checkpoint/resume supervisor state independent of any single
/// hot-swap.
#[derive(Clone, Debug)]
pub struct StoreSnapshot {
    pub entries: HashMap<String, (String, Vec<u8>)>,
    pub created_at: DateTime<Utc>,
}

pub struct StateStore {
    backend: Arc<dyn StateBackend>,
    serializer: Arc<dyn StateSerializer>,
    migrators: Mutex<HashMap<String, Vec<Arc<dyn Migrator>>>>,
}

impl StateStore {
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        Self::with_serializer(backend, Arc::new(JsonSerializer))
    }

    pub fn with_serializer(backend: Arc<dyn StateBackend>, serializer: Arc<dyn StateSerializer>) -> Self {
        Self {
            backend,
            serializer,
            migrators: Mutex::new(HashMap::new()),
        }
    }

    pub async fn save<T: Serialize + Sync>(
        &self,
        plugin_id: &str,
        version: &str,
        value: &T,
    ) -> SupervisionResult<()> {
        let json = serde_json::to_value(value)
            .map_err(|e| SupervisionError::Internal(format!("encode failed: {e}")))?;
        let payload = self.serializer.serialize(&json)?;
        self.backend.write(plugin_id, version, payload).await
    }

    pub async fn load<T: DeserializeOwned>(&self, plugin_id: &str, version: &str) -> SupervisionResult<T> {
        let payload = self.backend.read(plugin_id, version).await?;
        let json = self.serializer.deserialize(&payload)?;
        serde_json::from_value(json).map_err(|e| SupervisionError::Corrupt(e.to_string()))
    }

    pub async fn list(&self, plugin_id: &str) -> SupervisionResult<Vec<VersionInfo>> {
        self.backend.list(plugin_id).await
    }

    pub async fn delete(&self, plugin_id: &str, version: &str) -> SupervisionResult<()> {
        self.backend.delete(plugin_id, version).await
    }

    pub fn register_migrator(&self, plugin_id: &str, migrator: Arc<dyn Migrator>) {
        self.migrators
            .lock()
            .entry(plugin_id.to_string())
            .or_default()
            .push(migrator);
    }

    /// If `from == to`, loads and returns the raw payload as-is.
    /// Otherwise finds a registered migrator whose `can_migrate(from, to)`
    /// is true and invokes it; a missing migrator is a hard failure.
    pub async fn migrate(&self, plugin_id: &str, from: &str, to: &str) -> SupervisionResult<Vec<u8>> {
        let payload = self.backend.read(plugin_id, from).await?;
        if from == to {
            return Ok(payload);
        }

        let migrator = {
            let migrators = self.migrators.lock();
            migrators
                .get(plugin_id)
                .and_then(|list| list.iter().find(|m| m.can_migrate(from, to)))
                .cloned()
        };

        match migrator {
            Some(migrator) => migrator.migrate(payload).await,
            None => Err(SupervisionError::MigrationUnavailable {
                plugin_id: plugin_id.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }

    /// Snapshots the latest version of every plugin in `running_plugins`.
    /// A plugin with no stored versions is silently skipped.
    pub async fn create_snapshot(&self, running_plugins: &[String]) -> SupervisionResult<StoreSnapshot> {
        let mut entries = HashMap::new();
        for plugin_id in running_plugins {
            let versions = self.backend.list(plugin_id).await?;
            if let Some(latest) = versions.first() {
                let payload = self.backend.read(plugin_id, &latest.version).await?;
                entries.insert(plugin_id.clone(), (latest.version.clone(), payload));
            }
        }
        Ok(StoreSnapshot {
            entries,
            created_at: Utc::now(),
        })
    }

    pub async fn restore_snapshot(&self, snapshot: &StoreSnapshot) -> SupervisionResult<()> {
        for (plugin_id, (version, payload)) in &snapshot.entries {
            self.backend
                .write(plugin_id, version, payload.clone())
                .await?;
        }
        Ok(())
    }
}
