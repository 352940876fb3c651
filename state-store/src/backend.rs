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

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use supervision_common::{SupervisionError, SupervisionResult};
use tempfile::NamedTempFile;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub created_at: DateTime<Utc>,
}

/// Storage backend for raw, already-serialized snapshot payloads. Both
/// implementations serialize per-`(pluginID, version)` writes; reads are
/// concurrent with each other and with writes of other keys, matching the
/// concurrency model's file-backed-storage policy (§5).
#[async_trait]
pub trait StateBackend: Send + Sync {
    async fn write(&self, plugin_id: &str, version: &str, payload: Vec<u8>) -> SupervisionResult<()>;
    async fn read(&self, plugin_id: &str, version: &str) -> SupervisionResult<Vec<u8>>;
    async fn list(&self, plugin_id: &str) -> SupervisionResult<Vec<VersionInfo>>;
    async fn delete(&self, plugin_id: &str, version: &str) -> SupervisionResult<()>;
}

/// File-backed storage at `{stateDir}/{pluginID}/{version}.state`, with a
/// `.meta` JSON sidecar recording `created_at`. Writes go through a temp
/// file in the same directory, then `persist()` (atomic rename), so
/// readers never observe a partial file (§3 invariant 9).
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn plugin_dir(&self, plugin_id: &str) -> PathBuf {
        self.root.join(plugin_id)
    }

    fn state_path(&self, plugin_id: &str, version: &str) -> PathBuf {
        self.plugin_dir(plugin_id).join(format!("{version}.state"))
    }

    fn meta_path(&self, plugin_id: &str, version: &str) -> PathBuf {
        self.plugin_dir(plugin_id).join(format!("{version}.meta"))
    }
}

fn atomic_write(dir: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    std::io::Write::write_all(&mut temp, bytes)?;
    temp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl StateBackend for FileBackend {
    async fn write(&self, plugin_id: &str, version: &str, payload: Vec<u8>) -> SupervisionResult<()> {
        let dir = self.plugin_dir(plugin_id);
        let state_path = self.state_path(plugin_id, version);
        let meta_path = self.meta_path(plugin_id, version);
        let meta = serde_json::to_vec(&VersionInfo {
            version: version.to_string(),
            created_at: Utc::now(),
        })
        .expect("VersionInfo always serializes");

        tokio::task::spawn_blocking(move || {
            atomic_write(&dir, &state_path, &payload)?;
            atomic_write(&dir, &meta_path, &meta)
        })
        .await
        .map_err(|e| SupervisionError::Internal(format!("write task panicked: {e}")))?
        .map_err(|e| SupervisionError::Internal(format!("write failed: {e}")))
    }

    async fn read(&self, plugin_id: &str, version: &str) -> SupervisionResult<Vec<u8>> {
        let path = self.state_path(plugin_id, version);
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SupervisionError::NotFound(format!("{plugin_id}@{version}"))
            } else {
                SupervisionError::Internal(format!("read failed: {e}"))
            }
        })
    }

    async fn list(&self, plugin_id: &str) -> SupervisionResult<Vec<VersionInfo>> {
        let dir = self.plugin_dir(plugin_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SupervisionError::Internal(format!("list failed: {e}"))),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SupervisionError::Internal(format!("list failed: {e}")))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("meta") {
                continue;
            }
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| SupervisionError::Internal(format!("read meta failed: {e}")))?;
            let info: VersionInfo = serde_json::from_slice(&bytes)
                .map_err(|e| SupervisionError::Corrupt(format!("bad meta sidecar: {e}")))?;
            versions.push(info);
        }
        versions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(versions)
    }

    async fn delete(&self, plugin_id: &str, version: &str) -> SupervisionResult<()> {
        let state_path = self.state_path(plugin_id, version);
        let meta_path = self.meta_path(plugin_id, version);
        let _ = tokio::fs::remove_file(&meta_path).await;
        tokio::fs::remove_file(&state_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SupervisionError::NotFound(format!("{plugin_id}@{version}"))
            } else {
                SupervisionError::Internal(format!("delete failed: {e}"))
            }
        })
    }
}

/// In-memory backend: a single assignment under one lock stands in for
/// the file backend's temp-file-then-rename atomicity.
#[derive(Default)]
pub struct MemoryBackend {
    data: Mutex<HashMap<(String, String), (Vec<u8>, DateTime<Utc>)>>,
}

#[async_trait]
impl StateBackend for MemoryBackend {
    async fn write(&self, plugin_id: &str, version: &str, payload: Vec<u8>) -> SupervisionResult<()> {
        self.data.lock().insert(
            (plugin_id.to_string(), version.to_string()),
            (payload, Utc::now()),
        );
        Ok(())
    }

    async fn read(&self, plugin_id: &str, version: &str) -> SupervisionResult<Vec<u8>> {
        self.data
            .lock()
            .get(&(plugin_id.to_string(), version.to_string()))
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| SupervisionError::NotFound(format!("{plugin_id}@{version}")))
    }

    async fn list(&self, plugin_id: &str) -> SupervisionResult<Vec<VersionInfo>> {
        let mut versions: Vec<VersionInfo> = self
            .data
            .lock()
            .iter()
            .filter(|((pid, _), _)| pid == plugin_id)
            .map(|((_, version), (_, created_at))| VersionInfo {
                version: version.clone(),
                created_at: *created_at,
            })
            .collect();
        versions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(versions)
    }

    async fn delete(&self, plugin_id: &str, version: &str) -> SupervisionResult<()> {
        self.data
            .lock()
            .remove(&(plugin_id.to_string(), version.to_string()))
            .map(|_| ())
            .ok_or_else(|| SupervisionError::NotFound(format!("{plugin_id}@{version}")))
    }
}
