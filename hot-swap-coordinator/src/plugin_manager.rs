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
use std::time::Duration;
use supervision_common::{ServiceSpec, SupervisionResult};
use tracing::debug;

/// The plugin-side collaborator `hotSwap` "instructs" and "asks" at steps
/// 3-5 and 8 (§4.8). Everything this trait exposes talks to the plugin
/// over its own wire protocol (loading a parallel instance, draining
/// in-flight work, exporting/importing opaque state) — concrete schemas
/// for that protocol are out of scope here, so callers inject a real
/// implementation that speaks it; `NoopPluginManager` is a stand-in that
/// lets the rest of the swap sequence (checkpoint, migrate, swap, rollback)
/// run and be tested without one.
#[async_trait]
pub trait PluginManager: Send + Sync {
    /// Load the new binary in parallel; do not route traffic to it yet.
    async fn load_new(&self, plugin_id: &str, new_spec: &ServiceSpec) -> SupervisionResult<()>;

    /// Drain in-flight requests to the old plugin, bounded by `timeout`.
    async fn drain(&self, plugin_id: &str, timeout: Duration) -> SupervisionResult<()>;

    /// Ask the old plugin to export its state as opaque bytes.
    async fn export_state(&self, plugin_id: &str) -> SupervisionResult<Vec<u8>>;

    /// Hand the migrated state to the newly started plugin.
    async fn import_state(&self, plugin_id: &str, payload: Vec<u8>) -> SupervisionResult<()>;

    /// Unload whatever the old binary (or a staged-but-abandoned new one)
    /// left behind.
    async fn unload_old(&self, plugin_id: &str) -> SupervisionResult<()>;
}

/// A no-op `PluginManager`: every step succeeds immediately without
/// actually talking to a plugin. Useful until a real wire-protocol client
/// is wired in, and in tests that only care about the orchestrator-facing
/// half of a hot-swap.
pub struct NoopPluginManager;

#[async_trait]
impl PluginManager for NoopPluginManager {
    async fn load_new(&self, plugin_id: &str, new_spec: &ServiceSpec) -> SupervisionResult<()> {
        debug!(plugin_id, version = %new_spec.version, "load_new: no-op plugin manager");
        Ok(())
    }

    async fn drain(&self, plugin_id: &str, _timeout: Duration) -> SupervisionResult<()> {
        debug!(plugin_id, "drain: no-op plugin manager");
        Ok(())
    }

    async fn export_state(&self, plugin_id: &str) -> SupervisionResult<Vec<u8>> {
        debug!(plugin_id, "export_state: no-op plugin manager");
        Ok(Vec::new())
    }

    async fn import_state(&self, plugin_id: &str, _payload: Vec<u8>) -> SupervisionResult<()> {
        debug!(plugin_id, "import_state: no-op plugin manager");
        Ok(())
    }

    async fn unload_old(&self, plugin_id: &str) -> SupervisionResult<()> {
        debug!(plugin_id, "unload_old: no-op plugin manager");
        Ok(())
    }
}
