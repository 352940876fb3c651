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

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use supervision_common::ServiceSpec;
use uuid::Uuid;

/// `{id, pluginID, snapshotRef, createdAt}` (§3). `old_spec` is carried
/// alongside `snapshotRef` (here `old_version`, the state-store version to
/// restore) so a rollback can relaunch the exact binary that was running
/// before the swap, not just reload its state.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    pub id: Uuid,
    pub plugin_id: String,
    pub old_spec: ServiceSpec,
    pub old_version: String,
    pub created_at: DateTime<Utc>,
}

/// Short-lived checkpoint bookkeeping for in-flight hot-swaps. A checkpoint
/// exists only for the duration of one `hotSwap` call (§3: "short-lived").
#[derive(Default)]
pub struct RollbackManager {
    checkpoints: Mutex<HashMap<Uuid, Checkpoint>>,
}

impl RollbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoint(&self, plugin_id: &str, old_spec: ServiceSpec, old_version: String) -> Checkpoint {
        let checkpoint = Checkpoint {
            id: Uuid::new_v4(),
            plugin_id: plugin_id.to_string(),
            old_spec,
            old_version,
            created_at: Utc::now(),
        };
        self.checkpoints.lock().insert(checkpoint.id, checkpoint.clone());
        checkpoint
    }

    pub fn discard(&self, id: Uuid) {
        self.checkpoints.lock().remove(&id);
    }
}
