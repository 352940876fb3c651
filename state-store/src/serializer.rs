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

use supervision_common::{SupervisionError, SupervisionResult};

/// A process-wide, pluggable value injected at `StateStore` construction.
/// JSON is the default; alternative implementations (e.g. a binary
/// format) only need to round-trip through `serde_json::Value`.
pub trait StateSerializer: Send + Sync {
    fn serialize(&self, value: &serde_json::Value) -> SupervisionResult<Vec<u8>>;
    fn deserialize(&self, bytes: &[u8]) -> SupervisionResult<serde_json::Value>;
}

#[derive(Default)]
pub struct JsonSerializer;

impl StateSerializer for JsonSerializer {
    fn serialize(&self, value: &serde_json::Value) -> SupervisionResult<Vec<u8>> {
        serde_json::to_vec(value)
            .map_err(|e| SupervisionError::Internal(format!("serialize failed: {e}")))
    }

    fn deserialize(&self, bytes: &[u8]) -> SupervisionResult<serde_json::Value> {
        serde_json::from_slice(bytes).map_err(|e| SupervisionError::Corrupt(e.to_string()))
    }
}
