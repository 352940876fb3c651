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
use supervision_common::SupervisionResult;

/// A `MigrationEntry` (§3): registered before a hot-swap, it rewrites a
/// snapshot's payload across a specific version transition.
#[async_trait]
pub trait Migrator: Send + Sync {
    fn can_migrate(&self, from: &str, to: &str) -> bool;
    async fn migrate(&self, payload: Vec<u8>) -> SupervisionResult<Vec<u8>>;
}
