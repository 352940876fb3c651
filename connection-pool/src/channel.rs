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

use crate::transport::PluginTransport;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// One leasable connection inside a pool. Owned exclusively by its pool;
/// every mutation happens under the pool's lock.
pub struct PooledChannel {
    pub id: uuid::Uuid,
    pub transport: Arc<dyn PluginTransport>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub active_requests: u32,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub avg_latency: Duration,
}

impl PooledChannel {
    pub fn new(transport: Arc<dyn PluginTransport>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4(),
            transport,
            created_at: now,
            last_used_at: now,
            active_requests: 0,
            total_requests: 0,
            failed_requests: 0,
            avg_latency: Duration::ZERO,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.transport.is_healthy()
    }

    pub fn is_stale(&self, idle_timeout: Duration, max_age: Duration) -> bool {
        let now = Utc::now();
        let age = now.signed_duration_since(self.created_at);
        let idle = now.signed_duration_since(self.last_used_at);
        age > chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::max_value())
            || idle
                > chrono::Duration::from_std(idle_timeout).unwrap_or(chrono::Duration::max_value())
    }

    /// Folds a completed request's outcome and latency into the channel's
    /// running stats. Latency is folded as `(avg + sample) / 2`, matching
    /// the spec's deliberately history-free rolling average.
    pub fn record_completion(&mut self, latency: Duration, failed: bool) {
        self.total_requests += 1;
        if failed {
            self.failed_requests += 1;
        }
        self.avg_latency = (self.avg_latency + latency) / 2;
        self.last_used_at = Utc::now();
    }
}
