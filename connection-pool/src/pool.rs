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

use crate::channel::PooledChannel;
use crate::transport::{dial_tcp, dial_uds};
use bytes::Bytes;
use resource_governor::ResourceGovernor;
use serde::Serialize;
use std::time::{Duration, Instant};
use supervision_common::{Endpoint, SupervisionError, SupervisionResult};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, Serialize)]
pub struct PoolStats {
    pub service_name: String,
    pub size: usize,
    pub healthy_count: usize,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub avg_latency: Duration,
}

/// One pool per `(serviceName, endpoint)` (§4.2). Leases, dispatches, and
/// releases atomically with respect to the resource governor's counters.
pub struct ConnectionPool {
    service_name: String,
    endpoint: Endpoint,
    governor: ResourceGovernor,
    channels: Mutex<Vec<PooledChannel>>,
    cancel: CancellationToken,
}

impl ConnectionPool {
    pub fn new(service_name: impl Into<String>, endpoint: Endpoint, governor: ResourceGovernor) -> Self {
        Self {
            service_name: service_name.into(),
            endpoint,
            governor,
            channels: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Spawns the background eviction loop. Call once per pool; the
    /// returned handle's lifetime is tied to `close()`.
    pub fn spawn_health_loop(self: &std::sync::Arc<Self>) {
        let pool = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_CHECK_INTERVAL);
            loop {
                tokio::select! {
                    _ = pool.cancel.cancelled() => break,
                    _ = ticker.tick() => pool.evict_stale().await,
                }
            }
        });
    }

    async fn evict_stale(&self) {
        let limits = self.governor.limits();
        let mut channels = self.channels.lock().await;
        let before = channels.len();
        let mut retained = Vec::with_capacity(channels.len());
        for channel in channels.drain(..) {
            let stale = channel.is_stale(limits.connection_idle_timeout, limits.connection_max_age);
            if stale || !channel.is_healthy() {
                channel.transport.close().await;
                self.governor.track_connection_closed(&self.service_name);
            } else {
                retained.push(channel);
            }
        }
        *channels = retained;
        let evicted = before - channels.len();
        if evicted > 0 {
            debug!(service = %self.service_name, evicted, "evicted stale/unhealthy pooled channels");
        }
    }

    async fn dial(&self) -> SupervisionResult<std::sync::Arc<dyn crate::transport::PluginTransport>> {
        if self.endpoint.is_local {
            let path = self.endpoint.socket_path.as_ref().ok_or_else(|| {
                SupervisionError::Internal("local endpoint missing socket path".to_string())
            })?;
            dial_uds(path).await
        } else {
            let addr = self.endpoint.address.ok_or_else(|| {
                SupervisionError::Internal("remote endpoint missing address".to_string())
            })?;
            dial_tcp(addr).await
        }
    }

    /// Lease algorithm (§4.2): prefer the least-loaded healthy channel,
    /// dialing a new one only if under the per-service ceiling.
    async fn lease(&self) -> SupervisionResult<usize> {
        let mut channels = self.channels.lock().await;

        let mut best: Option<usize> = None;
        for (i, channel) in channels.iter().enumerate() {
            if !channel.is_healthy() {
                continue;
            }
            best = Some(match best {
                None => i,
                Some(b) => {
                    let current = &channels[b];
                    if channel.active_requests < current.active_requests
                        || (channel.active_requests == current.active_requests
                            && channel.last_used_at < current.last_used_at)
                    {
                        i
                    } else {
                        b
                    }
                }
            });
        }

        if best.is_none() {
            let limit = self.governor.limits().max_connections_per_service as usize;
            if channels.len() < limit {
                self.governor.can_create_connection(&self.service_name)?;
                let transport = self.dial().await?;
                self.governor.track_connection_created(&self.service_name);
                channels.push(PooledChannel::new(transport));
                best = Some(channels.len() - 1);
            }
        }

        let idx = best.ok_or_else(|| {
            SupervisionError::ResourceExhausted(format!(
                "no capacity in pool for {}",
                self.service_name
            ))
        })?;

        channels[idx].active_requests += 1;
        channels[idx].last_used_at = chrono::Utc::now();
        Ok(idx)
    }

    async fn release(&self, idx: usize, latency: Duration, failed: bool) {
        let mut channels = self.channels.lock().await;
        if let Some(channel) = channels.get_mut(idx) {
            channel.active_requests = channel.active_requests.saturating_sub(1);
            channel.record_completion(latency, failed);
        }
    }

    /// The only public operation combining lease, dispatch, and release.
    pub async fn invoke(&self, method: &str, request: Bytes) -> SupervisionResult<Bytes> {
        self.governor.try_reserve_request_slot()?;

        let idx = match self.lease().await {
            Ok(idx) => idx,
            Err(e) => {
                self.governor.track_request_completed();
                return Err(e);
            }
        };

        let transport = {
            let channels = self.channels.lock().await;
            channels[idx].transport.clone()
        };

        let start = Instant::now();
        let result = transport.invoke(method, request).await;
        let latency = start.elapsed();
        self.release(idx, latency, result.is_err()).await;
        self.governor.track_request_completed();
        result
    }

    pub async fn stats(&self) -> PoolStats {
        let channels = self.channels.lock().await;
        let healthy_count = channels.iter().filter(|c| c.is_healthy()).count();
        let total_requests: u64 = channels.iter().map(|c| c.total_requests).sum();
        let failed_requests: u64 = channels.iter().map(|c| c.failed_requests).sum();
        let avg_latency = if channels.is_empty() {
            Duration::ZERO
        } else {
            channels.iter().map(|c| c.avg_latency).sum::<Duration>() / channels.len() as u32
        };
        PoolStats {
            service_name: self.service_name.clone(),
            size: channels.len(),
            healthy_count,
            total_requests,
            failed_requests,
            avg_latency,
        }
    }

    /// Drains the health-check loop and closes every channel.
    pub async fn close(&self) {
        self.cancel.cancel();
        let mut channels = self.channels.lock().await;
        for channel in channels.drain(..) {
            channel.transport.close().await;
            self.governor.track_connection_closed(&self.service_name);
        }
        info!(service = %self.service_name, "connection pool closed");
    }
}
