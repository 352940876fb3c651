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

//! Resource Governor (C1): detects host capacity once at construction,
//! derives connection/request ceilings from a runtime-adjustable
//! utilization percentage, and offers fast, non-blocking admission checks
//! to the connection pool and protocol router.

mod token_bucket;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use supervision_common::{HostCapacity, ResourceLimits, SupervisionError, SupervisionResult};
use token_bucket::TokenBucket;
use tracing::debug;

/// A point-in-time view of the governor's counters and derived limits,
/// returned by `snapshot()` for observability.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GovernorSnapshot {
    pub capacity: HostCapacity,
    pub limits: ResourceLimits,
    pub utilization_pct: u8,
    pub total_connections: u64,
    pub connections_per_service: HashMap<String, u64>,
    pub concurrent_requests: u64,
}

struct Inner {
    capacity: HostCapacity,
    limits: RwLock<ResourceLimits>,
    utilization_pct: AtomicU64,
    total_connections: AtomicU64,
    per_service_connections: Mutex<HashMap<String, u64>>,
    concurrent_requests: AtomicU64,
    request_bucket: Mutex<TokenBucket>,
}

/// Resource Governor (C1). Cheap to clone; all state lives behind `Arc`.
#[derive(Clone)]
pub struct ResourceGovernor {
    inner: Arc<Inner>,
}

fn derive_limits(capacity: HostCapacity, utilization_pct: u8) -> ResourceLimits {
    let u = utilization_pct.clamp(1, 100) as f64 / 100.0;
    // networkCap is a conservative ceiling on sockets not already bounded
    // by the FD soft limit; 65536 mirrors the typical ephemeral port range.
    let network_cap = 65536u64;
    let max_total_connections =
        (((capacity.fd_soft_limit / 4).min(network_cap)) as f64 * u).floor() as u64;
    let max_connections_per_service =
        (((capacity.cpu_cores * 2) as f64 * u).floor() as u64).max(1);
    let max_concurrent_requests = (((capacity.cpu_cores * 10) as f64 * u).floor() as u64).max(1);
    let max_requests_per_second = (((capacity.cpu_cores * 50) as f64 * u).floor() as u64).max(1);

    ResourceLimits {
        max_total_connections: max_total_connections.max(1),
        max_connections_per_service,
        max_concurrent_requests,
        max_requests_per_second,
        connection_idle_timeout: std::time::Duration::from_secs(5 * 60),
        connection_max_age: std::time::Duration::from_secs(30 * 60),
    }
}

impl ResourceGovernor {
    /// Detects host capacity via `sysinfo` and the OS's FD soft limit,
    /// then derives initial limits at the given utilization percentage.
    pub fn detect(initial_utilization_pct: u8) -> Self {
        let capacity = detect_host_capacity();
        Self::with_capacity(capacity, initial_utilization_pct)
    }

    pub fn with_capacity(capacity: HostCapacity, initial_utilization_pct: u8) -> Self {
        let utilization_pct = initial_utilization_pct.clamp(1, 100);
        let limits = derive_limits(capacity, utilization_pct);
        let bucket = TokenBucket::new(limits.max_requests_per_second as f64);
        Self {
            inner: Arc::new(Inner {
                capacity,
                limits: RwLock::new(limits),
                utilization_pct: AtomicU64::new(utilization_pct as u64),
                total_connections: AtomicU64::new(0),
                per_service_connections: Mutex::new(HashMap::new()),
                concurrent_requests: AtomicU64::new(0),
                request_bucket: Mutex::new(bucket),
            }),
        }
    }

    pub fn limits(&self) -> ResourceLimits {
        *self.inner.limits.read()
    }

    /// Recomputes every derived limit from the fixed detected capacity at
    /// a new utilization percentage (1..=100, clamped).
    pub fn update_utilization(&self, pct: u8) {
        let pct = pct.clamp(1, 100);
        let new_limits = derive_limits(self.inner.capacity, pct);
        self.inner.utilization_pct.store(pct as u64, Ordering::Release);
        self.inner.request_bucket.lock().set_rate(new_limits.max_requests_per_second as f64);
        *self.inner.limits.write() = new_limits;
        debug!(utilization_pct = pct, "resource governor limits updated");
    }

    /// Non-blocking admission check for creating a new connection to
    /// `service`, against both the per-service and global ceilings.
    pub fn can_create_connection(&self, service: &str) -> SupervisionResult<()> {
        let limits = self.limits();
        let total = self.inner.total_connections.load(Ordering::Acquire);
        if total >= limits.max_total_connections {
            return Err(SupervisionError::ResourceExhausted(format!(
                "global connection limit reached ({total}/{})",
                limits.max_total_connections
            )));
        }
        let per_service = self.inner.per_service_connections.lock();
        let current = per_service.get(service).copied().unwrap_or(0);
        if current >= limits.max_connections_per_service {
            return Err(SupervisionError::ResourceExhausted(format!(
                "connection limit for {service} reached ({current}/{})",
                limits.max_connections_per_service
            )));
        }
        Ok(())
    }

    /// Atomically checks and reserves one in-flight-request slot against
    /// the token bucket and the concurrency ceiling, so two callers racing
    /// at `max_concurrent_requests - 1` can't both be admitted (invariant
    /// `sum(activeRequests) <= maxConcurrentRequests` holds at every
    /// instant, not just between a separate check and increment). Callers
    /// must pair a successful reservation with `track_request_completed`.
    pub fn try_reserve_request_slot(&self) -> SupervisionResult<()> {
        let limits = self.limits();
        let reserved = self
            .inner
            .concurrent_requests
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                (v < limits.max_concurrent_requests).then_some(v + 1)
            });
        if let Err(in_flight) = reserved {
            return Err(SupervisionError::ResourceExhausted(format!(
                "concurrent request limit reached ({in_flight}/{})",
                limits.max_concurrent_requests
            )));
        }
        if !self.inner.request_bucket.lock().try_take(1.0) {
            self.track_request_completed();
            return Err(SupervisionError::ResourceExhausted(
                "request rate limit exceeded".to_string(),
            ));
        }
        Ok(())
    }

    pub fn track_connection_created(&self, service: &str) {
        self.inner.total_connections.fetch_add(1, Ordering::AcqRel);
        *self
            .inner
            .per_service_connections
            .lock()
            .entry(service.to_string())
            .or_insert(0) += 1;
    }

    pub fn track_connection_closed(&self, service: &str) {
        self.inner
            .total_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(v.saturating_sub(1)))
            .ok();
        let mut per_service = self.inner.per_service_connections.lock();
        if let Some(count) = per_service.get_mut(service) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn track_request_completed(&self) {
        self.inner
            .concurrent_requests
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(v.saturating_sub(1)))
            .ok();
    }

    pub fn snapshot(&self) -> GovernorSnapshot {
        GovernorSnapshot {
            capacity: self.inner.capacity,
            limits: self.limits(),
            utilization_pct: self.inner.utilization_pct.load(Ordering::Acquire) as u8,
            total_connections: self.inner.total_connections.load(Ordering::Acquire),
            connections_per_service: self.inner.per_service_connections.lock().clone(),
            concurrent_requests: self.inner.concurrent_requests.load(Ordering::Acquire),
        }
    }
}

fn detect_host_capacity() -> HostCapacity {
    let cpu_cores = std::thread::available_parallelism()
        .map(|n| n.get() as u64)
        .unwrap_or(1)
        .max(1);

    let mut system = sysinfo::System::new();
    system.refresh_memory();
    let memory_bytes = if system.total_memory() > 0 {
        system.total_memory()
    } else {
        // Conservative default when the OS inquiry fails or reports zero.
        2 * 1024 * 1024 * 1024
    };

    // sysinfo does not expose the FD soft limit; a conservative default
    // matching most container/cgroup defaults stands in for the OS
    // inquiry the spec describes.
    let fd_soft_limit = 1024;

    HostCapacity {
        cpu_cores,
        memory_bytes,
        fd_soft_limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_capacity() -> HostCapacity {
        HostCapacity {
            cpu_cores: 4,
            memory_bytes: 8 * 1024 * 1024 * 1024,
            fd_soft_limit: 1024,
        }
    }

    #[test]
    fn derives_limits_scaled_by_utilization() {
        let gov = ResourceGovernor::with_capacity(test_capacity(), 100);
        let full = gov.limits();
        gov.update_utilization(50);
        let half = gov.limits();
        assert!(half.max_concurrent_requests < full.max_concurrent_requests);
        assert!(half.max_requests_per_second < full.max_requests_per_second);
    }

    #[test]
    fn admission_denies_once_per_service_ceiling_reached() {
        let gov = ResourceGovernor::with_capacity(test_capacity(), 100);
        let limit = gov.limits().max_connections_per_service;
        for _ in 0..limit {
            gov.can_create_connection("svc").expect("should admit");
            gov.track_connection_created("svc");
        }
        assert!(gov.can_create_connection("svc").is_err());
    }

    #[test]
    fn closing_a_connection_frees_capacity() {
        let gov = ResourceGovernor::with_capacity(test_capacity(), 100);
        let limit = gov.limits().max_connections_per_service;
        for _ in 0..limit {
            gov.track_connection_created("svc");
        }
        assert!(gov.can_create_connection("svc").is_err());
        gov.track_connection_closed("svc");
        assert!(gov.can_create_connection("svc").is_ok());
    }

    #[test]
    fn request_admission_respects_concurrency_ceiling() {
        let gov = ResourceGovernor::with_capacity(test_capacity(), 100);
        let limit = gov.limits().max_concurrent_requests;
        for _ in 0..limit {
            gov.try_reserve_request_slot().expect("should admit");
        }
        assert!(matches!(
            gov.try_reserve_request_slot(),
            Err(SupervisionError::ResourceExhausted(_))
        ));
        gov.track_request_completed();
        assert!(gov.try_reserve_request_slot().is_ok());
    }

    #[test]
    fn concurrent_reservations_never_exceed_the_ceiling() {
        use std::sync::atomic::AtomicUsize;

        let gov = ResourceGovernor::with_capacity(test_capacity(), 100);
        let limit = gov.limits().max_concurrent_requests as usize;

        let admitted = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for _ in 0..(limit * 4) {
                scope.spawn(|| {
                    if gov.try_reserve_request_slot().is_ok() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), limit);
    }

    #[test]
    fn snapshot_reports_current_counters() {
        let gov = ResourceGovernor::with_capacity(test_capacity(), 100);
        gov.track_connection_created("svc");
        gov.try_reserve_request_slot().expect("should admit");
        let snap = gov.snapshot();
        assert_eq!(snap.total_connections, 1);
        assert_eq!(snap.concurrent_requests, 1);
        assert_eq!(snap.connections_per_service.get("svc"), Some(&1));
    }
}
