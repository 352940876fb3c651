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
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU8, Ordering};
use std::time::Duration;

/// How a service's process is isolated from its siblings. `Process` is the
/// only mode implemented today; the enum exists so a future container or
/// jail mode is additive rather than a breaking change to `ServiceSpec`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Isolation {
    #[default]
    Process,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub cpu_share_pct: u8,
    pub memory_mb: u32,
    pub io_weight: u16,
    pub max_fds: u32,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            cpu_share_pct: 100,
            memory_mb: 0,
            io_weight: 100,
            max_fds: 1024,
        }
    }
}

/// Immutable declaration of a service. Created once by config load (or
/// discovery, §4.7) and never mutated after it is accepted into the
/// service table — a config change always yields a new `ServiceSpec`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub version: String,
    pub binary_path: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub work_dir: PathBuf,
    pub isolation: Isolation,
    pub resources: ResourceSpec,
    pub dependencies: Vec<String>,
    pub auto_restart: bool,
    pub health_check_interval: Duration,
    pub peer_timeout: Duration,
    pub enabled: bool,
}

impl ServiceSpec {
    /// Returns the fields whose change between two specs for the same
    /// `name` is "material" per §4.7's reconciliation rule — a change in
    /// any of them demands a restart rather than an in-place spec swap.
    pub fn materially_differs_from(&self, other: &ServiceSpec) -> bool {
        self.binary_path != other.binary_path
            || self.args != other.args
            || self.env != other.env
            || self.isolation != other.isolation
            || self.resources != other.resources
    }
}

/// The runtime state machine a `ServiceRecord` moves through. See §4.7 for
/// the full transition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ServiceState {
    Unknown = 0,
    Loaded = 1,
    Starting = 2,
    Running = 3,
    Stopping = 4,
    Stopped = 5,
    Restarting = 6,
    Failed = 7,
}

impl ServiceState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ServiceState::Loaded,
            2 => ServiceState::Starting,
            3 => ServiceState::Running,
            4 => ServiceState::Stopping,
            5 => ServiceState::Stopped,
            6 => ServiceState::Restarting,
            7 => ServiceState::Failed,
            _ => ServiceState::Unknown,
        }
    }

    /// True for the states §3 invariant 3 calls "no active supervisor".
    pub fn is_terminal_for_supervision(&self) -> bool {
        matches!(
            self,
            ServiceState::Stopped | ServiceState::Failed | ServiceState::Unknown
        )
    }
}

/// Exit information recorded the last time the child process stopped,
/// whether cleanly or not.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LastError {
    pub exit_code: Option<i32>,
    pub message: String,
    pub pid: i32,
    pub recorded_at: DateTime<Utc>,
}

/// Mutable runtime state for one service, shared between the process
/// orchestrator (C7) and its supervisor task (C6) via `Arc`. `state`,
/// `pid`, and `restarts` are plain atomics so the supervisor can read and
/// write them without ever taking the orchestrator's table lock, per the
/// concurrency model's "atomics for hot record fields" design note.
/// Long-form fields that only change under the table lock — `startedAt`,
/// `lastError` — are not part of this type; the orchestrator keeps those
/// in its own table entry, since `Arc<ServiceRecord>` cannot hand out the
/// `&mut` they'd need.
#[derive(Debug)]
pub struct ServiceRecord {
    pub spec: ServiceSpec,
    state: AtomicU8,
    pid: AtomicI32,
    restarts: AtomicU32,
}

impl ServiceRecord {
    pub fn new(spec: ServiceSpec) -> Self {
        Self {
            spec,
            state: AtomicU8::new(ServiceState::Loaded as u8),
            pid: AtomicI32::new(0),
            restarts: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> ServiceState {
        ServiceState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ServiceState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn pid(&self) -> i32 {
        self.pid.load(Ordering::Acquire)
    }

    pub fn set_pid(&self, pid: i32) {
        self.pid.store(pid, Ordering::Release);
    }

    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::Acquire)
    }

    pub fn increment_restarts(&self) -> u32 {
        self.restarts.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn reset_restarts(&self) {
        self.restarts.store(0, Ordering::Release);
    }

    /// Invariant 2: `state = Running ⇒ pid > 0`.
    pub fn is_consistent(&self) -> bool {
        self.state() != ServiceState::Running || self.pid() > 0
    }
}

/// A registered address for a service, owned by the protocol router's
/// registry. Exactly one of `socket_path`/`address` is set, matching
/// `is_local`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub service_name: String,
    pub socket_path: Option<PathBuf>,
    pub address: Option<SocketAddr>,
    pub is_local: bool,
    pub metadata: HashMap<String, String>,
    pub last_updated: DateTime<Utc>,
}

impl Endpoint {
    pub fn local(service_name: impl Into<String>, socket_path: PathBuf) -> Self {
        Self {
            service_name: service_name.into(),
            socket_path: Some(socket_path),
            address: None,
            is_local: true,
            metadata: HashMap::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn remote(service_name: impl Into<String>, address: SocketAddr) -> Self {
        Self {
            service_name: service_name.into(),
            socket_path: None,
            address: Some(address),
            is_local: false,
            metadata: HashMap::new(),
            last_updated: Utc::now(),
        }
    }
}

/// Derived, runtime-adjustable connection/request ceilings (§4.1).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_total_connections: u64,
    pub max_connections_per_service: u64,
    pub max_concurrent_requests: u64,
    pub max_requests_per_second: u64,
    pub connection_idle_timeout: Duration,
    pub connection_max_age: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_total_connections: 1,
            max_connections_per_service: 1,
            max_concurrent_requests: 1,
            max_requests_per_second: 1,
            connection_idle_timeout: Duration::from_secs(5 * 60),
            connection_max_age: Duration::from_secs(30 * 60),
        }
    }
}

/// Detected host capacity, the input to `ResourceLimits` derivation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostCapacity {
    pub cpu_cores: u64,
    pub memory_bytes: u64,
    pub fd_soft_limit: u64,
}
