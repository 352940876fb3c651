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

//! Shared types for the service supervision core: the data model (§3),
//! the error taxonomy (§7), configuration loading, tracing setup, and the
//! retry/backoff helper used by both the process supervisor and pool
//! clients.

pub mod config;
pub mod error;
pub mod model;
pub mod retry;
pub mod tracing;

pub use config::{ConfigLoader, SafeDisplay};
pub use error::{SupervisionError, SupervisionResult};
pub use model::{
    Endpoint, HostCapacity, Isolation, LastError, ResourceLimits, ResourceSpec, ServiceRecord,
    ServiceSpec, ServiceState,
};
pub use retry::RetryConfig;
pub use tracing::TracingConfig;
