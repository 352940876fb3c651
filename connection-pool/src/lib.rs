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

//! Connection Pool (C2): one pool per `(serviceName, endpoint)`, dialed
//! over a Unix-domain socket or TCP address behind a common
//! [`transport::PluginTransport`] trait, health-checked on a 30 second
//! loop, leased under the resource governor's admission checks.

pub mod channel;
pub mod manager;
pub mod pool;
pub mod transport;

pub use channel::PooledChannel;
pub use manager::PoolManager;
pub use pool::{ConnectionPool, PoolStats};
pub use transport::PluginTransport;
