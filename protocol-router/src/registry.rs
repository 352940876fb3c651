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

use parking_lot::RwLock;
use std::collections::HashMap;
use supervision_common::{Endpoint, SupervisionError, SupervisionResult};

/// The service registry: a map `serviceName → [Endpoint]` behind a single
/// lock, read-mostly per the concurrency model's "endpoint registry lives
/// behind a single lock; `discoverService` is read-mostly" guidance.
#[derive(Default)]
pub struct ServiceRegistry {
    endpoints: RwLock<HashMap<String, Vec<Endpoint>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the endpoint set for a service.
    pub fn register_service(&self, name: &str, endpoint: Endpoint) {
        let mut endpoints = self.endpoints.write();
        let entry = endpoints.entry(name.to_string()).or_default();
        entry.retain(|e| e.socket_path != endpoint.socket_path || e.address != endpoint.address);
        entry.push(endpoint);
    }

    pub fn unregister_service(&self, name: &str) {
        self.endpoints.write().remove(name);
    }

    /// Best endpoint for a service: local sockets first, then remotes
    /// sorted by most recently updated metadata (§4.3 routing policy).
    pub fn discover_service(&self, name: &str) -> SupervisionResult<Endpoint> {
        let endpoints = self.endpoints.read();
        let candidates = endpoints
            .get(name)
            .filter(|list| !list.is_empty())
            .ok_or_else(|| SupervisionError::NotFound(format!("service not registered: {name}")))?;

        if let Some(local) = candidates.iter().find(|e| e.is_local) {
            return Ok(local.clone());
        }

        candidates
            .iter()
            .max_by_key(|e| e.last_updated)
            .cloned()
            .ok_or_else(|| SupervisionError::NotFound(format!("service not registered: {name}")))
    }

    pub fn list_services(&self) -> Vec<String> {
        self.endpoints.read().keys().cloned().collect()
    }

    pub fn endpoints_for(&self, name: &str) -> Vec<Endpoint> {
        self.endpoints.read().get(name).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    #[test]
    fn prefers_local_endpoint_over_remote() {
        let registry = ServiceRegistry::new();
        let remote = Endpoint::remote("svc", "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        let local = Endpoint::local("svc", "/tmp/svc.sock".into());
        registry.register_service("svc", remote);
        registry.register_service("svc", local.clone());

        let discovered = registry.discover_service("svc").unwrap();
        assert!(discovered.is_local);
        assert_eq!(discovered.socket_path, local.socket_path);
    }

    #[test]
    fn unregistered_service_is_not_found() {
        let registry = ServiceRegistry::new();
        assert!(matches!(
            registry.discover_service("missing"),
            Err(SupervisionError::NotFound(_))
        ));
    }

    #[test]
    fn picks_most_recently_updated_remote() {
        let registry = ServiceRegistry::new();
        let addr_a: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        let addr_b: SocketAddr = "127.0.0.1:9002".parse().unwrap();
        let mut older = Endpoint::remote("svc", addr_a);
        older.last_updated = chrono::Utc::now() - chrono::Duration::seconds(60);
        let newer = Endpoint::remote("svc", addr_b);

        registry.register_service("svc", older);
        registry.register_service("svc", newer.clone());

        let discovered = registry.discover_service("svc").unwrap();
        assert_eq!(discovered.address, newer.address);
    }
}
