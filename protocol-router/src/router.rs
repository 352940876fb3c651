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

use crate::registry::ServiceRegistry;
use bytes::Bytes;
use connection_pool::{PoolManager, PoolStats};
use resource_governor::{GovernorSnapshot, ResourceGovernor};
use std::sync::Arc;
use supervision_common::{Endpoint, SupervisionError, SupervisionResult};
use tracing::debug;

/// A parsed `/pkg.Service/Method` full method name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMethod {
    pub service: String,
    pub method: String,
}

pub fn parse_full_method(full_method: &str) -> SupervisionResult<ParsedMethod> {
    let trimmed = full_method.strip_prefix('/').unwrap_or(full_method);
    let (service, method) = trimmed.split_once('/').ok_or_else(|| {
        SupervisionError::InvalidArgument(format!("malformed method name: {full_method}"))
    })?;
    if service.is_empty() || method.is_empty() {
        return Err(SupervisionError::InvalidArgument(format!(
            "malformed method name: {full_method}"
        )));
    }
    Ok(ParsedMethod {
        service: service.to_string(),
        method: method.to_string(),
    })
}

/// Protocol Router (C3): the façade combining the service registry, the
/// pool manager, and the resource governor into the single
/// `routeRequest` entry point plugins and siblings call through.
#[derive(Clone)]
pub struct ProtocolRouter {
    registry: Arc<ServiceRegistry>,
    pools: PoolManager,
    governor: ResourceGovernor,
}

impl ProtocolRouter {
    pub fn new(governor: ResourceGovernor) -> Self {
        Self {
            registry: Arc::new(ServiceRegistry::new()),
            pools: PoolManager::new(governor.clone()),
            governor,
        }
    }

    pub fn register_service(&self, name: &str, endpoint: Endpoint) {
        self.registry.register_service(name, endpoint);
    }

    pub fn unregister_service(&self, name: &str) {
        self.registry.unregister_service(name);
    }

    pub fn discover_service(&self, name: &str) -> SupervisionResult<Endpoint> {
        self.registry.discover_service(name)
    }

    /// Single-attempt routing: parses `fullMethod`, resolves the
    /// endpoint, acquires the matching pool, and delegates to
    /// `pool.invoke`. No automatic cross-endpoint retries — callers own
    /// retry policy since idempotency is protocol-specific (§4.3).
    pub async fn route_request(
        &self,
        service: &str,
        full_method: &str,
        request: Bytes,
    ) -> SupervisionResult<Bytes> {
        let parsed = parse_full_method(full_method)?;
        if parsed.service != service {
            debug!(
                requested = service,
                parsed = %parsed.service,
                "routing by explicit service name, ignoring method's service segment mismatch"
            );
        }

        let endpoint = self.registry.discover_service(service)?;
        let pool = self.pools.get_or_create(&endpoint);
        pool.invoke(&parsed.method, request).await
    }

    pub fn update_resource_limits(&self, utilization_pct: u8) {
        self.governor.update_utilization(utilization_pct);
    }

    pub fn list_services(&self) -> Vec<String> {
        self.registry.list_services()
    }

    pub async fn get_pool_stats(&self) -> Vec<PoolStats> {
        self.pools.all_stats().await
    }

    pub fn get_resource_usage(&self) -> GovernorSnapshot {
        self.governor.snapshot()
    }

    pub async fn shutdown(&self) {
        self.pools.close_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_full_method() {
        let parsed = parse_full_method("/plugins.Storage/Get").unwrap();
        assert_eq!(parsed.service, "plugins.Storage");
        assert_eq!(parsed.method, "Get");
    }

    #[test]
    fn rejects_malformed_full_method() {
        assert!(parse_full_method("not-a-method").is_err());
        assert!(parse_full_method("/OnlyService").is_err());
    }

    #[tokio::test]
    async fn routing_to_unregistered_service_is_not_found() {
        let governor = ResourceGovernor::with_capacity(
            supervision_common::HostCapacity {
                cpu_cores: 2,
                memory_bytes: 1024 * 1024 * 1024,
                fd_soft_limit: 256,
            },
            100,
        );
        let router = ProtocolRouter::new(governor);
        let result = router
            .route_request("missing", "/missing.Svc/Method", Bytes::new())
            .await;
        assert!(matches!(result, Err(SupervisionError::NotFound(_))));
    }
}
