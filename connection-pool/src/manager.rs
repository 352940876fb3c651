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

use crate::pool::ConnectionPool;
use parking_lot::RwLock;
use resource_governor::ResourceGovernor;
use std::collections::HashMap;
use std::sync::Arc;
use supervision_common::Endpoint;

fn pool_key(endpoint: &Endpoint) -> String {
    match (&endpoint.socket_path, &endpoint.address) {
        (Some(path), _) => format!("{}:uds:{}", endpoint.service_name, path.display()),
        (None, Some(addr)) => format!("{}:tcp:{addr}", endpoint.service_name),
        (None, None) => format!("{}:unresolved", endpoint.service_name),
    }
}

/// Memoized map from `(serviceName, endpoint)` to its pool, shared by the
/// protocol router so repeated `routeRequest` calls reuse pools instead of
/// dialing fresh ones.
#[derive(Clone)]
pub struct PoolManager {
    governor: ResourceGovernor,
    pools: Arc<RwLock<HashMap<String, Arc<ConnectionPool>>>>,
}

impl PoolManager {
    pub fn new(governor: ResourceGovernor) -> Self {
        Self {
            governor,
            pools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the existing pool for this endpoint, or creates, registers,
    /// and starts a new one.
    pub fn get_or_create(&self, endpoint: &Endpoint) -> Arc<ConnectionPool> {
        let key = pool_key(endpoint);
        if let Some(pool) = self.pools.read().get(&key) {
            return pool.clone();
        }
        let mut pools = self.pools.write();
        if let Some(pool) = pools.get(&key) {
            return pool.clone();
        }
        let pool = Arc::new(ConnectionPool::new(
            endpoint.service_name.clone(),
            endpoint.clone(),
            self.governor.clone(),
        ));
        pool.spawn_health_loop();
        pools.insert(key, pool.clone());
        pool
    }

    pub fn remove(&self, endpoint: &Endpoint) -> Option<Arc<ConnectionPool>> {
        self.pools.write().remove(&pool_key(endpoint))
    }

    pub async fn close_all(&self) {
        let pools: Vec<_> = self.pools.write().drain().map(|(_, v)| v).collect();
        for pool in pools {
            pool.close().await;
        }
    }

    pub async fn all_stats(&self) -> Vec<crate::pool::PoolStats> {
        let pools: Vec<_> = self.pools.read().values().cloned().collect();
        let mut stats = Vec::with_capacity(pools.len());
        for pool in pools {
            stats.push(pool.stats().await);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use supervision_common::HostCapacity;

    fn test_governor() -> ResourceGovernor {
        ResourceGovernor::with_capacity(
            HostCapacity {
                cpu_cores: 2,
                memory_bytes: 1024 * 1024 * 1024,
                fd_soft_limit: 256,
            },
            100,
        )
    }

    #[tokio::test]
    async fn reuses_pool_for_same_endpoint() {
        let manager = PoolManager::new(test_governor());
        let endpoint = Endpoint::local("svc", "/tmp/svc.sock".into());
        let a = manager.get_or_create(&endpoint);
        let b = manager.get_or_create(&endpoint);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn distinct_endpoints_get_distinct_pools() {
        let manager = PoolManager::new(test_governor());
        let a = manager.get_or_create(&Endpoint::local("svc", "/tmp/a.sock".into()));
        let b = manager.get_or_create(&Endpoint::local("svc", "/tmp/b.sock".into()));
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
