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

//! The `supervisor-service` composition root: constructs every component
//! of the Service Supervision Core in dependency order (C1 through C8)
//! and hands back a single [`Services`] struct the binary's `main.rs`
//! holds for the life of the process, mirroring the teacher's
//! `cloud-service::bootstrap::Services` shape.

pub mod config;

use config::SupervisorConfig;
use hot_swap_coordinator::{HotSwapCoordinator, NoopPluginManager, PluginManager};
use lifecycle_hooks::LifecycleManager;
use process_orchestrator::{OrchestratorConfig, ProcessOrchestrator};
use protocol_router::ProtocolRouter;
use resource_governor::ResourceGovernor;
use state_store::{FileBackend, StateStore};
use std::sync::Arc;

/// Every component of the core, wired together and ready to drive.
/// `Clone` is cheap: everything inside is already `Arc`-backed.
#[derive(Clone)]
pub struct Services {
    pub governor: ResourceGovernor,
    pub router: Arc<ProtocolRouter>,
    pub hooks: Arc<LifecycleManager>,
    pub state_store: Arc<StateStore>,
    pub orchestrator: Arc<ProcessOrchestrator>,
    pub hot_swap: Arc<HotSwapCoordinator>,
}

impl Services {
    /// Builds every component in the order data flows through them
    /// (§2): C1 has no dependencies, C2/C3 depend on C1, C4/C5 are
    /// independent of the rest, C6 is owned internally by C7, C7 depends
    /// on C4, and C8 depends on C5 and C7.
    pub fn new(config: &SupervisorConfig) -> Self {
        Self::with_plugin_manager(config, Arc::new(NoopPluginManager))
    }

    /// Same wiring as [`Services::new`], but with an injected
    /// `PluginManager` for callers that speak a concrete plugin wire
    /// protocol rather than the `NoopPluginManager` development stand-in
    /// (§9's "avoided source idioms": no singleton factory, an explicit
    /// constructor parameter instead).
    pub fn with_plugin_manager(config: &SupervisorConfig, plugin_manager: Arc<dyn PluginManager>) -> Self {
        let governor = ResourceGovernor::detect(config.utilization_pct);
        let router = Arc::new(ProtocolRouter::new(governor.clone()));
        let hooks = Arc::new(LifecycleManager::new());

        let backend = Arc::new(FileBackend::new(config.state_dir.clone()));
        let state_store = Arc::new(StateStore::new(backend));

        let orchestrator = Arc::new(ProcessOrchestrator::new(
            OrchestratorConfig {
                services_dir: config.services_dir.clone(),
                socket_dir: config.socket_dir.clone(),
                work_dir_root: config.work_dir_root.clone(),
                shutdown_timeout: config.shutdown_timeout,
                restart_policy: config.restart_policy(),
            },
            hooks.clone(),
        ));

        let hot_swap = Arc::new(HotSwapCoordinator::new(
            orchestrator.clone(),
            state_store.clone(),
            plugin_manager,
        ));

        Self {
            governor,
            router,
            hooks,
            state_store,
            orchestrator,
            hot_swap,
        }
    }

    /// Discovers installed binaries under `services_dir` and loads each
    /// as a `Loaded` spec not yet started (§4.7). Callers decide whether
    /// to `start_all` afterward or start services selectively.
    pub fn discover_and_load(&self) {
        for spec in self.orchestrator.discover() {
            self.orchestrator.load(spec);
        }
    }

    /// Graceful termination of the whole composition: stops every
    /// running service (which also sets the shutdown flag so no
    /// supervisor reschedules a restart mid-drain, testable property 9)
    /// and closes every connection pool.
    pub async fn shutdown(&self, deadline: std::time::Duration) {
        self.orchestrator.shutdown(deadline).await;
        self.router.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> (tempfile::TempDir, SupervisorConfig) {
        let dir = tempfile::tempdir().unwrap();
        let config = SupervisorConfig {
            services_dir: dir.path().join("services"),
            socket_dir: dir.path().join("sockets"),
            work_dir_root: dir.path().join("data"),
            state_dir: dir.path().join("state"),
            ..SupervisorConfig::default()
        };
        (dir, config)
    }

    #[test]
    fn wires_every_component_without_panicking() {
        let (_dir, config) = test_config();
        let services = Services::new(&config);
        assert!(services.orchestrator.get_all_services().is_empty());
        assert!(services.router.list_services().is_empty());
    }

    #[tokio::test]
    async fn discover_and_load_is_a_noop_when_services_dir_is_empty() {
        let (_dir, config) = test_config();
        let services = Services::new(&config);
        services.discover_and_load();
        assert!(services.orchestrator.get_all_services().is_empty());
    }

    #[tokio::test]
    async fn shutdown_completes_with_nothing_running() {
        let (_dir, config) = test_config();
        let services = Services::new(&config);
        services
            .shutdown(std::time::Duration::from_millis(100))
            .await;
    }
}
