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

//! Hot-Swap Coordinator (C8): zero-downtime replacement of a running
//! service's binary. Drives checkpoint/load-new/drain/export/migrate/swap/
//! unload through C7 (`process-orchestrator`) and C5 (`state-store`),
//! rolling back to the checkpointed version on any failure from steps 3
//! through 7 (§4.8).

mod plugin_manager;
mod rollback;

pub use plugin_manager::{NoopPluginManager, PluginManager};
pub use rollback::{Checkpoint, RollbackManager};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use process_orchestrator::ProcessOrchestrator;
use serde::{Deserialize, Serialize};
use state_store::StateStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use supervision_common::{ServiceSpec, ServiceState, SupervisionError, SupervisionResult};
use tracing::{info, warn};
use uuid::Uuid;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// The `HotSwapOperation` state machine (§3, §4.8).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HotSwapStatus {
    Pending,
    Draining,
    Loading,
    Swapping,
    Completed,
    RolledBack,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HotSwapOperation {
    pub id: Uuid,
    pub plugin_id: String,
    pub old_version: String,
    pub new_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: HotSwapStatus,
    pub error: Option<String>,
}

impl HotSwapOperation {
    fn new(plugin_id: String, old_version: String, new_version: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            plugin_id,
            old_version,
            new_version,
            started_at: Utc::now(),
            finished_at: None,
            status: HotSwapStatus::Pending,
            error: None,
        }
    }
}

pub struct HotSwapCoordinator {
    orchestrator: Arc<ProcessOrchestrator>,
    state_store: Arc<StateStore>,
    plugin_manager: Arc<dyn PluginManager>,
    rollback: RollbackManager,
    in_flight: Mutex<HashSet<String>>,
}

impl HotSwapCoordinator {
    pub fn new(
        orchestrator: Arc<ProcessOrchestrator>,
        state_store: Arc<StateStore>,
        plugin_manager: Arc<dyn PluginManager>,
    ) -> Self {
        Self {
            orchestrator,
            state_store,
            plugin_manager,
            rollback: RollbackManager::new(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// `hotSwap(pluginID, newSpec)` (§4.8). Returns the final
    /// `HotSwapOperation` regardless of outcome; a `Completed`, `RolledBack`,
    /// or `Failed` status is not itself an `Err` — only a precondition
    /// violation (not running, operation already in flight) is.
    pub async fn hot_swap(&self, plugin_id: &str, new_spec: ServiceSpec) -> SupervisionResult<HotSwapOperation> {
        // Step 1: precondition.
        if self.orchestrator.status(plugin_id)? != ServiceState::Running {
            return Err(SupervisionError::InvalidArgument(format!(
                "{plugin_id} is not running, cannot hot-swap"
            )));
        }
        {
            let mut in_flight = self.in_flight.lock();
            if !in_flight.insert(plugin_id.to_string()) {
                return Err(SupervisionError::AlreadyExists(format!(
                    "hot-swap already in flight for {plugin_id}"
                )));
            }
        }

        let result = self.run(plugin_id, new_spec).await;
        self.in_flight.lock().remove(plugin_id);
        result
    }

    async fn run(&self, plugin_id: &str, new_spec: ServiceSpec) -> SupervisionResult<HotSwapOperation> {
        let old_spec = self.orchestrator.get_spec(plugin_id)?;
        let old_version = old_spec.version.clone();
        let new_version = new_spec.version.clone();
        let mut op = HotSwapOperation::new(plugin_id.to_string(), old_version.clone(), new_version.clone());

        // Step 2: checkpoint.
        let checkpoint = self.rollback.checkpoint(plugin_id, old_spec.clone(), old_version.clone());

        match self.drive(plugin_id, &new_spec, &old_version, &new_version, &mut op).await {
            Ok(()) => {
                self.rollback.discard(checkpoint.id);
                op.status = HotSwapStatus::Completed;
                op.finished_at = Some(Utc::now());
                info!(plugin_id, old_version = %old_version, new_version = %new_version, "hot-swap completed");
                Ok(op)
            }
            Err(e) => {
                warn!(plugin_id, error = %e, "hot-swap failed, rolling back");
                match self.perform_rollback(plugin_id, &checkpoint).await {
                    Ok(()) => {
                        op.status = HotSwapStatus::RolledBack;
                        op.error = Some(e.to_string());
                    }
                    Err(rollback_err) => {
                        op.status = HotSwapStatus::Failed;
                        op.error = Some(format!("swap failed: {e}; rollback also failed: {rollback_err}"));
                    }
                }
                op.finished_at = Some(Utc::now());
                self.rollback.discard(checkpoint.id);
                Ok(op)
            }
        }
    }

    /// Steps 3-8. Any `Err` here is the trigger for rollback; the caller
    /// never surfaces this error directly (§4.8's failure behavior turns it
    /// into a `RolledBack` or `Failed` operation, not a propagated `Err`).
    async fn drive(
        &self,
        plugin_id: &str,
        new_spec: &ServiceSpec,
        old_version: &str,
        new_version: &str,
        op: &mut HotSwapOperation,
    ) -> SupervisionResult<()> {
        // Step 3: load-new.
        op.status = HotSwapStatus::Loading;
        self.plugin_manager.load_new(plugin_id, new_spec).await?;

        // Step 4: drain.
        op.status = HotSwapStatus::Draining;
        self.plugin_manager.drain(plugin_id, DRAIN_TIMEOUT).await?;

        // Step 5: export and save as (pluginID, oldVersion).
        let exported = self.plugin_manager.export_state(plugin_id).await?;
        self.state_store.save(plugin_id, old_version, &exported).await?;

        // Step 6: migrate.
        let migrated = self.state_store.migrate(plugin_id, old_version, new_version).await?;

        // Step 7: swap.
        op.status = HotSwapStatus::Swapping;
        self.orchestrator.stop(plugin_id).await?;
        self.orchestrator.load(new_spec.clone());
        self.orchestrator.start(plugin_id).await?;
        self.plugin_manager.import_state(plugin_id, migrated).await?;

        // Step 8: unload-old.
        self.plugin_manager.unload_old(plugin_id).await?;

        Ok(())
    }

    /// "Stop whatever was started, restart the old process from the
    /// checkpoint's state reference" (§4.8). Best-effort unload of whatever
    /// the plugin manager staged; failure there does not itself fail the
    /// rollback, since the orchestrator restoring the old spec is the part
    /// that actually matters to callers.
    async fn perform_rollback(&self, plugin_id: &str, checkpoint: &Checkpoint) -> SupervisionResult<()> {
        if let Err(e) = self.plugin_manager.unload_old(plugin_id).await {
            warn!(plugin_id, error = %e, "best-effort cleanup of staged new version failed during rollback");
        }

        if matches!(
            self.orchestrator.status(plugin_id),
            Ok(ServiceState::Running | ServiceState::Starting | ServiceState::Restarting)
        ) {
            self.orchestrator.stop(plugin_id).await?;
        }

        self.orchestrator.load(checkpoint.old_spec.clone());
        self.orchestrator.start(plugin_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifecycle_hooks::LifecycleManager;
    use process_orchestrator::OrchestratorConfig;
    use state_store::MemoryBackend;
    use std::collections::HashMap as Map;
    use std::sync::atomic::{AtomicBool, Ordering};
    use supervision_common::{Isolation, ResourceSpec, RetryConfig};

    fn spec(name: &str, version: &str) -> ServiceSpec {
        ServiceSpec {
            name: name.to_string(),
            version: version.to_string(),
            binary_path: "/bin/sh".into(),
            args: vec!["-c".to_string(), "sleep 5".to_string()],
            env: Map::new(),
            work_dir: std::env::temp_dir(),
            isolation: Isolation::Process,
            resources: ResourceSpec::default(),
            dependencies: vec![],
            auto_restart: false,
            health_check_interval: Duration::from_secs(30),
            peer_timeout: Duration::from_secs(5),
            enabled: true,
        }
    }

    fn orchestrator() -> Arc<ProcessOrchestrator> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(ProcessOrchestrator::new(
            OrchestratorConfig {
                services_dir: dir.path().to_path_buf(),
                socket_dir: dir.path().to_path_buf(),
                work_dir_root: dir.path().to_path_buf(),
                shutdown_timeout: Duration::from_millis(200),
                restart_policy: RetryConfig::restart_policy(Duration::from_millis(10), Duration::from_millis(50)),
            },
            Arc::new(LifecycleManager::new()),
        ))
    }

    fn store() -> Arc<StateStore> {
        Arc::new(StateStore::new(Arc::new(MemoryBackend::default())))
    }

    struct IdentityMigrator;

    #[async_trait::async_trait]
    impl state_store::Migrator for IdentityMigrator {
        fn can_migrate(&self, _from: &str, _to: &str) -> bool {
            true
        }
        async fn migrate(&self, payload: Vec<u8>) -> SupervisionResult<Vec<u8>> {
            Ok(payload)
        }
    }

    struct FailingLoadPluginManager;

    #[async_trait::async_trait]
    impl PluginManager for FailingLoadPluginManager {
        async fn load_new(&self, _plugin_id: &str, _new_spec: &ServiceSpec) -> SupervisionResult<()> {
            Err(SupervisionError::Unavailable("new binary missing".to_string()))
        }
        async fn drain(&self, _plugin_id: &str, _timeout: Duration) -> SupervisionResult<()> {
            Ok(())
        }
        async fn export_state(&self, _plugin_id: &str) -> SupervisionResult<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn import_state(&self, _plugin_id: &str, _payload: Vec<u8>) -> SupervisionResult<()> {
            Ok(())
        }
        async fn unload_old(&self, _plugin_id: &str) -> SupervisionResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn happy_swap_completes_and_starts_new_version() {
        let orch = orchestrator();
        orch.load(spec("worker", "1.0.0"));
        orch.start("worker").await.unwrap();

        let state_store = store();
        state_store.register_migrator("worker", Arc::new(IdentityMigrator));

        let coordinator = HotSwapCoordinator::new(orch.clone(), state_store, Arc::new(NoopPluginManager));
        let op = coordinator
            .hot_swap("worker", spec("worker", "2.0.0"))
            .await
            .unwrap();

        assert_eq!(op.status, HotSwapStatus::Completed);
        assert_eq!(orch.get_service_info("worker").unwrap().version, "2.0.0");
        assert_eq!(orch.status("worker").unwrap(), ServiceState::Running);
    }

    #[tokio::test]
    async fn swap_on_non_running_service_is_rejected() {
        let orch = orchestrator();
        orch.load(spec("idle", "1.0.0"));

        let coordinator = HotSwapCoordinator::new(orch, store(), Arc::new(NoopPluginManager));
        let result = coordinator.hot_swap("idle", spec("idle", "2.0.0")).await;
        assert!(matches!(result, Err(SupervisionError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn load_new_failure_rolls_back_to_old_version() {
        let orch = orchestrator();
        orch.load(spec("worker", "1.0.0"));
        orch.start("worker").await.unwrap();

        let coordinator = HotSwapCoordinator::new(orch.clone(), store(), Arc::new(FailingLoadPluginManager));
        let op = coordinator
            .hot_swap("worker", spec("worker", "2.0.0"))
            .await
            .unwrap();

        assert_eq!(op.status, HotSwapStatus::RolledBack);
        assert_eq!(orch.get_service_info("worker").unwrap().version, "1.0.0");
        assert_eq!(orch.status("worker").unwrap(), ServiceState::Running);
    }

    #[tokio::test]
    async fn concurrent_swap_for_same_plugin_is_denied() {
        let orch = orchestrator();
        orch.load(spec("worker", "1.0.0"));
        orch.start("worker").await.unwrap();

        struct BlockingPluginManager(Arc<AtomicBool>);

        #[async_trait::async_trait]
        impl PluginManager for BlockingPluginManager {
            async fn load_new(&self, _plugin_id: &str, _new_spec: &ServiceSpec) -> SupervisionResult<()> {
                while !self.0.load(Ordering::Acquire) {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                Ok(())
            }
            async fn drain(&self, _plugin_id: &str, _timeout: Duration) -> SupervisionResult<()> {
                Ok(())
            }
            async fn export_state(&self, _plugin_id: &str) -> SupervisionResult<Vec<u8>> {
                Ok(Vec::new())
            }
            async fn import_state(&self, _plugin_id: &str, _payload: Vec<u8>) -> SupervisionResult<()> {
                Ok(())
            }
            async fn unload_old(&self, _plugin_id: &str) -> SupervisionResult<()> {
                Ok(())
            }
        }

        let release = Arc::new(AtomicBool::new(false));
        let coordinator = Arc::new(HotSwapCoordinator::new(
            orch,
            store(),
            Arc::new(BlockingPluginManager(release.clone())),
        ));

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.hot_swap("worker", spec("worker", "2.0.0")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = coordinator.hot_swap("worker", spec("worker", "3.0.0")).await;
        assert!(matches!(second, Err(SupervisionError::AlreadyExists(_))));

        release.store(true, Ordering::Release);
        first.await.unwrap().unwrap();
    }
}
