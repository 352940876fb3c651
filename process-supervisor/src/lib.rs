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

//! Supervisor (C6): one task per `ServiceRecord` in
//! `{Starting, Running, Restarting}`. Awaits child exit or a stop signal,
//! applies the exponential-backoff-with-jitter restart policy, and
//! fires the `onCrash`/`onError` lifecycle events. Never holds the
//! orchestrator's service-table lock while waiting on the child (§4.6).

use async_trait::async_trait;
use chrono::Utc;
use lifecycle_hooks::LifecycleManager;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use supervision_common::{LastError, RetryConfig, ServiceRecord, ServiceState, SupervisionResult};
use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

/// A freshly spawned child process plus its PID, returned by
/// [`ChildSpawner::spawn`]. Kept distinct from `tokio::process::Child` so
/// callers don't have to re-derive the PID after spawn.
pub struct ChildHandle {
    pub child: Child,
    pub pid: u32,
}

/// Supplied by the process orchestrator (C7): knows how to build and
/// launch a fresh child process for the supervised service, including
/// the environment scrubbing and injection described in §4.7. The
/// supervisor itself is oblivious to those details.
#[async_trait]
pub trait ChildSpawner: Send + Sync {
    async fn spawn(&self) -> SupervisionResult<ChildHandle>;
}

/// Signals a running supervisor task to stop observing its child's exit
/// as a crash — sent (by dropping/firing the paired `Sender`) when the
/// orchestrator is deliberately stopping the service.
pub type StopSignal = oneshot::Receiver<()>;
pub type StopSender = oneshot::Sender<()>;

pub fn stop_channel() -> (StopSender, StopSignal) {
    oneshot::channel()
}

/// Runs the supervision loop for one service record until it either
/// receives a stop signal, exhausts its restart budget, or fails to
/// respawn. Consumes `initial_child`; the record's `pid`/`state` fields
/// are kept current throughout via atomics, without the caller's table
/// lock.
pub async fn supervise(
    plugin_id: String,
    record: Arc<ServiceRecord>,
    initial_child: ChildHandle,
    spawner: Arc<dyn ChildSpawner>,
    retry: RetryConfig,
    mut stop_rx: StopSignal,
    shutdown: Arc<AtomicBool>,
    hooks: Arc<LifecycleManager>,
    on_exit: Arc<dyn Fn(LastError) + Send + Sync>,
) {
    let mut child = initial_child.child;
    record.set_pid(initial_child.pid as i32);

    loop {
        tokio::select! {
            biased;

            _ = &mut stop_rx => {
                debug!(service = %plugin_id, "supervisor observed stop signal, returning silently");
                return;
            }

            status = child.wait() => {
                let status = match status {
                    Ok(status) => status,
                    Err(e) => {
                        warn!(service = %plugin_id, error = %e, "failed to wait on child process");
                        record.set_state(ServiceState::Failed);
                        return;
                    }
                };

                if shutdown.load(Ordering::Acquire) {
                    debug!(service = %plugin_id, "shutdown in progress, recording exit and returning");
                    record.set_state(ServiceState::Stopped);
                    return;
                }

                let exit_code = status.code();
                let pid = record.pid();
                warn!(service = %plugin_id, ?exit_code, pid, "service exited unexpectedly");
                record.set_state(ServiceState::Failed);
                on_exit(make_last_error(exit_code, pid, format!("exited with status {status}")));

                let attempt = record.restarts();
                if !record.spec.auto_restart || retry.attempts_exhausted(attempt) {
                    error!(service = %plugin_id, attempt, "restart policy exhausted, service permanently failed");
                    hooks.fire_crash(&plugin_id).await.ok();
                    return;
                }

                record.set_state(ServiceState::Restarting);
                let delay = retry.restart_backoff_delay(attempt);
                debug!(service = %plugin_id, ?delay, attempt, "scheduling restart");

                tokio::select! {
                    _ = &mut stop_rx => {
                        debug!(service = %plugin_id, "stop signal received during restart backoff");
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }

                match spawner.spawn().await {
                    Ok(new_child) => {
                        record.increment_restarts();
                        record.set_pid(new_child.pid as i32);
                        record.set_state(ServiceState::Running);
                        child = new_child.child;
                    }
                    Err(e) => {
                        error!(service = %plugin_id, error = %e, "respawn failed");
                        record.set_state(ServiceState::Failed);
                        hooks.fire_crash(&plugin_id).await.ok();
                        return;
                    }
                }
            }
        }
    }
}

pub fn make_last_error(exit_code: Option<i32>, pid: i32, message: impl Into<String>) -> LastError {
    LastError {
        exit_code,
        message: message.into(),
        pid,
        recorded_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use supervision_common::{Isolation, ResourceSpec, ServiceSpec};
    use tokio::process::Command;

    fn test_spec(auto_restart: bool) -> ServiceSpec {
        ServiceSpec {
            name: "echo-svc".to_string(),
            version: "1.0.0".to_string(),
            binary_path: "/bin/sh".into(),
            args: vec![],
            env: Default::default(),
            work_dir: "/tmp".into(),
            isolation: Isolation::Process,
            resources: ResourceSpec::default(),
            dependencies: vec![],
            auto_restart,
            health_check_interval: Duration::from_secs(30),
            peer_timeout: Duration::from_secs(5),
            enabled: true,
        }
    }

    struct CountingSpawner {
        calls: AtomicU32,
        exit_code: i32,
    }

    #[async_trait]
    impl ChildSpawner for CountingSpawner {
        async fn spawn(&self) -> SupervisionResult<ChildHandle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let child = Command::new("/bin/sh")
                .arg("-c")
                .arg(format!("exit {}", self.exit_code))
                .spawn()
                .expect("spawn /bin/sh");
            let pid = child.id().unwrap_or(0);
            Ok(ChildHandle { child, pid })
        }
    }

    async fn spawn_initial(exit_code: i32) -> ChildHandle {
        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg(format!("exit {exit_code}"))
            .spawn()
            .expect("spawn /bin/sh");
        let pid = child.id().unwrap_or(0);
        ChildHandle { child, pid }
    }

    #[tokio::test]
    async fn stop_signal_returns_without_restarting() {
        let record = Arc::new(ServiceRecord::new(test_spec(true)));
        let spawner = Arc::new(CountingSpawner { calls: AtomicU32::new(0), exit_code: 1 });
        let (stop_tx, stop_rx) = stop_channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let hooks = Arc::new(LifecycleManager::new());

        // A long-lived child so the stop signal wins the race.
        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg("sleep 5")
            .spawn()
            .expect("spawn sleep");
        let pid = child.id().unwrap_or(0);

        let handle = tokio::spawn(supervise(
            "echo-svc".to_string(),
            record.clone(),
            ChildHandle { child, pid },
            spawner.clone(),
            RetryConfig::restart_policy(Duration::from_millis(10), Duration::from_millis(50)),
            stop_rx,
            shutdown,
            hooks,
            Arc::new(|_last_error| {}),
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        stop_tx.send(()).ok();
        handle.await.unwrap();

        assert_eq!(spawner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn crash_triggers_restart_when_auto_restart_enabled() {
        let record = Arc::new(ServiceRecord::new(test_spec(true)));
        let spawner = Arc::new(CountingSpawner { calls: AtomicU32::new(0), exit_code: 1 });
        let (_stop_tx, stop_rx) = stop_channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let hooks = Arc::new(LifecycleManager::new());

        let initial = spawn_initial(1).await;

        let retry = RetryConfig {
            max_attempts: Some(3),
            ..RetryConfig::restart_policy(Duration::from_millis(5), Duration::from_millis(20))
        };

        supervise(
            "echo-svc".to_string(),
            record.clone(),
            initial,
            spawner.clone(),
            retry,
            stop_rx,
            shutdown,
            hooks,
            Arc::new(|_last_error| {}),
        )
        .await;

        assert_eq!(spawner.calls.load(Ordering::SeqCst), 3);
        assert_eq!(record.state(), ServiceState::Failed);
    }

    #[tokio::test]
    async fn no_restart_without_auto_restart() {
        let record = Arc::new(ServiceRecord::new(test_spec(false)));
        let spawner = Arc::new(CountingSpawner { calls: AtomicU32::new(0), exit_code: 1 });
        let (_stop_tx, stop_rx) = stop_channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let hooks = Arc::new(LifecycleManager::new());

        let initial = spawn_initial(1).await;

        supervise(
            "echo-svc".to_string(),
            record.clone(),
            initial,
            spawner.clone(),
            RetryConfig::restart_policy(Duration::from_millis(5), Duration::from_millis(20)),
            stop_rx,
            shutdown,
            hooks,
            Arc::new(|_last_error| {}),
        )
        .await;

        assert_eq!(spawner.calls.load(Ordering::SeqCst), 0);
        assert_eq!(record.state(), ServiceState::Failed);
    }

    #[tokio::test]
    async fn exit_during_shutdown_sets_stopped_not_failed() {
        let record = Arc::new(ServiceRecord::new(test_spec(true)));
        let spawner = Arc::new(CountingSpawner { calls: AtomicU32::new(0), exit_code: 0 });
        let (_stop_tx, stop_rx) = stop_channel();
        let shutdown = Arc::new(AtomicBool::new(true));
        let hooks = Arc::new(LifecycleManager::new());

        let initial = spawn_initial(0).await;

        supervise(
            "echo-svc".to_string(),
            record.clone(),
            initial,
            spawner.clone(),
            RetryConfig::restart_policy(Duration::from_millis(5), Duration::from_millis(20)),
            stop_rx,
            shutdown,
            hooks,
            Arc::new(|_last_error| {}),
        )
        .await;

        assert_eq!(record.state(), ServiceState::Stopped);
        assert_eq!(spawner.calls.load(Ordering::SeqCst), 0);
    }
}
