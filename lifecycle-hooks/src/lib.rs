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

//! Lifecycle Handlers (C4): an ordered registry of handlers fanned out on
//! each plugin lifecycle event. Registration order is preserved; any
//! handler returning an error short-circuits the remaining chain for
//! that event, except `onError`, which never short-circuits (§4.4).

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use supervision_common::{SupervisionError, SupervisionResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Load,
    Start,
    Stop,
    Unload,
    Error,
    Crash,
}

/// A single lifecycle participant. Default methods make implementing a
/// handler that only cares about one or two events low-ceremony.
#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn on_load(&self, _plugin_id: &str) -> SupervisionResult<()> {
        Ok(())
    }
    async fn on_start(&self, _plugin_id: &str) -> SupervisionResult<()> {
        Ok(())
    }
    async fn on_stop(&self, _plugin_id: &str) -> SupervisionResult<()> {
        Ok(())
    }
    async fn on_unload(&self, _plugin_id: &str) -> SupervisionResult<()> {
        Ok(())
    }
    async fn on_error(&self, _plugin_id: &str, _error: &SupervisionError) {}
    async fn on_crash(&self, _plugin_id: &str) -> SupervisionResult<()> {
        Ok(())
    }
}

/// Guards against a handler calling back into the lifecycle manager for
/// the same `(plugin_id, event)` pair while it is still running.
struct ReentrancyGuard<'a> {
    in_flight: &'a Mutex<HashSet<(String, LifecycleEvent)>>,
    key: (String, LifecycleEvent),
}

impl<'a> ReentrancyGuard<'a> {
    fn enter(
        in_flight: &'a Mutex<HashSet<(String, LifecycleEvent)>>,
        plugin_id: &str,
        event: LifecycleEvent,
    ) -> SupervisionResult<Self> {
        let key = (plugin_id.to_string(), event);
        let mut guard = in_flight.lock();
        if !guard.insert(key.clone()) {
            return Err(SupervisionError::InvalidArgument(format!(
                "reentrant lifecycle call for {plugin_id} event {event:?}"
            )));
        }
        drop(guard);
        Ok(Self { in_flight, key })
    }
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

/// The lifecycle manager: fans each event out to every registered handler
/// in registration order, on the caller's task (no internal spawning).
#[derive(Default)]
pub struct LifecycleManager {
    handlers: Mutex<Vec<Arc<dyn LifecycleHandler>>>,
    in_flight: Mutex<HashSet<(String, LifecycleEvent)>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handler: Arc<dyn LifecycleHandler>) {
        self.handlers.lock().push(handler);
    }

    fn snapshot_handlers(&self) -> Vec<Arc<dyn LifecycleHandler>> {
        self.handlers.lock().clone()
    }

    pub async fn fire_load(&self, plugin_id: &str) -> SupervisionResult<()> {
        let _guard = ReentrancyGuard::enter(&self.in_flight, plugin_id, LifecycleEvent::Load)?;
        for handler in self.snapshot_handlers() {
            handler.on_load(plugin_id).await?;
        }
        Ok(())
    }

    pub async fn fire_start(&self, plugin_id: &str) -> SupervisionResult<()> {
        let _guard = ReentrancyGuard::enter(&self.in_flight, plugin_id, LifecycleEvent::Start)?;
        for handler in self.snapshot_handlers() {
            handler.on_start(plugin_id).await?;
        }
        Ok(())
    }

    pub async fn fire_stop(&self, plugin_id: &str) -> SupervisionResult<()> {
        let _guard = ReentrancyGuard::enter(&self.in_flight, plugin_id, LifecycleEvent::Stop)?;
        for handler in self.snapshot_handlers() {
            handler.on_stop(plugin_id).await?;
        }
        Ok(())
    }

    pub async fn fire_unload(&self, plugin_id: &str) -> SupervisionResult<()> {
        let _guard = ReentrancyGuard::enter(&self.in_flight, plugin_id, LifecycleEvent::Unload)?;
        for handler in self.snapshot_handlers() {
            handler.on_unload(plugin_id).await?;
        }
        Ok(())
    }

    /// Never short-circuits: every handler observes the error regardless
    /// of what the others do.
    pub async fn fire_error(&self, plugin_id: &str, error: &SupervisionError) {
        let guard = ReentrancyGuard::enter(&self.in_flight, plugin_id, LifecycleEvent::Error);
        let guard = match guard {
            Ok(g) => g,
            Err(_) => return,
        };
        for handler in self.snapshot_handlers() {
            handler.on_error(plugin_id, error).await;
        }
        drop(guard);
    }

    pub async fn fire_crash(&self, plugin_id: &str) -> SupervisionResult<()> {
        let _guard = ReentrancyGuard::enter(&self.in_flight, plugin_id, LifecycleEvent::Crash)?;
        for handler in self.snapshot_handlers() {
            handler.on_crash(plugin_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingHandler {
        name: String,
        order: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl LifecycleHandler for RecordingHandler {
        fn name(&self) -> &str {
            &self.name
        }

        async fn on_load(&self, _plugin_id: &str) -> SupervisionResult<()> {
            self.order.lock().push(self.name.clone());
            if self.fail {
                Err(SupervisionError::Internal("boom".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn handlers_fire_in_registration_order() {
        let manager = LifecycleManager::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        manager.register(Arc::new(RecordingHandler {
            name: "a".to_string(),
            order: order.clone(),
            fail: false,
        }));
        manager.register(Arc::new(RecordingHandler {
            name: "b".to_string(),
            order: order.clone(),
            fail: false,
        }));

        manager.fire_load("plugin-1").await.unwrap();
        assert_eq!(*order.lock(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn a_failing_handler_short_circuits_remaining_chain() {
        let manager = LifecycleManager::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        manager.register(Arc::new(RecordingHandler {
            name: "a".to_string(),
            order: order.clone(),
            fail: true,
        }));
        manager.register(Arc::new(RecordingHandler {
            name: "b".to_string(),
            order: order.clone(),
            fail: false,
        }));

        let result = manager.fire_load("plugin-1").await;
        assert!(result.is_err());
        assert_eq!(*order.lock(), vec!["a"]);
    }

    struct CountingErrorHandler {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LifecycleHandler for CountingErrorHandler {
        fn name(&self) -> &str {
            "counting"
        }

        async fn on_error(&self, _plugin_id: &str, _error: &SupervisionError) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn on_error_never_short_circuits() {
        let manager = LifecycleManager::new();
        let count = Arc::new(AtomicUsize::new(0));
        manager.register(Arc::new(CountingErrorHandler { count: count.clone() }));
        manager.register(Arc::new(CountingErrorHandler { count: count.clone() }));

        manager
            .fire_error("plugin-1", &SupervisionError::Internal("x".to_string()))
            .await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reentrant_call_for_same_event_is_rejected() {
        struct ReentrantHandler {
            manager: Arc<LifecycleManager>,
        }

        #[async_trait]
        impl LifecycleHandler for ReentrantHandler {
            fn name(&self) -> &str {
                "reentrant"
            }
            async fn on_load(&self, plugin_id: &str) -> SupervisionResult<()> {
                self.manager.fire_load(plugin_id).await
            }
        }

        let manager = Arc::new(LifecycleManager::new());
        manager.register(Arc::new(ReentrantHandler { manager: manager.clone() }));

        let result = manager.fire_load("plugin-1").await;
        assert!(result.is_err());
    }
}
