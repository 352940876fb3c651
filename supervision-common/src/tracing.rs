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

use crate::config::SafeDisplay;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// How the supervisor emits its `tracing` events. Carried inside
/// `SupervisorConfig` and every other crate's standalone config for local
/// testing, mirroring how the teacher threads a `TracingConfig` through
/// every top-level service config.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TracingConfig {
    pub service_name: String,
    pub json: bool,
    pub stdout: bool,
    pub env_filter: String,
}

impl TracingConfig {
    /// A config suited to running on a developer's workstation: pretty
    /// human-readable output, filter driven by `RUST_LOG` with a sane
    /// default.
    pub fn local_dev(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            json: false,
            stdout: true,
            env_filter: "info".to_string(),
        }
    }

    /// Installs the global `tracing` subscriber described by this config.
    /// Safe to call exactly once per process; a second call returns an
    /// error rather than panicking.
    pub fn init(&self) -> Result<(), String> {
        let filter = EnvFilter::try_new(&self.env_filter)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(filter);

        if self.json {
            let layer = fmt::layer().json().with_target(true);
            registry
                .with(layer)
                .try_init()
                .map_err(|e| format!("failed to install tracing subscriber: {e}"))
        } else {
            let layer = fmt::layer().with_target(true).with_ansi(self.stdout);
            registry
                .with(layer)
                .try_init()
                .map_err(|e| format!("failed to install tracing subscriber: {e}"))
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::local_dev("supervisor-service")
    }
}

impl SafeDisplay for TracingConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "service name: {}", self.service_name);
        let _ = writeln!(&mut result, "json: {}", self.json);
        let _ = writeln!(&mut result, "stdout: {}", self.stdout);
        let _ = writeln!(&mut result, "env filter: {}", self.env_filter);
        result
    }
}
