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

use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::PathBuf;
use std::time::Duration;
use supervision_common::config::SafeDisplay;
use supervision_common::{RetryConfig, TracingConfig};

/// Top-level configuration for the `supervisor-service` binary. Loaded by
/// `supervision_common::ConfigLoader<SupervisorConfig>`, which layers a
/// TOML file under `SUPERVISOR_`-prefixed environment variables over
/// these defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SupervisorConfig {
    pub services_dir: PathBuf,
    pub socket_dir: PathBuf,
    pub work_dir_root: PathBuf,
    pub state_dir: PathBuf,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub restart_initial_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub restart_max_backoff: Duration,
    pub max_restart_attempts: u32,
    /// Governor utilization percentage in [1, 100] (§4.1, §6).
    pub utilization_pct: u8,
    pub tracing: TracingConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            services_dir: PathBuf::from("/var/lib/supervisor/services"),
            socket_dir: PathBuf::from("/var/lib/supervisor/sockets"),
            work_dir_root: PathBuf::from("/var/lib/supervisor/data"),
            state_dir: PathBuf::from("/var/lib/supervisor/state"),
            shutdown_timeout: Duration::from_secs(30),
            restart_initial_backoff: Duration::from_millis(1000),
            restart_max_backoff: Duration::from_secs(30),
            max_restart_attempts: 5,
            utilization_pct: 80,
            tracing: TracingConfig::local_dev("supervisor-service"),
        }
    }
}

impl SupervisorConfig {
    /// The restart policy derived from this config's backoff fields,
    /// handed to `process-orchestrator`'s `OrchestratorConfig`. Unlike
    /// `RetryConfig::default()`, attempts here are bounded by
    /// `max_restart_attempts`, matching §4.6's "exceeded ⇒ Failed
    /// permanently" rule, which `process-supervisor` enforces by reading
    /// `attempts_exhausted`.
    pub fn restart_policy(&self) -> RetryConfig {
        RetryConfig {
            initial_delay: self.restart_initial_backoff,
            max_delay: self.restart_max_backoff,
            multiplier: 2.0,
            max_attempts: Some(self.max_restart_attempts),
        }
    }
}

impl SafeDisplay for SupervisorConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "services_dir: {}", self.services_dir.display());
        let _ = writeln!(&mut result, "socket_dir: {}", self.socket_dir.display());
        let _ = writeln!(&mut result, "work_dir_root: {}", self.work_dir_root.display());
        let _ = writeln!(&mut result, "state_dir: {}", self.state_dir.display());
        let _ = writeln!(&mut result, "shutdown_timeout: {:?}", self.shutdown_timeout);
        let _ = writeln!(
            &mut result,
            "restart backoff: {:?} .. {:?} (max {} attempts)",
            self.restart_initial_backoff, self.restart_max_backoff, self.max_restart_attempts
        );
        let _ = writeln!(&mut result, "utilization_pct: {}", self.utilization_pct);
        let _ = write!(&mut result, "tracing:\n{}", self.tracing.to_safe_string_indented());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_policy_is_bounded_by_max_attempts() {
        let config = SupervisorConfig {
            max_restart_attempts: 3,
            ..SupervisorConfig::default()
        };
        let policy = config.restart_policy();
        assert_eq!(policy.max_attempts, Some(3));
        assert!(policy.attempts_exhausted(3));
        assert!(!policy.attempts_exhausted(2));
    }

    #[test]
    fn safe_string_contains_every_directory() {
        let config = SupervisorConfig::default();
        let rendered = config.to_safe_string();
        assert!(rendered.contains("services_dir"));
        assert!(rendered.contains("socket_dir"));
        assert!(rendered.contains("state_dir"));
        assert!(rendered.contains("tracing:"));
    }
}
