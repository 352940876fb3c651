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

use async_trait::async_trait;
use process_supervisor::{ChildHandle, ChildSpawner};
use std::collections::HashMap;
use std::path::PathBuf;
use supervision_common::{ServiceSpec, SupervisionError, SupervisionResult};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{info, warn};

const SCRUBBED_VARS: &[&str] = &["PATH", "HOME", "TEMP", "TMP"];

/// Builds the child command for one service per the §4.7 spawn sequence:
/// a scrubbed environment (only `PATH`/`HOME`/`TEMP`/`TMP` plus the
/// service's own declared `env`), working directory `spec.work_dir`,
/// `PLUGIN_SOCKET`/`PLUGIN_NAME` injected, and an optional memory-limit
/// hint. Captures stdout/stderr and tags every line with the service name
/// so multiple services can share one process's logs.
pub struct RealChildSpawner {
    pub spec: ServiceSpec,
    pub socket_dir: PathBuf,
}

impl RealChildSpawner {
    fn build_command(&self) -> Command {
        let mut env = HashMap::new();
        for key in SCRUBBED_VARS {
            if let Ok(value) = std::env::var(key) {
                env.insert(key.to_string(), value);
            }
        }
        env.extend(self.spec.env.clone());

        let socket_path = self.socket_dir.join(format!("{}.sock", self.spec.name));
        env.insert("PLUGIN_SOCKET".to_string(), socket_path.display().to_string());
        env.insert("PLUGIN_NAME".to_string(), self.spec.name.clone());

        if self.spec.resources.memory_mb > 0 {
            env.insert("GOMEMLIMIT".to_string(), format!("{}MiB", self.spec.resources.memory_mb));
        }

        let mut cmd = Command::new(&self.spec.binary_path);
        cmd.args(&self.spec.args)
            .env_clear()
            .envs(env)
            .current_dir(&self.spec.work_dir)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(false);
        cmd
    }

    fn tag_output(&self, child: &mut Child) {
        let name = self.spec.name.clone();
        if let Some(stdout) = child.stdout.take() {
            let name = name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(service = %name, "{line}");
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(service = %name, "{line}");
                }
            });
        }
    }
}

#[async_trait]
impl ChildSpawner for RealChildSpawner {
    async fn spawn(&self) -> SupervisionResult<ChildHandle> {
        let mut child = self
            .build_command()
            .spawn()
            .map_err(|e| SupervisionError::Internal(format!("failed to spawn {}: {e}", self.spec.name)))?;

        let pid = child
            .id()
            .ok_or_else(|| SupervisionError::Internal(format!("{} exited before pid was observed", self.spec.name)))?;

        self.tag_output(&mut child);

        Ok(ChildHandle { child, pid })
    }
}
