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

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use supervision_common::{Isolation, ResourceSpec, ServiceSpec};
use tracing::{debug, warn};

/// Scans `services_dir` for installed binaries. A service named `name` is
/// discoverable when `{services_dir}/{name}/{name}` exists and has at
/// least one executable bit set (§4.7). Discovered specs get the default
/// isolation and resource envelope; callers that already have a
/// configured spec for the same name should prefer it over the
/// discovered default.
pub fn discover_services(services_dir: &Path, work_dir_root: &Path) -> Vec<ServiceSpec> {
    let mut specs = Vec::new();

    let entries = match std::fs::read_dir(services_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %services_dir.display(), error = %e, "unable to read services directory");
            return specs;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let binary_path = path.join(name);
        if !is_executable(&binary_path) {
            debug!(service = name, path = %binary_path.display(), "no executable found, skipping");
            continue;
        }

        specs.push(ServiceSpec {
            name: name.to_string(),
            version: "discovered".to_string(),
            binary_path,
            args: Vec::new(),
            env: HashMap::new(),
            work_dir: work_dir_root.join(name),
            isolation: Isolation::Process,
            resources: ResourceSpec::default(),
            dependencies: Vec::new(),
            auto_restart: true,
            health_check_interval: Duration::from_secs(30),
            peer_timeout: Duration::from_secs(5),
            enabled: true,
        });
    }

    specs
}

fn is_executable(path: &PathBuf) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt as _;

    #[test]
    fn discovers_executable_service_binaries() {
        let dir = tempfile::tempdir().unwrap();
        let svc_dir = dir.path().join("echo-svc");
        fs::create_dir_all(&svc_dir).unwrap();
        let binary = svc_dir.join("echo-svc");
        fs::write(&binary, b"#!/bin/sh\necho hi\n").unwrap();
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();

        let work_dir_root = dir.path().join("data");
        let specs = discover_services(dir.path(), &work_dir_root);

        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "echo-svc");
        assert!(specs[0].enabled);
    }

    #[test]
    fn ignores_non_executable_files() {
        let dir = tempfile::tempdir().unwrap();
        let svc_dir = dir.path().join("not-a-service");
        fs::create_dir_all(&svc_dir).unwrap();
        fs::write(svc_dir.join("not-a-service"), b"plain text").unwrap();

        let specs = discover_services(dir.path(), &dir.path().join("data"));
        assert!(specs.is_empty());
    }
}
