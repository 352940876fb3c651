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

//! Entry point: load config (or dump it and exit), install tracing, build
//! the composition root, start every enabled service, and block until a
//! shutdown signal arrives.

use std::path::PathBuf;
use supervision_common::config::ConfigLoader;
use supervisor_service::config::SupervisorConfig;
use supervisor_service::Services;
use tracing::{error, info, warn};

fn config_path() -> PathBuf {
    std::env::var("SUPERVISOR_CONFIG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("supervisor.toml"))
}

fn dump_requested() -> bool {
    std::env::args().any(|arg| arg == "--dump-config")
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let loader: ConfigLoader<SupervisorConfig> = ConfigLoader::new(&config_path());
    let config = match loader.load_or_dump(dump_requested())? {
        Some(config) => config,
        None => return Ok(()),
    };

    config
        .tracing
        .init()
        .map_err(|e| format!("failed to install tracing: {e}"))?;

    info!("starting supervisor-service");

    let services = Services::new(&config);
    services.discover_and_load();

    let start_results = services.orchestrator.start_all().await;
    for (name, result) in &start_results {
        if let Err(e) = result {
            warn!(service = %name, error = %e, "failed to start service at boot");
        }
    }

    wait_for_shutdown_signal().await;

    info!("shutdown signal received, draining services");
    services.shutdown(config.shutdown_timeout).await;
    info!("supervisor-service stopped");

    Ok(())
}

/// Blocks until SIGTERM or SIGINT (Ctrl-C) arrives.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
