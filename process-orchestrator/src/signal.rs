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

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::time::Duration;
use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Sends `SIGTERM` to `pid`, polls until it exits or `timeout` elapses,
/// then falls back to `SIGKILL` (§4.7 stop sequence). Operates on the raw
/// pid rather than a `Child` handle since the `Child` itself is owned by
/// the supervisor task (C6), not the orchestrator (C7); a signal-and-poll
/// protocol lets the two stay decoupled.
pub async fn terminate_then_kill(pid: i32, timeout: Duration) {
    let target = Pid::from_raw(pid);

    if let Err(e) = signal::kill(target, Signal::SIGTERM) {
        if e != nix::errno::Errno::ESRCH {
            warn!(pid, error = %e, "SIGTERM failed");
        }
        return;
    }

    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if !is_alive(target) {
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    if is_alive(target) {
        warn!(pid, ?timeout, "graceful shutdown deadline exceeded, sending SIGKILL");
        if let Err(e) = signal::kill(target, Signal::SIGKILL) {
            if e != nix::errno::Errno::ESRCH {
                warn!(pid, error = %e, "SIGKILL failed");
            }
        }
    }
}

/// Signal 0 sends nothing but still validates the pid exists and is
/// reachable, the standard liveness-check idiom.
fn is_alive(pid: Pid) -> bool {
    signal::kill(pid, None).is_ok()
}
