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

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with full jitter, used both by the process
/// supervisor's restart policy and by any client retrying a transient
/// `Unavailable`/`Timeout` error.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: Some(5),
        }
    }
}

impl RetryConfig {
    /// The restart-policy flavor: longer ceiling, unbounded attempts by
    /// default since the orchestrator itself enforces the attempt cap and
    /// transitions to `Failed` rather than relying on this helper to stop.
    pub fn restart_policy(initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            initial_delay: initial_backoff,
            max_delay: max_backoff,
            multiplier: 2.0,
            max_attempts: None,
        }
    }

    /// Delay before the given attempt (0-indexed), without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    /// Delay before the given attempt with full jitter: a uniform random
    /// value between zero and the unjittered delay, so many simultaneously
    /// restarting processes don't all wake up in lockstep.
    pub fn delay_for_attempt_with_jitter(&self, attempt: u32) -> Duration {
        let cap = self.delay_for_attempt(attempt);
        if cap.is_zero() {
            return cap;
        }
        let jittered_secs = rand::rng().random_range(0.0..=cap.as_secs_f64());
        Duration::from_secs_f64(jittered_secs)
    }

    pub fn attempts_exhausted(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt >= max,
            None => false,
        }
    }

    /// The process-supervisor restart formula: exponential backoff
    /// clamped between the initial and max delay, perturbed by ±10%
    /// jitter so simultaneously crashing services don't all restart in
    /// lockstep.
    ///
    /// `delay_ms = clamp(initial * 2^restarts, initial, max) * (1 + uniform(-0.1, 0.1))`
    pub fn restart_backoff_delay(&self, restarts: u32) -> Duration {
        let base = self.delay_for_attempt(restarts);
        let jitter = rand::rng().random_range(-0.1..=0.1);
        Duration::from_secs_f64((base.as_secs_f64() * (1.0 + jitter)).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let retry = RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_attempts: Some(10),
        };
        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(retry.delay_for_attempt(10), Duration::from_secs(2));
    }

    #[test]
    fn jitter_never_exceeds_unjittered_delay() {
        let retry = RetryConfig::default();
        for attempt in 0..6 {
            let capped = retry.delay_for_attempt(attempt);
            for _ in 0..20 {
                let jittered = retry.delay_for_attempt_with_jitter(attempt);
                assert!(jittered <= capped);
            }
        }
    }

    #[test]
    fn attempts_exhausted_respects_cap() {
        let retry = RetryConfig {
            max_attempts: Some(3),
            ..RetryConfig::default()
        };
        assert!(!retry.attempts_exhausted(2));
        assert!(retry.attempts_exhausted(3));
        assert!(retry.attempts_exhausted(4));
    }

    #[test]
    fn restart_backoff_stays_within_ten_percent_of_base() {
        let retry = RetryConfig::restart_policy(Duration::from_millis(1000), Duration::from_secs(30));
        for restarts in 0..6 {
            let base = retry.delay_for_attempt(restarts).as_secs_f64();
            for _ in 0..20 {
                let jittered = retry.restart_backoff_delay(restarts).as_secs_f64();
                assert!(jittered >= base * 0.9 - 0.001);
                assert!(jittered <= base * 1.1 + 0.001);
            }
        }
    }

    #[test]
    fn unbounded_policy_never_exhausts() {
        let retry = RetryConfig::restart_policy(Duration::from_millis(100), Duration::from_secs(30));
        assert!(!retry.attempts_exhausted(10_000));
    }
}
