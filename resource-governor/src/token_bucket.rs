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

use std::time::Instant;

/// A simple non-blocking token bucket: tokens refill continuously at
/// `rate_per_sec` and `try_take` either succeeds immediately or fails,
/// matching the non-blocking admission contract of `canStartRequest`.
pub struct TokenBucket {
    rate_per_sec: f64,
    capacity: f64,
    available: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rate_per_sec: f64) -> Self {
        Self {
            rate_per_sec,
            capacity: rate_per_sec.max(1.0),
            available: rate_per_sec.max(1.0),
            last_refill: Instant::now(),
        }
    }

    pub fn set_rate(&mut self, rate_per_sec: f64) {
        self.rate_per_sec = rate_per_sec;
        self.capacity = rate_per_sec.max(1.0);
        self.available = self.available.min(self.capacity);
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.available = (self.available + elapsed * self.rate_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    pub fn try_take(&mut self, cost: f64) -> bool {
        self.refill();
        if self.available >= cost {
            self.available -= cost;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_once_capacity_exhausted() {
        let mut bucket = TokenBucket::new(2.0);
        assert!(bucket.try_take(1.0));
        assert!(bucket.try_take(1.0));
        assert!(!bucket.try_take(1.0));
    }

    #[test]
    fn refills_over_time() {
        let mut bucket = TokenBucket::new(1000.0);
        for _ in 0..1000 {
            assert!(bucket.try_take(1.0));
        }
        assert!(!bucket.try_take(1.0));
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(bucket.try_take(1.0));
    }
}
