use std::time::{Duration, Instant};

/// Fixed-cadence, bounded retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 10,
            delay: Duration::from_millis(100),
            initial_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Not due yet.
    Wait,
    /// Due now; `n` counts from 1.
    Try(u32),
    Exhausted,
}

/// Tracks attempts against a policy. Driven by the caller's loop rather than
/// a timer, so dropping it cancels the retry.
#[derive(Debug, Clone)]
pub struct Retry {
    policy: RetryPolicy,
    attempts: u32,
    next_at: Instant,
}

impl Retry {
    pub fn start(policy: RetryPolicy, now: Instant) -> Self {
        Retry {
            policy,
            attempts: 0,
            next_at: now + policy.initial_delay,
        }
    }

    pub fn poll(&mut self, now: Instant) -> Attempt {
        if self.attempts > self.policy.max_attempts {
            return Attempt::Exhausted;
        }
        if now < self.next_at {
            return Attempt::Wait;
        }
        self.attempts += 1;
        if self.attempts > self.policy.max_attempts {
            return Attempt::Exhausted;
        }
        self.next_at = now + self.policy.delay;
        Attempt::Try(self.attempts)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.min(self.policy.max_attempts)
    }
}
