//! Bounded exponential backoff for allocation retries.
//!
//! A [`BackoffPolicy`] describes the delay sequence; [`BackoffPolicy::start`]
//! turns it into a [`Backoff`], the per-attempt-sequence state. Elapsed time is
//! measured on the Tokio clock, so a paused runtime drives it
//! deterministically.
//!
//! Delays never decrease: each one is the previous one times the multiplier,
//! capped at `max_interval`. The sequence ends as soon as the next attempt
//! would start after `max_elapsed_time`, whether or not the cap was reached.

use core::time::Duration;
use tokio::time::Instant;

/// Retry delay policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the second attempt. The first attempt is immediate.
    pub initial_interval: Duration,
    /// Growth factor applied after every delay. Must be `>= 1.0`.
    pub multiplier: f64,
    /// Upper bound for a single delay.
    pub max_interval: Duration,
    /// Wall-clock budget for the whole attempt sequence.
    pub max_elapsed_time: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            max_elapsed_time: Duration::from_secs(120),
        }
    }
}

impl BackoffPolicy {
    /// Begins a new attempt sequence, starting the elapsed-time budget now.
    pub fn start(&self) -> Backoff {
        Backoff {
            policy: *self,
            current: self.initial_interval.min(self.max_interval),
            started: Instant::now(),
        }
    }
}

/// State of one attempt sequence. Discarded once the sequence ends.
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
    started: Instant,
}

impl Backoff {
    /// Returns the delay to wait before the next attempt, or `None` if that
    /// attempt would start after the elapsed-time budget.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let delay = self.current;
        if self.started.elapsed().saturating_add(delay) > self.policy.max_elapsed_time {
            return None;
        }

        // Overflowing growth saturates at the cap.
        self.current =
            Duration::try_from_secs_f64(self.current.as_secs_f64() * self.policy.multiplier)
                .unwrap_or(self.policy.max_interval)
                .min(self.policy.max_interval);
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(initial_ms: u64, multiplier: f64, max_ms: u64, budget_ms: u64) -> BackoffPolicy {
        BackoffPolicy {
            initial_interval: Duration::from_millis(initial_ms),
            multiplier,
            max_interval: Duration::from_millis(max_ms),
            max_elapsed_time: Duration::from_millis(budget_ms),
        }
    }

    /// Drains a backoff, advancing the paused clock by every delay.
    async fn drain(mut backoff: Backoff) -> Vec<Duration> {
        let mut delays = Vec::new();
        while let Some(delay) = backoff.next_delay() {
            delays.push(delay);
            tokio::time::advance(delay).await;
        }
        delays
    }

    #[tokio::test(start_paused = true)]
    async fn delays_grow_and_respect_cap() {
        let delays = drain(policy(1_000, 2.0, 5_000, 60_000).start()).await;

        assert_eq!(delays[..4], [
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(5),
        ]);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_budget_before_reaching_cap() {
        let delays = drain(policy(1_000, 2.0, 3_600_000, 10_000).start()).await;

        // 1 + 2 + 4 = 7s; the next 8s delay would start at 15s.
        assert_eq!(delays, vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn default_policy_fits_in_two_minutes() {
        let delays = drain(BackoffPolicy::default().start()).await;
        let total: Duration = delays.iter().sum();

        assert_eq!(delays[0], Duration::from_secs(2));
        assert_eq!(delays[1], Duration::from_secs(3));
        assert!(total <= Duration::from_secs(120));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_consume_the_budget() {
        let mut backoff = policy(1_000, 1.0, 1_000, 5_000).start();

        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
        // An attempt that took 4.5s leaves no room for another delay.
        tokio::time::advance(Duration::from_millis(4_500)).await;
        assert_eq!(backoff.next_delay(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_multiplier_saturates_at_cap() {
        let mut backoff = policy(2_000, 1e20, 60_000, 120_000).start();

        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(2)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(60)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn each_sequence_has_its_own_budget() {
        let policy = policy(1_000, 1.0, 1_000, 2_000);
        let first = drain(policy.start()).await;
        let second = drain(policy.start()).await;
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
