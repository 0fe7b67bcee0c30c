//! Bounded polling for conditions that take time to settle

use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// How many times to probe and how long to wait between probes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub attempts: u32,
    pub interval: Duration,

    /// Consecutive positive probes required before the condition counts as met
    pub settle: u32,
}

impl RetryBudget {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts,
            interval,
            settle: 1,
        }
    }

    pub fn with_settle(mut self, settle: u32) -> Self {
        self.settle = settle.max(1);
        self
    }

    /// Upper bound on the time spent sleeping between probes
    pub fn max_wait(&self) -> Duration {
        self.interval * self.attempts.saturating_sub(1)
    }
}

/// Probe until `settle` consecutive probes succeed or the budget runs out
///
/// Returns `Ok(false)` once the remaining attempts can no longer produce the
/// required streak. Probe errors end the poll immediately.
pub async fn poll_until<F, Fut, E>(budget: RetryBudget, mut probe: F) -> Result<bool, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let settle = budget.settle.max(1);
    let mut streak = 0u32;

    for attempt in 1..=budget.attempts {
        if probe().await? {
            streak += 1;
            if streak >= settle {
                debug!("Condition met after {} probe(s)", attempt);
                return Ok(true);
            }
        } else {
            streak = 0;
        }

        let remaining = budget.attempts - attempt;
        if remaining == 0 || streak + remaining < settle {
            break;
        }
        tokio::time::sleep(budget.interval).await;
    }

    debug!("Condition not met within {} probe(s)", budget.attempts);
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn scripted(results: Vec<bool>) -> (Cell<usize>, Vec<bool>) {
        (Cell::new(0), results)
    }

    #[tokio::test(start_paused = true)]
    async fn test_met_on_first_probe() {
        let budget = RetryBudget::new(5, Duration::from_secs(1));
        let met: Result<bool, ()> = poll_until(budget, || async { Ok(true) }).await;
        assert_eq!(met, Ok(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requires_consecutive_successes() {
        let (calls, results) = scripted(vec![true, false, true, true]);
        let budget = RetryBudget::new(10, Duration::from_millis(10)).with_settle(2);

        let met: Result<bool, ()> = poll_until(budget, || {
            let index = calls.get();
            calls.set(index + 1);
            let value = results.get(index).copied().unwrap_or(false);
            async move { Ok(value) }
        })
        .await;

        assert_eq!(met, Ok(true));
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhausted_within_bound() {
        let budget = RetryBudget::new(4, Duration::from_secs(1));
        let started = tokio::time::Instant::now();
        let calls = Cell::new(0);

        let met: Result<bool, ()> = poll_until(budget, || {
            calls.set(calls.get() + 1);
            async { Ok(false) }
        })
        .await;

        assert_eq!(met, Ok(false));
        assert_eq!(calls.get(), 4);
        assert!(started.elapsed() <= budget.max_wait());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_streak_unreachable() {
        let calls = Cell::new(0);
        let budget = RetryBudget::new(3, Duration::from_secs(1)).with_settle(3);

        let met: Result<bool, ()> = poll_until(budget, || {
            calls.set(calls.get() + 1);
            async { Ok(false) }
        })
        .await;

        assert_eq!(met, Ok(false));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_ends_poll() {
        let budget = RetryBudget::new(3, Duration::from_secs(1));
        let met = poll_until(budget, || async { Err::<bool, _>("probe failed") }).await;
        assert_eq!(met, Err("probe failed"));
    }
}
