use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use tokio::time::sleep;

/// Exponential backoff schedule with an overall deadline. Stands in for the
/// fixed sleeps the old runbooks used whenever they were really waiting for
/// a condition.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub cap: Duration,
    pub deadline: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, cap: Duration, deadline: Duration) -> Self {
        Self {
            initial,
            cap,
            deadline,
        }
    }

    /// Sensible schedule for Kubernetes status polling.
    pub fn for_deadline(deadline: Duration) -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(10), deadline)
    }

    fn next_delay(&self, current: Duration) -> Duration {
        (current * 2).min(self.cap)
    }
}

/// Repeatedly evaluates `op` until it yields a value or the deadline
/// expires. `Ok(None)` means "not yet"; an `Err` aborts the poll. The
/// condition is always checked at least once.
pub async fn poll_until<T, F, Fut>(what: &str, backoff: Backoff, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>>>,
{
    let started = Instant::now();
    let mut delay = backoff.initial;
    loop {
        if let Some(value) = op().await? {
            return Ok(value);
        }
        if started.elapsed() + delay >= backoff.deadline {
            bail!(
                "Timed out after {:.0?} waiting for {}",
                started.elapsed(),
                what
            );
        }
        tracing::debug!("Still waiting for {}, next check in {:?}", what, delay);
        sleep(delay).await;
        delay = backoff.next_delay(delay);
    }
}

/// Variant for conditions that always produce an observation: polls until
/// `settled` accepts one or the deadline expires, then returns the last
/// observation either way. Callers decide what a stale observation means.
pub async fn poll_until_settled<T, F, Fut, P>(
    what: &str,
    backoff: Backoff,
    mut op: F,
    settled: P,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    let started = Instant::now();
    let mut delay = backoff.initial;
    loop {
        let observed = op().await?;
        if settled(&observed) {
            return Ok(observed);
        }
        if started.elapsed() + delay >= backoff.deadline {
            tracing::warn!(
                "Giving up on {} after {:.0?}, keeping the last observation",
                what,
                started.elapsed()
            );
            return Ok(observed);
        }
        tracing::debug!("Still waiting for {}, next check in {:?}", what, delay);
        sleep(delay).await;
        delay = backoff.next_delay(delay);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast() -> Backoff {
        Backoff::new(
            Duration::from_millis(1),
            Duration::from_millis(4),
            Duration::from_millis(250),
        )
    }

    #[tokio::test]
    async fn returns_once_condition_holds() {
        let attempts = AtomicU32::new(0);
        let value = poll_until("the counter to reach three", fast(), || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(if n >= 3 { Some(n) } else { None })
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn times_out_with_a_named_condition() {
        let err = poll_until::<(), _, _>(
            "a pod that never comes up",
            Backoff::new(
                Duration::from_millis(1),
                Duration::from_millis(2),
                Duration::from_millis(10),
            ),
            || async { Ok(None) },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("a pod that never comes up"));
    }

    #[tokio::test]
    async fn errors_abort_immediately() {
        let attempts = AtomicU32::new(0);
        let err = poll_until::<(), _, _>("anything", fast(), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("connection refused")
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn settled_condition_short_circuits() {
        let attempts = AtomicU32::new(0);
        let value = poll_until_settled(
            "the counter to reach three",
            fast(),
            || async { Ok(attempts.fetch_add(1, Ordering::SeqCst) + 1) },
            |n| *n >= 3,
        )
        .await
        .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn unsettled_condition_yields_the_last_observation() {
        let attempts = AtomicU32::new(0);
        let value = poll_until_settled(
            "a count that never settles",
            Backoff::new(
                Duration::from_millis(1),
                Duration::from_millis(2),
                Duration::from_millis(10),
            ),
            || async { Ok(attempts.fetch_add(1, Ordering::SeqCst) + 1) },
            |_| false,
        )
        .await
        .unwrap();
        assert!(value >= 2);
        assert_eq!(value, attempts.load(Ordering::SeqCst));
    }

    #[test]
    fn delay_doubles_up_to_the_cap() {
        let backoff = fast();
        let mut delay = backoff.initial;
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(delay.as_millis());
            delay = backoff.next_delay(delay);
        }
        assert_eq!(seen, vec![1, 2, 4, 4]);
    }
}
