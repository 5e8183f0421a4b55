//! Bounded exponential-backoff retry and synthetic fault injection.
//!
//! [`RetryPolicy::execute`] treats every failure the same way: it waits,
//! then tries again, until the attempt budget is spent. Attempts never
//! overlap and an in-flight attempt is never cancelled.

use std::{
  future::Future,
  sync::{Mutex, PoisonError},
  time::Duration,
};

use rand::{Rng as _, SeedableRng as _, rngs::StdRng};

use crate::{Error, Result};

// ─── Policy ──────────────────────────────────────────────────────────────────

/// How many times to retry and how long to wait in between.
///
/// The delay before retry `k` (1-based) is `initial_backoff * 2^(k-1)`; the
/// defaults give 2s, 4s and 8s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Retries after the first attempt.
  pub max_retries:     u32,
  pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries:     3,
      initial_backoff: Duration::from_secs(2),
    }
  }
}

impl RetryPolicy {
  pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
    Self { max_retries, initial_backoff }
  }

  /// A policy that runs the operation exactly once.
  pub fn none() -> Self { Self::new(0, Duration::ZERO) }

  pub fn max_attempts(&self) -> u32 { self.max_retries + 1 }

  /// Delay before the given 1-based retry.
  pub fn delay_before_retry(&self, retry: u32) -> Duration {
    let factor = 2u32.saturating_pow(retry.saturating_sub(1));
    self.initial_backoff.saturating_mul(factor)
  }

  /// Run `operation` until it succeeds or the attempt budget is spent.
  ///
  /// The final failure is wrapped in [`Error::RetriesExhausted`].
  pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let mut attempt = 1;
    loop {
      match operation().await {
        Ok(value) => return Ok(value),
        Err(e) if attempt > self.max_retries => {
          tracing::error!(attempts = attempt, error = %e, "retries exhausted");
          return Err(Error::RetriesExhausted {
            attempts: attempt,
            source:   Box::new(e),
          });
        }
        Err(e) => {
          let delay = self.delay_before_retry(attempt);
          tracing::warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "attempt failed; retrying"
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
      }
    }
  }
}

// ─── Fault injection ─────────────────────────────────────────────────────────

/// Decides whether an attempt should fail on purpose. Used to exercise the
/// retry path without real I/O faults.
pub trait FaultInjector: Send + Sync {
  fn should_fail(&self) -> bool;
}

/// The default injector: never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverFail;

impl FaultInjector for NeverFail {
  fn should_fail(&self) -> bool { false }
}

impl<F> FaultInjector for F
where
  F: Fn() -> bool + Send + Sync,
{
  fn should_fail(&self) -> bool { self() }
}

/// Fails with probability `1 / one_in`, drawn from a seedable generator.
#[derive(Debug)]
pub struct RandomFaults {
  rng:    Mutex<StdRng>,
  one_in: u32,
}

impl RandomFaults {
  /// Reproducible faults for tests and demos.
  pub fn seeded(seed: u64, one_in: u32) -> Self {
    Self::with_rng(StdRng::seed_from_u64(seed), one_in)
  }

  pub fn from_entropy(one_in: u32) -> Self {
    Self::with_rng(StdRng::from_entropy(), one_in)
  }

  fn with_rng(rng: StdRng, one_in: u32) -> Self {
    Self { rng: Mutex::new(rng), one_in: one_in.max(1) }
  }
}

impl FaultInjector for RandomFaults {
  fn should_fail(&self) -> bool {
    let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
    rng.gen_ratio(1, self.one_in)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};

  use tokio::time::Instant;

  use super::*;

  fn secs(s: u64) -> Duration { Duration::from_secs(s) }

  fn assert_close(actual: Duration, expected: Duration) {
    assert!(
      actual >= expected && actual < expected + Duration::from_millis(50),
      "expected ~{expected:?}, got {actual:?}"
    );
  }

  #[test]
  fn default_delays_double_from_two_seconds() {
    let p = RetryPolicy::default();
    assert_eq!(p.max_attempts(), 4);
    let delays: Vec<_> = (1..=3).map(|k| p.delay_before_retry(k)).collect();
    assert_eq!(delays, vec![secs(2), secs(4), secs(8)]);
  }

  #[tokio::test(start_paused = true)]
  async fn always_failing_operation_exhausts_four_attempts() {
    let policy = RetryPolicy::default();
    let stamps = Mutex::new(Vec::new());

    let result: Result<()> = policy
      .execute(|| {
        stamps.lock().unwrap().push(Instant::now());
        async { Err(Error::SimulatedFailure) }
      })
      .await;

    match result {
      Err(Error::RetriesExhausted { attempts, source }) => {
        assert_eq!(attempts, 4);
        assert!(matches!(*source, Error::SimulatedFailure));
      }
      other => panic!("unexpected result: {other:?}"),
    }

    let stamps = stamps.into_inner().unwrap();
    assert_eq!(stamps.len(), 4);
    let gaps: Vec<_> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
    assert_close(gaps[0], secs(2));
    assert_close(gaps[1], secs(4));
    assert_close(gaps[2], secs(8));
  }

  #[tokio::test(start_paused = true)]
  async fn succeeds_once_the_operation_recovers() {
    let policy = RetryPolicy::default();
    let calls = AtomicU32::new(0);
    let start = Instant::now();

    let value = policy
      .execute(|| {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
          if n < 3 { Err(Error::SimulatedFailure) } else { Ok(n) }
        }
      })
      .await
      .unwrap();

    assert_eq!(value, 3);
    assert_close(start.elapsed(), secs(6));
  }

  #[tokio::test]
  async fn first_success_does_not_wait() {
    let calls = AtomicU32::new(0);
    let value = RetryPolicy::default()
      .execute(|| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok("done") }
      })
      .await
      .unwrap();
    assert_eq!(value, "done");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn zero_retries_runs_once() {
    let calls = AtomicU32::new(0);
    let err = RetryPolicy::none()
      .execute(|| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(Error::Validation("nope".into())) }
      })
      .await
      .unwrap_err();
    assert!(matches!(err, Error::RetriesExhausted { attempts: 1, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn seeded_faults_are_reproducible() {
    let a = RandomFaults::seeded(42, 3);
    let b = RandomFaults::seeded(42, 3);
    let draws_a: Vec<bool> = (0..64).map(|_| a.should_fail()).collect();
    let draws_b: Vec<bool> = (0..64).map(|_| b.should_fail()).collect();
    assert_eq!(draws_a, draws_b);
  }

  #[test]
  fn random_faults_fire_about_one_in_three() {
    let faults = RandomFaults::seeded(7, 3);
    let fired = (0..3000).filter(|_| faults.should_fail()).count();
    assert!((850..1150).contains(&fired), "fired {fired} times");
  }

  #[test]
  fn one_in_one_always_fails() {
    let faults = RandomFaults::seeded(1, 1);
    assert!((0..10).all(|_| faults.should_fail()));
    assert!(!NeverFail.should_fail());
  }

  #[test]
  fn closures_are_injectors() {
    let flip = AtomicU32::new(0);
    let injector = move || flip.fetch_add(1, Ordering::SeqCst) % 2 == 0;
    assert!(injector.should_fail());
    assert!(!injector.should_fail());
  }
}
