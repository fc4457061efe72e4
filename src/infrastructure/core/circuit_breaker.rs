use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,   // Calls pass through
    Open,     // Too many consecutive failures, calls are refused
    HalfOpen, // Cool-down elapsed, probing with real calls
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: usize,
    trial_successes: usize,
    opened_at: Option<Instant>,
}

/// Stops hammering the exchange after repeated failures.
///
/// Retries for a single request are handled by the HTTP middleware; this
/// sits above it and counts requests that failed even after retrying.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: usize,
    success_threshold: usize,
    cool_down: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// * `failure_threshold` - consecutive failures that open the circuit
    /// * `success_threshold` - successful trial calls needed to close it again
    /// * `cool_down` - how long to refuse calls before probing
    pub fn new(
        name: impl Into<String>,
        failure_threshold: usize,
        success_threshold: usize,
        cool_down: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            success_threshold: success_threshold.max(1),
            cool_down,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                trial_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Default settings for exchange REST calls
    pub fn for_exchange(name: impl Into<String>) -> Self {
        Self::new(name, 5, 2, Duration::from_secs(60))
    }

    pub async fn call<F, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        self.admit().await?;

        match f.await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(e) => {
                self.record_failure().await;
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }

    async fn admit<E>(&self) -> Result<(), CircuitBreakerError<E>> {
        let mut inner = self.inner.lock().await;
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
        if elapsed >= self.cool_down {
            info!("CircuitBreaker [{}]: Open -> HalfOpen", self.name);
            inner.state = CircuitState::HalfOpen;
            inner.trial_successes = 0;
            Ok(())
        } else {
            Err(CircuitBreakerError::Open(format!(
                "[{}] retry in {:?}",
                self.name,
                self.cool_down - elapsed
            )))
        }
    }

    async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.consecutive_failures = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.trial_successes += 1;
            if inner.trial_successes >= self.success_threshold {
                info!("CircuitBreaker [{}]: HalfOpen -> Closed", self.name);
                inner.state = CircuitState::Closed;
                inner.opened_at = None;
            }
        }
    }

    async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.consecutive_failures += 1;

        match inner.state {
            CircuitState::HalfOpen => {
                warn!("CircuitBreaker [{}]: trial call failed, reopening", self.name);
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Closed if inner.consecutive_failures >= self.failure_threshold => {
                error!(
                    "CircuitBreaker [{}]: Closed -> Open after {} failures",
                    self.name, inner.consecutive_failures
                );
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            _ => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open: {0}")]
    Open(String),

    #[error(transparent)]
    Inner(E),
}

impl CircuitBreakerError<anyhow::Error> {
    pub fn into_anyhow(self) -> anyhow::Error {
        match self {
            CircuitBreakerError::Open(msg) => anyhow::anyhow!("Circuit breaker open: {}", msg),
            CircuitBreakerError::Inner(inner) => inner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_opens_after_consecutive_failures() {
        let cb = CircuitBreaker::new("test", 3, 1, Duration::from_secs(60));

        for _ in 0..3 {
            assert!(cb.call(async { Err::<(), &str>("boom") }).await.is_err());
        }
        assert_eq!(cb.state().await, CircuitState::Open);

        let refused = cb.call(async { Ok::<(), &str>(()) }).await;
        assert!(matches!(refused, Err(CircuitBreakerError::Open(_))));
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let cb = CircuitBreaker::new("test", 2, 1, Duration::from_secs(60));

        let _ = cb.call(async { Err::<(), &str>("boom") }).await;
        let _ = cb.call(async { Ok::<(), &str>(()) }).await;
        let _ = cb.call(async { Err::<(), &str>("boom") }).await;

        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_recovers_after_cool_down() {
        let cb = CircuitBreaker::new("test", 1, 2, Duration::from_millis(50));
        let _ = cb.call(async { Err::<(), &str>("boom") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(cb.call(async { Ok::<(), &str>(()) }).await.is_ok());
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        assert!(cb.call(async { Ok::<(), &str>(()) }).await.is_ok());
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_failed_trial_call_reopens() {
        let cb = CircuitBreaker::new("test", 1, 1, Duration::from_millis(50));
        let _ = cb.call(async { Err::<(), &str>("boom") }).await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        let _ = cb.call(async { Err::<(), &str>("still down") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }
}
