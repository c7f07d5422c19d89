//! Circuit Breaker Engine: one independent breaker per backend, guarding
//! calls through CLOSED -> OPEN -> HALF_OPEN -> CLOSED transitions with
//! generation fencing so a stale in-flight call can't corrupt a fresh
//! generation's counters.

pub mod window;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::errors::{BreakerRejection, DataplaneError, Result};
use window::RingWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Trips CLOSED -> OPEN once `consecutive_failures >= ready_to_trip`.
    pub ready_to_trip: u32,
    pub sleep_window: Duration,
    pub half_open_max_requests: u32,
    pub max_concurrent_requests: usize,
    pub call_timeout: Duration,
    pub response_time_window: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            ready_to_trip: 6,
            sleep_window: Duration::from_secs(5),
            half_open_max_requests: 1,
            max_concurrent_requests: 100,
            call_timeout: Duration::from_secs(60),
            response_time_window: 64,
        }
    }
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    fallbacks: AtomicU64,
    rejections: AtomicU64,
    state_changes: AtomicU64,
}

/// Point-in-time snapshot of a breaker's counters, for metrics export.
#[derive(Debug, Clone)]
pub struct BreakerStats {
    pub state: State,
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub fallbacks: u64,
    pub rejections: u64,
    pub state_changes: u64,
    pub average_response_time: Duration,
    pub error_rate: f64,
}

struct Inner {
    state: State,
    consecutive_failures: u32,
    generation: u64,
    opened_at: Option<Instant>,
    half_open_inflight: u32,
    last_state_change: Instant,
    window: RingWindow,
}

/// Guards calls to one backend. Internal mutable state sits behind a single
/// mutex with short critical sections only; counters are separate atomics so
/// reading stats never contends with the hot path.
pub struct Breaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
    semaphore: Semaphore,
    counters: Counters,
}

impl Breaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let inner = Inner {
            state: State::Closed,
            consecutive_failures: 0,
            generation: 0,
            opened_at: None,
            half_open_inflight: 0,
            last_state_change: Instant::now(),
            window: RingWindow::new(config.response_time_window),
        };
        Self {
            name: name.into(),
            semaphore: Semaphore::new(config.max_concurrent_requests),
            inner: Mutex::new(inner),
            config,
            counters: Counters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> State {
        self.inner.lock().expect("breaker mutex poisoned").state
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.inner.lock().expect("breaker mutex poisoned");
        let requests = self.counters.requests.load(Ordering::Relaxed);
        let failures = self.counters.failures.load(Ordering::Relaxed);
        let error_rate = if requests == 0 { 0.0 } else { failures as f64 / requests as f64 };
        BreakerStats {
            state: inner.state,
            requests,
            successes: self.counters.successes.load(Ordering::Relaxed),
            failures,
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
            rejections: self.counters.rejections.load(Ordering::Relaxed),
            state_changes: self.counters.state_changes.load(Ordering::Relaxed),
            average_response_time: inner.window.average(),
            error_rate,
        }
    }

    /// Runs `f` if the breaker admits the call, racing it against the
    /// breaker's own timeout. Equivalent to `execute_with_ctx` with a token
    /// that is never cancelled externally.
    pub async fn execute<F, Fut, T, E>(&self, f: F) -> Result<std::result::Result<T, E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, E>>,
    {
        self.execute_with_ctx(CancellationToken::new(), f).await
    }

    /// Ctx-aware call: cancels on `ctx` or on the breaker's internal
    /// timeout, whichever comes first. Returns the rejection directly; call
    /// [`Self::execute_with_fallback`] instead to run a fallback on
    /// rejection.
    #[instrument(skip(self, f), fields(breaker = %self.name))]
    pub async fn execute_with_ctx<F, Fut, T, E>(
        &self,
        ctx: CancellationToken,
        f: F,
    ) -> Result<std::result::Result<T, E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, E>>,
    {
        let permit = match self.semaphore.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                self.counters.rejections.fetch_add(1, Ordering::Relaxed);
                return Err(DataplaneError::Breaker(BreakerRejection::TooManyRequests));
            }
        };

        let generation = match self.before_request() {
            Ok(generation) => generation,
            Err(rejection) => {
                self.counters.rejections.fetch_add(1, Ordering::Relaxed);
                return Err(DataplaneError::Breaker(rejection));
            }
        };

        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let outcome = tokio::select! {
            result = f() => Ok(result),
            _ = ctx.cancelled() => Err(()),
            _ = tokio::time::sleep(self.config.call_timeout) => Err(()),
        };

        drop(permit);
        let elapsed = started.elapsed();

        match outcome {
            Ok(result) => {
                self.after_request(generation, result.is_ok(), elapsed);
                if result.is_ok() {
                    self.counters.successes.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.counters.failures.fetch_add(1, Ordering::Relaxed);
                }
                Ok(result)
            }
            Err(()) => {
                self.after_request(generation, false, elapsed);
                self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                Err(DataplaneError::Breaker(BreakerRejection::Timeout))
            }
        }
    }

    /// Like [`Self::execute_with_ctx`], but runs `fallback` instead of
    /// surfacing the breaker's rejection (open, too-many-requests, timeout).
    /// The call's own `Err(E)` is never a fallback trigger -- only the
    /// breaker's decision not to run `f` at all, or its timeout, is.
    pub async fn execute_with_fallback<F, Fut, Fb, FbFut, T, E>(
        &self,
        ctx: CancellationToken,
        f: F,
        fallback: Fb,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, E>>,
        Fb: FnOnce() -> FbFut,
        FbFut: std::future::Future<Output = std::result::Result<T, E>>,
    {
        match self.execute_with_ctx(ctx, f).await {
            Ok(result) => result,
            Err(_) => {
                self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
                fallback().await
            }
        }
    }

    fn before_request(&self) -> std::result::Result<u64, BreakerRejection> {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.state {
            State::Closed => Ok(inner.generation),
            State::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed >= self.config.sleep_window {
                    self.transition(&mut inner, State::HalfOpen);
                    inner.half_open_inflight = 1;
                    Ok(inner.generation)
                } else {
                    Err(BreakerRejection::Open)
                }
            }
            State::HalfOpen => {
                if inner.half_open_inflight >= self.config.half_open_max_requests {
                    Err(BreakerRejection::TooManyRequests)
                } else {
                    inner.half_open_inflight += 1;
                    Ok(inner.generation)
                }
            }
        }
    }

    fn after_request(&self, observed_generation: u64, success: bool, elapsed: Duration) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        if inner.generation != observed_generation {
            return;
        }
        inner.window.record(elapsed);

        match inner.state {
            State::Closed => {
                if success {
                    inner.consecutive_failures = 0;
                } else {
                    inner.consecutive_failures += 1;
                    if inner.consecutive_failures >= self.config.ready_to_trip {
                        self.transition(&mut inner, State::Open);
                    }
                }
            }
            State::HalfOpen => {
                inner.half_open_inflight = inner.half_open_inflight.saturating_sub(1);
                if success {
                    inner.consecutive_failures = 0;
                    self.transition(&mut inner, State::Closed);
                } else {
                    self.transition(&mut inner, State::Open);
                }
            }
            State::Open => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: State) {
        inner.state = to;
        inner.generation += 1;
        inner.last_state_change = Instant::now();
        inner.opened_at = if to == State::Open { Some(Instant::now()) } else { None };
        self.counters.state_changes.fetch_add(1, Ordering::Relaxed);
        info!(breaker = %self.name, ?to, "circuit breaker state transition");
    }
}

/// Per-proxy table of breakers keyed by backend identifier
/// (`host:port`/FQDN/service name). Creation uses double-checked locking via
/// `DashMap::entry`, matching the pattern other in-process proxy registries
/// in this codebase use for read-mostly, occasionally-inserted maps.
#[derive(Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<Breaker>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert(&self, backend: &str, config: BreakerConfig) -> Arc<Breaker> {
        if let Some(existing) = self.breakers.get(backend) {
            return existing.clone();
        }
        self.breakers.entry(backend.to_string()).or_insert_with(|| Arc::new(Breaker::new(backend, config))).clone()
    }

    pub fn get(&self, backend: &str) -> Option<Arc<Breaker>> {
        self.breakers.get(backend).map(|b| b.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BreakerConfig {
        BreakerConfig {
            ready_to_trip: 3,
            sleep_window: Duration::from_millis(50),
            half_open_max_requests: 1,
            max_concurrent_requests: 10,
            call_timeout: Duration::from_secs(5),
            response_time_window: 8,
        }
    }

    async fn fail() -> std::result::Result<(), &'static str> {
        Err("boom")
    }

    async fn succeed() -> std::result::Result<(), &'static str> {
        Ok(())
    }

    #[tokio::test]
    async fn trips_open_after_the_configured_consecutive_failures() {
        let breaker = Breaker::new("backend-a", test_config());
        for _ in 0..3 {
            let _ = breaker.execute(fail).await;
        }
        assert_eq!(breaker.state(), State::Open);

        let rejected = breaker.execute(succeed).await;
        assert!(matches!(rejected, Err(DataplaneError::Breaker(BreakerRejection::Open))));
    }

    #[tokio::test]
    async fn half_open_accepts_one_probe_and_closes_on_success() {
        let breaker = Breaker::new("backend-b", test_config());
        for _ in 0..3 {
            let _ = breaker.execute(fail).await;
        }
        assert_eq!(breaker.state(), State::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let result = breaker.execute(succeed).await.unwrap();
        assert!(result.is_ok());
        assert_eq!(breaker.state(), State::Closed);
    }

    #[tokio::test]
    async fn half_open_rejects_a_second_concurrent_probe() {
        let breaker = Arc::new(Breaker::new("backend-c", test_config()));
        for _ in 0..3 {
            let _ = breaker.execute(fail).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        let b1 = breaker.clone();
        let probe = tokio::spawn(async move {
            b1.execute(|| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                succeed().await
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = breaker.execute(succeed).await;
        assert!(matches!(second, Err(DataplaneError::Breaker(BreakerRejection::TooManyRequests))));
        probe.await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn concurrency_cap_rejects_excess_requests() {
        let mut config = test_config();
        config.max_concurrent_requests = 1;
        let breaker = Arc::new(Breaker::new("backend-d", config));

        let b1 = breaker.clone();
        let holder = tokio::spawn(async move {
            b1.execute(|| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                succeed().await
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let rejected = breaker.execute(succeed).await;
        assert!(matches!(rejected, Err(DataplaneError::Breaker(BreakerRejection::TooManyRequests))));
        holder.await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn a_stale_generation_outcome_is_discarded() {
        let breaker = Breaker::new("backend-e", test_config());
        let generation_before = breaker.inner.lock().unwrap().generation;
        for _ in 0..3 {
            let _ = breaker.execute(fail).await;
        }
        assert_ne!(breaker.inner.lock().unwrap().generation, generation_before);
        breaker.after_request(generation_before, true, Duration::from_millis(1));
        assert_eq!(breaker.state(), State::Open);
    }

    #[tokio::test]
    async fn fallback_runs_instead_of_surfacing_a_rejection() {
        let breaker = Breaker::new("backend-g", test_config());
        for _ in 0..3 {
            let _ = breaker.execute(fail).await;
        }
        assert_eq!(breaker.state(), State::Open);

        let result: std::result::Result<&'static str, &'static str> = breaker
            .execute_with_fallback(CancellationToken::new(), succeed_with_value, || async { Ok("fallback") })
            .await;
        assert_eq!(result, Ok("fallback"));
        assert_eq!(breaker.stats().fallbacks, 1);
    }

    async fn succeed_with_value() -> std::result::Result<&'static str, &'static str> {
        Ok("primary")
    }

    #[test]
    fn registry_returns_the_same_breaker_for_the_same_backend() {
        let registry = BreakerRegistry::new();
        let a = registry.get_or_insert("backend-f", BreakerConfig::default());
        let b = registry.get_or_insert("backend-f", BreakerConfig::default());
        assert!(Arc::ptr_eq(&a, &b));
    }
}
