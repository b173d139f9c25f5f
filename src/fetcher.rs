//! Consolidated data fetcher.
//!
//! Wraps an async source with: a single request in flight (a newer `refresh`
//! supersedes the older one), exponential backoff on transient gateway
//! errors, optional polling gated by a staleness threshold, and optional
//! live refresh driven by a gateway subscription. State is published through
//! a `watch` channel so any number of views can follow it.

use std::{future::Future, sync::Arc, time::Duration};

use futures::{future::BoxFuture, FutureExt};
use thiserror::Error;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::gateway::{GatewayError, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based): base * 2^attempt, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub retry: RetryPolicy,
    /// Polling period; `None` disables polling.
    pub poll_interval: Option<Duration>,
    pub stale_after: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            poll_interval: None,
            stale_after: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchState<T> {
    Idle,
    Loading,
    Loaded { data: T, fetched_at: Instant },
    Errored { message: String },
}

impl<T> FetchState<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            FetchState::Loaded { data, .. } => Some(data),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request superseded by a newer one")]
    Superseded,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

type Source<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, GatewayError>> + Send + Sync>;

pub struct Fetcher<T> {
    source: Source<T>,
    options: FetchOptions,
    state: watch::Sender<FetchState<T>>,
    in_flight: Mutex<Option<CancellationToken>>,
}

impl<T> Fetcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(source: F, options: FetchOptions) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, GatewayError>> + Send + 'static,
    {
        let (state, _) = watch::channel(FetchState::Idle);
        Self {
            source: Arc::new(move || source().boxed()),
            options,
            state,
            in_flight: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    pub fn state(&self) -> FetchState<T> {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<FetchState<T>> {
        self.state.subscribe()
    }

    /// True when nothing has been loaded yet or the data outlived `stale_after`.
    pub fn is_stale(&self) -> bool {
        match &*self.state.borrow() {
            FetchState::Loaded { fetched_at, .. } => {
                fetched_at.elapsed() >= self.options.stale_after
            }
            _ => true,
        }
    }

    /// Fetches from the source, cancelling whatever request was still running.
    pub async fn refresh(&self) -> Result<T, FetchError> {
        let token = CancellationToken::new();
        if let Some(previous) = self.in_flight.lock().await.replace(token.clone()) {
            previous.cancel();
        }
        self.state.send_replace(FetchState::Loading);

        let result = tokio::select! {
            _ = token.cancelled() => return Err(FetchError::Superseded),
            result = self.run_with_retry() => result,
        };

        let mut in_flight = self.in_flight.lock().await;
        if token.is_cancelled() {
            return Err(FetchError::Superseded);
        }
        *in_flight = None;

        match result {
            Ok(data) => {
                self.state.send_replace(FetchState::Loaded {
                    data: data.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(data)
            }
            Err(e) => {
                self.state.send_replace(FetchState::Errored {
                    message: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    async fn run_with_retry(&self) -> Result<T, GatewayError> {
        let policy = self.options.retry;
        let mut attempt = 0;
        loop {
            match (self.source)().await {
                Ok(data) => return Ok(data),
                Err(e) if e.is_transient() && attempt < policy.max_retries => {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Refreshes on every poll tick where the data has gone stale. Returns
    /// `None` when polling is disabled.
    pub fn spawn_polling(self: &Arc<Self>, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        let period = self.options.poll_interval?;
        let fetcher = Arc::clone(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if fetcher.is_stale() {
                            fetcher.refresh_logged("poll").await;
                        }
                    }
                }
            }
        }))
    }

    /// Refetches whenever the subscription reports a change.
    pub fn spawn_live(
        self: &Arc<Self>,
        mut subscription: Subscription,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let fetcher = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    change = subscription.next() => match change {
                        Some(change) => {
                            tracing::debug!(
                                table = %change.table,
                                kind = ?change.kind,
                                "live change"
                            );
                            fetcher.refresh_logged("live").await;
                        }
                        None => break,
                    },
                }
            }
        })
    }

    async fn refresh_logged(&self, trigger: &'static str) {
        match self.refresh().await {
            Ok(_) | Err(FetchError::Superseded) => {}
            Err(e) => tracing::warn!(trigger, error = %e, "background refresh failed"),
        }
    }
}
