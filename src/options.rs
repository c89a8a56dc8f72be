use std::{fmt, future::Future, pin::Pin, sync::Arc, time::Duration};

use crate::Payload;

/// Future returned by a [`Sleep`] implementation.
pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Caller-supplied delay used before the single retry attempt.
///
/// Implemented for [`TokioSleep`] and for any
/// `Fn(Duration) -> impl Future<Output = ()>` closure, which lets tests
/// inject instant or counting timers.
pub trait Sleep: Send + Sync {
    fn sleep(&self, duration: Duration) -> SleepFuture;
}

impl<F, Fut> Sleep for F
where
    F: Fn(Duration) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn sleep(&self, duration: Duration) -> SleepFuture {
        Box::pin(self(duration))
    }
}

/// [`Sleep`] backed by `tokio::time::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleep;

impl Sleep for TokioSleep {
    fn sleep(&self, duration: Duration) -> SleepFuture {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Permission for one delayed re-attempt.
///
/// The delay primitive travels with the permission, so a retry can never be
/// requested without a way to wait for it.
#[derive(Clone)]
pub struct RetryPolicy {
    pub sleeper: Arc<dyn Sleep>,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(sleeper: impl Sleep + 'static, delay: Duration) -> Self {
        Self {
            sleeper: Arc::new(sleeper),
            delay,
        }
    }

    /// Retry after `delay` using the tokio timer.
    pub fn tokio(delay: Duration) -> Self {
        Self::new(TokioSleep, delay)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

/// Per-request options.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// Request body. Set by [`post`](crate::RequestEngine::post) and
    /// [`put`](crate::RequestEngine::put); must be left empty for those.
    pub payload: Option<Payload>,
    /// Allow exactly one delayed re-attempt when the first yields no text.
    pub retry: Option<RetryPolicy>,
    /// Log failures at debug level instead of error level.
    pub error_suppress: bool,
    /// Decode non-2xx bodies instead of treating them as failures.
    pub stubborn: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn error_suppress(mut self) -> Self {
        self.error_suppress = true;
        self
    }

    pub fn stubborn(mut self) -> Self {
        self.stubborn = true;
        self
    }

    /// Failures are expected by the caller or will be retried.
    pub(crate) fn quiet_failures(&self) -> bool {
        self.error_suppress || self.retry.is_some()
    }
}
