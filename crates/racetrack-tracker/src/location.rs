//! Location source adapter
//!
//! Wraps a platform [`LocationProvider`] and turns its raw callbacks into
//! canonical [`PositionFix`] values. Exposes a single-shot fix request with
//! a timeout and a cancellable continuous watch.

use crate::error::{TrackingError, TrackingResult};
use racetrack_core::{FixSource, PositionFix, RawFix};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Accuracy requested from the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accuracy {
    #[default]
    High,
    Balanced,
    Low,
}

/// Platform location services
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Ask for location permission; `PermissionDenied` when refused
    async fn request_permission(&self) -> TrackingResult<()>;

    /// One position reading. May never resolve; callers bound it with a timeout.
    async fn current_position(&self, accuracy: Accuracy) -> TrackingResult<RawFix>;

    /// Continuous position updates until the stream is dropped
    fn watch_position(&self, accuracy: Accuracy) -> TrackingResult<BoxStream<'static, RawFix>>;
}

/// Handle to a running watch. Cancelling (or dropping) it stops future
/// callbacks; a callback already executing runs to completion.
pub struct WatchHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Normalizing adapter over a [`LocationProvider`]
#[derive(Clone)]
pub struct LocationAdapter {
    provider: Arc<dyn LocationProvider>,
}

impl LocationAdapter {
    pub fn new(provider: Arc<dyn LocationProvider>) -> Self {
        Self { provider }
    }

    pub async fn ensure_permission(&self) -> TrackingResult<()> {
        self.provider.request_permission().await
    }

    /// Single-shot fix bounded by `timeout`
    pub async fn current_fix(
        &self,
        accuracy: Accuracy,
        timeout: Duration,
        source: FixSource,
    ) -> TrackingResult<PositionFix> {
        let raw = tokio::time::timeout(timeout, self.provider.current_position(accuracy))
            .await
            .map_err(|_| TrackingError::FixTimeout(timeout))??;

        Ok(raw.normalize(source)?)
    }

    /// Start a continuous watch feeding `callback` with normalized fixes
    pub fn watch<F, Fut>(&self, accuracy: Accuracy, callback: F) -> TrackingResult<WatchHandle>
    where
        F: Fn(PositionFix) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut stream = self.provider.watch_position(accuracy)?;
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = tokio::spawn(async move {
            info!("Position watch started ({:?})", accuracy);
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    next = stream.next() => next,
                };

                match next {
                    Some(raw) => match raw.normalize(FixSource::Watch) {
                        Ok(fix) => callback(fix).await,
                        Err(e) => warn!("Discarding watch fix: {}", e),
                    },
                    None => {
                        warn!("Position watch stream ended; relying on backup poll");
                        break;
                    }
                }
            }
            debug!("Position watch stopped");
        });

        Ok(WatchHandle { token, task })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLocation, raw_fix};
    use parking_lot::Mutex;

    #[tokio::test(start_paused = true)]
    async fn test_current_fix_times_out() {
        let (provider, _tx) = FakeLocation::new();
        let adapter = LocationAdapter::new(Arc::new(provider));

        let result = adapter
            .current_fix(Accuracy::High, Duration::from_secs(5), FixSource::Initial)
            .await;
        assert!(matches!(result, Err(TrackingError::FixTimeout(_))));
    }

    #[tokio::test]
    async fn test_current_fix_is_normalized() {
        let (provider, _tx) = FakeLocation::new();
        provider.queue_current(raw_fix(40.0, -3.0));
        let adapter = LocationAdapter::new(Arc::new(provider));

        let fix = adapter
            .current_fix(Accuracy::High, Duration::from_secs(5), FixSource::Poll)
            .await
            .unwrap();
        assert_eq!(fix.latitude, 40.0);
        assert_eq!(fix.source, FixSource::Poll);
    }

    #[tokio::test]
    async fn test_permission_denied_is_surfaced() {
        let (provider, _tx) = FakeLocation::new();
        provider.deny_permission();
        let adapter = LocationAdapter::new(Arc::new(provider));

        assert!(matches!(
            adapter.ensure_permission().await,
            Err(TrackingError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_watch_delivers_until_cancelled() {
        let (provider, tx) = FakeLocation::new();
        let adapter = LocationAdapter::new(Arc::new(provider));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let handle = adapter
            .watch(Accuracy::High, move |fix| {
                let sink = sink.clone();
                async move { sink.lock().push(fix) }
            })
            .unwrap();

        tx.send(raw_fix(40.0, -3.0)).unwrap();
        tx.send(raw_fix(40.001, -3.0)).unwrap();
        crate::testing::wait_until(|| seen.lock().len() == 2).await;
        assert!(seen.lock().iter().all(|f| f.source == FixSource::Watch));

        handle.cancel();
        crate::testing::wait_until(|| handle.is_finished()).await;

        let _ = tx.send(raw_fix(40.002, -3.0));
        tokio::task::yield_now().await;
        assert_eq!(seen.lock().len(), 2);
    }
}
