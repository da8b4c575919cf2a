//
// buffer.rs
//
// Debounced accumulation of incoming edits into one pending change set
//

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::error::PatchError;
use crate::patch::ChangeSet;

/// Receiver of flushed change sets
#[async_trait]
pub trait FlushTarget: Send + Sync {
    /// Apply a composed change set. Called at most once at a time, in
    /// composition order.
    async fn flush(&self, patch: ChangeSet);
}

/// Quiet-period bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_change_len: usize,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 50,
            max_delay_ms: 500,
            max_change_len: 1000,
        }
    }
}

impl From<&WorkerConfig> for DebounceConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            min_delay_ms: config.min_delay_ms,
            max_delay_ms: config.max_delay_ms,
            max_change_len: config.max_change_len,
        }
    }
}

/// Quiet period for a pending change set affecting `size` chars:
/// `ceil(min + (max - min) * min(size, cap) / cap)` milliseconds
pub fn debounce_delay(size: usize, config: &DebounceConfig) -> Duration {
    let min = config.min_delay_ms;
    let max = config.max_delay_ms.max(min);
    let cap = config.max_change_len.max(1) as u64;
    let size = (size as u64).min(cap);
    let span = max - min;
    let scaled = (u128::from(span) * u128::from(size)).div_ceil(u128::from(cap));
    // scaled <= span, so the narrowing cannot truncate
    Duration::from_millis(min + scaled as u64)
}

#[derive(Default)]
struct Pending {
    patch: Option<ChangeSet>,
    /// Batch the next composed edit belongs to
    batch: u64,
    timer: Option<CancellationToken>,
}

struct BufferInner {
    config: DebounceConfig,
    target: Arc<dyn FlushTarget>,
    pending: Mutex<Pending>,
    flush_lock: tokio::sync::Mutex<()>,
    /// Highest batch id that has been flushed
    flushed: watch::Sender<Option<u64>>,
    flush_count: AtomicU64,
    shutdown: CancellationToken,
}

/// Accumulates edits and flushes them after an adaptive quiet period.
///
/// Cloning yields another handle to the same buffer.
#[derive(Clone)]
pub struct ChangeBuffer {
    inner: Arc<BufferInner>,
}

impl ChangeBuffer {
    pub fn new(config: DebounceConfig, target: Arc<dyn FlushTarget>) -> Self {
        let (flushed, _) = watch::channel(None);
        Self {
            inner: Arc::new(BufferInner {
                config,
                target,
                pending: Mutex::new(Pending::default()),
                flush_lock: tokio::sync::Mutex::new(()),
                flushed,
                flush_count: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Compose `changes` into the pending change set and reschedule the flush.
    ///
    /// Composition happens before this returns, so edits are ordered by call
    /// order. The returned future resolves once the batch containing these
    /// changes has been flushed.
    pub fn submit(&self, changes: ChangeSet) -> Result<impl Future<Output = ()> + Send + 'static, PatchError> {
        let (batch, delay, timer) = {
            let mut pending = self.inner.pending.lock().unwrap_or_else(|e| e.into_inner());
            let composed = match pending.patch.take() {
                None => changes,
                Some(previous) => match previous.compose(&changes) {
                    Ok(composed) => composed,
                    Err(e) => {
                        pending.patch = Some(previous);
                        return Err(e);
                    }
                },
            };

            let delay = debounce_delay(composed.affected_len(), &self.inner.config);
            log::trace!(
                "Composed edit into batch {} (affected {}, flush in {:?})",
                pending.batch,
                composed.affected_len(),
                delay
            );
            pending.patch = Some(composed);

            if let Some(previous) = pending.timer.take() {
                previous.cancel();
            }
            let timer = CancellationToken::new();
            pending.timer = Some(timer.clone());
            (pending.batch, delay, timer)
        };

        self.schedule_flush(timer, delay);

        let mut flushed = self.inner.flushed.subscribe();
        let shutdown = self.inner.shutdown.clone();
        Ok(async move {
            tokio::select! {
                _ = flushed.wait_for(|f| f.is_some_and(|f| f >= batch)) => {}
                _ = shutdown.cancelled() => {}
            }
        })
    }

    /// Submit and wait for the flush
    pub async fn submit_and_wait(&self, changes: ChangeSet) -> Result<(), PatchError> {
        self.submit(changes)?.await;
        Ok(())
    }

    fn schedule_flush(&self, timer: CancellationToken, delay: Duration) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {
                    log::trace!("Flush timer superseded");
                    return;
                }
                _ = inner.shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            inner.flush(Some(&timer)).await;
        });
    }

    /// Flush the pending change set now
    pub async fn flush_now(&self) {
        self.inner.flush(None).await;
    }

    /// Whether edits are waiting for a flush
    pub fn has_pending(&self) -> bool {
        self.inner
            .pending
            .lock()
            .map(|p| p.patch.is_some())
            .unwrap_or(false)
    }

    /// Number of flushes that applied a change set
    pub fn flush_count(&self) -> u64 {
        self.inner.flush_count.load(Ordering::Relaxed)
    }

    /// Cancel any scheduled flush and release every waiter
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Token cancelled by [`ChangeBuffer::shutdown`]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }
}

impl BufferInner {
    /// Flush the pending change set. `timer` is the token of the timer that
    /// fired, if any; a timer cancelled while waiting for the lock flushes
    /// nothing.
    async fn flush(&self, timer: Option<&CancellationToken>) {
        let _guard = self.flush_lock.lock().await;

        let (patch, batch) = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            if timer.is_some_and(|t| t.is_cancelled()) {
                return;
            }
            let batch = pending.batch;
            pending.batch += 1;
            if let Some(timer) = pending.timer.take() {
                timer.cancel();
            }
            (pending.patch.take(), batch)
        };

        if let Some(patch) = patch {
            log::trace!("Flushing batch {} ({} ops)", batch, patch.ops().len());
            self.target.flush(patch).await;
            self.flush_count.fetch_add(1, Ordering::Relaxed);
        }

        self.flushed
            .send_modify(|f| *f = Some(f.map_or(batch, |prev| prev.max(batch))));
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_debounce_delay_is_monotonic_and_bounded(
            a in 0usize..5000,
            b in 0usize..5000,
            min in 0u64..200,
            extra in 0u64..1000,
            cap in 1usize..3000,
        ) {
            let config = DebounceConfig { min_delay_ms: min, max_delay_ms: min + extra, max_change_len: cap };
            let (small, large) = if a <= b { (a, b) } else { (b, a) };
            let d_small = debounce_delay(small, &config);
            let d_large = debounce_delay(large, &config);
            prop_assert!(d_small <= d_large);
            prop_assert!(d_small >= Duration::from_millis(min));
            prop_assert!(d_large <= Duration::from_millis(min + extra));
            prop_assert_eq!(debounce_delay(0, &config), Duration::from_millis(min));
            prop_assert_eq!(debounce_delay(cap, &config), Duration::from_millis(min + extra));
        }
    }
}
