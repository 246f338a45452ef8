//! Background lease renewal for locks acquired without an explicit TTL.
//!
//! A [`Watchdog`] is attached to one lock instance. After each successful
//! acquisition in watchdog mode it spawns a renewal task that, every
//! [`WATCHDOG_TICK`], pushes the key's expiry out to `WATCHDOG_TICK +
//! WATCHDOG_MARGIN` through the token-checked extend script.
//!
//! At most one renewal task runs per instance. The guard is an atomic flag
//! claimed with compare-exchange before spawning and cleared when the task
//! exits; a start that finds the flag set waits for the previous task to wind
//! down instead of spawning a second loop.
//!
//! Renewal failures do not stop the loop. Only the stop handle does.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::LockError;
use crate::lock::extend_lease;
use crate::store::LockStore;

/// Interval between lease renewals.
pub const WATCHDOG_TICK: Duration = Duration::from_secs(10);

/// Extra lease time added on each renewal to absorb scheduling jitter and
/// network latency.
pub const WATCHDOG_MARGIN: Duration = Duration::from_secs(10);

/// Clears the running flag when the renewal task ends, however it ends.
struct RunningFlag(Arc<AtomicBool>);

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Renewal task handle owned by a lock instance.
#[derive(Debug, Default)]
pub struct Watchdog {
    running: Arc<AtomicBool>,
    stop: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a renewal task is currently alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the renewal loop for `key`/`token`.
    ///
    /// The loop's stop handle is a child of `parent`, so cancelling the
    /// acquisition token also stops renewal, while [`stop`](Self::stop)
    /// stops renewal alone.
    pub(crate) async fn start(
        &mut self,
        store: Arc<dyn LockStore>,
        key: String,
        token: String,
        parent: &CancellationToken,
    ) {
        // A leftover task from an earlier acquisition must not keep renewing.
        if let Some(previous) = self.stop.take() {
            previous.cancel();
        }

        while self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tokio::task::yield_now().await;
        }

        let stop = parent.child_token();
        let flag = RunningFlag(Arc::clone(&self.running));
        let task_stop = stop.clone();
        debug!(key = %key, "starting lock watchdog");

        self.handle = Some(tokio::spawn(async move {
            let _flag = flag;
            renew_until_stopped(store.as_ref(), &key, &token, &task_stop).await;
        }));
        self.stop = Some(stop);
    }

    /// Signal the renewal task to stop and wait for it to exit.
    pub async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop.cancel();
        }
        if let Some(handle) = self.handle.take() {
            // The task never panics on its own; a join error means the
            // runtime is shutting down.
            let _ = handle.await;
        }
    }

    /// Signal the renewal task to stop without waiting.
    pub fn cancel(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop.cancel();
        }
        self.handle = None;
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn renew_until_stopped(
    store: &dyn LockStore,
    key: &str,
    token: &str,
    stop: &CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + WATCHDOG_TICK, WATCHDOG_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match extend_lease(store, key, token, WATCHDOG_TICK + WATCHDOG_MARGIN, stop).await {
            Ok(()) => {
                failures = 0;
                debug!(key = %key, "lock lease renewed");
            }
            Err(LockError::Cancelled) => break,
            Err(e) => {
                failures = failures.saturating_add(1);
                warn!(
                    key = %key,
                    error = %e,
                    consecutive_failures = failures,
                    "lock lease renewal failed"
                );
            }
        }
    }

    debug!(key = %key, "lock watchdog stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;

    use super::*;
    use crate::store::{LockScript, SetOutcome};

    /// Store that accepts every extend and counts them.
    #[derive(Default)]
    struct CountingStore {
        extends: AtomicU32,
    }

    impl CountingStore {
        fn extends(&self) -> u32 {
            self.extends.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LockStore for CountingStore {
        async fn set_if_absent(
            &self,
            _key: &str,
            _value: &str,
            _ttl: Duration,
        ) -> Result<SetOutcome, LockError> {
            Ok(SetOutcome::Acquired)
        }

        async fn eval(
            &self,
            script: LockScript,
            _key: &str,
            _args: &[String],
        ) -> Result<i64, LockError> {
            if script == LockScript::Extend {
                self.extends.fetch_add(1, Ordering::SeqCst);
            }
            Ok(1)
        }

        async fn get(&self, _key: &str) -> Result<Option<String>, LockError> {
            Ok(None)
        }
    }

    async fn start(
        watchdog: &mut Watchdog,
        store: &Arc<CountingStore>,
        parent: &CancellationToken,
    ) {
        let store: Arc<dyn LockStore> = Arc::<CountingStore>::clone(store);
        watchdog
            .start(store, "key".into(), "token".into(), parent)
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_start_keeps_a_single_renewal_task() {
        let store = Arc::new(CountingStore::default());
        let parent = CancellationToken::new();
        let mut watchdog = Watchdog::new();

        start(&mut watchdog, &store, &parent).await;
        start(&mut watchdog, &store, &parent).await;
        assert!(watchdog.is_running());

        tokio::time::sleep(WATCHDOG_TICK + Duration::from_secs(1)).await;
        assert_eq!(store.extends(), 1, "one renewal per tick");

        tokio::time::sleep(WATCHDOG_TICK).await;
        assert_eq!(store.extends(), 2);
        assert!(watchdog.is_running());

        watchdog.stop().await;
        assert!(!watchdog.is_running());

        tokio::time::sleep(WATCHDOG_TICK * 3).await;
        assert_eq!(store.extends(), 2, "stopped watchdog must not renew");
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_task_clears_running_flag() {
        let store = Arc::new(CountingStore::default());
        let parent = CancellationToken::new();
        let mut watchdog = Watchdog::new();

        start(&mut watchdog, &store, &parent).await;
        assert!(watchdog.is_running());

        let handle = watchdog.handle.take().expect("task spawned");
        handle.abort();
        let err = handle.await.expect_err("task was aborted");
        assert!(err.is_cancelled());
        assert!(!watchdog.is_running());

        // The flag is free again, so a restart does not wait.
        start(&mut watchdog, &store, &parent).await;
        assert!(watchdog.is_running());
        watchdog.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_parent_stops_renewal() {
        let store = Arc::new(CountingStore::default());
        let parent = CancellationToken::new();
        let mut watchdog = Watchdog::new();

        start(&mut watchdog, &store, &parent).await;
        parent.cancel();
        tokio::time::sleep(WATCHDOG_TICK * 2).await;

        assert_eq!(store.extends(), 0);
        assert!(!watchdog.is_running());
    }
}
