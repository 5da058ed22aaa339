use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt as _;
use log::{debug, error, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::scanner::TimeoutScanner;
use crate::timeout::TimeoutStore;

pub const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Handle to the running check loop. Dropping it without `stop` leaves the
/// task running until the runtime shuts down.
#[derive(Debug)]
pub struct CheckLoop {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CheckLoop {
    pub fn spawn(scanner: Arc<TimeoutScanner>, timeouts: Arc<TimeoutStore>) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(scanner, timeouts, stop_rx));
        CheckLoop { stop_tx, task }
    }

    /// Signals the loop and waits for it. A check already in flight runs to
    /// completion so its commit is never cut in half.
    pub async fn stop(self) {
        // ignore send error: the loop may already be gone
        let _ = self.stop_tx.send(true);
        match self.task.await {
            Ok(()) => debug!("Check loop exited"),
            Err(err) if err.is_cancelled() => debug!("Check loop cancelled"),
            Err(err) => error!("Check loop panicked: {}", err),
        }
    }
}

async fn run_loop(
    scanner: Arc<TimeoutScanner>,
    timeouts: Arc<TimeoutStore>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        if *stop_rx.borrow() {
            break;
        }

        let minutes = timeouts.refresh();
        match AssertUnwindSafe(scanner.perform_check(minutes))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) if !result.reclaimed.is_empty() => {
                info!("Reclaimed {} idle devices", result.reclaimed.len());
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => error!("Error in auto status check: {}", err),
            Err(_) => error!("Auto status check panicked"),
        }

        tokio::select! {
            _ = tokio::time::sleep(CHECK_INTERVAL) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HookRegistry;
    use crate::testing::{FakeStore, FixedClock, RecordingBroadcaster, device};

    fn spawn_with(store: Arc<FakeStore>, dir: &std::path::Path) -> CheckLoop {
        let scanner = TimeoutScanner::new(
            store,
            Arc::new(RecordingBroadcaster::default()),
            Arc::new(HookRegistry::new()),
            Arc::new(FixedClock(10_000.0)),
        );
        CheckLoop::spawn(Arc::new(scanner), Arc::new(TimeoutStore::new(dir)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_every_interval() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::new(vec![device(1, true, 9_999.0)]));
        let check_loop = spawn_with(store.clone(), dir.path());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.queries(), 1);

        tokio::time::sleep(CHECK_INTERVAL).await;
        assert_eq!(store.queries(), 2);

        check_loop.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_end_loop() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::new(vec![device(1, true, 0.0)]));
        store.fail_queries(true);
        let check_loop = spawn_with(store.clone(), dir.path());

        tokio::time::sleep(CHECK_INTERVAL * 2 + Duration::from_secs(1)).await;
        assert_eq!(store.queries(), 3);
        assert!(store.get(1).unwrap().using);

        store.fail_queries(false);
        tokio::time::sleep(CHECK_INTERVAL).await;
        assert_eq!(store.queries(), 4);
        assert!(!store.get(1).unwrap().using);

        check_loop.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_sleep() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::new(Vec::new()));
        let check_loop = spawn_with(store.clone(), dir.path());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.queries(), 1);

        let started = tokio::time::Instant::now();
        check_loop.stop().await;
        assert!(started.elapsed() < Duration::from_secs(1));

        tokio::time::sleep(CHECK_INTERVAL * 5).await;
        assert_eq!(store.queries(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_picks_up_new_timeout() {
        let dir = tempfile::tempdir().unwrap();
        // idle for 1000 s
        let store = Arc::new(FakeStore::new(vec![device(1, true, 9_000.0)]));
        TimeoutStore::new(dir.path()).save(30).unwrap();
        let check_loop = spawn_with(store.clone(), dir.path());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(store.get(1).unwrap().using);

        TimeoutStore::new(dir.path()).save(5).unwrap();
        tokio::time::sleep(CHECK_INTERVAL).await;
        assert!(!store.get(1).unwrap().using);

        check_loop.stop().await;
    }
}
