use std::sync::Arc;

use futures::future::join_all;
use log::{debug, info, warn};
use thiserror::Error;

use crate::hooks::HookRegistry;
use crate::messages::{
    ActivitySource, DEVICE_ACTIVITY_HOOK, DEVICE_UPDATED_EVENT, DeviceId, DeviceUpdate,
    DeviceUpdatedEvent, HookPayload,
};
use crate::ports::{Broadcaster, Clock, DeviceStore, StoreError};

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("querying in-use devices: {0}")]
    Query(#[source] StoreError),

    #[error("committing {count} reclaimed devices: {source}")]
    Commit { count: usize, source: StoreError },
}

/// Devices reclaimed by one tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScanResult {
    pub reclaimed: Vec<DeviceId>,
}

/// Finds reserved devices that have sat idle past the timeout and releases them.
pub struct TimeoutScanner {
    store: Arc<dyn DeviceStore>,
    broadcaster: Arc<dyn Broadcaster>,
    hooks: Arc<HookRegistry>,
    clock: Arc<dyn Clock>,
}

impl TimeoutScanner {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        broadcaster: Arc<dyn Broadcaster>,
        hooks: Arc<HookRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        TimeoutScanner {
            store,
            broadcaster,
            hooks,
            clock,
        }
    }

    /// One tick. Staged updates are committed together; broadcasts and the
    /// hook only fire once the commit has landed.
    pub async fn perform_check(&self, timeout_minutes: i64) -> Result<ScanResult, CheckError> {
        let timeout_seconds = timeout_minutes.saturating_mul(60) as f64;
        let now = self.clock.now();

        let devices = self.store.list_in_use().await.map_err(CheckError::Query)?;

        let mut staged = Vec::new();
        for dev in &devices {
            if now - dev.last_updated > timeout_seconds {
                info!("Device {} ({}) timed out.", dev.name, dev.id);
                staged.push(DeviceUpdate::auto_offline(dev.id));
            }
        }

        if staged.is_empty() {
            debug!("{} devices in use, none idle past {} min", devices.len(), timeout_minutes);
            return Ok(ScanResult::default());
        }

        let events: Vec<DeviceUpdatedEvent> = staged.iter().map(DeviceUpdatedEvent::from).collect();
        let reclaimed: Vec<DeviceId> = staged.iter().map(|u| u.id).collect();

        let count = staged.len();
        self.store
            .commit(staged)
            .await
            .map_err(|source| CheckError::Commit { count, source })?;

        let sends = events
            .iter()
            .map(|event| self.broadcaster.broadcast(DEVICE_UPDATED_EVENT, event));
        for (event, result) in events.iter().zip(join_all(sends).await) {
            if let Err(err) = result {
                warn!("Broadcast for device {} failed: {}", event.id, err);
            }
        }

        let payload = HookPayload {
            device_ids: reclaimed.clone(),
            source: ActivitySource::AutoTimeout,
        };
        self.hooks.trigger(DEVICE_ACTIVITY_HOOK, &payload).await;

        Ok(ScanResult { reclaimed })
    }
}
