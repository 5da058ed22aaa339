//! Collaborators the plugin is handed by its host. Everything the scanner
//! touches outside its own process goes through one of these traits.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use thiserror::Error;

use crate::messages::{Device, DeviceId, DeviceUpdate, DeviceUpdatedEvent, HookPayload};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("device store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("device store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("device {0} no longer exists")]
    UnknownDevice(DeviceId),
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("mqtt publish failed: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("could not encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
#[error("hook handler {handler} failed: {message}")]
pub struct HookError {
    pub handler: String,
    pub message: String,
}

/// Persistence layer owning the device table.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// All devices currently reserved (`using == true`).
    async fn list_in_use(&self) -> Result<Vec<Device>, StoreError>;

    /// Apply every staged update or none of them.
    async fn commit(&self, updates: Vec<DeviceUpdate>) -> Result<(), StoreError>;
}

/// Pushes events to live clients. Delivery is awaited but never retried.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(
        &self,
        event_name: &str,
        event: &DeviceUpdatedEvent,
    ) -> Result<(), BroadcastError>;
}

/// Something another plugin registers to react to a named hook.
#[async_trait]
pub trait HookHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, hook_name: &str, payload: &HookPayload) -> Result<(), HookError>;
}

pub trait Clock: Send + Sync {
    /// Seconds since the epoch.
    fn now(&self) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default()
    }
}
