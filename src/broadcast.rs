use async_trait::async_trait;
use log::info;

use crate::messages::DeviceUpdatedEvent;
use crate::ports::{BroadcastError, Broadcaster};

/// Used when no broker is configured: events only reach the log.
#[derive(Debug, Default)]
pub struct LogBroadcaster;

#[async_trait]
impl Broadcaster for LogBroadcaster {
    async fn broadcast(
        &self,
        event_name: &str,
        event: &DeviceUpdatedEvent,
    ) -> Result<(), BroadcastError> {
        info!("{}: {}", event_name, serde_json::to_string(event)?);
        Ok(())
    }
}
