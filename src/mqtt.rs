use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info};
use rumqttc::{MqttOptions, QoS};
use tokio::sync::watch;

use crate::config;
use crate::messages::DeviceUpdatedEvent;
use crate::ports::{BroadcastError, Broadcaster};

/// Publishes device events to live clients over MQTT.
#[derive(Debug, Clone)]
pub struct MqttClient {
    client: rumqttc::AsyncClient,
    publisher_id: String,
    topic_path: String,
}

impl MqttClient {
    pub fn new(config: &config::MqttConfig) -> (Self, rumqttc::EventLoop) {
        let publisher_id = config
            .publisher_id
            .as_ref()
            .unwrap_or(&"auto-status".to_string())
            .to_string();

        let mut mqttoptions = MqttOptions::new(
            publisher_id.clone(),
            config.host.clone(),
            config.port.unwrap_or(1883),
        );

        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive_seconds.unwrap_or(5)));

        if let (Some(username), Some(password)) =
            (config.username.as_ref(), config.password.as_ref())
        {
            mqttoptions.set_credentials(username.clone(), password.clone());
        }

        let (client, eventloop) = rumqttc::AsyncClient::new(mqttoptions, 10);

        (
            MqttClient {
                client,
                publisher_id,
                topic_path: config.topic_path.clone().unwrap_or("devices".to_string()),
            },
            eventloop,
        )
    }

    fn event_topic(&self, event_name: &str) -> String {
        format!(
            "{}/{}/events/{}",
            self.topic_path,
            self.publisher_id,
            sanitize_name(event_name)
        )
    }

    /// Drives the connection until `stop_rx` flips. Publishes only make
    /// progress while this is being polled.
    pub async fn event_loop(eventloop: &mut rumqttc::EventLoop, mut stop_rx: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        debug!("MQTT event loop stopping");
                        break;
                    }
                }
                notification = eventloop.poll() => match notification {
                    Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                        debug!("Connection acknowledged");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("Error polling MQTT event loop: {:?}", e);
                        // rumqttc reconnects on the next poll; don't spin.
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                },
            }
        }
    }

    pub async fn disconnect(&self) -> Result<(), rumqttc::ClientError> {
        debug!("Disconnecting MQTT client");
        self.client.disconnect().await
    }
}

#[async_trait]
impl Broadcaster for MqttClient {
    async fn broadcast(
        &self,
        event_name: &str,
        event: &DeviceUpdatedEvent,
    ) -> Result<(), BroadcastError> {
        info!("Broadcasting {} for device {} on MQTT", event_name, event.id);
        let payload = serde_json::to_string(event)?;
        self.client
            .publish(self.event_topic(event_name), QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }
}

fn sanitize_name(name: &str) -> String {
    // Remove any non-alphanumeric characters and replace spaces with underscores
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        let name = "Device Updated/v2";
        let sanitized = super::sanitize_name(name);
        assert_eq!(sanitized, "device_updated_v2");
    }

    #[tokio::test]
    async fn test_event_topic() {
        let config = config::MqttConfig {
            host: "localhost".to_string(),
            port: None,
            username: None,
            password: None,
            publisher_id: Some("lab-host".to_string()),
            topic_path: None,
            keep_alive_seconds: None,
        };
        let (client, _eventloop) = MqttClient::new(&config);
        assert_eq!(
            client.event_topic("device_updated"),
            "devices/lab-host/events/device_updated"
        );
    }
}
