use std::path::PathBuf;

use serde_derive::Deserialize;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct AppConfig {
    pub mqtt: Option<MqttConfig>,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub publisher_id: Option<String>,
    pub topic_path: Option<String>,
    pub keep_alive_seconds: Option<u64>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StoreConfig {
    /// JSON file holding the device table shared with the host.
    pub devices_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            devices_path: PathBuf::from("devices.json"),
        }
    }
}

impl AppConfig {
    /// A missing file is not an error: the host runs with defaults and no broker.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(toml::de::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("No config at {}, using defaults", path.display());
                Ok(AppConfig::default())
            }
            Err(err) => Err(err.into()),
        }
    }
}
