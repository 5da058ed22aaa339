use serde_derive::{Deserialize, Serialize};

pub type DeviceId = i64;

pub const OFFLINE_AUTO_STATUS: &str = "Offline (Auto)";
pub const DEVICE_UPDATED_EVENT: &str = "device_updated";
pub const DEVICE_ACTIVITY_HOOK: &str = "device_activity";

/// A device row as the host persists it. Fields this plugin does not know
/// about are carried through untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub using: bool,
    pub status: String,
    /// Seconds since the epoch.
    pub last_updated: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A staged mutation, applied by `DeviceStore::commit`.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceUpdate {
    pub id: DeviceId,
    pub using: bool,
    pub status: String,
}

impl DeviceUpdate {
    pub fn auto_offline(id: DeviceId) -> Self {
        DeviceUpdate {
            id,
            using: false,
            status: OFFLINE_AUTO_STATUS.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UpdatedFields {
    pub using: bool,
    pub status: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeviceUpdatedEvent {
    pub id: DeviceId,
    pub updated_fields: UpdatedFields,
}

impl From<&DeviceUpdate> for DeviceUpdatedEvent {
    fn from(update: &DeviceUpdate) -> Self {
        DeviceUpdatedEvent {
            id: update.id,
            updated_fields: UpdatedFields {
                using: update.using,
                status: update.status.clone(),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySource {
    AutoTimeout,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HookPayload {
    pub device_ids: Vec<DeviceId>,
    pub source: ActivitySource,
}
