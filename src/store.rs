use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use tokio::sync::Mutex;

use crate::messages::{Device, DeviceUpdate};
use crate::ports::{DeviceStore, StoreError};

/// Device table kept as a JSON array in a single file.
///
/// Commits rewrite the whole table through a temporary file and a rename,
/// so readers see either the old table or the new one.
#[derive(Debug)]
pub struct JsonDeviceStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonDeviceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonDeviceStore {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<Vec<Device>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("No device table at {}", self.path.display());
                Ok(Vec::new())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn write_all(&self, devices: &[Device]) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(devices)?;
        let tmp = tmp_path(&self.path);
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl DeviceStore for JsonDeviceStore {
    async fn list_in_use(&self) -> Result<Vec<Device>, StoreError> {
        let devices = self.read_all().await?;
        Ok(devices.into_iter().filter(|d| d.using).collect())
    }

    async fn commit(&self, updates: Vec<DeviceUpdate>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut devices = self.read_all().await?;
        let index: HashMap<_, _> = devices
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id, i))
            .collect();

        // Validate everything before touching anything.
        let mut positions = Vec::with_capacity(updates.len());
        for update in &updates {
            let Some(&pos) = index.get(&update.id) else {
                return Err(StoreError::UnknownDevice(update.id));
            };
            positions.push(pos);
        }

        for (update, pos) in updates.into_iter().zip(positions) {
            let device = &mut devices[pos];
            device.using = update.using;
            device.status = update.status;
        }

        self.write_all(&devices).await
    }
}
