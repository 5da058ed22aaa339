//! Fake collaborators for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::messages::{Device, DeviceId, DeviceUpdate, DeviceUpdatedEvent, HookPayload};
use crate::ports::{
    BroadcastError, Broadcaster, Clock, DeviceStore, HookError, HookHandler, StoreError,
};

pub fn device(id: DeviceId, using: bool, last_updated: f64) -> Device {
    Device {
        id,
        name: format!("dev-{id}"),
        using,
        status: if using { "In use" } else { "Idle" }.to_string(),
        last_updated,
        extra: Default::default(),
    }
}

pub struct FixedClock(pub f64);

impl Clock for FixedClock {
    fn now(&self) -> f64 {
        self.0
    }
}

#[derive(Default)]
pub struct FakeStore {
    devices: Mutex<Vec<Device>>,
    queries: AtomicUsize,
    commits: AtomicUsize,
    fail_queries: AtomicBool,
    fail_commits: AtomicBool,
}

impl FakeStore {
    pub fn new(devices: Vec<Device>) -> Self {
        FakeStore {
            devices: Mutex::new(devices),
            ..Default::default()
        }
    }

    pub fn get(&self, id: DeviceId) -> Option<Device> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned()
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

fn unavailable() -> StoreError {
    StoreError::Io(std::io::Error::other("store unavailable"))
}

#[async_trait]
impl DeviceStore for FakeStore {
    async fn list_in_use(&self) -> Result<Vec<Device>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self
            .devices
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.using)
            .cloned()
            .collect())
    }

    async fn commit(&self, updates: Vec<DeviceUpdate>) -> Result<(), StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        let mut devices = self.devices.lock().unwrap();
        for update in updates {
            let dev = devices
                .iter_mut()
                .find(|d| d.id == update.id)
                .ok_or(StoreError::UnknownDevice(update.id))?;
            dev.using = update.using;
            dev.status = update.status;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingBroadcaster {
    events: Mutex<Vec<(String, DeviceUpdatedEvent)>>,
    fail: AtomicBool,
}

impl RecordingBroadcaster {
    pub fn events(&self) -> Vec<(String, DeviceUpdatedEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn broadcast(
        &self,
        event_name: &str,
        event: &DeviceUpdatedEvent,
    ) -> Result<(), BroadcastError> {
        if self.fail.load(Ordering::SeqCst) {
            let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
            return Err(BroadcastError::Encode(err));
        }
        self.events
            .lock()
            .unwrap()
            .push((event_name.to_string(), event.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingHook {
    calls: Mutex<Vec<HookPayload>>,
}

impl RecordingHook {
    pub fn calls(&self) -> Vec<HookPayload> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HookHandler for RecordingHook {
    fn name(&self) -> &str {
        "recording"
    }

    async fn handle(&self, _hook_name: &str, payload: &HookPayload) -> Result<(), HookError> {
        self.calls.lock().unwrap().push(payload.clone());
        Ok(())
    }
}
