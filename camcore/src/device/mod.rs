use std::collections::HashMap;
use std::time::Duration;

use api::device::{CameraConfig, CameraConfigPatch, DeviceStatus, OperationMode};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::connection::{CloseReason, Connection, ConnectionId, CLOSE_REPLACED};
use crate::error::SessionError;
use crate::metrics;

pub mod registry;

pub use registry::Registry;

/// Registry record of one camera.
#[derive(Debug, Clone)]
pub struct DeviceSession {
    pub id: String,
    pub credential: String,
    pub status: DeviceStatus,
    pub operation_mode: OperationMode,
    pub config: CameraConfig,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub connection_count: u64,
    pub recording: bool,
    pub connection: Option<Connection>,
}

impl DeviceSession {
    fn new(id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            credential: new_credential(),
            status: DeviceStatus::Registered,
            operation_mode: OperationMode::default(),
            config: CameraConfig::default(),
            created_at: now,
            last_seen: now,
            connection_count: 0,
            recording: false,
            connection: None,
        }
    }

    pub fn info(&self) -> api::response::Device {
        api::response::Device {
            id: self.id.clone(),
            status: self.status,
            operation_mode: self.operation_mode,
            config: self.config.clone(),
            created_at: self.created_at.timestamp_millis(),
            last_seen: self.last_seen.timestamp_millis(),
            connection_count: self.connection_count,
            recording: self.recording,
            connected: self.connection.is_some(),
        }
    }
}

fn new_credential() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Device records plus the credential index. Owned by exactly one worker.
#[derive(Debug, Default)]
pub struct DeviceTable {
    devices: HashMap<String, DeviceSession>,
    credentials: HashMap<String, String>,
}

impl DeviceTable {
    /// Idempotent: a known id keeps its credential and config.
    pub fn register(&mut self, device_id: &str, now: DateTime<Utc>) -> (String, CameraConfig) {
        if let Some(session) = self.devices.get(device_id) {
            debug!(device = device_id, "device already registered");
            return (session.credential.clone(), session.config.clone());
        }
        let session = DeviceSession::new(device_id.to_string(), now);
        let result = (session.credential.clone(), session.config.clone());
        self.credentials
            .insert(session.credential.clone(), device_id.to_string());
        self.devices.insert(device_id.to_string(), session);
        metrics::DEVICE.set(self.devices.len() as i64);
        info!(device = device_id, "device registered");
        result
    }

    pub fn get(&self, device_id: &str) -> Option<&DeviceSession> {
        self.devices.get(device_id)
    }

    pub fn by_credential(&self, credential: &str) -> Option<&DeviceSession> {
        self.credentials
            .get(credential)
            .and_then(|id| self.devices.get(id))
    }

    pub fn list(&self) -> Vec<api::response::Device> {
        let mut devices: Vec<_> = self.devices.values().map(DeviceSession::info).collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    /// Bind `connection` to the device, closing whatever was bound before.
    /// Returns false for an unknown id.
    pub fn bind(&mut self, device_id: &str, connection: Connection, now: DateTime<Utc>) -> bool {
        let Some(session) = self.devices.get_mut(device_id) else {
            warn!(device = device_id, "bind for unknown device");
            return false;
        };
        match session.connection.replace(connection) {
            Some(previous) => {
                warn!(
                    device = device_id,
                    connection = previous.id(),
                    "{}",
                    SessionError::ResourceConflict(device_id.to_string())
                );
                previous.close(CloseReason::new(
                    CLOSE_REPLACED,
                    "replaced by a newer connection",
                ));
            }
            None => metrics::CONNECTED.inc(),
        }
        session.status = DeviceStatus::Online;
        session.connection_count += 1;
        session.last_seen = now;
        true
    }

    /// Clear the binding if `connection_id` is still the bound connection.
    /// An evicted connection closing late must not take its successor down.
    pub fn unbind(
        &mut self,
        device_id: &str,
        connection_id: ConnectionId,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(session) = self.devices.get_mut(device_id) else {
            return false;
        };
        match &session.connection {
            Some(current) if current.id() == connection_id => {
                session.connection = None;
                session.status = DeviceStatus::Offline;
                session.recording = false;
                session.last_seen = now;
                metrics::CONNECTED.dec();
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub fn connection(&self, device_id: &str) -> Option<Connection> {
        self.devices
            .get(device_id)
            .and_then(|session| session.connection.clone())
    }

    pub fn seen(&mut self, device_id: &str, now: DateTime<Utc>) -> bool {
        match self.devices.get_mut(device_id) {
            Some(session) => {
                session.last_seen = now;
                true
            }
            None => false,
        }
    }

    pub fn heartbeat(&mut self, device_id: &str, now: DateTime<Utc>) -> bool {
        match self.devices.get_mut(device_id) {
            Some(session) => {
                session.last_seen = now;
                if !session.status.is_awake() {
                    session.status = DeviceStatus::Online;
                }
                true
            }
            None => false,
        }
    }

    pub fn frame(&mut self, device_id: &str, now: DateTime<Utc>) -> bool {
        match self.devices.get_mut(device_id) {
            Some(session) => {
                session.last_seen = now;
                if session.status != DeviceStatus::Streaming {
                    debug!(device = device_id, from = %session.status, "device streaming");
                    session.status = DeviceStatus::Streaming;
                }
                session.recording = true;
                true
            }
            None => false,
        }
    }

    /// No transition is rejected, the latest report wins.
    pub fn set_status(&mut self, device_id: &str, status: DeviceStatus, now: DateTime<Utc>) -> bool {
        match self.devices.get_mut(device_id) {
            Some(session) => {
                if session.status != status {
                    info!(device = device_id, from = %session.status, to = %status, "device status");
                }
                session.status = status;
                session.last_seen = now;
                if status != DeviceStatus::Streaming {
                    session.recording = false;
                }
                true
            }
            None => {
                warn!(device = device_id, %status, "status for unknown device");
                false
            }
        }
    }

    pub fn update_config(
        &mut self,
        device_id: &str,
        patch: CameraConfigPatch,
    ) -> Option<CameraConfig> {
        match self.devices.get_mut(device_id) {
            Some(session) => {
                session.config.apply(patch);
                Some(session.config.clone())
            }
            None => {
                warn!(device = device_id, "config update for unknown device");
                None
            }
        }
    }

    pub fn update_operation_mode(&mut self, device_id: &str, mode: OperationMode) -> bool {
        match self.devices.get_mut(device_id) {
            Some(session) => {
                session.operation_mode = mode;
                true
            }
            None => {
                warn!(device = device_id, ?mode, "operation mode for unknown device");
                false
            }
        }
    }

    /// Forget devices that have been offline for longer than `max_age`.
    /// A device still holding a socket is kept until that socket closes.
    pub fn sweep(&mut self, now: DateTime<Utc>, max_age: Duration) -> Vec<String> {
        let expired: Vec<String> = self
            .devices
            .values()
            .filter(|session| session.status == DeviceStatus::Offline)
            .filter(|session| session.connection.is_none())
            .filter(|session| {
                (now - session.last_seen)
                    .to_std()
                    .is_ok_and(|elapsed| elapsed > max_age)
            })
            .map(|session| session.id.clone())
            .collect();
        for id in expired.iter() {
            if let Some(session) = self.devices.remove(id) {
                self.credentials.remove(&session.credential);
                info!(device = id, "inactive device removed");
            }
        }
        metrics::DEVICE.set(self.devices.len() as i64);
        expired
    }
}
