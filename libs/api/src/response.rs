use serde::{Deserialize, Serialize};

use crate::device::{CameraConfig, DeviceStatus, OperationMode};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Registered {
    pub api_key: String,
    pub config: CameraConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub status: DeviceStatus,
    pub operation_mode: OperationMode,
    pub config: CameraConfig,
    pub created_at: i64,
    pub last_seen: i64,
    pub connection_count: u64,
    pub recording: bool,
    pub connected: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Starting,
    Active,
    Error,
    Stopped,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub device_id: String,
    pub state: PipelineState,
    pub path: String,
    pub failures: u32,
    pub written: u64,
    pub dropped: u64,
}
