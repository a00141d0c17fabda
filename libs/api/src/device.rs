use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[serde(alias = "REGISTERED")]
    Registered,
    #[serde(alias = "ONLINE")]
    Online,
    #[serde(alias = "STREAMING")]
    Streaming,
    #[serde(alias = "ASLEEP")]
    Asleep,
    #[serde(alias = "OFFLINE")]
    Offline,
}

impl DeviceStatus {
    /// Online or streaming.
    pub fn is_awake(&self) -> bool {
        matches!(self, DeviceStatus::Online | DeviceStatus::Streaming)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceStatus::Registered => "registered",
            DeviceStatus::Online => "online",
            DeviceStatus::Streaming => "streaming",
            DeviceStatus::Asleep => "asleep",
            DeviceStatus::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// Duty-cycle policy of a camera.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    #[default]
    #[serde(alias = "motion-triggered", alias = "MOTION_TRIGGERED")]
    MotionTriggered,
    #[serde(alias = "always-on", alias = "ALWAYS_ON")]
    AlwaysOn,
    #[serde(alias = "CONTINUOUS")]
    Continuous,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CameraConfig {
    pub resolution: String,
    pub framerate: u32,
    /// JPEG quality, lower is better (sensor scale 0-63).
    pub quality: u8,
    pub brightness: i8,
    pub contrast: i8,
    pub saturation: i8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            resolution: "VGA".to_string(),
            framerate: 10,
            quality: 12,
            brightness: 0,
            contrast: 0,
            saturation: 0,
        }
    }
}

impl CameraConfig {
    pub fn apply(&mut self, patch: CameraConfigPatch) {
        if let Some(resolution) = patch.resolution {
            self.resolution = resolution;
        }
        if let Some(framerate) = patch.framerate {
            self.framerate = framerate;
        }
        if let Some(quality) = patch.quality {
            self.quality = quality;
        }
        if let Some(brightness) = patch.brightness {
            self.brightness = brightness;
        }
        if let Some(contrast) = patch.contrast {
            self.contrast = contrast;
        }
        if let Some(saturation) = patch.saturation {
            self.saturation = saturation;
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CameraConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framerate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<i8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contrast: Option<i8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturation: Option<i8>,
}

impl From<CameraConfig> for CameraConfigPatch {
    fn from(cfg: CameraConfig) -> Self {
        Self {
            resolution: Some(cfg.resolution),
            framerate: Some(cfg.framerate),
            quality: Some(cfg.quality),
            brightness: Some(cfg.brightness),
            contrast: Some(cfg.contrast),
            saturation: Some(cfg.saturation),
        }
    }
}
