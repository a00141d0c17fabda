//! JSON envelopes exchanged over the WebSocket endpoint.
//!
//! Devices and viewers tag their messages with `type`, commands sent by the
//! server to a device are tagged with `action`. Unrecognized tags decode into
//! an `Unknown` variant so a newer peer never breaks an older server.

use serde::{Deserialize, Serialize};

use crate::device::{CameraConfig, DeviceStatus, OperationMode};

/// Device to server.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceMessage {
    Heartbeat,
    StatusUpdate {
        status: DeviceStatus,
    },
    Ready,
    Error {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Unknown,
}

/// Server to device.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DeviceCommand {
    StartStreaming,
    StopStreaming,
    UpdateOperationMode {
        #[serde(rename = "operationMode")]
        operation_mode: OperationMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        config: Option<CameraConfig>,
    },
    Reboot,
    Sleep,
}

/// Viewer to server.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerMessage {
    Subscribe {
        #[serde(rename = "deviceId")]
        device_id: String,
    },
    Unsubscribe {
        #[serde(rename = "deviceId")]
        device_id: String,
    },
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_message_tags() {
        let msg: DeviceMessage =
            serde_json::from_str(r#"{"type":"status_update","status":"asleep"}"#).unwrap();
        assert_eq!(
            msg,
            DeviceMessage::StatusUpdate {
                status: DeviceStatus::Asleep
            }
        );

        let msg: DeviceMessage = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(msg, DeviceMessage::Heartbeat);

        let msg: DeviceMessage =
            serde_json::from_str(r#"{"type":"error","message":"sensor timeout"}"#).unwrap();
        assert_eq!(
            msg,
            DeviceMessage::Error {
                message: "sensor timeout".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_tag_is_not_an_error() {
        let msg: DeviceMessage = serde_json::from_str(r#"{"type":"firmware_update"}"#).unwrap();
        assert_eq!(msg, DeviceMessage::Unknown);

        let msg: ViewerMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg, ViewerMessage::Unknown);
    }

    #[test]
    fn test_command_wire_format() {
        let cmd = DeviceCommand::UpdateOperationMode {
            operation_mode: OperationMode::Continuous,
            config: None,
        };
        assert_eq!(
            serde_json::to_string(&cmd).unwrap(),
            r#"{"action":"update_operation_mode","operationMode":"continuous"}"#
        );
        assert_eq!(
            serde_json::to_string(&DeviceCommand::StartStreaming).unwrap(),
            r#"{"action":"start_streaming"}"#
        );
    }

    #[test]
    fn test_viewer_subscribe() {
        let msg: ViewerMessage =
            serde_json::from_str(r#"{"type":"subscribe","deviceId":"AA:BB:CC:DD:EE:FF"}"#)
                .unwrap();
        assert_eq!(
            msg,
            ViewerMessage::Subscribe {
                device_id: "AA:BB:CC:DD:EE:FF".to_string()
            }
        );
    }
}
