use std::sync::Arc;

use api::device::{CameraConfigPatch, DeviceStatus};
use api::message::{DeviceCommand, DeviceMessage, ViewerMessage};
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::connection::{CloseReason, Connection, ConnectionId, Outbound, CLOSE_INVALID_CREDENTIAL};
use crate::device::Registry;
use crate::error::SessionError;
use crate::metrics;
use crate::pipeline::PipelineManager;
use crate::protocol::{classify_peer, Handshake, Inbound, PeerClass};
use crate::viewer::ViewerHub;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    Device(String),
    Viewer,
}

/// Result of sending a command to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    NotConnected,
    UnknownDevice,
}

/// Dispatches everything peers send. Nothing here fails towards the
/// transport: errors are logged per connection and the session goes on.
#[derive(Clone, Debug)]
pub struct ProtocolRouter {
    registry: Registry,
    pipelines: PipelineManager,
    hub: ViewerHub,
    allowed_origins: Arc<Vec<String>>,
}

impl ProtocolRouter {
    pub fn new(
        registry: Registry,
        pipelines: PipelineManager,
        hub: ViewerHub,
        allowed_origins: Vec<String>,
    ) -> Self {
        Self {
            registry,
            pipelines,
            hub,
            allowed_origins: Arc::new(allowed_origins),
        }
    }

    pub async fn accept(&self, handshake: &Handshake) -> Result<Peer, CloseReason> {
        match classify_peer(handshake, &self.allowed_origins) {
            Ok(PeerClass::Device(credential)) => {
                match self.registry.lookup_by_credential(credential).await {
                    Some(session) => Ok(Peer::Device(session.id)),
                    None => {
                        warn!(
                            origin = ?handshake.origin,
                            "{}",
                            SessionError::Authentication("unknown credential".to_string())
                        );
                        Err(CloseReason::new(
                            CLOSE_INVALID_CREDENTIAL,
                            "invalid credential",
                        ))
                    }
                }
            }
            Ok(PeerClass::Viewer) => Ok(Peer::Viewer),
            Err(reason) => {
                warn!(
                    origin = ?handshake.origin,
                    code = reason.code,
                    "{}",
                    SessionError::Authentication(reason.reason.clone())
                );
                Err(reason)
            }
        }
    }

    /// Bind a freshly accepted device connection, evicting an older one.
    pub async fn open_device(&self, device_id: &str, connection: Connection) -> bool {
        let bound = self.registry.bind(device_id.to_string(), connection).await;
        if bound {
            info!(device = device_id, "device connected");
        }
        bound
    }

    pub async fn on_device_message(&self, device_id: &str, msg: Inbound<DeviceMessage>) {
        let msg = match msg {
            Inbound::Frame(frame) => return self.on_frame(device_id, frame),
            Inbound::Control(msg) => msg,
            Inbound::Malformed(reason) => {
                warn!(device = device_id, "{}, dropped", SessionError::Protocol(reason));
                return;
            }
        };
        match msg {
            DeviceMessage::Heartbeat => {
                self.registry.heartbeat(device_id.to_string()).await;
                return;
            }
            DeviceMessage::StatusUpdate { status } => {
                self.registry.set_status(device_id.to_string(), status).await;
                if matches!(status, DeviceStatus::Asleep | DeviceStatus::Offline) {
                    self.pipelines.stop(device_id.to_string()).await;
                }
                return;
            }
            DeviceMessage::Ready => info!(device = device_id, "device ready"),
            DeviceMessage::Error { message } => {
                warn!(device = device_id, "device reported error: {}", message)
            }
            DeviceMessage::Unknown => debug!(device = device_id, "unknown message type ignored"),
        }
        self.registry.seen(device_id.to_string()).await;
    }

    /// Frame path: hand the bytes on without waiting on anyone.
    fn on_frame(&self, device_id: &str, frame: Bytes) {
        metrics::FRAME.inc();
        self.pipelines.write_frame(device_id.to_string(), frame.clone());
        self.hub.publish(device_id.to_string(), frame);
        self.registry.frame_received(device_id.to_string());
    }

    /// The device connection is gone. Only the currently bound connection
    /// takes the device OFFLINE and stops its pipeline.
    pub async fn close_device(&self, device_id: &str, connection_id: ConnectionId) {
        if self
            .registry
            .unbind(device_id.to_string(), connection_id)
            .await
        {
            self.pipelines.stop(device_id.to_string()).await;
            info!(device = device_id, "device disconnected");
        } else {
            debug!(
                device = device_id,
                connection = connection_id,
                "replaced connection closed"
            );
        }
    }

    pub async fn on_viewer_message(&self, viewer: &Connection, msg: Inbound<ViewerMessage>) {
        match msg {
            Inbound::Control(ViewerMessage::Subscribe { device_id }) => {
                self.hub.subscribe(device_id, viewer.clone()).await
            }
            Inbound::Control(ViewerMessage::Unsubscribe { device_id }) => {
                self.hub.unsubscribe(device_id, viewer.id()).await
            }
            Inbound::Control(ViewerMessage::Unknown) => {
                debug!(viewer = viewer.id(), "unknown viewer message ignored")
            }
            Inbound::Frame(_) => warn!(
                viewer = viewer.id(),
                "{}",
                SessionError::Protocol("viewers cannot send frames".to_string())
            ),
            Inbound::Malformed(reason) => {
                warn!(viewer = viewer.id(), "{}, dropped", SessionError::Protocol(reason))
            }
        }
    }

    pub async fn close_viewer(&self, viewer: ConnectionId) {
        self.hub.drop_connection(viewer).await;
    }

    /// Serialize `command` onto the device's bound connection and apply its
    /// local side effects once it is on its way.
    pub async fn send_command(&self, device_id: &str, command: DeviceCommand) -> Delivery {
        let Some(session) = self.registry.lookup_by_id(device_id.to_string()).await else {
            return Delivery::UnknownDevice;
        };
        let Some(connection) = session.connection else {
            debug!(device = device_id, ?command, "device not connected, command not sent");
            return Delivery::NotConnected;
        };
        let text = match serde_json::to_string(&command) {
            Ok(text) => text,
            Err(e) => {
                warn!(device = device_id, "command not serializable: {}", e);
                return Delivery::NotConnected;
            }
        };
        if let Err(e) = connection.try_send(Outbound::Text(text)) {
            warn!(device = device_id, "command not sent: {}", e);
            return Delivery::NotConnected;
        }
        info!(device = device_id, ?command, "command sent");

        match command {
            DeviceCommand::StartStreaming => {
                self.registry
                    .set_status(device_id.to_string(), DeviceStatus::Streaming)
                    .await
            }
            DeviceCommand::StopStreaming | DeviceCommand::Sleep => {
                self.pipelines.stop(device_id.to_string()).await;
            }
            DeviceCommand::UpdateOperationMode {
                operation_mode,
                config,
            } => {
                self.registry
                    .update_operation_mode(device_id.to_string(), operation_mode)
                    .await;
                if let Some(config) = config {
                    self.registry
                        .update_config(device_id.to_string(), CameraConfigPatch::from(config))
                        .await;
                }
            }
            DeviceCommand::Reboot => {}
        }
        Delivery::Sent
    }
}
