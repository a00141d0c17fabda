use std::time::Duration;

use api::device::{CameraConfig, CameraConfigPatch, DeviceStatus, OperationMode};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace};

use super::{DeviceSession, DeviceTable};
use crate::connection::{Connection, ConnectionId};

enum Command {
    Register {
        device_id: String,
        reply: oneshot::Sender<(String, CameraConfig)>,
    },
    ByCredential {
        credential: String,
        reply: oneshot::Sender<Option<DeviceSession>>,
    },
    ById {
        device_id: String,
        reply: oneshot::Sender<Option<DeviceSession>>,
    },
    List {
        reply: oneshot::Sender<Vec<api::response::Device>>,
    },
    Bind {
        device_id: String,
        connection: Connection,
        reply: oneshot::Sender<bool>,
    },
    Unbind {
        device_id: String,
        connection_id: ConnectionId,
        reply: oneshot::Sender<bool>,
    },
    #[cfg(test)]
    Connection {
        device_id: String,
        reply: oneshot::Sender<Option<Connection>>,
    },
    Seen {
        device_id: String,
    },
    Heartbeat {
        device_id: String,
    },
    Frame {
        device_id: String,
    },
    SetStatus {
        device_id: String,
        status: DeviceStatus,
    },
    UpdateConfig {
        device_id: String,
        patch: CameraConfigPatch,
        reply: oneshot::Sender<Option<CameraConfig>>,
    },
    UpdateOperationMode {
        device_id: String,
        mode: OperationMode,
        reply: oneshot::Sender<bool>,
    },
    Sweep {
        max_age: Duration,
        reply: oneshot::Sender<Vec<String>>,
    },
}

/// Handle to the device registry worker. Cheap to clone; every clone talks to
/// the same single writer.
#[derive(Clone, Debug)]
pub struct Registry {
    sender: mpsc::Sender<Command>,
}

impl Registry {
    pub fn new() -> Self {
        let (sender, recv) = mpsc::channel(1024);
        tokio::spawn(Self::run(DeviceTable::default(), recv));
        Registry { sender }
    }

    async fn run(mut table: DeviceTable, mut recv: mpsc::Receiver<Command>) {
        while let Some(command) = recv.recv().await {
            let now = Utc::now();
            match command {
                Command::Register { device_id, reply } => {
                    let _ = reply.send(table.register(&device_id, now));
                }
                Command::ByCredential { credential, reply } => {
                    let _ = reply.send(table.by_credential(&credential).cloned());
                }
                Command::ById { device_id, reply } => {
                    let _ = reply.send(table.get(&device_id).cloned());
                }
                Command::List { reply } => {
                    let _ = reply.send(table.list());
                }
                Command::Bind {
                    device_id,
                    connection,
                    reply,
                } => {
                    let _ = reply.send(table.bind(&device_id, connection, now));
                }
                Command::Unbind {
                    device_id,
                    connection_id,
                    reply,
                } => {
                    let _ = reply.send(table.unbind(&device_id, connection_id, now));
                }
                #[cfg(test)]
                Command::Connection { device_id, reply } => {
                    let _ = reply.send(table.connection(&device_id));
                }
                Command::Seen { device_id } => {
                    table.seen(&device_id, now);
                }
                Command::Heartbeat { device_id } => {
                    table.heartbeat(&device_id, now);
                }
                Command::Frame { device_id } => {
                    table.frame(&device_id, now);
                }
                Command::SetStatus { device_id, status } => {
                    table.set_status(&device_id, status, now);
                }
                Command::UpdateConfig {
                    device_id,
                    patch,
                    reply,
                } => {
                    let _ = reply.send(table.update_config(&device_id, patch));
                }
                Command::UpdateOperationMode {
                    device_id,
                    mode,
                    reply,
                } => {
                    let _ = reply.send(table.update_operation_mode(&device_id, mode));
                }
                Command::Sweep { max_age, reply } => {
                    let _ = reply.send(table.sweep(now, max_age));
                }
            }
        }
        debug!("registry worker stopped");
    }

    async fn call<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (reply, recv) = oneshot::channel();
        self.sender.send(command(reply)).await.ok()?;
        recv.await.ok()
    }

    pub async fn register(&self, device_id: String) -> Option<(String, CameraConfig)> {
        self.call(|reply| Command::Register { device_id, reply })
            .await
    }

    pub async fn lookup_by_credential(&self, credential: String) -> Option<DeviceSession> {
        self.call(|reply| Command::ByCredential { credential, reply })
            .await
            .flatten()
    }

    pub async fn lookup_by_id(&self, device_id: String) -> Option<DeviceSession> {
        self.call(|reply| Command::ById { device_id, reply })
            .await
            .flatten()
    }

    pub async fn list(&self) -> Vec<api::response::Device> {
        self.call(|reply| Command::List { reply })
            .await
            .unwrap_or_default()
    }

    pub async fn bind(&self, device_id: String, connection: Connection) -> bool {
        self.call(|reply| Command::Bind {
            device_id,
            connection,
            reply,
        })
        .await
        .unwrap_or(false)
    }

    /// True when `connection_id` was the bound connection and the device
    /// went OFFLINE.
    pub async fn unbind(&self, device_id: String, connection_id: ConnectionId) -> bool {
        self.call(|reply| Command::Unbind {
            device_id,
            connection_id,
            reply,
        })
        .await
        .unwrap_or(false)
    }

    #[cfg(test)]
    pub async fn connection(&self, device_id: String) -> Option<Connection> {
        self.call(|reply| Command::Connection { device_id, reply })
            .await
            .flatten()
    }

    pub async fn seen(&self, device_id: String) {
        let _ = self.sender.send(Command::Seen { device_id }).await;
    }

    pub async fn heartbeat(&self, device_id: String) {
        let _ = self.sender.send(Command::Heartbeat { device_id }).await;
    }

    /// Called on the frame path, never waits.
    pub fn frame_received(&self, device_id: String) {
        if self.sender.try_send(Command::Frame { device_id }).is_err() {
            trace!("registry busy, frame activity not recorded");
        }
    }

    pub async fn set_status(&self, device_id: String, status: DeviceStatus) {
        let _ = self
            .sender
            .send(Command::SetStatus { device_id, status })
            .await;
    }

    pub async fn update_config(
        &self,
        device_id: String,
        patch: CameraConfigPatch,
    ) -> Option<CameraConfig> {
        self.call(|reply| Command::UpdateConfig {
            device_id,
            patch,
            reply,
        })
        .await
        .flatten()
    }

    pub async fn update_operation_mode(&self, device_id: String, mode: OperationMode) -> bool {
        self.call(|reply| Command::UpdateOperationMode {
            device_id,
            mode,
            reply,
        })
        .await
        .unwrap_or(false)
    }

    pub async fn sweep_inactive(&self, max_age: Duration) -> Vec<String> {
        self.call(|reply| Command::Sweep { max_age, reply })
            .await
            .unwrap_or_default()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically forget devices that stayed offline past `max_age`.
pub async fn sweep_tick(registry: Registry, interval: Duration, max_age: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let removed = registry.sweep_inactive(max_age).await;
        if !removed.is_empty() {
            info!(count = removed.len(), ?removed, "swept inactive devices");
        }
    }
}
