use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc;
#[cfg(test)]
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::connection::{Connection, ConnectionId, Outbound};

/// deviceId -> viewers, plus the reverse index used when a viewer leaves.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    by_device: HashMap<String, HashMap<ConnectionId, Connection>>,
    by_viewer: HashMap<ConnectionId, HashSet<String>>,
}

impl SubscriptionTable {
    pub fn subscribe(&mut self, device_id: &str, viewer: Connection) {
        self.by_viewer
            .entry(viewer.id())
            .or_default()
            .insert(device_id.to_string());
        self.by_device
            .entry(device_id.to_string())
            .or_default()
            .insert(viewer.id(), viewer);
    }

    pub fn unsubscribe(&mut self, device_id: &str, viewer: ConnectionId) {
        if let Some(viewers) = self.by_device.get_mut(device_id) {
            viewers.remove(&viewer);
            if viewers.is_empty() {
                self.by_device.remove(device_id);
            }
        }
        if let Some(devices) = self.by_viewer.get_mut(&viewer) {
            devices.remove(device_id);
            if devices.is_empty() {
                self.by_viewer.remove(&viewer);
            }
        }
    }

    pub fn drop_connection(&mut self, viewer: ConnectionId) {
        let Some(devices) = self.by_viewer.remove(&viewer) else {
            return;
        };
        for device_id in devices {
            if let Some(viewers) = self.by_device.get_mut(&device_id) {
                viewers.remove(&viewer);
                if viewers.is_empty() {
                    self.by_device.remove(&device_id);
                }
            }
        }
    }

    /// Best effort: a viewer whose queue is full misses this frame, a closed
    /// viewer is skipped. Returns how many viewers accepted the frame.
    pub fn publish(&self, device_id: &str, frame: &Bytes) -> usize {
        let Some(viewers) = self.by_device.get(device_id) else {
            return 0;
        };
        let mut delivered = 0;
        for viewer in viewers.values() {
            match viewer.try_send(Outbound::Binary(frame.clone())) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    trace!(device = device_id, viewer = viewer.id(), "viewer busy, frame skipped")
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    #[cfg(test)]
    pub fn subscribers(&self, device_id: &str) -> usize {
        self.by_device.get(device_id).map_or(0, HashMap::len)
    }
}

enum Command {
    Subscribe {
        device_id: String,
        viewer: Connection,
    },
    Unsubscribe {
        device_id: String,
        viewer: ConnectionId,
    },
    Publish {
        device_id: String,
        frame: Bytes,
    },
    DropConnection {
        viewer: ConnectionId,
    },
    #[cfg(test)]
    Subscribers {
        device_id: String,
        reply: oneshot::Sender<usize>,
    },
}

/// Handle to the broadcast worker.
#[derive(Clone, Debug)]
pub struct ViewerHub {
    sender: mpsc::Sender<Command>,
}

impl ViewerHub {
    pub fn new() -> Self {
        let (sender, recv) = mpsc::channel(1024);
        tokio::spawn(Self::run(SubscriptionTable::default(), recv));
        ViewerHub { sender }
    }

    async fn run(mut table: SubscriptionTable, mut recv: mpsc::Receiver<Command>) {
        while let Some(command) = recv.recv().await {
            match command {
                Command::Subscribe { device_id, viewer } => {
                    debug!(device = device_id, viewer = viewer.id(), "viewer subscribed");
                    table.subscribe(&device_id, viewer);
                }
                Command::Unsubscribe { device_id, viewer } => {
                    debug!(device = device_id, viewer, "viewer unsubscribed");
                    table.unsubscribe(&device_id, viewer);
                }
                Command::Publish { device_id, frame } => {
                    table.publish(&device_id, &frame);
                }
                Command::DropConnection { viewer } => {
                    table.drop_connection(viewer);
                }
                #[cfg(test)]
                Command::Subscribers { device_id, reply } => {
                    let _ = reply.send(table.subscribers(&device_id));
                }
            }
        }
        debug!("viewer hub worker stopped");
    }

    pub async fn subscribe(&self, device_id: String, viewer: Connection) {
        let _ = self
            .sender
            .send(Command::Subscribe { device_id, viewer })
            .await;
    }

    pub async fn unsubscribe(&self, device_id: String, viewer: ConnectionId) {
        let _ = self
            .sender
            .send(Command::Unsubscribe { device_id, viewer })
            .await;
    }

    /// Called on the frame path, never waits.
    pub fn publish(&self, device_id: String, frame: Bytes) {
        if self
            .sender
            .try_send(Command::Publish { device_id, frame })
            .is_err()
        {
            trace!("viewer hub busy, frame not published");
        }
    }

    pub async fn drop_connection(&self, viewer: ConnectionId) {
        let _ = self.sender.send(Command::DropConnection { viewer }).await;
    }

    #[cfg(test)]
    pub async fn subscribers(&self, device_id: String) -> usize {
        let (reply, recv) = oneshot::channel();
        if self
            .sender
            .send(Command::Subscribers { device_id, reply })
            .await
            .is_err()
        {
            return 0;
        }
        recv.await.unwrap_or(0)
    }
}

impl Default for ViewerHub {
    fn default() -> Self {
        Self::new()
    }
}
