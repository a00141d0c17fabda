use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};

pub type ConnectionId = u64;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub const CLOSE_INVALID_CREDENTIAL: u16 = 4001;
pub const CLOSE_ORIGIN_REJECTED: u16 = 4003;
pub const CLOSE_REPLACED: u16 = 4009;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: u16, reason: impl ToString) -> Self {
        Self {
            code,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Binary(Bytes),
}

/// Non-owning handle to a live WebSocket. The socket itself is driven by its
/// connection task, everything else talks to it through this handle.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    outbound: mpsc::Sender<Outbound>,
    close: Arc<watch::Sender<Option<CloseReason>>>,
}

/// The half kept by the connection task.
#[derive(Debug)]
pub struct ConnectionRx {
    pub outbound: mpsc::Receiver<Outbound>,
    pub close: watch::Receiver<Option<CloseReason>>,
}

impl Connection {
    pub fn new(capacity: usize) -> (Self, ConnectionRx) {
        let (outbound, outbound_rx) = mpsc::channel(capacity);
        let (close, close_rx) = watch::channel(None);
        (
            Self {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                outbound,
                close: Arc::new(close),
            },
            ConnectionRx {
                outbound: outbound_rx,
                close: close_rx,
            },
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a message without waiting. Fails when the queue is full or the
    /// connection is gone.
    pub fn try_send(&self, msg: Outbound) -> Result<(), mpsc::error::TrySendError<Outbound>> {
        self.outbound.try_send(msg)
    }

    /// Ask the connection task to send a close frame and stop.
    pub fn close(&self, reason: CloseReason) {
        let _ = self.close.send(Some(reason));
    }
}
