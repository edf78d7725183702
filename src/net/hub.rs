//! Broadcast dispatcher - fans encoded lines out to live connections

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::protocol::ServerMsg;

/// Lines a connection may have queued before it counts as stalled
pub const OUTBOUND_QUEUE: usize = 256;

/// Sending side of one live connection
struct Outbound {
    tx: mpsc::Sender<String>,
    evicted: Arc<Notify>,
}

impl Outbound {
    /// Queue a line. `false` means the connection must be dropped.
    fn deliver(&self, id: &str, line: &str) -> bool {
        match self.tx.try_send(line.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(conn_id = %id, queued = OUTBOUND_QUEUE, "Outbound queue full, evicting connection");
                self.evicted.notify_one();
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn_id = %id, "Pruned closed connection");
                false
            }
        }
    }
}

/// What a connection gets back from a successful registration
pub struct Registration {
    /// Lines to write to the socket
    pub outbound: mpsc::Receiver<String>,
    /// Fires when the hub drops the connection for not keeping up
    pub evicted: Arc<Notify>,
}

/// Live connections keyed by connection id
#[derive(Default)]
pub struct BroadcastHub {
    connections: DashMap<String, Outbound>,
    /// Serialises the capacity check with the insert
    admission: Mutex<()>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection unless `capacity` connections are already open
    pub fn try_register(&self, id: &str, capacity: usize) -> Option<Registration> {
        let _admission = self.admission.lock();
        if self.connections.len() >= capacity {
            return None;
        }

        let (tx, outbound) = mpsc::channel(OUTBOUND_QUEUE);
        let evicted = Arc::new(Notify::new());
        self.connections.insert(
            id.to_string(),
            Outbound {
                tx,
                evicted: evicted.clone(),
            },
        );
        Some(Registration { outbound, evicted })
    }

    pub fn unregister(&self, id: &str) -> bool {
        self.connections.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Send to every live connection, dropping those that are closed or
    /// stalled. Returns the number of connections reached.
    pub fn broadcast(&self, msg: &ServerMsg) -> usize {
        let line = msg.to_string();
        self.connections.retain(|id, out| out.deliver(id, &line));
        self.connections.len()
    }

    /// Send to one connection only
    pub fn unicast(&self, id: &str, msg: &ServerMsg) -> bool {
        let delivered = match self.connections.get(id) {
            Some(out) => out.deliver(id, &msg.to_string()),
            None => return false,
        };
        if !delivered {
            self.connections.remove(id);
        }
        delivered
    }
}
