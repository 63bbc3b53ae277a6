//! WebSocket Relay Hub
//!
//! Owns the single device slot and the set of client connections, and
//! decides where every inbound frame goes:
//!
//! - client → device: forwarded verbatim
//! - device → clients: broadcast verbatim, and persisted when it carries state
//! - `ESP32` from anyone: that connection becomes the device
//!
//! All classification state sits behind one lock so a connection is never
//! observed as both device and client. The lock is held only long enough to
//! copy out the send targets; actual sends happen after it is released.
//!
//! Every connection has a bounded outbound queue. A peer that stops reading
//! has frames skipped once its queue is full; nothing waits on it.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::messages::{FrameError, HubNotice, InboundFrame, Record};
use crate::sink::{SnapshotWriter, WriterStats};

/// Unique identifier for a connection
pub type PeerId = String;

/// Configuration for the relay hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Frames buffered per connection before further frames are skipped
    pub peer_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            peer_queue_capacity: 64,
        }
    }
}

/// Send capability of one connection
///
/// Frames pushed here are written to the socket by the connection's send
/// task. The peer counts as open for as long as that task is alive.
#[derive(Debug, Clone)]
pub struct Peer {
    id: PeerId,
    sender: mpsc::Sender<String>,
}

/// Result of queueing one frame for a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Queued,
    /// The peer's queue is full; frame skipped
    Full,
    /// The peer's send task is gone
    Closed,
}

impl Peer {
    fn new(sender: mpsc::Sender<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
        }
    }

    /// Connection identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the connection can still accept frames
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queue a frame without waiting
    fn send(&self, text: String) -> Delivery {
        match self.sender.try_send(text) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

/// Classification state
#[derive(Default)]
struct HubState {
    /// The identified device, if any
    device: Option<Peer>,
    /// Every other tracked connection
    clients: HashMap<PeerId, Peer>,
}

impl HubState {
    fn is_device(&self, id: &str) -> bool {
        self.device.as_ref().map(|d| d.id == id).unwrap_or(false)
    }

    fn open_clients(&self) -> Vec<Peer> {
        self.clients
            .values()
            .filter(|peer| peer.is_open())
            .cloned()
            .collect()
    }
}

/// What the hub did with one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// The sender is now the device
    Identified {
        /// Device that was displaced, if a different connection held the slot
        replaced: Option<PeerId>,
    },
    /// Client frame handed to the device
    Forwarded {
        /// False if the device connection was gone or its queue full
        delivered: bool,
    },
    /// Device frame handed to clients
    Broadcast {
        /// Number of clients the frame was queued for
        recipients: usize,
        /// What happened on the persistence side
        persistence: Persistence,
    },
    /// No device is identified, frame discarded
    NoDevice,
    /// Frame could not be parsed, discarded
    Malformed(FrameError),
}

/// Persistence decision for a device frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Frame carried no state report
    Skipped,
    /// Snapshot handed to the writer
    Queued,
    /// Snapshot could not be built or queued
    Failed,
}

/// What a closing connection was
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The device left; clients were told
    Device {
        /// Clients that received the disconnect notice
        notified: usize,
    },
    /// A client left
    Client,
    /// Not tracked (already removed, or a displaced device)
    Untracked,
}

/// Point-in-time view of the hub
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct HubStatus {
    pub device_connected: bool,
    pub clients: usize,
}

/// Routes frames between the device and its clients
pub struct RelayHub {
    state: RwLock<HubState>,
    writer: SnapshotWriter,
    config: HubConfig,
    /// Frames skipped because the target's queue was full
    skipped_frames: AtomicU64,
}

impl RelayHub {
    /// Create a hub with default configuration
    pub fn new(writer: SnapshotWriter) -> Self {
        Self::with_config(HubConfig::default(), writer)
    }

    /// Create a hub that persists device state through `writer`
    pub fn with_config(config: HubConfig, writer: SnapshotWriter) -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            writer,
            config,
            skipped_frames: AtomicU64::new(0),
        }
    }

    /// Register a freshly accepted connection as a client
    ///
    /// Returns the peer handle and the receiving end of its outbound queue,
    /// which the connection's send task drains into the socket.
    pub async fn connect(&self) -> (Peer, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.config.peer_queue_capacity.max(1));
        let peer = Peer::new(tx);

        let clients = {
            let mut state = self.state.write().await;
            state.clients.insert(peer.id.clone(), peer.clone());
            state.clients.len()
        };

        tracing::info!(peer_id = %peer.id, clients, "Client connected");
        (peer, rx)
    }

    /// Make `peer` the device
    ///
    /// A previously identified device is not notified or closed; it simply
    /// stops being routed to.
    pub async fn identify(&self, peer: &Peer) -> Option<PeerId> {
        let previous = {
            let mut state = self.state.write().await;
            state.clients.remove(&peer.id);
            state.device.replace(peer.clone())
        };

        let replaced = previous.map(|p| p.id).filter(|id| *id != peer.id);

        match &replaced {
            Some(old) => tracing::warn!(
                peer_id = %peer.id,
                replaced = %old,
                "Device re-identified, previous device connection orphaned"
            ),
            None => tracing::info!(peer_id = %peer.id, "Device identified"),
        }

        replaced
    }

    /// Clean up after a closed connection
    ///
    /// Safe to call more than once for the same peer.
    pub async fn disconnect(&self, peer: &Peer) -> Departure {
        let notify = {
            let mut state = self.state.write().await;
            if state.is_device(&peer.id) {
                state.device = None;
                Some(state.open_clients())
            } else if state.clients.remove(&peer.id).is_some() {
                tracing::info!(peer_id = %peer.id, clients = state.clients.len(), "Client disconnected");
                return Departure::Client;
            } else {
                None
            }
        };

        let Some(targets) = notify else {
            tracing::debug!(peer_id = %peer.id, "Untracked connection closed");
            return Departure::Untracked;
        };

        let notice = match HubNotice::DeviceDisconnected.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize disconnect notice");
                return Departure::Device { notified: 0 };
            }
        };

        let notified = self.fan_out(&targets, &notice);

        tracing::info!(peer_id = %peer.id, notified, "Device disconnected");
        Departure::Device { notified }
    }

    /// Handle one frame received from `peer`
    pub async fn route(&self, peer: &Peer, frame: InboundFrame) -> RouteOutcome {
        match frame {
            InboundFrame::Identify => RouteOutcome::Identified {
                replaced: self.identify(peer).await,
            },
            InboundFrame::Malformed { raw, error } => {
                tracing::warn!(peer_id = %peer.id, error = %error, frame = %raw, "Discarding malformed message");
                RouteOutcome::Malformed(error)
            }
            InboundFrame::Record(record) => self.relay(peer, record).await,
        }
    }

    async fn relay(&self, peer: &Peer, record: Record) -> RouteOutcome {
        let (device, from_device, clients) = {
            let state = self.state.read().await;
            let from_device = state.is_device(&peer.id);
            let clients = if from_device {
                state.open_clients()
            } else {
                Vec::new()
            };
            (state.device.clone(), from_device, clients)
        };

        let Some(device) = device else {
            tracing::info!(peer_id = %peer.id, "No device connected, discarding message");
            return RouteOutcome::NoDevice;
        };

        if !from_device {
            let delivered = self.deliver(&device, record.raw);
            if delivered {
                tracing::debug!(peer_id = %peer.id, device_id = %device.id, "Forwarded command to device");
            } else {
                tracing::debug!(peer_id = %peer.id, device_id = %device.id, "Device unavailable, command dropped");
            }
            return RouteOutcome::Forwarded { delivered };
        }

        // A bare `null` has no fields to inspect; treat it as unusable state
        if record.value.is_null() {
            tracing::warn!(peer_id = %peer.id, "Discarding null device frame");
            return RouteOutcome::Malformed(FrameError::NullState);
        }

        let persistence = self.persist(&record);
        let recipients = self.fan_out(&clients, &record.raw);

        tracing::debug!(peer_id = %peer.id, recipients, "Broadcast device update");
        RouteOutcome::Broadcast {
            recipients,
            persistence,
        }
    }

    /// Queue `text` for every target, returning how many accepted it
    fn fan_out(&self, targets: &[Peer], text: &str) -> usize {
        targets
            .iter()
            .filter(|peer| self.deliver(peer, text.to_string()))
            .count()
    }

    fn deliver(&self, peer: &Peer, text: String) -> bool {
        match peer.send(text) {
            Delivery::Queued => true,
            Delivery::Full => {
                self.skipped_frames.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(peer_id = %peer.id, "Outbound queue full, frame skipped");
                false
            }
            Delivery::Closed => false,
        }
    }

    fn persist(&self, record: &Record) -> Persistence {
        match record.snapshot() {
            None => Persistence::Skipped,
            Some(Ok(snapshot)) => match self.writer.submit(snapshot) {
                Ok(()) => Persistence::Queued,
                Err(_) => Persistence::Failed,
            },
            Some(Err(e)) => {
                tracing::error!(error = %e, frame = %record.raw, "Failed to build snapshot");
                Persistence::Failed
            }
        }
    }

    /// Current device/client view
    pub async fn status(&self) -> HubStatus {
        let state = self.state.read().await;
        HubStatus {
            device_connected: state.device.is_some(),
            clients: state.clients.len(),
        }
    }

    /// Whether `peer` currently holds the device slot
    pub async fn is_device(&self, peer: &Peer) -> bool {
        self.state.read().await.is_device(&peer.id)
    }

    /// Whether `peer` is currently a tracked client
    pub async fn is_client(&self, peer: &Peer) -> bool {
        self.state.read().await.clients.contains_key(&peer.id)
    }

    /// Frames skipped so far because a peer's queue was full
    pub fn skipped_frames(&self) -> u64 {
        self.skipped_frames.load(Ordering::Relaxed)
    }

    /// Snapshot writer counters
    pub fn snapshot_stats(&self) -> WriterStats {
        self.writer.stats()
    }

    /// Name of the sink snapshots are written to
    pub fn sink_name(&self) -> &str {
        self.writer.sink_name()
    }
}
