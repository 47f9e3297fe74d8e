use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::protocol::EncodedFrame;

/// Connection identity. Unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("{0} is no longer receiving")]
    Closed(PeerId),
}

/// Handle to a live connection, as seen by the fan-out path.
///
/// The outbound queue is unbounded: delivery never waits on the recipient.
/// The owning session drains it into the socket.
#[derive(Clone)]
pub struct Peer {
    id: PeerId,
    addr: Option<SocketAddr>,
    outbound: mpsc::UnboundedSender<EncodedFrame>,
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl Peer {
    /// Create a peer handle together with the receiving end of its outbound
    /// queue.
    pub fn channel(addr: Option<SocketAddr>) -> (Self, mpsc::UnboundedReceiver<EncodedFrame>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let peer = Self {
            id: PeerId::next(),
            addr,
            outbound,
        };
        (peer, rx)
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Queue a frame for this peer. Fails only when the peer's session has
    /// dropped its receiver.
    pub fn deliver(&self, frame: EncodedFrame) -> Result<(), DeliveryError> {
        self.outbound
            .send(frame)
            .map_err(|_| DeliveryError::Closed(self.id))
    }
}

/// Set of sessions currently eligible for live broadcast.
///
/// All operations take the same lock, so a snapshot never contains a peer
/// that is halfway through removal.
#[derive(Clone, Default)]
pub struct Registry {
    peers: Arc<RwLock<HashMap<PeerId, Peer>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer. Returns `false` if it was already registered.
    pub fn add(&self, peer: Peer) -> bool {
        let mut peers = self.peers.write();
        if peers.contains_key(&peer.id) {
            return false;
        }
        peers.insert(peer.id, peer);
        true
    }

    /// Unregister a peer. Removing an absent peer is a no-op that returns
    /// `None`, so racing teardown paths can both call this safely.
    pub fn remove(&self, id: PeerId) -> Option<Peer> {
        self.peers.write().remove(&id)
    }

    /// Immutable copy of the registered peers, ordered by id.
    pub fn snapshot(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.peers.read().values().cloned().collect();
        peers.sort_by_key(|p| p.id);
        peers
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.peers.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
