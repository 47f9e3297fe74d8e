//! Coordinator for the server's shared state.
//!
//! The history log and the peer registry are the only mutable state shared
//! between connections. Nothing outside this module touches them directly;
//! sessions go through [`Hub`].
//!
//! Ordering rules:
//!
//! - `broadcast` appends to the log, snapshots the registry and queues the
//!   frame to every peer in the snapshot, all while holding the log's write
//!   lock. Queueing is non-blocking, so a slow peer never holds the lock.
//! - `join` queues the full replay to the new peer and registers it while
//!   holding the log's read lock.
//!
//! A frame is therefore either part of a joining peer's replay or part of
//! its live stream, never both and never neither, and every peer's queue is
//! in history order.

use crate::history::HistoryLog;
use crate::protocol::{EncodedFrame, Frame, ProtocolError};
use crate::registry::{DeliveryError, Peer, PeerId, Registry};

/// Outcome of fanning one frame out to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sequence number of the frame in the history log.
    pub seq: u64,
    /// Number of peers the frame was queued to.
    pub delivered: usize,
    /// Peers whose queue was closed. They have been unregistered.
    pub failed: Vec<PeerId>,
}

#[derive(Clone, Default)]
pub struct Hub {
    history: HistoryLog,
    registry: Registry,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, peer: Peer) -> bool {
        self.registry.add(peer)
    }

    /// Unregister a peer. Safe to call any number of times.
    pub fn remove(&self, id: PeerId) -> bool {
        let removed = self.registry.remove(id).is_some();
        if removed {
            tracing::debug!(peer = %id, "peer unregistered");
        }
        removed
    }

    pub fn snapshot(&self) -> Vec<Peer> {
        self.registry.snapshot()
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.registry.contains(id)
    }

    pub fn peer_count(&self) -> usize {
        self.registry.len()
    }

    /// Record a frame without fanning it out.
    pub fn append(&self, frame: &Frame) -> Result<u64, ProtocolError> {
        Ok(self.history.append(frame.encode()?))
    }

    pub fn replay_all(&self) -> Vec<EncodedFrame> {
        self.history.replay_all()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Replay history to `peer`, then register it for live broadcasts.
    ///
    /// Returns the number of replayed frames. Fails if the peer's queue is
    /// already closed, in which case it is not registered.
    pub fn join(&self, peer: Peer) -> Result<usize, DeliveryError> {
        let id = peer.id();
        let replayed = self.history.replay_then(|frames| {
            for frame in frames {
                peer.deliver(frame.clone())?;
            }
            self.registry.add(peer);
            Ok::<_, DeliveryError>(frames.len())
        })?;
        tracing::debug!(peer = %id, replayed, "peer joined");
        Ok(replayed)
    }

    /// Append `frame` to history, then queue it to every registered peer.
    ///
    /// A closed recipient does not affect the others; it is unregistered
    /// and reported in [`BroadcastReport::failed`].
    pub fn broadcast(&self, frame: &Frame) -> Result<BroadcastReport, ProtocolError> {
        let encoded = frame.encode()?;
        let report = self.history.append_then(encoded.clone(), |seq| {
            let mut report = BroadcastReport {
                seq,
                delivered: 0,
                failed: Vec::new(),
            };
            for peer in self.registry.snapshot() {
                match peer.deliver(encoded.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        tracing::warn!(peer = %peer.id(), error = %e, "broadcast delivery failed");
                        report.failed.push(peer.id());
                    }
                }
            }
            report
        });

        for id in &report.failed {
            self.remove(*id);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn drain(rx: &mut UnboundedReceiver<EncodedFrame>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(f) = rx.try_recv() {
            let frame = Frame::decode(&f).unwrap();
            out.push(frame.message().to_string());
        }
        out
    }

    fn msg(text: &str) -> Frame {
        Frame::with_timestamp("tester", text, "2024-01-01 00:00:00")
    }

    #[test]
    fn broadcast_appends_then_delivers() {
        let hub = Hub::new();
        let (peer, mut rx) = Peer::channel(None);
        hub.join(peer).unwrap();

        let report = hub.broadcast(&msg("hello")).unwrap();
        assert_eq!(report.seq, 0);
        assert_eq!(report.delivered, 1);
        assert!(report.failed.is_empty());
        assert_eq!(hub.history_len(), 1);
        assert_eq!(drain(&mut rx), vec!["hello"]);
    }

    #[test]
    fn join_replays_history_in_order() {
        let hub = Hub::new();
        hub.broadcast(&msg("one")).unwrap();
        hub.broadcast(&msg("two")).unwrap();

        let (peer, mut rx) = Peer::channel(None);
        assert_eq!(hub.join(peer).unwrap(), 2);
        hub.broadcast(&msg("three")).unwrap();

        assert_eq!(drain(&mut rx), vec!["one", "two", "three"]);
    }

    #[test]
    fn join_with_closed_queue_does_not_register() {
        let hub = Hub::new();
        hub.broadcast(&msg("one")).unwrap();
        let (peer, rx) = Peer::channel(None);
        let id = peer.id();
        drop(rx);
        assert!(hub.join(peer).is_err());
        assert!(!hub.contains(id));
    }

    #[test]
    fn broadcast_isolates_dead_peer() {
        let hub = Hub::new();
        let (alive1, mut rx1) = Peer::channel(None);
        let (dead, dead_rx) = Peer::channel(None);
        let (alive2, mut rx2) = Peer::channel(None);
        let dead_id = dead.id();
        hub.join(alive1).unwrap();
        hub.join(dead).unwrap();
        hub.join(alive2).unwrap();
        drop(dead_rx);

        let report = hub.broadcast(&msg("hi")).unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, vec![dead_id]);
        assert!(!hub.contains(dead_id));
        assert_eq!(hub.peer_count(), 2);
        assert_eq!(drain(&mut rx1), vec!["hi"]);
        assert_eq!(drain(&mut rx2), vec!["hi"]);
    }

    #[test]
    fn remove_twice_matches_remove_once() {
        let hub = Hub::new();
        let (peer, _rx) = Peer::channel(None);
        let id = peer.id();
        hub.join(peer).unwrap();

        assert!(hub.remove(id));
        assert!(!hub.remove(id));
        assert_eq!(hub.peer_count(), 0);
    }

    #[test]
    fn append_does_not_fan_out() {
        let hub = Hub::new();
        let (peer, mut rx) = Peer::channel(None);
        hub.join(peer).unwrap();
        hub.append(&msg("quiet")).unwrap();
        assert_eq!(hub.history_len(), 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn concurrent_join_and_broadcast_never_gaps_or_duplicates() {
        let hub = Hub::new();
        let writer = {
            let hub = hub.clone();
            std::thread::spawn(move || {
                for i in 0..300 {
                    hub.broadcast(&msg(&i.to_string())).unwrap();
                }
            })
        };

        let mut receivers = Vec::new();
        for _ in 0..20 {
            let (peer, rx) = Peer::channel(None);
            hub.join(peer).unwrap();
            receivers.push(rx);
            std::thread::yield_now();
        }
        writer.join().unwrap();

        for mut rx in receivers {
            let seen = drain(&mut rx);
            let expected: Vec<String> = (0..300).map(|i: i32| i.to_string()).collect();
            assert_eq!(seen, expected);
        }
    }
}
