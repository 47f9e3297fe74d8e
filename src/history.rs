use std::sync::Arc;

use parking_lot::RwLock;

use crate::protocol::EncodedFrame;

/// Append-only, ordered record of every frame the server has accepted.
///
/// Insertion order is server-receipt order. Entries are never mutated or
/// removed; the log lives as long as the process.
///
/// Replay always observes a consistent prefix: a reader holds the lock for
/// the duration of its scan, so appends that start after the scan began are
/// not visible to it.
#[derive(Clone, Default)]
pub struct HistoryLog {
    frames: Arc<RwLock<Vec<EncodedFrame>>>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame and return its zero-based sequence number.
    pub fn append(&self, frame: EncodedFrame) -> u64 {
        self.append_then(frame, |seq| seq)
    }

    /// Append a frame and run `f` with its sequence number while the write
    /// lock is still held.
    ///
    /// No replay can interleave between the append and `f`, which is what
    /// lets the hub fan out a frame atomically with respect to joins.
    pub fn append_then<R>(&self, frame: EncodedFrame, f: impl FnOnce(u64) -> R) -> R {
        let mut frames = self.frames.write();
        let seq = frames.len() as u64;
        frames.push(frame);
        f(seq)
    }

    /// Copy of every frame appended so far, in order.
    pub fn replay_all(&self) -> Vec<EncodedFrame> {
        self.frames.read().clone()
    }

    /// Run `f` against the current contents while appends are held off.
    pub fn replay_then<R>(&self, f: impl FnOnce(&[EncodedFrame]) -> R) -> R {
        let frames = self.frames.read();
        f(&frames)
    }

    pub fn len(&self) -> usize {
        self.frames.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(s: &str) -> EncodedFrame {
        Arc::from(s)
    }

    #[test]
    fn append_assigns_sequential_numbers() {
        let log = HistoryLog::new();
        assert_eq!(log.append(frame("a")), 0);
        assert_eq!(log.append(frame("b")), 1);
        assert_eq!(log.append(frame("c")), 2);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn replay_preserves_append_order() {
        let log = HistoryLog::new();
        for s in ["one", "two", "three"] {
            log.append(frame(s));
        }
        let replay: Vec<String> = log.replay_all().iter().map(|f| f.to_string()).collect();
        assert_eq!(replay, vec!["one", "two", "three"]);
    }

    #[test]
    fn replay_is_restartable() {
        let log = HistoryLog::new();
        log.append(frame("x"));
        assert_eq!(log.replay_all(), log.replay_all());
    }

    #[test]
    fn replay_snapshot_excludes_later_appends() {
        let log = HistoryLog::new();
        log.append(frame("before"));
        let snapshot = log.replay_all();
        log.append(frame("after"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn empty_log() {
        let log = HistoryLog::new();
        assert!(log.is_empty());
        assert!(log.replay_all().is_empty());
    }

    #[test]
    fn concurrent_appends_are_all_recorded() {
        let log = HistoryLog::new();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        log.append(frame(&format!("{t}-{i}")));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(log.len(), 800);

        // Each writer's frames appear in that writer's call order.
        let replay = log.replay_all();
        for t in 0..8 {
            let prefix = format!("{t}-");
            let seen: Vec<usize> = replay
                .iter()
                .filter_map(|f| f.strip_prefix(prefix.as_str()))
                .map(|n| n.parse().unwrap())
                .collect();
            assert_eq!(seen, (0..100).collect::<Vec<_>>());
        }
    }

    #[test]
    fn concurrent_replay_sees_a_prefix() {
        let log = HistoryLog::new();
        let writer = {
            let log = log.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    log.append(frame(&i.to_string()));
                }
            })
        };
        for _ in 0..50 {
            let replay = log.replay_all();
            for (i, f) in replay.iter().enumerate() {
                assert_eq!(f.as_ref(), i.to_string());
            }
        }
        writer.join().unwrap();
    }
}
