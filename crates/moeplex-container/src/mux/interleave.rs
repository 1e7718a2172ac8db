//! Cross-track packet ordering.

use crate::config::InterleaveMode;
use crate::packet::Packet;
use crate::{Error, Result};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Default)]
struct TrackQueue {
    pending: VecDeque<Packet>,
    closed: bool,
}

/// Per-track queues merged by smallest pending timestamp, ties broken by
/// ascending stream index.
#[derive(Debug)]
pub(crate) struct Interleaver {
    queues: BTreeMap<u8, TrackQueue>,
    mode: InterleaveMode,
    capacity: usize,
}

impl Interleaver {
    pub(crate) fn new(mode: InterleaveMode, capacity: usize) -> Self {
        Self {
            queues: BTreeMap::new(),
            mode,
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn register(&mut self, stream: u8) {
        self.queues.entry(stream).or_default();
    }

    pub(crate) fn enqueue(&mut self, packet: Packet) -> Result<()> {
        let queue = self
            .queues
            .get_mut(&packet.stream)
            .ok_or(Error::NoSuchTrack(packet.stream))?;
        if queue.closed {
            return Err(Error::InvalidState {
                operation: "push a packet",
                state: "track closed",
            });
        }
        queue.pending.push_back(packet);
        Ok(())
    }

    /// Mark a track as finished. Its pending packets are still released.
    pub(crate) fn close(&mut self, stream: u8) -> Result<()> {
        let queue = self
            .queues
            .get_mut(&stream)
            .ok_or(Error::NoSuchTrack(stream))?;
        queue.closed = true;
        Ok(())
    }

    pub(crate) fn close_all(&mut self) {
        for queue in self.queues.values_mut() {
            queue.closed = true;
        }
    }

    pub(crate) fn queue_len(&self, stream: u8) -> usize {
        self.queues.get(&stream).map_or(0, |q| q.pending.len())
    }

    pub(crate) fn pending(&self) -> usize {
        self.queues.values().map(|q| q.pending.len()).sum()
    }

    /// First open track with nothing pending, which blocks strict release.
    pub(crate) fn waiting_on(&self) -> Option<u8> {
        self.queues
            .iter()
            .find(|(_, q)| !q.closed && q.pending.is_empty())
            .map(|(stream, _)| *stream)
    }

    fn next_candidate(&self) -> Option<u8> {
        self.queues
            .iter()
            .filter_map(|(stream, q)| q.pending.front().map(|p| (p.timestamp, *stream)))
            .min()
            .map(|(_, stream)| stream)
    }

    fn pop_from(&mut self, stream: u8) -> Option<Packet> {
        self.queues.get_mut(&stream)?.pending.pop_front()
    }

    /// Release the next packet if ordering allows it.
    ///
    /// Strict mode requires every open track to have a pending packet. Live
    /// mode additionally releases when some queue has reached capacity.
    pub(crate) fn pop_ready(&mut self) -> Option<Packet> {
        let candidate = self.next_candidate()?;
        let blocked = self.waiting_on().is_some();
        let overflowing = self.mode == InterleaveMode::Live
            && self.queues.values().any(|q| q.pending.len() >= self.capacity);
        if blocked && !overflowing {
            return None;
        }
        self.pop_from(candidate)
    }

    /// Release the smallest pending packet regardless of stalled tracks.
    pub(crate) fn pop_any(&mut self) -> Option<Packet> {
        let candidate = self.next_candidate()?;
        self.pop_from(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(interleaver: &mut Interleaver) -> Vec<(u8, u64)> {
        std::iter::from_fn(|| interleaver.pop_ready())
            .map(|p| (p.stream, p.timestamp))
            .collect()
    }

    #[test]
    fn test_strict_waits_for_every_open_track() {
        let mut il = Interleaver::new(InterleaveMode::Strict, 4);
        il.register(0);
        il.register(1);
        il.enqueue(Packet::new(0, 10, vec![])).unwrap();
        il.enqueue(Packet::new(0, 20, vec![])).unwrap();
        assert!(il.pop_ready().is_none());
        assert_eq!(il.waiting_on(), Some(1));

        il.enqueue(Packet::new(1, 15, vec![])).unwrap();
        assert_eq!(drain(&mut il), vec![(0, 10), (1, 15)]);

        il.close(1).unwrap();
        assert_eq!(drain(&mut il), vec![(0, 20)]);
    }

    #[test]
    fn test_ties_break_by_stream_index() {
        let mut il = Interleaver::new(InterleaveMode::Strict, 4);
        for stream in [2, 0, 1] {
            il.register(stream);
            il.enqueue(Packet::new(stream, 100, vec![])).unwrap();
        }
        il.close_all();
        assert_eq!(drain(&mut il), vec![(0, 100), (1, 100), (2, 100)]);
    }

    #[test]
    fn test_live_releases_on_full_queue() {
        let mut il = Interleaver::new(InterleaveMode::Live, 2);
        il.register(0);
        il.register(1);
        il.enqueue(Packet::new(0, 10, vec![])).unwrap();
        assert!(il.pop_ready().is_none());
        il.enqueue(Packet::new(0, 20, vec![])).unwrap();
        assert_eq!(drain(&mut il), vec![(0, 10)]);

        // Late packet of the stalled track is still accepted.
        il.enqueue(Packet::new(1, 5, vec![])).unwrap();
        assert_eq!(drain(&mut il), vec![(1, 5)]);

        il.close(1).unwrap();
        assert_eq!(drain(&mut il), vec![(0, 20)]);
    }

    #[test]
    fn test_pop_any_ignores_stalled_tracks() {
        let mut il = Interleaver::new(InterleaveMode::Live, 8);
        il.register(0);
        il.register(1);
        il.enqueue(Packet::new(1, 30, vec![])).unwrap();
        assert!(il.pop_ready().is_none());
        assert_eq!(il.pop_any().map(|p| p.timestamp), Some(30));
        assert!(il.pop_any().is_none());
    }

    #[test]
    fn test_closed_track_rejects_packets() {
        let mut il = Interleaver::new(InterleaveMode::Strict, 4);
        il.register(0);
        il.close(0).unwrap();
        assert!(matches!(
            il.enqueue(Packet::new(0, 1, vec![])),
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            il.enqueue(Packet::new(9, 1, vec![])),
            Err(Error::NoSuchTrack(9))
        ));
    }
}
