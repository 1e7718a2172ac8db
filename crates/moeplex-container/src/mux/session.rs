//! Concurrent packet ingestion over bounded per-track channels.
//!
//! Each track gets a [`TrackProducer`] that can be moved to its own thread.
//! [`Multiplexer::drain`] is the single merge point: it pulls from the
//! channels, applies the interleaving rule and frames packets until every
//! producer has been dropped.

use super::Multiplexer;
use crate::config::InterleaveMode;
use crate::packet::Packet;
use crate::{Error, Result};
use flume::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::collections::BTreeMap;
use tracing::debug;

/// Sending half for one track. Dropping it closes the track.
#[derive(Debug, Clone)]
pub struct TrackProducer {
    stream: u8,
    tx: Sender<Packet>,
}

impl TrackProducer {
    pub fn stream(&self) -> u8 {
        self.stream
    }

    /// Send a packet, blocking while the track's queue is full.
    pub fn send(&self, packet: Packet) -> Result<()> {
        if packet.stream != self.stream {
            return Err(Error::InvalidTrack {
                index: packet.stream,
                reason: format!("sent through the producer of stream {}", self.stream),
            });
        }
        self.tx.send(packet).map_err(|_| Error::InvalidState {
            operation: "send a packet",
            state: "multiplexer gone",
        })
    }

    /// Close the track.
    pub fn close(self) {}
}

/// Receiving halves, consumed by [`Multiplexer::drain`].
#[derive(Debug)]
pub struct TrackChannels {
    receivers: BTreeMap<u8, Receiver<Packet>>,
}

impl Multiplexer {
    /// Create one bounded channel per declared track. Freezes the metadata.
    pub fn channels(&mut self) -> Result<(Vec<TrackProducer>, TrackChannels)> {
        self.ensure_header()?;
        self.expect_state(super::MuxState::HeaderWritten, "open track channels")?;

        let capacity = self.config.queue_capacity.max(1);
        let mut producers = Vec::with_capacity(self.format.tracks.len());
        let mut receivers = BTreeMap::new();
        for track in &self.format.tracks {
            let (tx, rx) = flume::bounded(capacity);
            producers.push(TrackProducer {
                stream: track.index,
                tx,
            });
            receivers.insert(track.index, rx);
        }
        Ok((producers, TrackChannels { receivers }))
    }

    /// Merge packets from every producer until all of them are dropped.
    ///
    /// Strict mode blocks on a track with nothing queued. Live mode waits at
    /// most `live_timeout_ms` for it, then releases the smallest ready packet.
    pub fn drain(&mut self, channels: TrackChannels) -> Result<()> {
        let mut open = channels.receivers;
        let capacity = self.config.queue_capacity.max(1);

        while !open.is_empty() {
            // Take whatever is ready without blocking.
            let mut finished = Vec::new();
            for (&stream, rx) in &open {
                while self.interleaver.queue_len(stream) < capacity {
                    match rx.try_recv() {
                        Ok(packet) => self.push(packet)?,
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            finished.push(stream);
                            break;
                        }
                    }
                }
            }
            for stream in finished {
                open.remove(&stream);
                self.close_track(stream)?;
            }
            self.pump()?;

            let Some(stream) = self.interleaver.waiting_on() else {
                continue;
            };
            let Some(rx) = open.get(&stream) else {
                // No channel feeds this track.
                self.close_track(stream)?;
                continue;
            };

            let received = match self.config.interleave {
                InterleaveMode::Strict => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                InterleaveMode::Live => rx.recv_timeout(self.config.live_timeout()),
            };
            match received {
                Ok(packet) => self.push(packet)?,
                Err(RecvTimeoutError::Disconnected) => {
                    open.remove(&stream);
                    self.close_track(stream)?;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(packet) = self.interleaver.pop_any() {
                        debug!(
                            waiting_on = stream,
                            released = packet.stream,
                            timestamp = packet.timestamp,
                            "Track stalled, releasing out of order"
                        );
                        self.stage(packet)?;
                    }
                }
            }
        }

        self.interleaver.close_all();
        self.pump()?;
        self.flush_batch()
    }
}
