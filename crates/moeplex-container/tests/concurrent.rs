//! Producer threads feeding the multiplexer, and readers sharing one index.

mod common;

use common::{subtitle_track, track_packets, video_track};
use moeplex_container::{
    CompressionMode, Demultiplexer, FormatData, InterleaveMode, Multiplexer, MuxConfig, Packet,
};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use std::thread;

fn format() -> FormatData {
    FormatData::new("moeplex", "threads")
        .with_track(video_track(0, CompressionMode::Zstd))
        .with_track(video_track(1, CompressionMode::Lz4))
        .with_track(subtitle_track(2, CompressionMode::None))
}

fn mux_threaded(config: MuxConfig, tracks: &[Vec<Packet>]) -> Vec<u8> {
    let mut mux = Multiplexer::from_format(format(), config).unwrap();
    let (producers, channels) = mux.channels().unwrap();

    thread::scope(|s| {
        for producer in producers {
            let packets = tracks
                .iter()
                .find(|t| t.first().map(|p| p.stream) == Some(producer.stream()))
                .cloned()
                .unwrap_or_default();
            s.spawn(move || {
                for packet in packets {
                    producer.send(packet).unwrap();
                }
            });
        }
        mux.drain(channels).unwrap();
    });

    let mut out = Vec::new();
    mux.finalize(&mut out).unwrap();
    out
}

fn by_track(packets: Vec<Packet>) -> BTreeMap<u8, Vec<Packet>> {
    let mut map: BTreeMap<u8, Vec<Packet>> = BTreeMap::new();
    for packet in packets {
        map.entry(packet.stream).or_default().push(packet);
    }
    map
}

fn read_all(bytes: &[u8]) -> Vec<Packet> {
    let mut demux = Demultiplexer::open_default(Cursor::new(bytes)).unwrap();
    demux.packets().collect::<Result<_, _>>().unwrap()
}

#[test]
fn test_strict_threads_preserve_global_order() {
    let tracks = vec![
        track_packets(0, 150, 500),
        track_packets(1, 150, 501),
        track_packets(2, 30, 502),
    ];
    let config = MuxConfig::default().queue_capacity(3).batch_size(8);
    let packets = read_all(&mux_threaded(config, &tracks));

    for pair in packets.windows(2) {
        assert!((pair[0].timestamp, pair[0].stream) <= (pair[1].timestamp, pair[1].stream));
    }
    let map = by_track(packets);
    for track in &tracks {
        assert_eq!(&map[&track[0].stream], track);
    }
}

#[test]
fn test_live_threads_preserve_track_order() {
    let tracks = vec![track_packets(0, 100, 510), track_packets(1, 100, 511)];
    let config = MuxConfig::default()
        .interleave(InterleaveMode::Live)
        .queue_capacity(2);
    let map = by_track(read_all(&mux_threaded(config, &tracks)));

    assert_eq!(map[&0], tracks[0]);
    assert_eq!(map[&1], tracks[1]);
    assert!(!map.contains_key(&2));
}

#[test]
fn test_readers_share_index_across_threads() {
    let tracks = vec![
        track_packets(0, 80, 520),
        track_packets(1, 80, 521),
        track_packets(2, 20, 522),
    ];
    let bytes = common::build_container(format(), MuxConfig::default(), &tracks);
    let primary = Demultiplexer::open_default(Cursor::new(bytes.as_slice())).unwrap();

    let readers: Vec<_> = (0..3u8)
        .map(|_| primary.reader(Cursor::new(bytes.as_slice())).unwrap())
        .collect();
    for reader in &readers {
        assert!(Arc::ptr_eq(reader.index(), primary.index()));
    }

    thread::scope(|s| {
        for (stream, mut reader) in (0u8..).zip(readers) {
            let track = &tracks[stream as usize];
            s.spawn(move || {
                let mid = track[track.len() / 2].timestamp;
                assert_eq!(reader.seek(stream, mid).unwrap(), Some(mid));
                let rest: Vec<Packet> = reader
                    .packets()
                    .map(Result::unwrap)
                    .filter(|p| p.stream == stream)
                    .collect();
                let first = track.iter().position(|p| p.timestamp >= mid).unwrap();
                assert_eq!(rest, track[first..]);
            });
        }
    });
}
