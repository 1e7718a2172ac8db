//! Random access through seek tables, and the scan fallback when a table is unusable.

mod common;

use common::{build_container, seek_table_span, subtitle_track, track_packets, video_track};
use moeplex_container::{CompressionMode, Demultiplexer, Error, FormatData, MuxConfig, Packet, TrackIndex};
use std::io::Cursor;

fn fixture() -> (Vec<Vec<Packet>>, Vec<u8>) {
    let format = FormatData::new("moeplex", "seek")
        .with_track(video_track(0, CompressionMode::Zstd))
        .with_track(video_track(1, CompressionMode::None))
        .with_track(subtitle_track(2, CompressionMode::Lz4));
    let tracks = vec![
        track_packets(0, 200, 100),
        track_packets(1, 150, 101),
        track_packets(2, 40, 102),
    ];
    let bytes = build_container(format, MuxConfig::default(), &tracks);
    (tracks, bytes)
}

/// First packet of the track at or after `target`.
fn expected(track: &[Packet], target: u64) -> Option<&Packet> {
    track.iter().find(|p| p.timestamp >= target)
}

fn targets(track: &[Packet]) -> Vec<u64> {
    let last = track.last().map_or(0, |p| p.timestamp);
    let mut targets: Vec<u64> = track.iter().step_by(7).map(|p| p.timestamp).collect();
    targets.extend([0, 1, last / 3, last / 2 + 1, last, last + 1, u64::MAX]);
    targets
}

fn check_seeks(demux: &mut Demultiplexer<Cursor<&[u8]>>, tracks: &[Vec<Packet>]) {
    for track in tracks {
        let stream = track[0].stream;
        for target in targets(track) {
            let want = expected(track, target);
            let found = demux.seek(stream, target).unwrap();
            assert_eq!(found, want.map(|p| p.timestamp), "stream {stream} target {target}");

            match want {
                Some(want) => {
                    let packet = demux.next_packet().unwrap().unwrap();
                    assert_eq!(&packet, want);
                }
                None => assert!(demux.next_packet().unwrap().is_none()),
            }
        }
    }
}

#[test]
fn test_seek_lands_on_first_packet_at_or_after_target() {
    let (tracks, bytes) = fixture();
    let mut demux = Demultiplexer::open_default(Cursor::new(bytes.as_slice())).unwrap();
    for stream in 0..3 {
        let table = demux.index().track_index(stream).unwrap().table().unwrap();
        assert!(table.len() > 1, "stream {stream} has {} entries", table.len());
    }
    check_seeks(&mut demux, &tracks);
}

#[test]
fn test_reading_continues_after_seek() {
    let (tracks, bytes) = fixture();
    let mut demux = Demultiplexer::open_default(Cursor::new(bytes.as_slice())).unwrap();

    let target = tracks[0][120].timestamp;
    demux.seek(0, target).unwrap();
    let rest: Vec<Packet> = demux
        .packets()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
        .into_iter()
        .filter(|p| p.stream == 0)
        .collect();
    let first = tracks[0].iter().position(|p| p.timestamp >= target).unwrap();
    assert_eq!(rest, tracks[0][first..]);
}

#[test]
fn test_seek_unknown_stream() {
    let (_, bytes) = fixture();
    let mut demux = Demultiplexer::open_default(Cursor::new(bytes.as_slice())).unwrap();
    assert!(matches!(demux.seek(9, 0), Err(Error::NoSuchTrack(9))));
}

#[test]
fn test_corrupt_seek_table_falls_back_to_scan() {
    let (tracks, mut bytes) = fixture();
    let span = seek_table_span(&bytes, 0).unwrap();
    // A maximal first timestamp breaks monotonicity.
    bytes[span.start..span.start + 8].fill(0xFF);

    let mut demux = Demultiplexer::open_default(Cursor::new(bytes.as_slice())).unwrap();
    assert!(matches!(
        demux.index().track_index(0),
        Some(TrackIndex::SequentialOnly { .. })
    ));
    assert!(demux.index().seek_tables().is_indexed(1));
    assert_eq!(demux.index().sequential_only().collect::<Vec<_>>(), vec![0]);

    check_seeks(&mut demux, &tracks);
}

#[test]
fn test_misaligned_seek_table_degrades_only_its_track() {
    let (tracks, mut bytes) = fixture();
    let span = seek_table_span(&bytes, 2).unwrap();
    // Shrink the declared length by one and drop the byte it no longer covers.
    let len_at = span.start - 8;
    let len = (span.end - span.start) as u64 - 1;
    bytes[len_at..span.start].copy_from_slice(&len.to_le_bytes());
    bytes.remove(span.end - 1);

    let mut demux = Demultiplexer::open_default(Cursor::new(bytes.as_slice())).unwrap();
    assert!(!demux.index().seek_tables().is_indexed(2));
    assert!(demux.index().seek_tables().is_indexed(0));

    let packets: Vec<Packet> = demux.packets().collect::<Result<_, _>>().unwrap();
    assert_eq!(packets.len(), tracks.iter().map(Vec::len).sum::<usize>());
    check_seeks(&mut demux, &tracks);
}

#[test]
fn test_seek_with_repeated_timestamps_lands_on_first() {
    let format = FormatData::new("moeplex", "seek").with_track(video_track(0, CompressionMode::None));
    let tracks = vec![vec![
        Packet::new(0, 0, b"zero".to_vec()),
        Packet::new(0, 100, b"A".to_vec()),
        Packet::new(0, 100, b"B".to_vec()),
    ]];
    let bytes = build_container(format, MuxConfig::default().seek_interval_us(0), &tracks);

    let mut demux = Demultiplexer::open_default(Cursor::new(bytes.as_slice())).unwrap();
    let table = demux.index().track_index(0).unwrap().table().unwrap();
    assert_eq!(table.len(), 2);

    assert_eq!(demux.seek(0, 100).unwrap(), Some(100));
    assert_eq!(demux.next_packet().unwrap().unwrap().payload, b"A".to_vec());
    assert_eq!(demux.next_packet().unwrap().unwrap().payload, b"B".to_vec());
    check_seeks(&mut demux, &tracks);
}
