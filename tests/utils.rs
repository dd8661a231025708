use infrared::nmf::{NmfBasis, NmfData, NmfNote};

pub fn enable_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// An NMF object with one section at quantum zero.
pub fn one_section() -> NmfData {
    let mut nmf = NmfData::new(NmfBasis::Q96);
    nmf.push_section(0).unwrap();
    nmf
}

pub fn note(t: i32, dur: i32, pitch: i32) -> NmfNote {
    NmfNote {
        t,
        dur,
        pitch,
        art: 0,
        sect: 0,
        layer: 0,
    }
}

/// One decoded track event.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackEvent {
    /// Absolute time in ticks from the start of the track.
    pub tick: u32,
    pub status: u8,
    pub data: Vec<u8>,
}

/// A minimal SMF reader for checking compiled output: verifies the chunk
/// framing and decodes the single track, honouring running status.
pub fn parse_smf(bytes: &[u8]) -> Vec<TrackEvent> {
    assert_eq!(&bytes[0..4], b"MThd");
    assert_eq!(&bytes[4..8], &[0, 0, 0, 6]);
    assert_eq!(&bytes[8..10], &[0, 0], "format 0");
    assert_eq!(&bytes[10..12], &[0, 1], "one track");
    assert_eq!(&bytes[12..14], &[0x03, 0x00], "768 ticks per quarter");
    assert_eq!(&bytes[14..18], b"MTrk");
    let len = u32::from_be_bytes([bytes[18], bytes[19], bytes[20], bytes[21]]) as usize;
    let body = &bytes[22..];
    assert_eq!(body.len(), len, "track length field must match the body");

    let mut events = Vec::new();
    let mut pos = 0usize;
    let mut tick = 0u32;
    let mut running: Option<u8> = None;
    while pos < body.len() {
        let (delta, used) = read_vlq(body, pos);
        pos += used;
        tick += delta;

        let status = if body[pos] & 0x80 != 0 {
            let s = body[pos];
            pos += 1;
            s
        } else {
            running.expect("data byte with no running status")
        };

        let data = match status {
            0x80..=0xbf | 0xe0..=0xef => {
                running = Some(status);
                let d = body[pos..pos + 2].to_vec();
                pos += 2;
                d
            }
            0xc0..=0xdf => {
                running = Some(status);
                let d = vec![body[pos]];
                pos += 1;
                d
            }
            0xf0 | 0xf7 => {
                running = None;
                let (len, used) = read_vlq(body, pos);
                pos += used;
                let d = body[pos..pos + len as usize].to_vec();
                pos += len as usize;
                d
            }
            0xff => {
                running = None;
                let ty = body[pos];
                pos += 1;
                let (len, used) = read_vlq(body, pos);
                pos += used;
                let mut d = vec![ty];
                d.extend_from_slice(&body[pos..pos + len as usize]);
                pos += len as usize;
                d
            }
            _ => panic!("bad status byte {:#x}", status),
        };
        events.push(TrackEvent { tick, status, data });
    }

    let last = events.last().expect("track may not be empty");
    assert_eq!(last.status, 0xff);
    assert_eq!(last.data, vec![0x2f], "track must end with End Of Track");
    events
}

fn read_vlq(buf: &[u8], mut pos: usize) -> (u32, usize) {
    let mut value = 0u32;
    let mut used = 0usize;
    loop {
        let b = buf[pos];
        pos += 1;
        used += 1;
        value = (value << 7) | u32::from(b & 0x7f);
        if b & 0x80 == 0 {
            return (value, used);
        }
        assert!(used < 4, "overlong VLQ");
    }
}

/// All note-on / note-off pairs per (channel, key), as (on_tick, off_tick)
/// intervals. A note-on with velocity zero counts as a release.
pub fn note_intervals(events: &[TrackEvent]) -> Vec<((u8, u8), (u32, u32))> {
    let mut open: std::collections::HashMap<(u8, u8), u32> = std::collections::HashMap::new();
    let mut out = Vec::new();
    for e in events {
        let kind = e.status >> 4;
        if kind != 0x8 && kind != 0x9 {
            continue;
        }
        let ch = e.status & 0x0f;
        let key = e.data[0];
        let vel = e.data[1];
        let is_on = kind == 0x9 && vel > 0;
        if is_on {
            let prev = open.insert((ch, key), e.tick);
            assert!(prev.is_none(), "note-on while key {} already down", key);
        } else {
            let on = open
                .remove(&(ch, key))
                .unwrap_or_else(|| panic!("release without note-on for key {}", key));
            out.push(((ch, key), (on, e.tick)));
        }
    }
    assert!(open.is_empty(), "unreleased notes left at end of track");
    out
}
