mod utils;

use infrared::compile_to;
use infrared::nmf::NmfData;
use infrared::Session;
use std::io::Read;
use tempfile::tempdir;
use utils::{enable_logging, note, note_intervals, one_section, parse_smf};

fn compile(script: &str, nmf: NmfData) -> Vec<u8> {
    let mut out = Vec::new();
    compile_to(script, nmf, &mut out).unwrap();
    out
}

#[test]
fn single_default_note() {
    enable_logging();
    let mut nmf = one_section();
    nmf.push_note(note(0, 96, 0)).unwrap();
    let events = parse_smf(&compile("%infrared;", nmf));

    assert_eq!(events.len(), 3);
    assert_eq!(events[0].tick, 0);
    assert_eq!(events[0].status, 0x90);
    assert_eq!(events[0].data, vec![60, 64]);
    // default release is a note-on with velocity zero, one quarter later
    assert_eq!(events[1].tick, 768);
    assert_eq!(events[1].status, 0x90);
    assert_eq!(events[1].data, vec![60, 0]);
    assert_eq!(events[2].data, vec![0x2f]);
}

#[test]
fn script_classifiers_shape_the_performance() {
    enable_logging();
    let mut nmf = one_section();
    nmf.push_note(note(0, 96, 0)).unwrap();
    nmf.push_note(note(96, 96, 2)).unwrap();

    // route everything to channel 5, velocity 100, with an explicit
    // note-off release velocity of 40
    let script = r#"%infrared;
( begin_set all end_set ) @everything
=everything =everything =everything 5 note_channel
=everything =everything =everything 100 gval note_graph
=everything =everything =everything 40 note_release
"#;
    let events = parse_smf(&compile(script, nmf));

    assert_eq!(events[0].status, 0x94);
    assert_eq!(events[0].data, vec![60, 100]);
    assert_eq!(events[1].status, 0x84);
    assert_eq!(events[1].data, vec![60, 40]);
    assert_eq!(events[2].status, 0x94);
    assert_eq!(events[2].data, vec![62, 100]);
    assert_eq!(events[3].status, 0x84);
    assert_eq!(events[3].data, vec![62, 40]);
}

#[test]
fn header_metadata_and_tempo() {
    enable_logging();
    let mut nmf = one_section();
    nmf.push_note(note(0, 96, 0)).unwrap();

    let script = r#"%infrared;
ptr "A Piece" text_title
ptr 4 4 24 time_sig
ptr 2 major_key
120 bpm gval auto_tempo
"#;
    let events = parse_smf(&compile(script, nmf));

    // header events first, in insertion order, all at tick 0
    assert_eq!(events[0].status, 0xff);
    assert_eq!(events[0].data[0], 0x03);
    assert_eq!(&events[0].data[1..], b"A Piece");
    assert_eq!(events[1].data, vec![0x58, 4, 2, 24, 8]);
    assert_eq!(events[2].data, vec![0x59, 2, 0]);
    // the automatic tempo stream lands at the range start
    assert_eq!(events[3].tick, 0);
    assert_eq!(events[3].data, vec![0x51, 0x07, 0xa1, 0x20]);
    assert_eq!(events[4].status, 0x90);
}

#[test]
fn pointer_arithmetic_places_events() {
    enable_logging();
    let mut nmf = one_section();
    nmf.push_note(note(0, 96, 0)).unwrap();

    // a marker one quantum after the start: 8 ticks
    let script = r#"%infrared;
ptr 0s 1q "mark" text_marker
"#;
    let events = parse_smf(&compile(script, nmf));
    let marker = events
        .iter()
        .find(|e| e.status == 0xff && e.data[0] == 0x06)
        .unwrap();
    assert_eq!(marker.tick, 8);
    assert_eq!(&marker.data[1..], b"mark");
}

#[test]
fn arrays_concat_and_slice() {
    enable_logging();
    let mut nmf = one_section();
    nmf.push_note(note(0, 96, 0)).unwrap();

    let script = r#"%infrared;
ptr ["ab", "cd", "ef"] concat 1 5 slice text_title
"#;
    let events = parse_smf(&compile(script, nmf));
    assert_eq!(&events[0].data[1..], b"bcde");
}

#[test]
fn sysex_and_custom_payloads() {
    enable_logging();
    let mut nmf = one_section();
    nmf.push_note(note(0, 96, 0)).unwrap();

    let script = r#"%infrared;
ptr {f0 7e 7f 09 01 f7} sysex
ptr 0s {de ad} custom
"#;
    let events = parse_smf(&compile(script, nmf));
    // header sysex: status F0 with the lead byte stripped from the payload
    assert_eq!(events[0].status, 0xf0);
    assert_eq!(events[0].data, vec![0x7e, 0x7f, 0x09, 0x01, 0xf7]);
    let custom = events
        .iter()
        .find(|e| e.status == 0xff && e.data[0] == 0x7f)
        .unwrap();
    assert_eq!(&custom.data[1..], &[0xde, 0xad]);
}

#[test]
fn program_and_modal_messages() {
    enable_logging();
    let mut nmf = one_section();
    nmf.push_note(note(0, 96, 0)).unwrap();

    let script = r#"%infrared;
ptr 1 9 program
ptr 2 3 20 patch
ptr 0s 1 notes_off
"#;
    let events = parse_smf(&compile(script, nmf));
    // header: program change, then bank select pair and program change
    assert_eq!(events[0].status, 0xc0);
    assert_eq!(events[0].data, vec![8]);
    assert_eq!(events[1].status, 0xb1);
    assert_eq!(events[1].data, vec![0x00, 0]);
    assert_eq!(events[2].data, vec![0x20, 2]);
    assert_eq!(events[3].status, 0xc1);
    assert_eq!(events[3].data, vec![19]);
    let off = events.iter().find(|e| e.status == 0xb0).unwrap();
    assert_eq!(off.data, vec![123, 0]);
}

#[test]
fn overlapping_unison_notes_are_reconciled() {
    enable_logging();
    let mut nmf = one_section();
    // two overlapping middle Cs and one starting at the same quantum
    nmf.push_note(note(0, 96, 0)).unwrap();
    nmf.push_note(note(48, 96, 0)).unwrap();
    nmf.push_note(note(0, 24, 0)).unwrap();
    let events = parse_smf(&compile("%infrared;", nmf));

    let intervals = note_intervals(&events);
    assert_eq!(intervals.len(), 2);
    // the longer note at the shared onset survived and was truncated at
    // the second onset
    assert_eq!(intervals[0].1, (0, 384));
    assert_eq!(intervals[1].1, (384, 1152));
}

#[test]
fn note_events_never_overlap_per_key() {
    enable_logging();
    let mut nmf = one_section();
    for i in 0..24 {
        let pitch = i % 5;
        nmf.push_note(note(i * 7, 40 + (i % 11), pitch)).unwrap();
    }
    let events = parse_smf(&compile("%infrared;", nmf));
    let mut intervals = note_intervals(&events);
    intervals.sort();
    for pair in intervals.windows(2) {
        if pair[0].0 == pair[1].0 {
            assert!(
                pair[0].1 .1 <= pair[1].1 .0,
                "overlap on {:?}: {:?} then {:?}",
                pair[0].0,
                pair[0].1,
                pair[1].1
            );
        }
    }
}

#[test]
fn grace_notes_sit_before_their_beat() {
    enable_logging();
    let mut nmf = one_section();
    nmf.push_note(note(12, 96, 0)).unwrap();
    nmf.push_note(note(12, -1, 4)).unwrap();
    nmf.push_note(note(12, -2, 7)).unwrap();
    let events = parse_smf(&compile("%infrared;", nmf));

    // grace -2 at beat-96 ticks, grace -1 at beat-48; the beat note last
    let ons: Vec<(u32, u8)> = events
        .iter()
        .filter(|e| e.status == 0x90 && e.data[1] > 0)
        .map(|e| (e.tick, e.data[0]))
        .collect();
    assert_eq!(ons, vec![(0, 67), (48, 64), (96, 60)]);
}

#[test]
fn aftertouch_follows_the_velocity_graph() {
    enable_logging();
    let mut nmf = one_section();
    nmf.push_note(note(0, 96, 0)).unwrap();

    let script = r#"%infrared;
( begin_set all end_set ) @everything
ptr ?p
begin_graph
  =p 0s 0q 64 graph_const
  =p 0s 24q 64 96 8 graph_ramp
  =p 0s 72q 96 graph_const
end_graph ?vel
=everything =everything =everything =vel note_graph
=everything =everything =everything aftertouch_enable
"#;
    let events = parse_smf(&compile(script, nmf));

    let on = &events[0];
    assert_eq!(on.status, 0x90);
    assert_eq!(on.data, vec![60, 64]);
    // poly aftertouch messages appear inside the note as the ramp climbs
    let touches: Vec<&utils::TrackEvent> = events.iter().filter(|e| e.status == 0xa0).collect();
    assert!(!touches.is_empty());
    let mut prev = 64;
    for t in &touches {
        assert_eq!(t.data[0], 60);
        assert!(t.data[1] >= prev);
        prev = t.data[1];
    }
    assert_eq!(prev, 96);
}

#[test]
fn section_map_file() {
    enable_logging();
    let mut nmf = one_section();
    nmf.push_section(96).unwrap();
    nmf.push_section(96).unwrap();
    nmf.push_note(note(0, 96, 0)).unwrap();

    let mut session = Session::new(nmf).unwrap();
    session.run_script("%infrared;").unwrap();
    session.render().unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("sections.map");
    let mut fh = std::fs::File::create(&path).unwrap();
    session.write_map(&mut fh).unwrap();
    drop(fh);

    let mut text = String::new();
    std::fs::File::open(&path)
        .unwrap()
        .read_to_string(&mut text)
        .unwrap();
    assert_eq!(text, "0:0\n1:768\n2:768\n");
}

#[test]
fn fatal_errors_surface() {
    enable_logging();
    let mut nmf = one_section();
    nmf.push_note(note(0, 96, 0)).unwrap();
    let mut out = Vec::new();

    // unknown operation
    assert!(compile_to("%infrared; nonsense", clone_nmf(&nmf), &mut out).is_err());
    // leftover stack value at end of script
    assert!(compile_to("%infrared; 7", clone_nmf(&nmf), &mut out).is_err());
    // group that does not produce a value
    assert!(compile_to("%infrared; ( )", clone_nmf(&nmf), &mut out).is_err());
    // type mismatch
    assert!(compile_to("%infrared; 1 2 concat", clone_nmf(&nmf), &mut out).is_err());
    // stop is fatal
    assert!(compile_to("%infrared; stop", clone_nmf(&nmf), &mut out).is_err());
}

fn clone_nmf(nmf: &NmfData) -> NmfData {
    nmf.clone()
}
