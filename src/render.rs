//! The renderer pipeline.
//!
//! A *classifier* pairs three membership sets (section, layer,
//! articulation) with one performance attribute. Every NMF note walks the
//! whole pipeline in registration order and, for each attribute kind, the
//! last classifier whose three sets all contain the note wins; notes no
//! classifier matches fall back to fixed defaults. The classified notes
//! are then materialised into note-on, note-off and polyphonic aftertouch
//! events in the MIDI assembler.
//!
//! An optional *keyboard process* runs between classification and
//! emission: on each (channel, key) it keeps only the longest of any notes
//! sharing an onset and truncates notes that would overlap their
//! successor, the way a single physical key cannot sound twice at once.

use crate::art::Art;
use crate::error::{LibError, LibResult};
use crate::graph::{GraphId, GraphStore};
use crate::midi::{ChannelMsg, MidiAssembler, CH_MAX, DATA_MAX};
use crate::moment::{self, Part, SUBQUANTA_PER_QUANTUM};
use crate::nmf::{NmfData, NMF_MAX_ART, NMF_MAX_PITCH, NMF_MIN_PITCH};
use crate::ruler::Ruler;
use crate::set::{SetId, SetStore};
use log::debug;

const PIPE_MAX: usize = 16_384;

/// The attribute carried by one classifier.
#[derive(Clone, Copy, Debug)]
pub enum ClassifierValue {
    Art(Art),
    Ruler(Ruler),
    Graph(GraphId),
    Channel(i32),
    /// `-1` means release with a note-on at velocity zero.
    Release(i32),
    Aftertouch(bool),
}

#[derive(Clone, Copy, Debug)]
struct Classifier {
    sect: SetId,
    layer: SetId,
    art: SetId,
    value: ClassifierValue,
}

/// A classified note ready for emission.
#[derive(Clone, Copy, Debug)]
struct NoteEvent {
    /// Insertion-ordered id; negative marks the event deleted.
    eid: i32,
    /// Performance start in subquanta.
    t: i32,
    /// Performance duration in subquanta, greater than zero.
    dur: i32,
    key: u8,
    ch: u8,
    release: i8,
    after: bool,
    graph: GraphId,
}

/// Renderer state for one compilation.
#[derive(Debug)]
pub struct Renderer {
    pipeline: Vec<Classifier>,
    rendered: bool,
    keyboard: bool,
}

impl Default for Renderer {
    fn default() -> Self {
        Renderer {
            pipeline: Vec::new(),
            rendered: false,
            keyboard: true,
        }
    }
}

struct PipeResult {
    art: Art,
    ruler: Ruler,
    graph: GraphId,
    ch: i32,
    release: i32,
    after: bool,
}

impl Renderer {
    pub fn new() -> Renderer {
        Renderer::default()
    }

    /// Enable or disable the keyboard non-overlap process (on by default).
    pub fn set_keyboard(&mut self, enabled: bool) {
        self.keyboard = enabled;
    }

    fn check_open(&self) -> LibResult<()> {
        if self.rendered {
            return Err(LibError::Shutdown { module: "Renderer" });
        }
        Ok(())
    }

    fn push_classifier(&mut self, sect: SetId, layer: SetId, art: SetId, value: ClassifierValue, line: i64) -> LibResult<()> {
        self.check_open()?;
        if self.pipeline.len() >= PIPE_MAX {
            return Err(range_err!(line, "Rendering pipeline capacity exceeded"));
        }
        self.pipeline.push(Classifier {
            sect,
            layer,
            art,
            value,
        });
        Ok(())
    }

    pub fn classify_art(&mut self, sect: SetId, layer: SetId, art: SetId, v: Art, line: i64) -> LibResult<()> {
        self.push_classifier(sect, layer, art, ClassifierValue::Art(v), line)
    }

    pub fn classify_ruler(&mut self, sect: SetId, layer: SetId, art: SetId, v: Ruler, line: i64) -> LibResult<()> {
        self.push_classifier(sect, layer, art, ClassifierValue::Ruler(v), line)
    }

    pub fn classify_graph(&mut self, sect: SetId, layer: SetId, art: SetId, v: GraphId, line: i64) -> LibResult<()> {
        self.push_classifier(sect, layer, art, ClassifierValue::Graph(v), line)
    }

    pub fn classify_channel(&mut self, sect: SetId, layer: SetId, art: SetId, v: i32, line: i64) -> LibResult<()> {
        if v < 1 || v > CH_MAX {
            return Err(range_err!(line, "Invalid MIDI channel value {}", v));
        }
        self.push_classifier(sect, layer, art, ClassifierValue::Channel(v), line)
    }

    pub fn classify_release(&mut self, sect: SetId, layer: SetId, art: SetId, v: i32, line: i64) -> LibResult<()> {
        if v < -1 || v > DATA_MAX {
            return Err(range_err!(line, "Invalid MIDI release velocity {}", v));
        }
        self.push_classifier(sect, layer, art, ClassifierValue::Release(v), line)
    }

    pub fn classify_aftertouch(&mut self, sect: SetId, layer: SetId, art: SetId, v: bool, line: i64) -> LibResult<()> {
        self.push_classifier(sect, layer, art, ClassifierValue::Aftertouch(v), line)
    }

    /// Walk the pipeline once for a note; last matching classifier per
    /// attribute kind wins over the defaults.
    fn run_pipe(&self, sets: &SetStore, graphs: &mut GraphStore, sect: i32, layer1: i32, art_idx: i32) -> LibResult<PipeResult> {
        let mut r = PipeResult {
            art: Art::new(1, 1, 8, 0, -1)?,
            ruler: Ruler::default_ruler(),
            graph: graphs.constant(64, -1)?,
            ch: 1,
            release: -1,
            after: false,
        };
        for c in &self.pipeline {
            if sets.get(c.sect).has(sect) && sets.get(c.layer).has(layer1) && sets.get(c.art).has(art_idx) {
                match c.value {
                    ClassifierValue::Art(v) => r.art = v,
                    ClassifierValue::Ruler(v) => r.ruler = v,
                    ClassifierValue::Graph(v) => r.graph = v,
                    ClassifierValue::Channel(v) => r.ch = v,
                    ClassifierValue::Release(v) => r.release = v,
                    ClassifierValue::Aftertouch(v) => r.after = v,
                }
            }
        }
        Ok(r)
    }

    /// Classify every NMF note and produce its MIDI events. May be called
    /// once; classifier registration is closed afterwards.
    pub fn render_nmf(
        &mut self,
        nmf: &NmfData,
        sets: &SetStore,
        graphs: &mut GraphStore,
        midi: &mut MidiAssembler,
    ) -> LibResult<()> {
        self.check_open()?;
        self.rendered = true;

        let mut events = self.import_notes(nmf, sets, graphs)?;
        if self.keyboard {
            keyboard_process(&mut events);
        }

        for e in &events {
            if e.eid < 0 {
                continue;
            }
            self.emit(e, graphs, midi)?;
        }
        Ok(())
    }

    fn import_notes(&self, nmf: &NmfData, sets: &SetStore, graphs: &mut GraphStore) -> LibResult<Vec<NoteEvent>> {
        let mut events = Vec::new();
        let mut next_eid = 0i32;
        for i in 0..nmf.note_count() {
            let n = *nmf.note(i);

            // cue notes carry no performance data
            if n.dur == 0 {
                continue;
            }
            if n.art > NMF_MAX_ART {
                return Err(internal!());
            }

            let r = self.run_pipe(sets, graphs, n.sect, n.layer + 1, n.art)?;

            if n.t < 0 {
                return Err(internal!());
            }
            let mut t = n
                .t
                .checked_mul(SUBQUANTA_PER_QUANTUM)
                .ok_or(LibError::Overflow { line: -1 })?;

            let dur = if n.dur > 0 {
                r.art.transform(n.dur, -1)?
            } else {
                t = r.ruler.position(t, n.dur, -1)?;
                r.ruler.duration()
            };

            if n.pitch < NMF_MIN_PITCH || n.pitch > NMF_MAX_PITCH {
                return Err(internal!());
            }
            let key = (n.pitch + 60) as u8;

            next_eid += 1;
            events.push(NoteEvent {
                eid: next_eid,
                t,
                dur,
                key,
                ch: r.ch as u8,
                release: r.release as i8,
                after: r.after,
                graph: r.graph,
            });
        }
        debug!("imported {} note events", events.len());
        Ok(events)
    }

    fn emit(&self, e: &NoteEvent, graphs: &GraphStore, midi: &mut MidiAssembler) -> LibResult<()> {
        let t_on = moment::pack(e.t, Part::Middle, -1)?;
        let vel = graphs.query(e.graph, t_on);
        if vel < 1 || vel > DATA_MAX {
            return Err(range_err!(-1, "Note velocity graph out of range"));
        }
        midi.message(t_on, false, i32::from(e.ch), ChannelMsg::NoteOn, i32::from(e.key), vel, -1)?;

        let end_sub = e.t.checked_add(e.dur).ok_or(LibError::Overflow { line: -1 })?;
        let t_off = moment::pack(end_sub, Part::Start, -1)?;
        if t_off <= t_on {
            return Err(internal!());
        }
        if e.release < 0 {
            midi.message(t_off, false, i32::from(e.ch), ChannelMsg::NoteOn, i32::from(e.key), 0, -1)?;
        } else {
            midi.message(
                t_off,
                false,
                i32::from(e.ch),
                ChannelMsg::NoteOff,
                i32::from(e.key),
                i32::from(e.release),
                -1,
            )?;
        }

        // track the velocity graph over the note's interior, one event
        // per change, seeded with the note-on velocity
        if e.after && e.dur >= 2 {
            let from = moment::pack(e.t + 1, Part::Start, -1)?;
            let to = moment::pack(e.t + e.dur - 1, Part::End, -1)?;
            let ch = i32::from(e.ch);
            let key = i32::from(e.key);
            graphs.track(e.graph, from, Some(to), Some(vel), |t, v| {
                if v < 1 || v > DATA_MAX {
                    return Err(range_err!(-1, "Aftertouch graph value out of range"));
                }
                midi.message(t, false, ch, ChannelMsg::PolyAftertouch, key, v, -1)
            })?;
        }
        Ok(())
    }
}

/// Enforce per-(channel, key) exclusivity.
///
/// Events are ordered by channel, key, onset, then longest-first and
/// newest-first. Within a run sharing (channel, key, onset) only the first
/// survivor is kept, and each survivor is truncated so it releases no
/// later than the next onset on the same channel and key.
fn keyboard_process(events: &mut Vec<NoteEvent>) {
    if events.len() < 2 {
        return;
    }
    events.sort_by(|a, b| {
        a.ch.cmp(&b.ch)
            .then(a.key.cmp(&b.key))
            .then(a.t.cmp(&b.t))
            .then(b.dur.cmp(&a.dur))
            .then(b.eid.cmp(&a.eid))
    });

    let mut i = 0;
    while i < events.len() {
        let mut j = i + 1;
        while j < events.len() {
            if events[j].ch != events[i].ch || events[j].key != events[i].key {
                break;
            }
            if events[j].t == events[i].t {
                // a shorter or older duplicate of the same onset
                events[j].eid = -1;
                j += 1;
            } else {
                // later onset on the same key: truncate the current note
                // if it would still be sounding
                let end = i64::from(events[i].t) + i64::from(events[i].dur);
                if end > i64::from(events[j].t) {
                    events[i].dur = events[j].t - events[i].t;
                }
                break;
            }
        }
        i = j;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nmf::{NmfBasis, NmfNote};
    use crate::set::SetStore;

    fn one_section_nmf() -> NmfData {
        let mut nmf = NmfData::new(NmfBasis::Q96);
        nmf.push_section(0).unwrap();
        nmf
    }

    fn all_set(sets: &mut SetStore) -> SetId {
        sets.begin(-1).unwrap();
        sets.all(-1).unwrap();
        sets.end(-1).unwrap()
    }

    fn note(t: i32, dur: i32, pitch: i32) -> NmfNote {
        NmfNote {
            t,
            dur,
            pitch,
            art: 0,
            sect: 0,
            layer: 0,
        }
    }

    fn render_to_bytes(nmf: &NmfData, setup: impl FnOnce(&mut Renderer, &mut SetStore, &mut GraphStore)) -> Vec<u8> {
        let mut sets = SetStore::new();
        let mut graphs = GraphStore::new();
        let mut midi = MidiAssembler::new();
        let mut rend = Renderer::new();
        setup(&mut rend, &mut sets, &mut graphs);
        rend.render_nmf(nmf, &sets, &mut graphs, &mut midi).unwrap();
        let texts = crate::text::TextStore::new();
        let blobs = crate::blob::BlobStore::new();
        let mut out = Vec::new();
        midi.compile(&mut out, &texts, &blobs).unwrap();
        out
    }

    #[test]
    fn default_pipeline_single_note() {
        let mut nmf = one_section_nmf();
        nmf.push_note(note(0, 96, 0)).unwrap();
        let bytes = render_to_bytes(&nmf, |_, _, _| {});
        let body = &bytes[22..];
        // note-on key 60 vel 64 ch 1 at delta 0; release as note-on vel 0
        // after one whole note (768 ticks, VLQ 86 00); end of track
        assert_eq!(
            body,
            &[0x00, 0x90, 60, 64, 0x86, 0x00, 60, 0, 0x00, 0xff, 0x2f, 0x00]
        );
    }

    #[test]
    fn cue_notes_are_skipped() {
        let mut nmf = one_section_nmf();
        nmf.push_note(note(0, 0, 5)).unwrap();
        let bytes = render_to_bytes(&nmf, |_, _, _| {});
        let body = &bytes[22..];
        assert_eq!(body, &[0x00, 0xff, 0x2f, 0x00]);
    }

    #[test]
    fn grace_note_uses_ruler() {
        let mut nmf = one_section_nmf();
        nmf.push_note(note(12, -1, 0)).unwrap();
        let bytes = render_to_bytes(&nmf, |_, _, _| {});
        let body = &bytes[22..];
        // beat at subq 96, grace -1 starts at 48 with duration 48; range
        // is rebased so the note-on lands at delta 0, release 48 later
        assert_eq!(body[0], 0x00);
        assert_eq!(body[1], 0x90);
        assert_eq!(body[2], 60);
        assert_eq!(body[4], 48);
    }

    #[test]
    fn classifier_last_match_wins() {
        let mut nmf = one_section_nmf();
        nmf.push_note(note(0, 96, 0)).unwrap();
        let bytes = render_to_bytes(&nmf, |rend, sets, graphs| {
            let s = all_set(sets);
            let g1 = graphs.constant(40, -1).unwrap();
            let g2 = graphs.constant(100, -1).unwrap();
            rend.classify_graph(s, s, s, g1, -1).unwrap();
            rend.classify_graph(s, s, s, g2, -1).unwrap();
            rend.classify_channel(s, s, s, 3, -1).unwrap();
        });
        let body = &bytes[22..];
        assert_eq!(body[1], 0x92); // channel 3
        assert_eq!(body[3], 100); // later graph classifier won
    }

    #[test]
    fn classifier_sets_filter_notes() {
        let mut nmf = one_section_nmf();
        nmf.push_note(note(0, 96, 0)).unwrap();
        let bytes = render_to_bytes(&nmf, |rend, sets, graphs| {
            let every = all_set(sets);
            // a layer set that does not contain layer 1
            sets.begin(-1).unwrap();
            sets.rclose(2, 2, false, -1).unwrap();
            let layer2 = sets.end(-1).unwrap();
            let g = graphs.constant(99, -1).unwrap();
            rend.classify_graph(every, layer2, every, g, -1).unwrap();
        });
        let body = &bytes[22..];
        assert_eq!(body[3], 64); // classifier did not apply
    }

    #[test]
    fn release_velocity_uses_note_off() {
        let mut nmf = one_section_nmf();
        nmf.push_note(note(0, 96, 0)).unwrap();
        let bytes = render_to_bytes(&nmf, |rend, sets, _| {
            let s = all_set(sets);
            rend.classify_release(s, s, s, 30, -1).unwrap();
        });
        let body = &bytes[22..];
        assert_eq!(body[1], 0x90);
        // note-off is a real 0x80 message carrying velocity 30
        assert_eq!(&body[4..9], &[0x86, 0x00, 0x80, 60, 30]);
    }

    #[test]
    fn aftertouch_tracks_graph_changes() {
        let mut nmf = one_section_nmf();
        nmf.push_note(note(0, 96, 0)).unwrap();
        let bytes = render_to_bytes(&nmf, |rend, sets, graphs| {
            let s = all_set(sets);
            graphs.begin(-1).unwrap();
            graphs
                .add_constant(moment::pack(0, Part::Middle, -1).unwrap(), 64, -1)
                .unwrap();
            graphs
                .add_constant(moment::pack(384, Part::Middle, -1).unwrap(), 80, -1)
                .unwrap();
            let g = graphs.end(-1).unwrap();
            rend.classify_graph(s, s, s, g, -1).unwrap();
            rend.classify_aftertouch(s, s, s, true, -1).unwrap();
        });
        let body = &bytes[22..];
        // note-on, then a poly aftertouch at subq 384 with value 80
        assert_eq!(&body[..4], &[0x00, 0x90, 60, 64]);
        assert_eq!(&body[4..9], &[0x83, 0x00, 0xa0, 60, 80]);
    }

    #[test]
    fn keyboard_dedupes_same_onset() {
        let mut events = vec![
            NoteEvent {
                eid: 1,
                t: 0,
                dur: 10,
                key: 60,
                ch: 1,
                release: -1,
                after: false,
                graph: GraphId(0),
            },
            NoteEvent {
                eid: 2,
                t: 0,
                dur: 20,
                key: 60,
                ch: 1,
                release: -1,
                after: false,
                graph: GraphId(0),
            },
        ];
        keyboard_process(&mut events);
        let alive: Vec<_> = events.iter().filter(|e| e.eid >= 0).collect();
        assert_eq!(alive.len(), 1);
        assert_eq!(alive[0].dur, 20);
        assert_eq!(alive[0].eid, 2);
    }

    #[test]
    fn keyboard_truncates_overlap() {
        let mut events = vec![
            NoteEvent {
                eid: 1,
                t: 0,
                dur: 100,
                key: 60,
                ch: 1,
                release: -1,
                after: false,
                graph: GraphId(0),
            },
            NoteEvent {
                eid: 2,
                t: 40,
                dur: 10,
                key: 60,
                ch: 1,
                release: -1,
                after: false,
                graph: GraphId(0),
            },
        ];
        keyboard_process(&mut events);
        assert_eq!(events[0].dur, 40);
        assert_eq!(events[1].dur, 10);
    }

    #[test]
    fn keyboard_ignores_other_keys_and_channels() {
        let base = NoteEvent {
            eid: 1,
            t: 0,
            dur: 100,
            key: 60,
            ch: 1,
            release: -1,
            after: false,
            graph: GraphId(0),
        };
        let mut events = vec![
            base,
            NoteEvent {
                eid: 2,
                t: 50,
                key: 61,
                ..base
            },
            NoteEvent {
                eid: 3,
                t: 50,
                ch: 2,
                ..base
            },
        ];
        keyboard_process(&mut events);
        assert!(events.iter().all(|e| e.eid >= 0));
        assert!(events.iter().all(|e| e.dur == 100));
    }

    #[test]
    fn velocity_out_of_range_is_fatal() {
        let mut nmf = one_section_nmf();
        nmf.push_note(note(0, 96, 0)).unwrap();
        let mut sets = SetStore::new();
        let mut graphs = GraphStore::new();
        let mut midi = MidiAssembler::new();
        let mut rend = Renderer::new();
        let s = all_set(&mut sets);
        let zero = graphs.constant(0, -1).unwrap();
        rend.classify_graph(s, s, s, zero, -1).unwrap();
        assert!(rend.render_nmf(&nmf, &sets, &mut graphs, &mut midi).is_err());
    }

    #[test]
    fn render_is_single_shot() {
        let nmf = one_section_nmf();
        let sets = SetStore::new();
        let mut graphs = GraphStore::new();
        let mut midi = MidiAssembler::new();
        let mut rend = Renderer::new();
        rend.render_nmf(&nmf, &sets, &mut graphs, &mut midi).unwrap();
        assert!(rend.render_nmf(&nmf, &sets, &mut graphs, &mut midi).is_err());
        let s = SetId(0);
        assert!(rend.classify_channel(s, s, s, 1, -1).is_err());
    }
}
