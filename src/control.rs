//! Automatic controller tracking.
//!
//! Scripts can map a graph onto a controller target: tempo, a 7-bit or
//! 14-bit control change, a non-registered or registered parameter, channel
//! pressure or pitch bend. At most one graph is mapped per (target,
//! channel, index); later registrations overwrite. After every note has
//! been rendered and the event range is final, [`ControlMap::track`] walks
//! each mapped graph over the whole range and emits the corresponding
//! physical messages for every change in value.

use crate::error::LibResult;
use crate::graph::{GraphId, GraphStore};
use crate::midi::{ChannelMsg, MidiAssembler, CH_MAX, DATA_MAX, TEMPO_MAX, TEMPO_MIN, WIDE_MAX};
use crate::moment::{self, Part};
use std::collections::BTreeMap;

/// The controller targets a graph can be mapped onto.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum CtlKind {
    Tempo,
    Bit7,
    Bit14,
    NonReg,
    Reg,
    Pressure,
    PitchBend,
}

/// Controller mapping state for one compilation.
#[derive(Debug, Default)]
pub struct ControlMap {
    map: BTreeMap<(CtlKind, i32, i32), GraphId>,
}

/// Data-entry controller index, excluded from the 14-bit coarse range.
const INDEX_DATA: i32 = 0x06;

fn check_index(kind: CtlKind, idx: i32, line: i64) -> LibResult<()> {
    let ok = match kind {
        CtlKind::Bit7 => (0x40..=0x5f).contains(&idx) || (0x66..=0x77).contains(&idx),
        CtlKind::Bit14 => (0x01..=0x1f).contains(&idx) && idx != INDEX_DATA,
        CtlKind::NonReg | CtlKind::Reg => (0..=WIDE_MAX).contains(&idx),
        CtlKind::Tempo | CtlKind::Pressure | CtlKind::PitchBend => true,
    };
    if !ok {
        return Err(range_err!(line, "MIDI controller index {} out of range", idx));
    }
    Ok(())
}

impl ControlMap {
    pub fn new() -> ControlMap {
        ControlMap::default()
    }

    /// Map a graph onto a controller target. Channel and index are
    /// ignored where the target does not use them.
    pub fn register(&mut self, kind: CtlKind, ch: i32, idx: i32, graph: GraphId, line: i64) -> LibResult<()> {
        if kind != CtlKind::Tempo && (ch < 1 || ch > CH_MAX) {
            return Err(range_err!(line, "MIDI channel {} out of range", ch));
        }
        check_index(kind, idx, line)?;

        let ch = if kind == CtlKind::Tempo { 0 } else { ch };
        let idx = match kind {
            CtlKind::Bit7 | CtlKind::Bit14 | CtlKind::NonReg | CtlKind::Reg => idx,
            _ => 0,
        };
        self.map.insert((kind, ch, idx), graph);
        Ok(())
    }

    /// Emit controller messages for every mapped graph across the final
    /// event range. Call once, after rendering and before compilation.
    pub fn track(&self, graphs: &GraphStore, midi: &mut MidiAssembler) -> LibResult<()> {
        let start = moment::pack(midi.range_lower(), Part::Start, -1)?;
        let end = moment::pack(midi.range_upper(), Part::End, -1)?;
        for (&(kind, ch, idx), &graph) in &self.map {
            graphs.track(graph, start, Some(end), None, |t, v| {
                emit(kind, ch, idx, t, v, midi)
            })?;
        }
        Ok(())
    }
}

fn emit(kind: CtlKind, ch: i32, idx: i32, t: i32, v: i32, midi: &mut MidiAssembler) -> LibResult<()> {
    match kind {
        CtlKind::Tempo => {
            if v < TEMPO_MIN || v > TEMPO_MAX {
                return Err(range_err!(-1, "Tempo graph value out of range"));
            }
            midi.tempo(t, false, v, -1)
        }
        CtlKind::Bit7 => {
            if v < 0 || v > DATA_MAX {
                return Err(range_err!(-1, "7-bit controller graph value out of range"));
            }
            midi.message(t, false, ch, ChannelMsg::Control, idx, v, -1)
        }
        CtlKind::Bit14 => {
            if v < 0 || v > WIDE_MAX {
                return Err(range_err!(-1, "14-bit controller graph value out of range"));
            }
            let msb = (v >> 7) & 0x7f;
            let lsb = v & 0x7f;
            midi.message(t, false, ch, ChannelMsg::Control, idx, msb, -1)?;
            midi.message(t, false, ch, ChannelMsg::Control, idx + 0x20, lsb, -1)
        }
        CtlKind::NonReg | CtlKind::Reg => {
            if v < 0 || v > WIDE_MAX {
                return Err(range_err!(-1, "Parameter controller graph value out of range"));
            }
            let msb = (v >> 7) & 0x7f;
            let lsb = v & 0x7f;
            let idx_msb = (idx >> 7) & 0x7f;
            let idx_lsb = idx & 0x7f;
            let (sel_lsb, sel_msb) = if kind == CtlKind::NonReg {
                (0x62, 0x63)
            } else {
                (0x64, 0x65)
            };
            midi.message(t, false, ch, ChannelMsg::Control, sel_lsb, idx_lsb, -1)?;
            midi.message(t, false, ch, ChannelMsg::Control, sel_msb, idx_msb, -1)?;
            midi.message(t, false, ch, ChannelMsg::Control, INDEX_DATA, msb, -1)?;
            midi.message(t, false, ch, ChannelMsg::Control, 0x26, lsb, -1)
        }
        CtlKind::Pressure => {
            if v < 0 || v > DATA_MAX {
                return Err(range_err!(-1, "Channel pressure graph value out of range"));
            }
            midi.message(t, false, ch, ChannelMsg::ChannelAftertouch, 0, v, -1)
        }
        CtlKind::PitchBend => {
            if v < 0 || v > WIDE_MAX {
                return Err(range_err!(-1, "Pitch bend graph value out of range"));
            }
            midi.message(t, false, ch, ChannelMsg::PitchBend, 0, v, -1)
        }
    }
}
