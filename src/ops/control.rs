//! Event posting and controller operations.
//!
//! These all take a pointer argument deepest on the stack; a header
//! pointer routes the event to the MIDI track header, anything else to
//! the resolved moment.

use crate::control::CtlKind;
use crate::error::LibResult;
use crate::midi::{ChannelMsg, TextClass, CH_MAX};
use crate::session::Session;

fn op_null_event(s: &mut Session, line: i64) -> LibResult<()> {
    let pid = s.interp.pop_pointer(line)?;
    let (t, head) = s.event_time(pid, line)?;
    s.midi.null_event(t, head)
}

fn text_op(s: &mut Session, line: i64, class: TextClass) -> LibResult<()> {
    let text = s.interp.pop_text(line)?;
    let pid = s.interp.pop_pointer(line)?;
    let (t, head) = s.event_time(pid, line)?;
    s.midi.text(t, head, class, text)
}

fn op_text(s: &mut Session, line: i64) -> LibResult<()> {
    text_op(s, line, TextClass::General)
}

fn op_text_copyright(s: &mut Session, line: i64) -> LibResult<()> {
    text_op(s, line, TextClass::Copyright)
}

fn op_text_title(s: &mut Session, line: i64) -> LibResult<()> {
    text_op(s, line, TextClass::Title)
}

fn op_text_instrument(s: &mut Session, line: i64) -> LibResult<()> {
    text_op(s, line, TextClass::Instrument)
}

fn op_text_lyric(s: &mut Session, line: i64) -> LibResult<()> {
    text_op(s, line, TextClass::Lyric)
}

fn op_text_marker(s: &mut Session, line: i64) -> LibResult<()> {
    text_op(s, line, TextClass::Marker)
}

fn op_text_cue(s: &mut Session, line: i64) -> LibResult<()> {
    text_op(s, line, TextClass::Cue)
}

fn op_time_sig(s: &mut Session, line: i64) -> LibResult<()> {
    let metro = s.interp.pop_int(line)?;
    let denom = s.interp.pop_int(line)?;
    let num = s.interp.pop_int(line)?;
    let pid = s.interp.pop_pointer(line)?;
    let (t, head) = s.event_time(pid, line)?;
    s.midi.time_sig(t, head, num, denom, metro, line)
}

fn key_op(s: &mut Session, line: i64, minor: bool) -> LibResult<()> {
    let count = s.interp.pop_int(line)?;
    let pid = s.interp.pop_pointer(line)?;
    let (t, head) = s.event_time(pid, line)?;
    s.midi.key_sig(t, head, count, minor, line)
}

fn op_major_key(s: &mut Session, line: i64) -> LibResult<()> {
    key_op(s, line, false)
}

fn op_minor_key(s: &mut Session, line: i64) -> LibResult<()> {
    key_op(s, line, true)
}

fn op_custom(s: &mut Session, line: i64) -> LibResult<()> {
    let blob = s.interp.pop_blob(line)?;
    let pid = s.interp.pop_pointer(line)?;
    let (t, head) = s.event_time(pid, line)?;
    s.midi.custom(t, head, blob)
}

fn op_sysex(s: &mut Session, line: i64) -> LibResult<()> {
    let blob = s.interp.pop_blob(line)?;
    let pid = s.interp.pop_pointer(line)?;
    let (t, head) = s.event_time(pid, line)?;
    s.midi.system(t, head, blob, &s.blobs)
}

fn instrument(s: &mut Session, line: i64, bank: Option<i32>, program: i32, ch: i32, t: i32, head: bool) -> LibResult<()> {
    if !(1..=128).contains(&program) {
        return Err(range_err!(line, "MIDI program {} out of range", program));
    }
    if let Some(bank) = bank {
        if !(1..=16_384).contains(&bank) {
            return Err(range_err!(line, "MIDI bank {} out of range", bank));
        }
        let b = bank - 1;
        s.midi
            .message(t, head, ch, ChannelMsg::Control, 0x00, (b >> 7) & 0x7f, line)?;
        s.midi
            .message(t, head, ch, ChannelMsg::Control, 0x20, b & 0x7f, line)?;
    }
    s.midi
        .message(t, head, ch, ChannelMsg::Program, 0, program - 1, line)
}

fn op_program(s: &mut Session, line: i64) -> LibResult<()> {
    let program = s.interp.pop_int(line)?;
    let ch = s.interp.pop_int(line)?;
    let pid = s.interp.pop_pointer(line)?;
    let (t, head) = s.event_time(pid, line)?;
    instrument(s, line, None, program, ch, t, head)
}

fn op_patch(s: &mut Session, line: i64) -> LibResult<()> {
    let program = s.interp.pop_int(line)?;
    let bank = s.interp.pop_int(line)?;
    let ch = s.interp.pop_int(line)?;
    let pid = s.interp.pop_pointer(line)?;
    let (t, head) = s.event_time(pid, line)?;
    instrument(s, line, Some(bank), program, ch, t, head)
}

/// Channel mode messages are control changes on indices 120..=127.
fn modal(s: &mut Session, line: i64, index: i32, value: i32) -> LibResult<()> {
    let ch = s.interp.pop_int(line)?;
    let pid = s.interp.pop_pointer(line)?;
    let (t, head) = s.event_time(pid, line)?;
    s.midi
        .message(t, head, ch, ChannelMsg::Control, index, value, line)
}

fn op_sound_off(s: &mut Session, line: i64) -> LibResult<()> {
    modal(s, line, 120, 0)
}

fn op_midi_reset(s: &mut Session, line: i64) -> LibResult<()> {
    modal(s, line, 121, 0)
}

fn op_local_off(s: &mut Session, line: i64) -> LibResult<()> {
    modal(s, line, 122, 0)
}

fn op_local_on(s: &mut Session, line: i64) -> LibResult<()> {
    modal(s, line, 122, 127)
}

fn op_notes_off(s: &mut Session, line: i64) -> LibResult<()> {
    modal(s, line, 123, 0)
}

fn op_omni_off(s: &mut Session, line: i64) -> LibResult<()> {
    modal(s, line, 124, 0)
}

fn op_omni_on(s: &mut Session, line: i64) -> LibResult<()> {
    modal(s, line, 125, 0)
}

fn op_mono(s: &mut Session, line: i64) -> LibResult<()> {
    let count = s.interp.pop_int(line)?;
    if count < 0 || count > CH_MAX {
        return Err(range_err!(line, "MIDI mono channel count out of range"));
    }
    modal(s, line, 126, count)
}

fn op_poly(s: &mut Session, line: i64) -> LibResult<()> {
    modal(s, line, 127, 0)
}

fn op_auto_tempo(s: &mut Session, line: i64) -> LibResult<()> {
    let g = s.interp.pop_graph(line)?;
    s.control.register(CtlKind::Tempo, 0, 0, g, line)
}

fn auto_indexed(s: &mut Session, line: i64, kind: CtlKind) -> LibResult<()> {
    let g = s.interp.pop_graph(line)?;
    let idx = s.interp.pop_int(line)?;
    let ch = s.interp.pop_int(line)?;
    s.control.register(kind, ch, idx, g, line)
}

fn op_auto_7bit(s: &mut Session, line: i64) -> LibResult<()> {
    auto_indexed(s, line, CtlKind::Bit7)
}

fn op_auto_14bit(s: &mut Session, line: i64) -> LibResult<()> {
    auto_indexed(s, line, CtlKind::Bit14)
}

fn op_auto_nonreg(s: &mut Session, line: i64) -> LibResult<()> {
    auto_indexed(s, line, CtlKind::NonReg)
}

fn op_auto_reg(s: &mut Session, line: i64) -> LibResult<()> {
    auto_indexed(s, line, CtlKind::Reg)
}

fn auto_channel(s: &mut Session, line: i64, kind: CtlKind) -> LibResult<()> {
    let g = s.interp.pop_graph(line)?;
    let ch = s.interp.pop_int(line)?;
    s.control.register(kind, ch, 0, g, line)
}

fn op_auto_pressure(s: &mut Session, line: i64) -> LibResult<()> {
    auto_channel(s, line, CtlKind::Pressure)
}

fn op_auto_pitch(s: &mut Session, line: i64) -> LibResult<()> {
    auto_channel(s, line, CtlKind::PitchBend)
}

pub(crate) fn register(s: &mut Session) -> LibResult<()> {
    s.register_op("null_event", op_null_event)?;

    s.register_op("text", op_text)?;
    s.register_op("text_copyright", op_text_copyright)?;
    s.register_op("text_title", op_text_title)?;
    s.register_op("text_instrument", op_text_instrument)?;
    s.register_op("text_lyric", op_text_lyric)?;
    s.register_op("text_marker", op_text_marker)?;
    s.register_op("text_cue", op_text_cue)?;

    s.register_op("time_sig", op_time_sig)?;
    s.register_op("major_key", op_major_key)?;
    s.register_op("minor_key", op_minor_key)?;

    s.register_op("custom", op_custom)?;
    s.register_op("sysex", op_sysex)?;
    s.register_op("program", op_program)?;
    s.register_op("patch", op_patch)?;

    s.register_op("sound_off", op_sound_off)?;
    s.register_op("midi_reset", op_midi_reset)?;
    s.register_op("local_off", op_local_off)?;
    s.register_op("local_on", op_local_on)?;
    s.register_op("notes_off", op_notes_off)?;
    s.register_op("omni_off", op_omni_off)?;
    s.register_op("omni_on", op_omni_on)?;
    s.register_op("mono", op_mono)?;
    s.register_op("poly", op_poly)?;

    s.register_op("auto_tempo", op_auto_tempo)?;
    s.register_op("auto_7bit", op_auto_7bit)?;
    s.register_op("auto_14bit", op_auto_14bit)?;
    s.register_op("auto_nonreg", op_auto_nonreg)?;
    s.register_op("auto_reg", op_auto_reg)?;
    s.register_op("auto_pressure", op_auto_pressure)?;
    s.register_op("auto_pitch", op_auto_pitch)?;
    Ok(())
}
