//! The MIDI assembler.
//!
//! Every logical MIDI message is encoded once into a byte arena and then
//! referred to by a *selector*: a packed `u32` whose high 8 bits are the
//! status byte and whose low 24 bits are the arena offset of the payload.
//! The arena layout depends on the status byte:
//!
//! * `0x80..=0xBF`, `0xE0..=0xEF` — two data bytes.
//! * `0xC0..=0xDF` — one data byte.
//! * `0xF0` — a VLQ handle of a blob whose first byte is `0xF0` (the lead
//!   byte is implied by the status and not repeated in the payload).
//! * `0xF7` — a VLQ handle of an arbitrary blob.
//! * `0xFF` — one byte holding the meta type code, with the high bit set
//!   when a VLQ *handle* follows (text or blob) and clear when a VLQ
//!   payload *length* plus direct payload bytes follow.
//!
//! Events either go to the header list (emitted at delta 0 in insertion
//! order at the start of the track) or to the moment list, which is sorted
//! at compile time by moment, then status class (note-offs before
//! note-ons), then status byte, then insertion order. Compilation turns
//! moments into delta times relative to the lower bound of the event
//! range, sizes the whole track with running-status optimisation, and
//! writes a Format-0 SMF.

use crate::blob::BlobStore;
use crate::error::{LibError, LibResult};
use crate::moment::{self, Part, TICKS_PER_QUARTER};
use crate::scribe::{status_size, Scribe};
use crate::text::TextStore;
use crate::vlq;
use crate::{blob::BlobId, text::TextId};
use log::{debug, trace};
use snafu::ResultExt;
use std::io::Write;

/// Greatest MIDI channel number (one-indexed).
pub const CH_MAX: i32 = 16;

/// Greatest 7-bit data value.
pub const DATA_MAX: i32 = 127;

/// Greatest 14-bit data value.
pub const WIDE_MAX: i32 = 0x3fff;

/// Tempo bounds in microseconds per quarter note (24-bit field).
pub const TEMPO_MIN: i32 = 1;
pub const TEMPO_MAX: i32 = 16_777_215;

/// Time signature field bounds.
pub const TIME_NUM_MAX: i32 = 255;
pub const TIME_DENOM_MAX: i32 = 1024;
pub const TIME_METRO_MAX: i32 = 255;

/// Key signature accidental count bounds.
pub const KEY_COUNT_MIN: i32 = -7;
pub const KEY_COUNT_MAX: i32 = 7;

const HANDLE_MAX: usize = 16_384;
const ARENA_MAX: usize = 16_777_215;
const HEADER_MAX: usize = 16_384;
const MOMENT_MAX: usize = 8_388_608;

/// The seven MIDI channel message kinds, by high status nibble.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChannelMsg {
    NoteOff = 0x8,
    NoteOn = 0x9,
    PolyAftertouch = 0xa,
    Control = 0xb,
    Program = 0xc,
    ChannelAftertouch = 0xd,
    PitchBend = 0xe,
}

/// The seven text meta-event classes, by meta type code.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TextClass {
    General = 1,
    Copyright = 2,
    Title = 3,
    Instrument = 4,
    Lyric = 5,
    Marker = 6,
    Cue = 7,
}

#[derive(Clone, Copy, Debug)]
enum Handle {
    Text(TextId),
    Blob(BlobId),
}

#[derive(Clone, Copy, Debug)]
struct MomentEvent {
    eid: i32,
    t: i32,
    sel: u32,
}

/// Assembler state for one compilation.
#[derive(Debug, Default)]
pub struct MidiAssembler {
    compiled: bool,
    handles: Vec<Handle>,
    arena: Vec<u8>,
    header: Vec<u32>,
    moments: Vec<MomentEvent>,
    next_eid: i32,
    /// Lower and upper bound of all posted events, in subquanta.
    range: Option<(i32, i32)>,
}

impl MidiAssembler {
    pub fn new() -> MidiAssembler {
        MidiAssembler::default()
    }

    fn check_open(&self) -> LibResult<()> {
        if self.compiled {
            return Err(LibError::Shutdown {
                module: "MIDI assembler",
            });
        }
        Ok(())
    }

    fn event_id(&mut self) -> LibResult<i32> {
        if self.next_eid == i32::MAX {
            return Err(LibError::Overflow { line: -1 });
        }
        self.next_eid += 1;
        Ok(self.next_eid)
    }

    /// Extend the event range to cover a moment, including for null events
    /// that produce no message.
    fn touch_range(&mut self, t_moment: i32) {
        let sub = moment::subquantum(t_moment);
        self.range = Some(match self.range {
            None => (sub, sub),
            Some((lo, hi)) => (lo.min(sub), hi.max(sub)),
        });
    }

    /// Lower bound of the event range in subquanta (zero when no events).
    pub fn range_lower(&self) -> i32 {
        self.range.map(|r| r.0).unwrap_or(0)
    }

    /// Upper bound of the event range in subquanta (zero when no events).
    pub fn range_upper(&self) -> i32 {
        self.range.map(|r| r.1).unwrap_or(0)
    }

    fn add_handle(&mut self, h: Handle) -> LibResult<i32> {
        if self.handles.len() >= HANDLE_MAX {
            return Err(range_err!(-1, "MIDI handle table capacity exceeded"));
        }
        self.handles.push(h);
        Ok(self.handles.len() as i32 - 1)
    }

    fn arena_offset(&self, extra: usize) -> LibResult<u32> {
        if self.arena.len() + extra > ARENA_MAX {
            return Err(range_err!(-1, "MIDI message table capacity exceeded"));
        }
        Ok(self.arena.len() as u32)
    }

    fn selector(status: u8, offset: u32) -> u32 {
        (u32::from(status) << 24) | offset
    }

    /// One-data-byte message, status `0xC0..=0xDF`.
    fn add_msg1(&mut self, status: u8, b: u8) -> LibResult<u32> {
        if !(0xc0..=0xdf).contains(&status) || b > 127 {
            return Err(internal!());
        }
        let off = self.arena_offset(1)?;
        self.arena.push(b);
        Ok(Self::selector(status, off))
    }

    /// Two-data-byte message, status `0x80..=0xBF` or `0xE0..=0xEF`.
    fn add_msg2(&mut self, status: u8, b1: u8, b2: u8) -> LibResult<u32> {
        let ok_status = (0x80..=0xbf).contains(&status) || (0xe0..=0xef).contains(&status);
        if !ok_status || b1 > 127 || b2 > 127 {
            return Err(internal!());
        }
        let off = self.arena_offset(2)?;
        self.arena.push(b1);
        self.arena.push(b2);
        Ok(Self::selector(status, off))
    }

    /// System-exclusive message carrying a blob handle.
    fn add_msg_blob(&mut self, status: u8, blob: BlobId, blobs: &BlobStore) -> LibResult<u32> {
        if status != 0xf0 && status != 0xf7 {
            return Err(internal!());
        }
        if status == 0xf0 {
            let data = blobs.get(blob);
            if data.first() != Some(&0xf0) {
                return Err(internal!());
            }
        }
        let h = self.add_handle(Handle::Blob(blob))?;
        self.arena_offset(vlq::size(h)?)?;
        let off = self.arena.len() as u32;
        vlq::encode_into(&mut self.arena, h)?;
        Ok(Self::selector(status, off))
    }

    /// Meta event whose payload is an indirect text or blob handle.
    fn add_msg_meta_handle(&mut self, ty: u8, h: Handle) -> LibResult<u32> {
        if ty > 127 {
            return Err(internal!());
        }
        let idx = self.add_handle(h)?;
        self.arena_offset(vlq::size(idx)? + 1)?;
        let off = self.arena.len() as u32;
        self.arena.push(ty | 0x80);
        vlq::encode_into(&mut self.arena, idx)?;
        Ok(Self::selector(0xff, off))
    }

    /// Meta event whose payload is stored directly in the arena.
    fn add_msg_meta_data(&mut self, ty: u8, data: &[u8]) -> LibResult<u32> {
        if ty > 127 {
            return Err(internal!());
        }
        let len = data.len() as i32;
        self.arena_offset(vlq::size(len)? + 1 + data.len())?;
        let off = self.arena.len() as u32;
        self.arena.push(ty);
        vlq::encode_into(&mut self.arena, len)?;
        self.arena.extend_from_slice(data);
        Ok(Self::selector(0xff, off))
    }

    fn post(&mut self, t: i32, head: bool, sel: u32) -> LibResult<()> {
        if head {
            if self.header.len() >= HEADER_MAX {
                return Err(range_err!(-1, "MIDI header table capacity exceeded"));
            }
            self.header.push(sel);
        } else {
            if self.moments.len() >= MOMENT_MAX {
                return Err(range_err!(-1, "MIDI moment table capacity exceeded"));
            }
            let eid = self.event_id()?;
            self.moments.push(MomentEvent { eid, t, sel });
            self.touch_range(t);
        }
        Ok(())
    }

    /// A null event: extends the event range without producing a message.
    pub fn null_event(&mut self, t: i32, head: bool) -> LibResult<()> {
        self.check_open()?;
        if !head {
            self.touch_range(t);
        }
        Ok(())
    }

    /// A text meta event of the given class.
    pub fn text(&mut self, t: i32, head: bool, class: TextClass, text: TextId) -> LibResult<()> {
        self.check_open()?;
        let sel = self.add_msg_meta_handle(class as u8, Handle::Text(text))?;
        self.post(t, head, sel)
    }

    /// A tempo meta event, in microseconds per quarter note.
    pub fn tempo(&mut self, t: i32, head: bool, val: i32, line: i64) -> LibResult<()> {
        self.check_open()?;
        if val < TEMPO_MIN || val > TEMPO_MAX {
            return Err(range_err!(line, "Tempo value {} out of range", val));
        }
        let buf = [
            ((val >> 16) & 0xff) as u8,
            ((val >> 8) & 0xff) as u8,
            (val & 0xff) as u8,
        ];
        let sel = self.add_msg_meta_data(0x51, &buf)?;
        self.post(t, head, sel)
    }

    /// A time signature meta event. The denominator must be a power of
    /// two; the final byte is the conventional 8 32nd-notes per quarter.
    pub fn time_sig(&mut self, t: i32, head: bool, num: i32, denom: i32, metro: i32, line: i64) -> LibResult<()> {
        self.check_open()?;
        if num < 1 || num > TIME_NUM_MAX || denom < 1 || denom > TIME_DENOM_MAX {
            return Err(range_err!(line, "Time signature out of range"));
        }
        if metro < 1 || metro > TIME_METRO_MAX {
            return Err(range_err!(line, "Time signature metronome out of range"));
        }
        let mut log2 = 0u8;
        let mut d = denom;
        while d > 1 {
            if d % 2 != 0 {
                return Err(range_err!(line, "Time denominator must be power of 2"));
            }
            d /= 2;
            log2 += 1;
        }
        let buf = [num as u8, log2, metro as u8, 8u8];
        let sel = self.add_msg_meta_data(0x58, &buf)?;
        self.post(t, head, sel)
    }

    /// A key signature meta event: signed accidental count and mode flag.
    pub fn key_sig(&mut self, t: i32, head: bool, count: i32, minor: bool, line: i64) -> LibResult<()> {
        self.check_open()?;
        if count < KEY_COUNT_MIN || count > KEY_COUNT_MAX {
            return Err(range_err!(line, "Key signature count out of range"));
        }
        let buf = [count as i8 as u8, if minor { 1 } else { 0 }];
        let sel = self.add_msg_meta_data(0x59, &buf)?;
        self.post(t, head, sel)
    }

    /// A sequencer-specific meta event (type `0x7F`) carrying a blob.
    pub fn custom(&mut self, t: i32, head: bool, blob: BlobId) -> LibResult<()> {
        self.check_open()?;
        let sel = self.add_msg_meta_handle(0x7f, Handle::Blob(blob))?;
        self.post(t, head, sel)
    }

    /// A system-exclusive event. Blobs that begin with `0xF0` use status
    /// `0xF0` with the lead byte implied; anything else uses `0xF7`.
    pub fn system(&mut self, t: i32, head: bool, blob: BlobId, blobs: &BlobStore) -> LibResult<()> {
        self.check_open()?;
        let status = if blobs.get(blob).first() == Some(&0xf0) {
            0xf0
        } else {
            0xf7
        };
        let sel = self.add_msg_blob(status, blob, blobs)?;
        self.post(t, head, sel)
    }

    /// A channel message on a one-indexed channel.
    pub fn message(
        &mut self,
        t: i32,
        head: bool,
        ch: i32,
        msg: ChannelMsg,
        idx: i32,
        val: i32,
        line: i64,
    ) -> LibResult<()> {
        self.check_open()?;
        if ch < 1 || ch > CH_MAX {
            return Err(range_err!(line, "MIDI channel {} out of range", ch));
        }
        let status = (((msg as i32) << 4) | (ch - 1)) as u8;
        let sel = match msg {
            ChannelMsg::NoteOff | ChannelMsg::NoteOn | ChannelMsg::PolyAftertouch | ChannelMsg::Control => {
                if idx < 0 || idx > DATA_MAX || val < 0 || val > DATA_MAX {
                    return Err(range_err!(line, "MIDI data byte out of range"));
                }
                self.add_msg2(status, idx as u8, val as u8)?
            }
            ChannelMsg::Program | ChannelMsg::ChannelAftertouch => {
                if val < 0 || val > DATA_MAX {
                    return Err(range_err!(line, "MIDI data byte out of range"));
                }
                self.add_msg1(status, val as u8)?
            }
            ChannelMsg::PitchBend => {
                if val < 0 || val > WIDE_MAX {
                    return Err(range_err!(line, "MIDI pitch bend value out of range"));
                }
                self.add_msg2(status, (val & 0x7f) as u8, ((val >> 7) & 0x7f) as u8)?
            }
        };
        self.post(t, head, sel)
    }

    /// Byte size of one encoded message, accounting for running status
    /// against the previous event's selector, excluding the delta time.
    fn size_msg(&self, sel: u32, prev: Option<u32>, texts: &TextStore, blobs: &BlobStore) -> LibResult<i32> {
        let status = (sel >> 24) as u8;
        let off = (sel & 0x00ff_ffff) as usize;
        let prev_status = prev.map(|p| (p >> 24) as u8);

        let mut size = status_size(status, prev_status);
        match status {
            0x80..=0xbf | 0xe0..=0xef => size += 2,
            0xc0..=0xdf => size += 1,
            0xf0 => {
                let blob = self.handle_blob(off)?;
                let len = blobs.len(blob) as i32;
                size += vlq::size(len - 1)? as i32 + (len - 1);
            }
            0xf7 => {
                let blob = self.handle_blob(off)?;
                let len = blobs.len(blob) as i32;
                size += vlq::size(len)? as i32 + len;
            }
            0xff => {
                let ty = self.arena[off];
                size += 1;
                if ty & 0x80 != 0 {
                    let (h, _) = vlq::decode(&self.arena[off + 1..])?;
                    let len = match self.handles.get(h as usize) {
                        Some(Handle::Text(id)) => texts.len(*id) as i32,
                        Some(Handle::Blob(id)) => blobs.len(*id) as i32,
                        None => return Err(internal!()),
                    };
                    size += vlq::size(len)? as i32 + len;
                } else {
                    let (len, used) = vlq::decode(&self.arena[off + 1..])?;
                    size += used as i32 + len;
                }
            }
            _ => return Err(internal!()),
        }
        Ok(size)
    }

    fn handle_blob(&self, arena_off: usize) -> LibResult<BlobId> {
        let (h, _) = vlq::decode(&self.arena[arena_off..])?;
        match self.handles.get(h as usize) {
            Some(Handle::Blob(id)) => Ok(*id),
            _ => Err(internal!()),
        }
    }

    /// Emit one message through the scribe, mirroring `size_msg` exactly.
    fn write_msg<W: Write>(
        &self,
        s: &mut Scribe<W>,
        sel: u32,
        texts: &TextStore,
        blobs: &BlobStore,
    ) -> LibResult<()> {
        let status = (sel >> 24) as u8;
        let off = (sel & 0x00ff_ffff) as usize;

        s.write_status_byte(status)?;
        match status {
            0x80..=0xbf | 0xe0..=0xef => s.write_all(&self.arena[off..off + 2])?,
            0xc0..=0xdf => s.write_byte(self.arena[off])?,
            0xf0 => {
                let data = blobs.get(self.handle_blob(off)?);
                let mut vbuf = Vec::new();
                vlq::encode_into(&mut vbuf, data.len() as i32 - 1)?;
                s.write_all(&vbuf)?;
                s.write_all(&data[1..])?;
            }
            0xf7 => {
                let data = blobs.get(self.handle_blob(off)?);
                let mut vbuf = Vec::new();
                vlq::encode_into(&mut vbuf, data.len() as i32)?;
                s.write_all(&vbuf)?;
                s.write_all(data)?;
            }
            0xff => {
                let ty = self.arena[off];
                if ty & 0x80 != 0 {
                    s.write_byte(ty & 0x7f)?;
                    let (h, _) = vlq::decode(&self.arena[off + 1..])?;
                    let data: &[u8] = match self.handles.get(h as usize) {
                        Some(Handle::Text(id)) => texts.get(*id).as_bytes(),
                        Some(Handle::Blob(id)) => blobs.get(*id),
                        None => return Err(internal!()),
                    };
                    let mut vbuf = Vec::new();
                    vlq::encode_into(&mut vbuf, data.len() as i32)?;
                    s.write_all(&vbuf)?;
                    s.write_all(data)?;
                } else {
                    s.write_byte(ty)?;
                    let (len, used) = vlq::decode(&self.arena[off + 1..])?;
                    s.write_all(&self.arena[off + 1..off + 1 + used + len as usize])?;
                }
            }
            _ => return Err(internal!()),
        }
        Ok(())
    }

    /// Sort, size and serialise the accumulated events as a Format-0
    /// Standard MIDI File. May be called once; the assembler is spent
    /// afterwards.
    pub fn compile<W: Write>(
        &mut self,
        out: &mut W,
        texts: &TextStore,
        blobs: &BlobStore,
    ) -> LibResult<()> {
        self.check_open()?;
        self.compiled = true;

        // total order: moment, status class (0x80..=0xAF after all other
        // statuses, so note-offs precede note-ons only via the status
        // byte comparison that follows), status byte with 0xF0..=0xFF
        // collapsed, insertion order
        self.moments.sort_by_key(|e| {
            let status = (e.sel >> 24) as u8;
            let class = if (0x80..=0xaf).contains(&status) { 2u8 } else { 1u8 };
            let collapsed = if status >= 0xf0 { 0xf0 } else { status };
            (e.t, class, collapsed, e.eid)
        });

        // cap the track with End Of Track at the end-of-moment of the
        // upper range bound
        let eot_sel = self.add_msg_meta_data(0x2f, &[])?;
        let eot_t = moment::pack(self.range_upper(), Part::End, -1)?;
        let eid = self.event_id()?;
        self.moments.push(MomentEvent {
            eid,
            t: eot_t,
            sel: eot_sel,
        });
        self.touch_range(eot_t);

        // convert moments to subquanta relative to the range lower bound,
        // then to per-event deltas
        let lower = self.range_lower();
        let mut prev_sub = 0i32;
        for e in self.moments.iter_mut() {
            let sub = moment::subquantum(e.t) - lower;
            e.t = sub - prev_sub;
            prev_sub = sub;
        }

        // size pass
        let mut len: i64 = 0;
        let mut prev_sel: Option<u32> = None;
        for &sel in &self.header {
            len += 1 + i64::from(self.size_msg(sel, prev_sel, texts, blobs)?);
            prev_sel = Some(sel);
        }
        for e in &self.moments {
            if e.t < 0 || e.t > vlq::VLQ_MAX {
                return Err(LibError::Overflow { line: -1 });
            }
            len += vlq::size(e.t)? as i64 + i64::from(self.size_msg(e.sel, prev_sel, texts, blobs)?);
            prev_sel = Some(e.sel);
        }
        if len > i64::from(i32::MAX) {
            return Err(range_err!(-1, "Compiled MIDI track too large"));
        }
        debug!("track body is {} bytes", len);

        // chunk headers
        out.write_all(b"MThd").context(io!())?;
        out.write_all(&6u32.to_be_bytes()).context(io!())?;
        out.write_all(&0u16.to_be_bytes()).context(io!())?;
        out.write_all(&1u16.to_be_bytes()).context(io!())?;
        out.write_all(&TICKS_PER_QUARTER.to_be_bytes()).context(io!())?;
        out.write_all(b"MTrk").context(io!())?;
        out.write_all(&(len as u32).to_be_bytes()).context(io!())?;

        // write pass
        let mut scribe = Scribe::new(out);
        for i in 0..self.header.len() {
            scribe.write_byte(0)?;
            self.write_msg(&mut scribe, self.header[i], texts, blobs)?;
        }
        for i in 0..self.moments.len() {
            let e = self.moments[i];
            trace!("event delta {} selector {:#010x}", e.t, e.sel);
            let mut vbuf = Vec::new();
            vlq::encode_into(&mut vbuf, e.t)?;
            scribe.write_all(&vbuf)?;
            self.write_msg(&mut scribe, e.sel, texts, blobs)?;
        }

        // the write pass must land exactly on the size pass's prediction
        if scribe.written() != len as u64 {
            return Err(internal!());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moment::pack;

    fn m(subq: i32, part: Part) -> i32 {
        pack(subq, part, -1).unwrap()
    }

    fn compile(asm: &mut MidiAssembler, texts: &TextStore, blobs: &BlobStore) -> Vec<u8> {
        let mut out = Vec::new();
        asm.compile(&mut out, texts, blobs).unwrap();
        out
    }

    #[test]
    fn empty_file_has_only_end_of_track() {
        let texts = TextStore::new();
        let blobs = BlobStore::new();
        let mut asm = MidiAssembler::new();
        let bytes = compile(&mut asm, &texts, &blobs);
        let expected: Vec<u8> = vec![
            b'M', b'T', b'h', b'd', 0, 0, 0, 6, 0, 0, 0, 1, 0x03, 0x00, // MThd, fmt 0, 1 trk, 768
            b'M', b'T', b'r', b'k', 0, 0, 0, 4, // body is delta + FF 2F 00
            0x00, 0xff, 0x2f, 0x00,
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn compile_is_single_shot() {
        let texts = TextStore::new();
        let blobs = BlobStore::new();
        let mut asm = MidiAssembler::new();
        let mut out = Vec::new();
        asm.compile(&mut out, &texts, &blobs).unwrap();
        assert!(asm.compile(&mut out, &texts, &blobs).is_err());
        assert!(asm.null_event(0, false).is_err());
    }

    #[test]
    fn running_status_suppresses_repeats() {
        let texts = TextStore::new();
        let blobs = BlobStore::new();
        let mut asm = MidiAssembler::new();
        let t = m(0, Part::Middle);
        asm.message(t, false, 1, ChannelMsg::NoteOn, 60, 64, -1).unwrap();
        asm.message(t, false, 1, ChannelMsg::NoteOn, 64, 64, -1).unwrap();
        let bytes = compile(&mut asm, &texts, &blobs);
        let body = &bytes[22..];
        // delta, status, 2 data; delta, 2 data (status suppressed); eot
        assert_eq!(
            body,
            &[0x00, 0x90, 60, 64, 0x00, 64, 64, 0x00, 0xff, 0x2f, 0x00]
        );
    }

    #[test]
    fn note_off_sorts_before_note_on_at_same_moment() {
        let texts = TextStore::new();
        let blobs = BlobStore::new();
        let mut asm = MidiAssembler::new();
        let t = m(10, Part::Middle);
        asm.message(t, false, 1, ChannelMsg::NoteOn, 60, 64, -1).unwrap();
        asm.message(t, false, 1, ChannelMsg::NoteOff, 62, 0, -1).unwrap();
        // a control message is class 1 and must precede both
        asm.message(t, false, 1, ChannelMsg::Control, 7, 100, -1).unwrap();
        let bytes = compile(&mut asm, &texts, &blobs);
        let body = &bytes[22..];
        assert_eq!(body[0], 0x00); // range collapses to a single instant
        assert_eq!(body[1], 0xb0);
        assert_eq!(body[5], 0x80);
        assert_eq!(body[9], 0x90);
    }

    #[test]
    fn deltas_are_relative_to_range_lower() {
        let texts = TextStore::new();
        let blobs = BlobStore::new();
        let mut asm = MidiAssembler::new();
        asm.message(m(100, Part::Middle), false, 1, ChannelMsg::NoteOn, 60, 64, -1)
            .unwrap();
        asm.message(m(868, Part::Middle), false, 1, ChannelMsg::NoteOn, 60, 0, -1)
            .unwrap();
        let bytes = compile(&mut asm, &texts, &blobs);
        let body = &bytes[22..];
        // first event at delta 0 (the range starts at it), second 768
        // ticks later encoded as a two-byte VLQ
        assert_eq!(body[0], 0x00);
        assert_eq!(&body[4..6], &[0x86, 0x00]);
    }

    #[test]
    fn null_event_extends_range() {
        let texts = TextStore::new();
        let blobs = BlobStore::new();
        let mut asm = MidiAssembler::new();
        asm.null_event(m(-50, Part::Middle), false).unwrap();
        asm.message(m(0, Part::Middle), false, 1, ChannelMsg::NoteOn, 60, 64, -1)
            .unwrap();
        assert_eq!(asm.range_lower(), -50);
        assert_eq!(asm.range_upper(), 0);
        let bytes = compile(&mut asm, &texts, &blobs);
        let body = &bytes[22..];
        // note-on sits 50 subquanta after the rebased origin
        assert_eq!(body[0], 50);
    }

    #[test]
    fn header_events_precede_moment_events() {
        let mut texts = TextStore::new();
        let blobs = BlobStore::new();
        let title = texts.literal("T", -1).unwrap();
        let mut asm = MidiAssembler::new();
        asm.message(m(0, Part::Middle), false, 1, ChannelMsg::NoteOn, 60, 64, -1)
            .unwrap();
        asm.text(0, true, TextClass::Title, title).unwrap();
        let bytes = compile(&mut asm, &texts, &blobs);
        let body = &bytes[22..];
        assert_eq!(&body[..6], &[0x00, 0xff, 0x03, 0x01, b'T', 0x00]);
        assert_eq!(body[6], 0x90);
    }

    #[test]
    fn sysex_f0_lead_byte_is_implied() {
        let texts = TextStore::new();
        let mut blobs = BlobStore::new();
        let payload = blobs.from_bytes(&[0xf0, 0x7e, 0xf7], -1).unwrap();
        let mut asm = MidiAssembler::new();
        asm.system(m(0, Part::Middle), false, payload, &blobs).unwrap();
        let bytes = compile(&mut asm, &texts, &blobs);
        let body = &bytes[22..];
        assert_eq!(&body[..5], &[0x00, 0xf0, 0x02, 0x7e, 0xf7]);
    }

    #[test]
    fn sysex_f7_keeps_all_bytes() {
        let texts = TextStore::new();
        let mut blobs = BlobStore::new();
        let payload = blobs.from_bytes(&[0x01, 0x02], -1).unwrap();
        let mut asm = MidiAssembler::new();
        asm.system(m(0, Part::Middle), false, payload, &blobs).unwrap();
        let bytes = compile(&mut asm, &texts, &blobs);
        let body = &bytes[22..];
        assert_eq!(&body[..5], &[0x00, 0xf7, 0x02, 0x01, 0x02]);
    }

    #[test]
    fn tempo_and_time_sig_payloads() {
        let texts = TextStore::new();
        let blobs = BlobStore::new();
        let mut asm = MidiAssembler::new();
        asm.tempo(0, true, 500_000, -1).unwrap();
        asm.time_sig(0, true, 6, 8, 36, -1).unwrap();
        asm.key_sig(0, true, -3, true, -1).unwrap();
        let bytes = compile(&mut asm, &texts, &blobs);
        let body = &bytes[22..];
        assert_eq!(&body[..7], &[0x00, 0xff, 0x51, 0x03, 0x07, 0xa1, 0x20]);
        assert_eq!(&body[7..14], &[0x00, 0xff, 0x58, 0x04, 6, 3, 36]);
        assert_eq!(body[14], 8);
        assert_eq!(&body[15..20], &[0x00, 0xff, 0x59, 0x02, 0xfd]);
        assert_eq!(body[20], 1);
    }

    #[test]
    fn message_validation() {
        let mut asm = MidiAssembler::new();
        assert!(asm.message(0, false, 0, ChannelMsg::NoteOn, 60, 64, -1).is_err());
        assert!(asm.message(0, false, 17, ChannelMsg::NoteOn, 60, 64, -1).is_err());
        assert!(asm.message(0, false, 1, ChannelMsg::NoteOn, 128, 64, -1).is_err());
        assert!(asm.message(0, false, 1, ChannelMsg::PitchBend, 0, 0x4000, -1).is_err());
        assert!(asm.tempo(0, false, 0, -1).is_err());
        assert!(asm.tempo(0, false, 16_777_216, -1).is_err());
        assert!(asm.time_sig(0, false, 4, 6, 24, -1).is_err());
        assert!(asm.key_sig(0, false, 8, false, -1).is_err());
    }
}
