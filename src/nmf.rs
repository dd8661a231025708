//! The quantised note input.
//!
//! [`NmfData`] is the engine's read-only view of a parsed NMF file: a
//! quantum basis, a table of section start times in quanta, and a flat note
//! list. The engine only accepts the 96-quanta-per-whole-note basis; the
//! other basis codes exist so a reader can name what it rejected.
//!
//! The serialised container read by [`NmfData::read`] is a fixed-width
//! big-endian layout:
//!
//! ```text
//! "nmf1"           4-byte signature
//! basis            u16   (0 = Q96, 1 = 44100 Hz, 2 = 48000 Hz)
//! section count    u16   (at least 1)
//! note count       u32
//! section table    u32 per section, base offset in quanta, ascending
//! note records     16 bytes each:
//!   t              u32   offset in quanta from start of piece
//!   dur            i32   > 0 measured, 0 cue, < 0 unmeasured grace
//!   pitch          i16   semitones from middle C, -39..=48
//!   art            u16   articulation index, 0..=61
//!   sect           u16   section index
//!   layer          u16   zero-based layer within the section
//! ```
//!
//! In-memory construction through [`NmfData::new`] is what the engine and
//! tests use; the reader exists for the command-line pipeline.

use crate::error::LibResult;
use log::trace;
use snafu::ResultExt;
use std::io::Read;

/// Maximum number of sections in an NMF file.
pub const NMF_MAX_SECTIONS: usize = 65_535;

/// Maximum number of notes in an NMF file.
pub const NMF_MAX_NOTES: usize = 1_048_576;

/// Least valid pitch in semitones from middle C.
pub const NMF_MIN_PITCH: i32 = -39;

/// Greatest valid pitch in semitones from middle C.
pub const NMF_MAX_PITCH: i32 = 48;

/// Greatest valid articulation index.
pub const NMF_MAX_ART: i32 = 61;

/// The quantum basis of an NMF file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NmfBasis {
    /// 96 quanta per whole note. The only basis the engine accepts.
    Q96,
    /// 44,100 quanta per second.
    R44100,
    /// 48,000 quanta per second.
    R48000,
}

/// One note of the quantised input.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NmfNote {
    /// Offset in quanta from the start of the piece.
    pub t: i32,
    /// Duration in quanta: positive measured, zero cue, negative grace.
    pub dur: i32,
    /// Pitch in semitones from middle C.
    pub pitch: i32,
    /// Articulation index, `0..=61`.
    pub art: i32,
    /// Section index.
    pub sect: i32,
    /// Zero-based layer within the section.
    pub layer: i32,
}

/// A parsed NMF file: basis, section table and note list.
#[derive(Clone, Debug)]
pub struct NmfData {
    basis: NmfBasis,
    sections: Vec<i32>,
    notes: Vec<NmfNote>,
}

impl NmfData {
    /// An empty NMF object with the given basis and no sections or notes.
    pub fn new(basis: NmfBasis) -> NmfData {
        NmfData {
            basis,
            sections: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn basis(&self) -> NmfBasis {
        self.basis
    }

    pub fn section_count(&self) -> i32 {
        self.sections.len() as i32
    }

    /// The base offset of a section in quanta. Callers must check the
    /// index against [`NmfData::section_count`] first.
    pub fn section_base_quantum(&self, sect: i32) -> i32 {
        self.sections[sect as usize]
    }

    pub fn note_count(&self) -> i32 {
        self.notes.len() as i32
    }

    pub fn note(&self, i: i32) -> &NmfNote {
        &self.notes[i as usize]
    }

    /// Append a section starting at the given base quantum.
    pub fn push_section(&mut self, base_quantum: i32) -> crate::error::Result<()> {
        Ok(self.push_section_inner(base_quantum)?)
    }

    fn push_section_inner(&mut self, base_quantum: i32) -> LibResult<()> {
        if self.sections.len() >= NMF_MAX_SECTIONS {
            return Err(range_err!(-1, "Too many NMF sections"));
        }
        if base_quantum < 0 {
            return Err(range_err!(-1, "NMF section offset may not be negative"));
        }
        if let Some(&last) = self.sections.last() {
            if base_quantum < last {
                return Err(range_err!(-1, "NMF section offsets must be ascending"));
            }
        }
        self.sections.push(base_quantum);
        Ok(())
    }

    /// Append a note, validating every field against the format limits.
    pub fn push_note(&mut self, note: NmfNote) -> crate::error::Result<()> {
        Ok(self.push_note_inner(note)?)
    }

    fn push_note_inner(&mut self, note: NmfNote) -> LibResult<()> {
        if self.notes.len() >= NMF_MAX_NOTES {
            return Err(range_err!(-1, "Too many NMF notes"));
        }
        if note.t < 0 {
            return Err(range_err!(-1, "NMF note offset may not be negative"));
        }
        if note.pitch < NMF_MIN_PITCH || note.pitch > NMF_MAX_PITCH {
            return Err(range_err!(-1, "NMF note pitch {} out of range", note.pitch));
        }
        if note.art < 0 || note.art > NMF_MAX_ART {
            return Err(range_err!(-1, "NMF note articulation {} out of range", note.art));
        }
        if note.sect < 0 || note.sect >= self.section_count() {
            return Err(range_err!(-1, "NMF note section {} out of range", note.sect));
        }
        if note.layer < 0 || note.layer > 0xffff {
            return Err(range_err!(-1, "NMF note layer {} out of range", note.layer));
        }
        self.notes.push(note);
        Ok(())
    }

    /// Parse the binary container from a reader.
    pub(crate) fn read_inner<R: Read>(r: &mut R) -> LibResult<NmfData> {
        let mut sig = [0u8; 4];
        r.read_exact(&mut sig).context(io!())?;
        if &sig != b"nmf1" {
            return Err(range_err!(-1, "Not an NMF file (bad signature)"));
        }

        let basis = match read_u16(r)? {
            0 => NmfBasis::Q96,
            1 => NmfBasis::R44100,
            2 => NmfBasis::R48000,
            other => return Err(range_err!(-1, "Unknown NMF basis code {}", other)),
        };
        let section_count = read_u16(r)? as usize;
        if section_count < 1 {
            return Err(range_err!(-1, "NMF file has no sections"));
        }
        let note_count = read_u32(r)? as usize;
        if note_count > NMF_MAX_NOTES {
            return Err(range_err!(-1, "Too many NMF notes"));
        }
        trace!(
            "nmf header: {:?}, {} sections, {} notes",
            basis,
            section_count,
            note_count
        );

        let mut data = NmfData::new(basis);
        for _ in 0..section_count {
            let base = read_u32(r)?;
            if base > i32::MAX as u32 {
                return Err(range_err!(-1, "NMF section offset out of range"));
            }
            data.push_section_inner(base as i32)?;
        }
        for _ in 0..note_count {
            let t = read_u32(r)?;
            if t > i32::MAX as u32 {
                return Err(range_err!(-1, "NMF note offset out of range"));
            }
            let dur = read_u32(r)? as i32;
            let pitch = read_u16(r)? as i16 as i32;
            let art = read_u16(r)? as i32;
            let sect = read_u16(r)? as i32;
            let layer = read_u16(r)? as i32;
            data.push_note_inner(NmfNote {
                t: t as i32,
                dur,
                pitch,
                art,
                sect,
                layer,
            })?;
        }
        Ok(data)
    }

    /// Parse the binary container from a reader.
    pub fn read<R: Read>(mut r: R) -> crate::error::Result<NmfData> {
        Ok(Self::read_inner(&mut r)?)
    }
}

fn read_u16<R: Read>(r: &mut R) -> LibResult<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf).context(io!())?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32<R: Read>(r: &mut R) -> LibResult<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).context(io!())?;
    Ok(u32::from_be_bytes(buf))
}

/// Reject every basis except Q96. Pointer resolution and rendering both
/// assume the 8-subquanta-per-quantum scale that only makes sense there.
pub(crate) fn require_q96(data: &NmfData) -> LibResult<()> {
    if data.basis() != NmfBasis::Q96 {
        return Err(range_err!(-1, "Input NMF has wrong quantum basis"));
    }
    if data.section_count() < 1 {
        return Err(range_err!(-1, "Input NMF has no sections"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_u16(out: &mut Vec<u8>, v: u16) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    fn write_u32(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    fn sample_file() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"nmf1");
        write_u16(&mut out, 0); // Q96
        write_u16(&mut out, 2); // sections
        write_u32(&mut out, 1); // notes
        write_u32(&mut out, 0);
        write_u32(&mut out, 96);
        // one measured note
        write_u32(&mut out, 0); // t
        write_u32(&mut out, 96u32); // dur
        write_u16(&mut out, 0); // pitch
        write_u16(&mut out, 0); // art
        write_u16(&mut out, 0); // sect
        write_u16(&mut out, 0); // layer
        out
    }

    #[test]
    fn read_sample() {
        let data = NmfData::read(&sample_file()[..]).unwrap();
        assert_eq!(data.basis(), NmfBasis::Q96);
        assert_eq!(data.section_count(), 2);
        assert_eq!(data.section_base_quantum(1), 96);
        assert_eq!(data.note_count(), 1);
        let n = data.note(0);
        assert_eq!(n.dur, 96);
        assert_eq!(n.pitch, 0);
    }

    #[test]
    fn negative_duration_roundtrips() {
        let mut file = sample_file();
        // patch the duration field to -2 (grace note)
        let dur_at = 4 + 2 + 2 + 4 + 8 + 4;
        file[dur_at..dur_at + 4].copy_from_slice(&(-2i32 as u32).to_be_bytes());
        let data = NmfData::read(&file[..]).unwrap();
        assert_eq!(data.note(0).dur, -2);
    }

    #[test]
    fn rejects_bad_signature() {
        let mut file = sample_file();
        file[0] = b'x';
        assert!(NmfData::read(&file[..]).is_err());
    }

    #[test]
    fn rejects_truncated() {
        let file = sample_file();
        assert!(NmfData::read(&file[..file.len() - 3]).is_err());
    }

    #[test]
    fn push_note_validation() {
        let mut data = NmfData::new(NmfBasis::Q96);
        data.push_section(0).unwrap();
        let good = NmfNote {
            t: 0,
            dur: 1,
            pitch: 0,
            art: 0,
            sect: 0,
            layer: 0,
        };
        data.push_note(good).unwrap();
        assert!(data.push_note(NmfNote { pitch: 49, ..good }).is_err());
        assert!(data.push_note(NmfNote { pitch: -40, ..good }).is_err());
        assert!(data.push_note(NmfNote { art: 62, ..good }).is_err());
        assert!(data.push_note(NmfNote { sect: 1, ..good }).is_err());
        assert!(data.push_note(NmfNote { t: -1, ..good }).is_err());
    }

    #[test]
    fn basis_gate() {
        let data = NmfData::new(NmfBasis::R44100);
        assert!(require_q96(&data).is_err());
        let mut q = NmfData::new(NmfBasis::Q96);
        assert!(require_q96(&q).is_err()); // no sections yet
        q.push_section(0).unwrap();
        assert!(require_q96(&q).is_ok());
    }
}
