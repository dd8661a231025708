//! The moment codec.
//!
//! A *moment* is a single signed 32-bit integer that encodes a subquantum
//! offset together with a moment part: `m = s * 3 + p`. The part is the
//! tiebreaker among events that share a subquantum; start sorts before
//! middle, which sorts before end. Packing this way gives every event time
//! in the engine a strict total order while staying inside `i32`.
//!
//! There are 8 subquanta per NMF quantum; at 96 quanta per whole note this
//! yields 768 MIDI ticks per quarter.

use crate::error::{src_line, LibError, LibResult};

/// Subquanta per NMF quantum.
pub const SUBQUANTA_PER_QUANTUM: i32 = 8;

/// MIDI ticks (= subquanta) per quarter note at the Q96 basis.
pub const TICKS_PER_QUARTER: u16 = 768;

/// The tiebreaker among events at the same subquantum.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub enum Part {
    Start,
    Middle,
    End,
}

impl Default for Part {
    fn default() -> Self {
        Part::Middle
    }
}

impl Part {
    /// The packed offset of this part, in `0..=2`.
    pub fn index(self) -> i32 {
        match self {
            Part::Start => 0,
            Part::Middle => 1,
            Part::End => 2,
        }
    }

    /// Decode the script-facing moment part in `-1..=1` (start, middle, end).
    pub(crate) fn from_signed(m: i32, line: i64) -> LibResult<Part> {
        match m {
            -1 => Ok(Part::Start),
            0 => Ok(Part::Middle),
            1 => Ok(Part::End),
            _ => Err(range_err!(line, "Invalid moment part {}", m)),
        }
    }
}

/// Pack a subquantum offset and moment part into a moment integer.
///
/// Fails with an overflow diagnostic when the result would not fit in a
/// signed 32-bit integer.
pub fn pack(subq: i32, part: Part, line: i64) -> LibResult<i32> {
    let wide = i64::from(subq) * 3 + i64::from(part.index());
    if wide < i64::from(i32::MIN) || wide > i64::from(i32::MAX) {
        return Err(LibError::Overflow {
            line: src_line(line),
        });
    }
    Ok(wide as i32)
}

/// Unpack a moment integer into its subquantum offset and moment part.
///
/// Negative moments round toward negative infinity, so the part stays in
/// `0..=2` for every `i32` input, including `i32::MIN`.
pub fn unpack(moment: i32) -> (i32, Part) {
    let subq = moment.div_euclid(3);
    let part = match moment.rem_euclid(3) {
        0 => Part::Start,
        1 => Part::Middle,
        _ => Part::End,
    };
    (subq, part)
}

/// The subquantum offset of a moment, discarding the part.
pub fn subquantum(moment: i32) -> i32 {
    moment.div_euclid(3)
}
