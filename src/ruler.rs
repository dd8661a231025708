//! Rulers lay out unmeasured grace notes in slots before their beat.

use crate::error::{src_line, LibError, LibResult};
use std::fmt::{Display, Formatter};

/// Slot layout parameters for unmeasured grace notes.
///
/// Grace note `i` (a negative index, -1 being closest to the beat) attached
/// to a beat at subquantum `b` starts at `b + i * slot`. Its performance
/// duration is `slot + gap`, which the constructor guarantees is positive.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Ruler {
    slot: i32,
    gap: i32,
}

impl Ruler {
    pub fn new(slot: i32, gap: i32, line: i64) -> LibResult<Ruler> {
        if slot < 1 {
            return Err(range_err!(line, "Ruler slot out of range"));
        }
        if gap > 0 {
            return Err(range_err!(line, "Ruler gap out of range"));
        }
        if slot + gap < 1 {
            return Err(range_err!(line, "Ruler gap too large for slot"));
        }
        Ok(Ruler { slot, gap })
    }

    /// The default ruler: 48-subquantum slots with no gap.
    pub fn default_ruler() -> Ruler {
        Ruler { slot: 48, gap: 0 }
    }

    /// The subquantum position of grace note `i` (negative) before a beat
    /// at subquantum `beat`.
    pub fn position(&self, beat: i32, i: i32, line: i64) -> LibResult<i32> {
        if i >= 0 {
            return Err(internal!());
        }
        let pos = i64::from(i) * i64::from(self.slot) + i64::from(beat);
        if pos < i64::from(i32::MIN) || pos > i64::from(i32::MAX) {
            return Err(LibError::Overflow {
                line: src_line(line),
            });
        }
        Ok(pos as i32)
    }

    /// The performance duration of a grace note under this ruler.
    pub fn duration(&self) -> i32 {
        self.slot + self.gap
    }
}

impl Display for Ruler {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{}]", self.slot, self.gap)
    }
}
