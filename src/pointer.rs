//! Temporal pointers.
//!
//! A pointer is a compound coordinate into the score: either the special
//! *header* position (events that belong to the MIDI track header and have
//! no time) or a body position made of an NMF section, a quantum offset
//! within it, a grace-note index with its ruler, a subquantum tilt and a
//! moment part. Resolving a body pointer against the NMF section table
//! collapses all of that into a single packed moment integer.
//!
//! Pointers are mutable and aliased: the same pointer may sit on the
//! interpreter stack and in the name bank at once, and adjusting it through
//! one reference is visible through the other. They therefore live in an
//! arena and are addressed by id.

use crate::error::{src_line, LibError, LibResult};
use crate::moment::{self, Part, SUBQUANTA_PER_QUANTUM};
use crate::nmf::NmfData;
use crate::prim;
use crate::ruler::Ruler;

/// An owning index into the [`PointerStore`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PointerId(pub(crate) u32);

/// A compound temporal coordinate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Pointer {
    /// Sentinel for events that go to the MIDI track header.
    Header,
    Body {
        sect: i32,
        offs: i32,
        /// Grace-note index, zero or negative.
        grace: i32,
        /// Present exactly when `grace < 0`.
        grace_ruler: Option<Ruler>,
        tilt: i32,
        part: Part,
    },
}

impl Pointer {
    pub fn new() -> Pointer {
        Pointer::Header
    }

    pub fn is_header(&self) -> bool {
        matches!(self, Pointer::Header)
    }

    /// Return to the header position.
    pub fn reset(&mut self) {
        *self = Pointer::Header;
    }

    /// Move to the start of a section. From the header this also picks the
    /// middle-of-moment part; from a body position the part is retained.
    pub fn jump(&mut self, sect: i32, line: i64) -> LibResult<()> {
        if sect < 0 {
            return Err(range_err!(line, "Invalid pointer section {}", sect));
        }
        let part = match *self {
            Pointer::Header => Part::Middle,
            Pointer::Body { part, .. } => part,
        };
        *self = Pointer::Body {
            sect,
            offs: 0,
            grace: 0,
            grace_ruler: None,
            tilt: 0,
            part,
        };
        Ok(())
    }

    /// Set the quantum offset, clearing grace and tilt.
    pub fn seek(&mut self, new_offs: i32, line: i64) -> LibResult<()> {
        match self {
            Pointer::Header => Err(range_err!(line, "Can't seek a header pointer")),
            Pointer::Body {
                offs,
                grace,
                grace_ruler,
                tilt,
                ..
            } => {
                *offs = new_offs;
                *grace = 0;
                *grace_ruler = None;
                *tilt = 0;
                Ok(())
            }
        }
    }

    /// Adjust the quantum offset relatively.
    pub fn advance(&mut self, rel: i32, line: i64) -> LibResult<()> {
        match *self {
            Pointer::Header => Err(range_err!(line, "Can't advance a header pointer")),
            Pointer::Body { offs, .. } => {
                let next = offs.checked_add(rel).ok_or(LibError::Overflow {
                    line: src_line(line),
                })?;
                self.seek(next, line)
            }
        }
    }

    /// Set the grace-note index; a ruler is required exactly when `g < 0`.
    /// Clears the tilt.
    pub fn grace(&mut self, g: i32, ruler: Option<Ruler>, line: i64) -> LibResult<()> {
        if g > 0 {
            return Err(range_err!(line, "Invalid grace note offset {}", g));
        }
        if g < 0 && ruler.is_none() {
            return Err(range_err!(line, "Missing ruler parameter"));
        }
        match self {
            Pointer::Header => Err(range_err!(line, "Can't grace-offset a header pointer")),
            Pointer::Body {
                grace,
                grace_ruler,
                tilt,
                ..
            } => {
                *grace = g;
                *grace_ruler = if g < 0 { ruler } else { None };
                *tilt = 0;
                Ok(())
            }
        }
    }

    /// Set the subquantum tilt.
    pub fn tilt(&mut self, t: i32, line: i64) -> LibResult<()> {
        match self {
            Pointer::Header => Err(range_err!(line, "Can't tilt a header pointer")),
            Pointer::Body { tilt, .. } => {
                *tilt = t;
                Ok(())
            }
        }
    }

    /// Set the moment part from the script encoding `-1/0/+1`.
    pub fn moment(&mut self, p: i32, line: i64) -> LibResult<()> {
        let part = Part::from_signed(p, line)?;
        match self {
            Pointer::Header => Err(range_err!(line, "Can't adjust moment on a header pointer")),
            Pointer::Body { part: mp, .. } => {
                *mp = part;
                Ok(())
            }
        }
    }

    /// Resolve a body pointer to a packed moment. All arithmetic is
    /// checked; header pointers cannot be resolved.
    pub fn resolve(&self, nmf: &NmfData, line: i64) -> LibResult<i32> {
        let (sect, offs, grace, grace_ruler, tilt, part) = match *self {
            Pointer::Header => {
                return Err(range_err!(line, "Can't compute a header pointer"));
            }
            Pointer::Body {
                sect,
                offs,
                grace,
                grace_ruler,
                tilt,
                part,
            } => (sect, offs, grace, grace_ruler, tilt, part),
        };

        if sect >= nmf.section_count() {
            return Err(range_err!(line, "Pointer section {} out of NMF range", sect));
        }

        let mut t = nmf.section_base_quantum(sect);
        t = t.checked_add(offs).ok_or(LibError::Overflow {
            line: src_line(line),
        })?;
        t = prim::mul(t, SUBQUANTA_PER_QUANTUM, line)?;
        if grace < 0 {
            let ruler = grace_ruler.ok_or_else(|| internal!())?;
            t = ruler.position(t, grace, line)?;
        }
        t = t.checked_add(tilt).ok_or(LibError::Overflow {
            line: src_line(line),
        })?;
        moment::pack(t, part, line)
    }

    /// Render for the script `print` diagnostic.
    pub fn display(&self) -> String {
        match *self {
            Pointer::Header => String::from("<header>"),
            Pointer::Body {
                sect,
                offs,
                grace,
                grace_ruler,
                tilt,
                part,
            } => {
                let g = match grace_ruler {
                    Some(r) if grace < 0 => format!("{}:{}", grace, r),
                    _ => String::from("."),
                };
                let m = match part {
                    Part::Start => "start",
                    Part::Middle => "mid",
                    Part::End => "end",
                };
                format!("({},{},{},{},{})", sect, offs, g, tilt, m)
            }
        }
    }
}

impl Default for Pointer {
    fn default() -> Self {
        Pointer::Header
    }
}

/// Per-compilation arena of pointers.
#[derive(Debug, Default)]
pub struct PointerStore {
    items: Vec<Pointer>,
}

impl PointerStore {
    pub fn new() -> PointerStore {
        PointerStore::default()
    }

    pub fn alloc(&mut self) -> PointerId {
        let id = PointerId(self.items.len() as u32);
        self.items.push(Pointer::Header);
        id
    }

    pub fn get(&self, id: PointerId) -> &Pointer {
        &self.items[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: PointerId) -> &mut Pointer {
        &mut self.items[id.0 as usize]
    }
}
