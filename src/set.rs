//! Ordered sets of non-negative integers.
//!
//! Finished sets are immutable and encoded as a sorted table of *spans*,
//! one signed integer per span: a non-negative entry is a closed span
//! holding just that value, while `-(v + 1)` is an open span that starts at
//! `v` and runs until the next span (or forever). The encoding can express
//! both finite sets and cofinite sets such as "everything except 7" in a
//! handful of entries.
//!
//! Sets are built through the accumulator ([`SetStore::begin`] ..
//! [`SetStore::end`]), which keeps a list of inclusive ranges plus a
//! polarity flag. Positive polarity means the ranges are the members;
//! negative polarity means the ranges are the non-members. Including an
//! open range flips the polarity rather than storing an unbounded range.

use crate::error::{LibError, LibResult};

/// Maximum number of encoded spans in a finished set.
const SET_MAX_TABLE: usize = 16_384;

/// Maximum number of ranges in the accumulator.
const ACC_MAX: usize = 16_384;

/// An owning index into the [`SetStore`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SetId(pub(crate) u32);

/// An immutable finished set.
#[derive(Debug)]
pub struct Set {
    spans: Vec<i32>,
}

/// An inclusive range of set members; `hi == None` means unbounded above.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SpanRange {
    pub lo: i32,
    pub hi: Option<i32>,
}

fn encode_span(v: i32, open: bool) -> i32 {
    if open {
        // -(v + 1) without the i32::MAX edge overflowing
        (-(i64::from(v) + 1)) as i32
    } else {
        v
    }
}

fn decode_span(e: i32) -> (i32, bool) {
    if e < 0 {
        (-(e + 1), true)
    } else {
        (e, false)
    }
}

impl Set {
    /// Membership test for a non-negative value.
    pub fn has(&self, val: i32) -> bool {
        if val < 0 || self.spans.is_empty() {
            return false;
        }
        // index of the last span whose value is <= val
        let idx = self.spans.partition_point(|&e| decode_span(e).0 <= val);
        if idx == 0 {
            return false;
        }
        let (v, open) = decode_span(self.spans[idx - 1]);
        if open {
            val >= v
        } else {
            val == v
        }
    }

    /// Decode the span table into inclusive member ranges.
    pub fn ranges(&self) -> Vec<SpanRange> {
        let mut out: Vec<SpanRange> = Vec::new();
        for &e in &self.spans {
            let (v, open) = decode_span(e);
            match out.last_mut() {
                // extend the previous range when this span is adjacent to it
                Some(last) if last.hi.is_none() || last.hi == Some(v - 1) => {
                    last.hi = if open { None } else { Some(v) };
                }
                _ => out.push(SpanRange {
                    lo: v,
                    hi: if open { None } else { Some(v) },
                }),
            }
        }
        out
    }

    /// Render for the script `print` diagnostic: `1-4,7,10-`.
    pub fn display(&self) -> String {
        let ranges = self.ranges();
        if ranges.is_empty() {
            return String::from("<empty>");
        }
        let mut s = String::new();
        for (i, r) in ranges.iter().enumerate() {
            if i > 0 {
                s.push(',');
            }
            match r.hi {
                None => s.push_str(&format!("{}-", r.lo)),
                Some(hi) if hi == r.lo => s.push_str(&format!("{}", r.lo)),
                Some(hi) => s.push_str(&format!("{}-{}", r.lo, hi)),
            }
        }
        s
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Polarity {
    Positive,
    Negative,
}

#[derive(Debug)]
struct Accum {
    polarity: Polarity,
    /// Sorted, non-overlapping, non-adjacent inclusive ranges `(lo, hi)`.
    ranges: Vec<(i32, i32)>,
}

/// Per-compilation arena of finished sets plus the single set accumulator.
#[derive(Debug, Default)]
pub struct SetStore {
    items: Vec<Set>,
    accum: Option<Accum>,
}

impl SetStore {
    pub fn new() -> SetStore {
        SetStore::default()
    }

    pub fn get(&self, id: SetId) -> &Set {
        &self.items[id.0 as usize]
    }

    fn accum_mut(&mut self, line: i64) -> LibResult<&mut Accum> {
        self.accum.as_mut().ok_or(LibError::GroupConstraint {
            what: String::from("No set definition in progress"),
            line: crate::error::src_line(line),
        })
    }

    /// Open a set definition. The accumulator starts as the empty set.
    pub fn begin(&mut self, line: i64) -> LibResult<()> {
        if self.accum.is_some() {
            return Err(LibError::GroupConstraint {
                what: String::from("Set definition already in progress"),
                line: crate::error::src_line(line),
            });
        }
        self.accum = Some(Accum {
            polarity: Polarity::Positive,
            ranges: Vec::new(),
        });
        Ok(())
    }

    /// Reset the open definition to the set of all non-negative integers.
    pub fn all(&mut self, line: i64) -> LibResult<()> {
        let acc = self.accum_mut(line)?;
        acc.polarity = Polarity::Negative;
        acc.ranges.clear();
        Ok(())
    }

    /// Reset the open definition to the empty set.
    pub fn none(&mut self, line: i64) -> LibResult<()> {
        let acc = self.accum_mut(line)?;
        acc.polarity = Polarity::Positive;
        acc.ranges.clear();
        Ok(())
    }

    /// Complement the open definition.
    pub fn invert(&mut self, line: i64) -> LibResult<()> {
        let acc = self.accum_mut(line)?;
        acc.polarity = match acc.polarity {
            Polarity::Positive => Polarity::Negative,
            Polarity::Negative => Polarity::Positive,
        };
        Ok(())
    }

    /// Include (`exclude == false`) or exclude a closed range `lo..=hi`.
    pub fn rclose(&mut self, lo: i32, hi: i32, exclude: bool, line: i64) -> LibResult<()> {
        if lo < 0 || hi < lo {
            return Err(range_err!(line, "Invalid range for set"));
        }
        let acc = self.accum_mut(line)?;
        // in a negative set the ranges track exclusions, so flip the sense
        let eff_exclude = exclude != (acc.polarity == Polarity::Negative);
        if eff_exclude {
            subtract_range(&mut acc.ranges, lo, hi);
        } else {
            insert_range(&mut acc.ranges, lo, hi, line)?;
        }
        Ok(())
    }

    /// Include or exclude the open range `lo..`.
    pub fn ropen(&mut self, lo: i32, exclude: bool, line: i64) -> LibResult<()> {
        if lo < 0 {
            return Err(range_err!(line, "Invalid range for set"));
        }
        let acc = self.accum_mut(line)?;
        let invert = (!exclude && acc.polarity == Polarity::Positive)
            || (exclude && acc.polarity == Polarity::Negative);
        if !invert {
            // drop everything at or above lo from the tracked ranges
            subtract_open(&mut acc.ranges, lo);
            return Ok(());
        }

        // The tracked ranges cannot represent an unbounded range directly.
        // Swallow every range the open range touches, then replace the
        // array with the gaps below the (possibly lowered) start and flip
        // polarity.
        let mut start = lo;
        let mut kept: Vec<(i32, i32)> = Vec::new();
        for &(rlo, rhi) in acc.ranges.iter() {
            if rhi >= start - 1 {
                start = start.min(rlo);
            } else {
                kept.push((rlo, rhi));
            }
        }
        let mut gaps: Vec<(i32, i32)> = Vec::new();
        let mut pos = 0i32;
        for &(rlo, rhi) in &kept {
            if rlo > pos {
                gaps.push((pos, rlo - 1));
            }
            pos = rhi + 1;
        }
        if pos <= start - 1 {
            gaps.push((pos, start - 1));
        }
        acc.ranges = gaps;
        acc.polarity = match acc.polarity {
            Polarity::Positive => Polarity::Negative,
            Polarity::Negative => Polarity::Positive,
        };
        Ok(())
    }

    /// Union the open definition with a finished set.
    pub fn union(&mut self, other: SetId, line: i64) -> LibResult<()> {
        for r in self.get(other).ranges() {
            match r.hi {
                Some(hi) => self.rclose(r.lo, hi, false, line)?,
                None => self.ropen(r.lo, false, line)?,
            }
        }
        Ok(())
    }

    /// Intersect the open definition with a finished set.
    pub fn intersect(&mut self, other: SetId, line: i64) -> LibResult<()> {
        // exclude the complement of the other set
        let mut pos = 0i32;
        for r in self.get(other).ranges() {
            if r.lo > pos {
                self.rclose(pos, r.lo - 1, true, line)?;
            }
            match r.hi {
                Some(hi) if hi < i32::MAX => pos = hi + 1,
                _ => return Ok(()),
            }
        }
        self.ropen(pos, true, line)
    }

    /// Subtract a finished set from the open definition.
    pub fn except(&mut self, other: SetId, line: i64) -> LibResult<()> {
        for r in self.get(other).ranges() {
            match r.hi {
                Some(hi) => self.rclose(r.lo, hi, true, line)?,
                None => self.ropen(r.lo, true, line)?,
            }
        }
        Ok(())
    }

    /// Close the definition and intern the finished set.
    pub fn end(&mut self, line: i64) -> LibResult<SetId> {
        let acc = match self.accum.take() {
            Some(a) => a,
            None => {
                return Err(LibError::GroupConstraint {
                    what: String::from("No set definition in progress"),
                    line: crate::error::src_line(line),
                })
            }
        };

        fn push_range(spans: &mut Vec<i32>, lo: i32, hi: i32) {
            if lo == hi {
                spans.push(encode_span(lo, false));
            } else if lo + 1 == hi {
                spans.push(encode_span(lo, false));
                spans.push(encode_span(hi, false));
            } else {
                spans.push(encode_span(lo, true));
                spans.push(encode_span(hi, false));
            }
        }

        let mut spans: Vec<i32> = Vec::new();

        match acc.polarity {
            Polarity::Positive => {
                for &(lo, hi) in &acc.ranges {
                    push_range(&mut spans, lo, hi);
                }
            }
            Polarity::Negative => {
                // encode the gaps between the exclusion ranges
                let mut pos = 0i32;
                let mut open_tail = true;
                for &(lo, hi) in &acc.ranges {
                    if lo > pos {
                        push_range(&mut spans, pos, lo - 1);
                    }
                    if hi == i32::MAX {
                        open_tail = false;
                        break;
                    }
                    pos = hi + 1;
                }
                if open_tail {
                    spans.push(encode_span(pos, true));
                }
            }
        }

        if spans.len() > SET_MAX_TABLE {
            return Err(range_err!(line, "Set too complex"));
        }

        let id = SetId(self.items.len() as u32);
        self.items.push(Set { spans });
        Ok(id)
    }
}

/// Merge an inclusive range into a sorted list of disjoint ranges,
/// coalescing any range it overlaps or directly abuts.
fn insert_range(ranges: &mut Vec<(i32, i32)>, mut lo: i32, mut hi: i32, line: i64) -> LibResult<()> {
    let mut i = 0;
    while i < ranges.len() {
        let (rlo, rhi) = ranges[i];
        if i64::from(hi) < i64_dec(rlo) {
            break;
        }
        if i64_inc(rhi) < i64::from(lo) {
            i += 1;
            continue;
        }
        lo = lo.min(rlo);
        hi = hi.max(rhi);
        ranges.remove(i);
    }
    if ranges.len() >= ACC_MAX {
        return Err(range_err!(line, "Set is too complex"));
    }
    ranges.insert(i, (lo, hi));
    Ok(())
}

/// Remove an inclusive range from a sorted list of disjoint ranges.
fn subtract_range(ranges: &mut Vec<(i32, i32)>, lo: i32, hi: i32) {
    let mut out: Vec<(i32, i32)> = Vec::with_capacity(ranges.len() + 1);
    for &(rlo, rhi) in ranges.iter() {
        if rhi < lo || rlo > hi {
            out.push((rlo, rhi));
            continue;
        }
        if rlo < lo {
            out.push((rlo, lo - 1));
        }
        if rhi > hi {
            out.push((hi + 1, rhi));
        }
    }
    *ranges = out;
}

/// Remove everything at or above `lo` from a sorted list of ranges.
fn subtract_open(ranges: &mut Vec<(i32, i32)>, lo: i32) {
    let mut out: Vec<(i32, i32)> = Vec::with_capacity(ranges.len());
    for &(rlo, rhi) in ranges.iter() {
        if rhi < lo {
            out.push((rlo, rhi));
        } else if rlo < lo {
            out.push((rlo, lo - 1));
        }
    }
    *ranges = out;
}

// adjacency helpers that avoid i32 edge overflow
fn i64_dec(v: i32) -> i64 {
    i64::from(v) - 1
}

fn i64_inc(v: i32) -> i64 {
    i64::from(v) + 1
}
