//! The text store.
//!
//! Texts are immutable ASCII strings owned by a per-compilation store and
//! addressed by copyable ids. Values on the interpreter stack, in the name
//! bank and in the MIDI handle table all refer to texts by id, so sharing
//! never copies the bytes. Text payloads end up in MIDI meta events, which
//! is why the character set is restricted to printable ASCII plus space.

use crate::error::LibResult;

/// The maximum length in bytes of a single text.
pub const TEXT_MAX_LEN: usize = 1023;

/// An owning index into the [`TextStore`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TextId(pub(crate) u32);

/// Per-compilation arena of immutable texts.
#[derive(Debug, Default)]
pub struct TextStore {
    items: Vec<String>,
}

fn check_ascii(s: &str, line: i64) -> LibResult<()> {
    for b in s.bytes() {
        if !(0x20..=0x7e).contains(&b) {
            return Err(range_err!(line, "Text has characters outside printable ASCII"));
        }
    }
    Ok(())
}

impl TextStore {
    pub fn new() -> TextStore {
        TextStore::default()
    }

    fn intern(&mut self, s: String) -> TextId {
        let id = TextId(self.items.len() as u32);
        self.items.push(s);
        id
    }

    /// Store a text literal after validating length and character set.
    pub fn literal(&mut self, s: &str, line: i64) -> LibResult<TextId> {
        if s.len() > TEXT_MAX_LEN {
            return Err(range_err!(line, "Text literal too long"));
        }
        check_ascii(s, line)?;
        Ok(self.intern(s.to_owned()))
    }

    /// Concatenate texts in order into a new text.
    pub fn concat(&mut self, parts: &[TextId], line: i64) -> LibResult<TextId> {
        let mut full = String::new();
        for &id in parts {
            full.push_str(self.get(id));
            if full.len() > TEXT_MAX_LEN {
                return Err(range_err!(line, "Concatenated text length too large"));
            }
        }
        Ok(self.intern(full))
    }

    /// Take the byte range `i..j` of a text as a new text.
    pub fn slice(&mut self, src: TextId, i: i32, j: i32, line: i64) -> LibResult<TextId> {
        let len = self.get(src).len() as i32;
        if i < 0 || i > len {
            return Err(range_err!(line, "Lower text slice index out of range"));
        }
        if j < i || j > len {
            return Err(range_err!(line, "Upper text slice index out of range"));
        }
        let piece = self.get(src)[i as usize..j as usize].to_owned();
        Ok(self.intern(piece))
    }

    pub fn get(&self, id: TextId) -> &str {
        &self.items[id.0 as usize]
    }

    pub fn len(&self, id: TextId) -> usize {
        self.get(id).len()
    }
}
