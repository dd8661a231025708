use crate::error::LibResult;
use snafu::ResultExt;
use std::io::Write;

/// A wrapper for any `Write` that applies running-status optimisation and
/// counts the bytes it emits.
///
/// Status bytes in `0x80..=0xEF` participate in running status: writing the
/// same status twice in a row suppresses the second byte. Any other status
/// byte clears the stored state. The byte count lets the serialiser verify
/// that the size pass and the write pass agreed.
pub(crate) struct Scribe<W: Write> {
    w: W,
    running_status: Option<u8>,
    written: u64,
}

impl<W: Write> Scribe<W> {
    pub(crate) fn new(w: W) -> Self {
        Scribe {
            w,
            running_status: None,
            written: 0,
        }
    }

    /// Total bytes emitted through this scribe.
    pub(crate) fn written(&self) -> u64 {
        self.written
    }

    pub(crate) fn write_all(&mut self, buf: &[u8]) -> LibResult<()> {
        self.w.write_all(buf).context(io!())?;
        self.written += buf.len() as u64;
        Ok(())
    }

    pub(crate) fn write_byte(&mut self, b: u8) -> LibResult<()> {
        self.write_all(&[b])
    }

    /// Write a status byte unless running status makes it redundant.
    pub(crate) fn write_status_byte(&mut self, status: u8) -> LibResult<()> {
        match self.running_status {
            Some(previous) if previous == status => {}
            _ => self.write_byte(status)?,
        }
        self.running_status = if (0x80..=0xef).contains(&status) {
            Some(status)
        } else {
            None
        };
        Ok(())
    }

}

/// Bytes a status byte will occupy given the previous event's status: zero
/// under running status, one otherwise. The write pass must agree with
/// this, which [`Scribe::written`] lets the serialiser verify.
pub(crate) fn status_size(status: u8, prev_status: Option<u8>) -> i32 {
    match prev_status {
        Some(p) if (0x80..=0xef).contains(&p) && p == status => 0,
        _ => 1,
    }
}
