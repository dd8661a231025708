//! The compilation session.
//!
//! One [`Session`] owns every per-compilation store: the interpreter, the
//! value arenas, the graph and set accumulators, the renderer pipeline,
//! the controller map and the MIDI assembler. A compilation runs in three
//! serial phases on a single thread:
//!
//! 1. **Script** — [`Session::run_script`] consumes entities, and the
//!    registered operations build values and register classifiers.
//! 2. **Render** — [`Session::render`] materialises every NMF note into
//!    MIDI events; classifier registration is closed afterwards.
//! 3. **Output** — [`Session::track_controllers`] emits the automatic
//!    controller streams, then [`Session::compile`] sorts and serialises
//!    the MIDI file. The session is spent afterwards.
//!
//! Dropping the session releases every store at once; there is no partial
//! recovery from a failed compilation.

use crate::blob::BlobStore;
use crate::control::ControlMap;
use crate::error::{src_line, LibError, LibResult, Result};
use crate::graph::GraphStore;
use crate::interp::{valid_name, Interp, Value};
use crate::midi::MidiAssembler;
use crate::moment;
use crate::nmf::{require_q96, NmfData};
use crate::ops;
use crate::pointer::{Pointer, PointerStore};
use crate::render::Renderer;
use crate::script;
use crate::set::SetStore;
use crate::text::TextStore;
use log::debug;
use snafu::ResultExt;
use std::collections::HashMap;
use std::io::Write;

/// An operation implementation: pops its arguments off the interpreter
/// stack and calls into the core stores.
pub type OpFn = fn(&mut Session, i64) -> LibResult<()>;

/// All state for one compilation.
pub struct Session {
    pub(crate) nmf: NmfData,
    pub(crate) interp: Interp,
    pub(crate) texts: TextStore,
    pub(crate) blobs: BlobStore,
    pub(crate) sets: SetStore,
    pub(crate) graphs: GraphStore,
    pub(crate) pointers: PointerStore,
    pub(crate) renderer: Renderer,
    pub(crate) control: ControlMap,
    pub(crate) midi: MidiAssembler,
    ops: HashMap<String, OpFn>,
    /// Whether the script diagnostic channel sits at the start of a line.
    fresh_line: bool,
}

impl Session {
    /// Start a compilation against parsed NMF input. Rejects any quantum
    /// basis other than Q96 and registers the operation catalogue.
    pub fn new(nmf: NmfData) -> Result<Session> {
        Ok(Self::new_inner(nmf)?)
    }

    pub(crate) fn new_inner(nmf: NmfData) -> LibResult<Session> {
        require_q96(&nmf)?;
        let mut session = Session {
            nmf,
            interp: Interp::new(),
            texts: TextStore::new(),
            blobs: BlobStore::new(),
            sets: SetStore::new(),
            graphs: GraphStore::new(),
            pointers: PointerStore::new(),
            renderer: Renderer::new(),
            control: ControlMap::new(),
            midi: MidiAssembler::new(),
            ops: HashMap::new(),
            fresh_line: true,
        };
        ops::register_all(&mut session)?;
        debug!("session ready: {} operations registered", session.ops.len());
        Ok(session)
    }

    /// Enable or disable the keyboard non-overlap process (on by default).
    pub fn set_keyboard(&mut self, enabled: bool) {
        self.renderer.set_keyboard(enabled);
    }

    /// Register one operation under a unique name.
    pub(crate) fn register_op(&mut self, name: &str, f: OpFn) -> LibResult<()> {
        if !valid_name(name) {
            return Err(LibError::InvalidName {
                name: name.to_owned(),
                line: -1,
            });
        }
        if self.ops.insert(name.to_owned(), f).is_some() {
            return Err(LibError::DuplicateOp {
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    /// Invoke an operation by name.
    pub(crate) fn dispatch(&mut self, name: &str, line: i64) -> LibResult<()> {
        let f = match self.ops.get(name) {
            Some(&f) => f,
            None => {
                return Err(LibError::Syntax {
                    what: format!("Invalid operation '{}'", name),
                    line: src_line(line),
                })
            }
        };
        f(self, line)
    }

    /// Run a whole script (phase 1).
    pub fn run_script(&mut self, text: &str) -> Result<()> {
        Ok(script::run_script(self, text)?)
    }

    /// Render every NMF note into MIDI events (phase 2).
    pub fn render(&mut self) -> Result<()> {
        Ok(self
            .renderer
            .render_nmf(&self.nmf, &self.sets, &mut self.graphs, &mut self.midi)?)
    }

    /// Emit the automatic controller streams (phase 3, first half).
    pub fn track_controllers(&mut self) -> Result<()> {
        Ok(self.control.track(&self.graphs, &mut self.midi)?)
    }

    /// Serialise the Standard MIDI File (phase 3, second half). The
    /// session cannot post further events afterwards.
    pub fn compile<W: Write>(&mut self, out: &mut W) -> Result<()> {
        Ok(self.midi.compile(out, &self.texts, &self.blobs)?)
    }

    /// Write the section map: one `<section>:<delta>` line per NMF
    /// section, with deltas in ticks from the track origin. Call after
    /// rendering, when the event range is final.
    pub fn write_map<W: Write>(&mut self, out: &mut W) -> Result<()> {
        Ok(self.write_map_inner(out)?)
    }

    fn write_map_inner<W: Write>(&mut self, out: &mut W) -> LibResult<()> {
        let lower = self.midi.range_lower();
        for sect in 0..self.nmf.section_count() {
            let mut p = Pointer::new();
            p.jump(sect, -1)?;
            p.moment(-1, -1)?;
            let subq = moment::subquantum(p.resolve(&self.nmf, -1)?);
            let delta = i64::from(subq) - i64::from(lower);
            if delta < i64::from(i32::MIN) || delta > i64::from(i32::MAX) {
                return Err(LibError::Overflow { line: -1 });
            }
            writeln!(out, "{}:{}", sect, delta).context(io!())?;
        }
        Ok(())
    }

    /// Resolve a pointer for an event post: header pointers yield no time
    /// and route the event to the track header.
    pub(crate) fn event_time(&self, pid: crate::pointer::PointerId, line: i64) -> LibResult<(i32, bool)> {
        let p = self.pointers.get(pid);
        if p.is_header() {
            Ok((0, true))
        } else {
            Ok((p.resolve(&self.nmf, line)?, false))
        }
    }

    /// The script `print` diagnostic channel: renders a value to stderr,
    /// prefixed with the script line when starting a fresh line.
    pub(crate) fn print_value(&mut self, v: &Value, line: i64) {
        if self.fresh_line {
            self.fresh_line = false;
            eprint!("infrared: [Script line {}] ", src_line(line));
        }
        eprint!("{}", self.display_value(v));
    }

    pub(crate) fn print_newline(&mut self) {
        eprintln!();
        self.fresh_line = true;
    }

    fn display_value(&self, v: &Value) -> String {
        match *v {
            Value::Integer(i) => format!("{}", i),
            Value::Text(id) => self.texts.get(id).to_owned(),
            Value::Blob(id) => self.blobs.display(id),
            Value::Graph(id) => self.graphs.get(id).display(),
            Value::Set(id) => self.sets.get(id).display(),
            Value::Art(a) => format!("{}", a),
            Value::Ruler(r) => format!("{}", r),
            Value::Pointer(id) => self.pointers.get(id).display(),
        }
    }
}

/// Compile a script and NMF input into a MIDI byte stream in one call.
///
/// This is the whole pipeline: script phase, render phase, controller
/// tracking and serialisation.
pub fn compile_to<W: Write>(script_text: &str, nmf: NmfData, out: &mut W) -> Result<Session> {
    let mut session = Session::new(nmf)?;
    session.run_script(script_text)?;
    session.render()?;
    session.track_controllers()?;
    session.compile(out)?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nmf::{NmfBasis, NmfNote};

    fn simple_nmf() -> NmfData {
        let mut nmf = NmfData::new(NmfBasis::Q96);
        nmf.push_section(0).unwrap();
        nmf.push_note(NmfNote {
            t: 0,
            dur: 96,
            pitch: 0,
            art: 0,
            sect: 0,
            layer: 0,
        })
        .unwrap();
        nmf
    }

    #[test]
    fn rejects_wrong_basis() {
        assert!(Session::new(NmfData::new(NmfBasis::R48000)).is_err());
    }

    #[test]
    fn duplicate_op_rejected() {
        let mut s = Session::new_inner(simple_nmf()).unwrap();
        fn nop(_: &mut Session, _: i64) -> LibResult<()> {
            Ok(())
        }
        s.register_op("my_op", nop).unwrap();
        assert!(s.register_op("my_op", nop).is_err());
        assert!(s.register_op("0bad", nop).is_err());
    }

    #[test]
    fn unknown_op_is_fatal() {
        let mut s = Session::new_inner(simple_nmf()).unwrap();
        assert!(s.run_script("%infrared; frobnicate").is_err());
    }

    #[test]
    fn end_to_end_default_pipeline() {
        let mut out = Vec::new();
        compile_to("%infrared;", simple_nmf(), &mut out).unwrap();
        assert_eq!(&out[..4], b"MThd");
        let body = &out[22..];
        assert_eq!(
            body,
            &[0x00, 0x90, 60, 64, 0x86, 0x00, 60, 0, 0x00, 0xff, 0x2f, 0x00]
        );
    }

    #[test]
    fn script_leftover_stack_is_fatal() {
        let mut s = Session::new_inner(simple_nmf()).unwrap();
        assert!(s.run_script("%infrared; 42").is_err());
    }

    #[test]
    fn section_map_output() {
        let mut nmf = NmfData::new(NmfBasis::Q96);
        nmf.push_section(0).unwrap();
        nmf.push_section(96).unwrap();
        nmf.push_note(NmfNote {
            t: 0,
            dur: 96,
            pitch: 0,
            art: 0,
            sect: 0,
            layer: 0,
        })
        .unwrap();
        let mut s = Session::new(nmf).unwrap();
        s.run_script("%infrared;").unwrap();
        s.render().unwrap();
        let mut map = Vec::new();
        s.write_map(&mut map).unwrap();
        assert_eq!(String::from_utf8(map).unwrap(), "0:0\n1:768\n");
    }
}
