//! Constructors for articulations, rulers and pointers.

use crate::art::Art;
use crate::error::LibResult;
use crate::interp::Value;
use crate::ruler::Ruler;
use crate::session::Session;

fn op_art(s: &mut Session, line: i64) -> LibResult<()> {
    let gap = s.interp.pop_int(line)?;
    let bumper = s.interp.pop_int(line)?;
    let denom = s.interp.pop_int(line)?;
    let num = s.interp.pop_int(line)?;
    let a = Art::new(num, denom, bumper, gap, line)?;
    s.interp.push(Value::Art(a), line)
}

fn op_ruler(s: &mut Session, line: i64) -> LibResult<()> {
    let gap = s.interp.pop_int(line)?;
    let slot = s.interp.pop_int(line)?;
    let r = Ruler::new(slot, gap, line)?;
    s.interp.push(Value::Ruler(r), line)
}

fn op_ptr(s: &mut Session, line: i64) -> LibResult<()> {
    let pid = s.pointers.alloc();
    s.interp.push(Value::Pointer(pid), line)
}

pub(crate) fn register(s: &mut Session) -> LibResult<()> {
    s.register_op("art", op_art)?;
    s.register_op("ruler", op_ruler)?;
    s.register_op("ptr", op_ptr)?;
    Ok(())
}
