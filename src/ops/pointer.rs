//! Pointer adjustment operations and the ruler stack.
//!
//! `s q r g t m` mirror the numeric suffix letters: they pop an integer
//! and a pointer, adjust the pointer in place, and push it back so
//! adjustments chain naturally.

use crate::error::LibResult;
use crate::interp::Value;
use crate::script::apply_pointer_suffix;
use crate::session::Session;

fn suffix_op(s: &mut Session, line: i64, suf: char) -> LibResult<()> {
    let v = s.interp.pop_int(line)?;
    let pid = s.interp.pop_pointer(line)?;
    if suf != 's' && s.pointers.get(pid).is_header() {
        return Err(range_err!(line, "Can't adjust header pointer"));
    }
    apply_pointer_suffix(s, pid, suf, v, line)?;
    s.interp.push(Value::Pointer(pid), line)
}

fn op_s(s: &mut Session, line: i64) -> LibResult<()> {
    suffix_op(s, line, 's')
}

fn op_q(s: &mut Session, line: i64) -> LibResult<()> {
    suffix_op(s, line, 'q')
}

fn op_r(s: &mut Session, line: i64) -> LibResult<()> {
    suffix_op(s, line, 'r')
}

fn op_g(s: &mut Session, line: i64) -> LibResult<()> {
    suffix_op(s, line, 'g')
}

fn op_t(s: &mut Session, line: i64) -> LibResult<()> {
    suffix_op(s, line, 't')
}

fn op_m(s: &mut Session, line: i64) -> LibResult<()> {
    suffix_op(s, line, 'm')
}

fn op_reset(s: &mut Session, line: i64) -> LibResult<()> {
    let pid = s.interp.pop_pointer(line)?;
    s.pointers.get_mut(pid).reset();
    s.interp.push(Value::Pointer(pid), line)
}

fn op_rpush(s: &mut Session, line: i64) -> LibResult<()> {
    let r = s.interp.pop_ruler(line)?;
    s.interp.rstack_push(r, line)
}

fn op_rpop(s: &mut Session, line: i64) -> LibResult<()> {
    s.interp.rstack_pop(line)?;
    Ok(())
}

pub(crate) fn register(s: &mut Session) -> LibResult<()> {
    s.register_op("s", op_s)?;
    s.register_op("q", op_q)?;
    s.register_op("r", op_r)?;
    s.register_op("g", op_g)?;
    s.register_op("t", op_t)?;
    s.register_op("m", op_m)?;

    s.register_op("reset", op_reset)?;
    s.register_op("rpush", op_rpush)?;
    s.register_op("rpop", op_rpop)?;
    Ok(())
}
