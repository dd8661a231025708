//! Set construction operations.

use crate::error::LibResult;
use crate::interp::Value;
use crate::session::Session;

fn op_begin_set(s: &mut Session, line: i64) -> LibResult<()> {
    s.sets.begin(line)
}

fn op_end_set(s: &mut Session, line: i64) -> LibResult<()> {
    let id = s.sets.end(line)?;
    s.interp.push(Value::Set(id), line)
}

fn op_all(s: &mut Session, line: i64) -> LibResult<()> {
    s.sets.all(line)
}

fn op_none(s: &mut Session, line: i64) -> LibResult<()> {
    s.sets.none(line)
}

fn op_invert(s: &mut Session, line: i64) -> LibResult<()> {
    s.sets.invert(line)
}

fn closed(s: &mut Session, line: i64, exclude: bool) -> LibResult<()> {
    let hi = s.interp.pop_int(line)?;
    let lo = s.interp.pop_int(line)?;
    s.sets.rclose(lo, hi, exclude, line)
}

fn op_include(s: &mut Session, line: i64) -> LibResult<()> {
    closed(s, line, false)
}

fn op_exclude(s: &mut Session, line: i64) -> LibResult<()> {
    closed(s, line, true)
}

fn open(s: &mut Session, line: i64, exclude: bool) -> LibResult<()> {
    let lo = s.interp.pop_int(line)?;
    s.sets.ropen(lo, exclude, line)
}

fn op_include_from(s: &mut Session, line: i64) -> LibResult<()> {
    open(s, line, false)
}

fn op_exclude_from(s: &mut Session, line: i64) -> LibResult<()> {
    open(s, line, true)
}

fn op_union(s: &mut Session, line: i64) -> LibResult<()> {
    let other = s.interp.pop_set(line)?;
    s.sets.union(other, line)
}

fn op_intersect(s: &mut Session, line: i64) -> LibResult<()> {
    let other = s.interp.pop_set(line)?;
    s.sets.intersect(other, line)
}

fn op_except(s: &mut Session, line: i64) -> LibResult<()> {
    let other = s.interp.pop_set(line)?;
    s.sets.except(other, line)
}

pub(crate) fn register(s: &mut Session) -> LibResult<()> {
    s.register_op("begin_set", op_begin_set)?;
    s.register_op("end_set", op_end_set)?;

    s.register_op("all", op_all)?;
    s.register_op("none", op_none)?;
    s.register_op("invert", op_invert)?;

    s.register_op("include", op_include)?;
    s.register_op("exclude", op_exclude)?;
    s.register_op("include_from", op_include_from)?;
    s.register_op("exclude_from", op_exclude_from)?;

    s.register_op("union", op_union)?;
    s.register_op("intersect", op_intersect)?;
    s.register_op("except", op_except)?;
    Ok(())
}
