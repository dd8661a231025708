//! Stack housekeeping, the diagnostic channel and integer arithmetic.

use crate::error::{src_line, LibError, LibResult};
use crate::interp::Value;
use crate::midi::{TEMPO_MAX, TEMPO_MIN};
use crate::prim;
use crate::session::Session;

fn op_pop(s: &mut Session, line: i64) -> LibResult<()> {
    s.interp.pop(line)?;
    Ok(())
}

fn op_dup(s: &mut Session, line: i64) -> LibResult<()> {
    let v = s.interp.pop(line)?;
    s.interp.push(v, line)?;
    s.interp.push(v, line)
}

fn op_print(s: &mut Session, line: i64) -> LibResult<()> {
    let v = s.interp.pop(line)?;
    s.print_value(&v, line);
    Ok(())
}

fn op_newline(s: &mut Session, _line: i64) -> LibResult<()> {
    s.print_newline();
    Ok(())
}

fn op_stop(s: &mut Session, line: i64) -> LibResult<()> {
    s.print_newline();
    Err(LibError::Stopped {
        line: src_line(line),
    })
}

fn binary(s: &mut Session, line: i64, f: fn(i32, i32, i64) -> LibResult<i32>) -> LibResult<()> {
    let b = s.interp.pop_int(line)?;
    let a = s.interp.pop_int(line)?;
    s.interp.push(Value::Integer(f(a, b, line)?), line)
}

fn op_add(s: &mut Session, line: i64) -> LibResult<()> {
    binary(s, line, prim::add)
}

fn op_sub(s: &mut Session, line: i64) -> LibResult<()> {
    binary(s, line, prim::sub)
}

fn op_mul(s: &mut Session, line: i64) -> LibResult<()> {
    binary(s, line, prim::mul)
}

fn op_div(s: &mut Session, line: i64) -> LibResult<()> {
    binary(s, line, prim::div)
}

fn op_neg(s: &mut Session, line: i64) -> LibResult<()> {
    let v = s.interp.pop_int(line)?;
    s.interp.push(Value::Integer(prim::neg(v, line)?), line)
}

/// Convert quarter notes per minute into the tempo meta event value
/// (microseconds per quarter note).
fn op_bpm(s: &mut Session, line: i64) -> LibResult<()> {
    let bpm = s.interp.pop_int(line)?;
    if bpm < 1 {
        return Err(range_err!(line, "Beats per minute must be at least one"));
    }
    let usec = 60_000_000 / bpm;
    if usec < TEMPO_MIN || usec > TEMPO_MAX {
        return Err(range_err!(line, "Beats per minute {} out of tempo range", bpm));
    }
    s.interp.push(Value::Integer(usec), line)
}

pub(crate) fn register(s: &mut Session) -> LibResult<()> {
    s.register_op("pop", op_pop)?;
    s.register_op("dup", op_dup)?;
    s.register_op("print", op_print)?;
    s.register_op("newline", op_newline)?;
    s.register_op("stop", op_stop)?;

    s.register_op("add", op_add)?;
    s.register_op("sub", op_sub)?;
    s.register_op("mul", op_mul)?;
    s.register_op("div", op_div)?;
    s.register_op("neg", op_neg)?;

    s.register_op("bpm", op_bpm)?;
    Ok(())
}
