//! Concatenation and slicing for texts and blobs.

use crate::error::{src_line, LibError, LibResult};
use crate::interp::Value;
use crate::session::Session;

const MAX_CONCAT: i32 = 16_384;

fn op_concat(s: &mut Session, line: i64) -> LibResult<()> {
    let n = s.interp.pop_int(line)?;
    if n < 1 {
        return Err(range_err!(line, "Element count for concat must be at least one"));
    }
    if n > MAX_CONCAT {
        return Err(range_err!(
            line,
            "Element count for concat may be at most {}",
            MAX_CONCAT
        ));
    }

    // the top element decides whether this is a text or a blob concat
    let probe = s.interp.pop(line)?;
    let is_blob = match probe {
        Value::Text(_) => false,
        Value::Blob(_) => true,
        _ => {
            return Err(LibError::TypeMismatch {
                expected: "blob or text",
                line: src_line(line),
            })
        }
    };
    s.interp.push(probe, line)?;

    if is_blob {
        let mut ids = Vec::with_capacity(n as usize);
        for _ in 0..n {
            ids.push(s.interp.pop_blob(line)?);
        }
        ids.reverse();
        let out = s.blobs.concat(&ids, line)?;
        s.interp.push(Value::Blob(out), line)
    } else {
        let mut ids = Vec::with_capacity(n as usize);
        for _ in 0..n {
            ids.push(s.interp.pop_text(line)?);
        }
        ids.reverse();
        let out = s.texts.concat(&ids, line)?;
        s.interp.push(Value::Text(out), line)
    }
}

fn op_slice(s: &mut Session, line: i64) -> LibResult<()> {
    let j = s.interp.pop_int(line)?;
    let i = s.interp.pop_int(line)?;
    match s.interp.pop(line)? {
        Value::Blob(id) => {
            let out = s.blobs.slice(id, i, j, line)?;
            s.interp.push(Value::Blob(out), line)
        }
        Value::Text(id) => {
            let out = s.texts.slice(id, i, j, line)?;
            s.interp.push(Value::Text(out), line)
        }
        _ => Err(LibError::TypeMismatch {
            expected: "blob or text",
            line: src_line(line),
        }),
    }
}

pub(crate) fn register(s: &mut Session) -> LibResult<()> {
    s.register_op("concat", op_concat)?;
    s.register_op("slice", op_slice)?;
    Ok(())
}
