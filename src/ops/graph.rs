//! Graph construction operations.

use crate::error::LibResult;
use crate::interp::Value;
use crate::pointer::PointerId;
use crate::session::Session;

/// Resolve a pointer argument for a graph region. Header pointers have no
/// time and cannot anchor regions.
fn region_time(s: &Session, pid: PointerId, line: i64) -> LibResult<i32> {
    let p = s.pointers.get(pid);
    if p.is_header() {
        return Err(range_err!(line, "Can't use header pointers in a graph"));
    }
    p.resolve(&s.nmf, line)
}

fn op_gval(s: &mut Session, line: i64) -> LibResult<()> {
    let v = s.interp.pop_int(line)?;
    let id = s.graphs.constant(v, line)?;
    s.interp.push(Value::Graph(id), line)
}

fn op_begin_graph(s: &mut Session, line: i64) -> LibResult<()> {
    s.graphs.begin(line)
}

fn op_end_graph(s: &mut Session, line: i64) -> LibResult<()> {
    let id = s.graphs.end(line)?;
    s.interp.push(Value::Graph(id), line)
}

fn op_graph_const(s: &mut Session, line: i64) -> LibResult<()> {
    let v = s.interp.pop_int(line)?;
    let pid = s.interp.pop_pointer(line)?;
    let t = region_time(s, pid, line)?;
    s.graphs.add_constant(t, v, line)
}

fn ramp(s: &mut Session, line: i64, log: bool) -> LibResult<()> {
    let step = s.interp.pop_int(line)?;
    let b = s.interp.pop_int(line)?;
    let a = s.interp.pop_int(line)?;
    let pid = s.interp.pop_pointer(line)?;
    let t = region_time(s, pid, line)?;
    s.graphs.add_ramp(t, a, b, step, log, line)
}

fn op_graph_ramp(s: &mut Session, line: i64) -> LibResult<()> {
    ramp(s, line, false)
}

fn op_graph_ramp_log(s: &mut Session, line: i64) -> LibResult<()> {
    ramp(s, line, true)
}

fn op_graph_derive(s: &mut Session, line: i64) -> LibResult<()> {
    let max = s.interp.pop_int(line)?;
    let min = s.interp.pop_int(line)?;
    let c = s.interp.pop_int(line)?;
    let denom = s.interp.pop_int(line)?;
    let num = s.interp.pop_int(line)?;
    let src_pid = s.interp.pop_pointer(line)?;
    let src_graph = s.interp.pop_graph(line)?;
    let dst_pid = s.interp.pop_pointer(line)?;

    let max = match max {
        -1 => None,
        v if v >= 0 => Some(v),
        _ => return Err(range_err!(line, "Invalid graph region maximum")),
    };
    let t = region_time(s, dst_pid, line)?;
    let t_src = region_time(s, src_pid, line)?;
    s.graphs
        .add_derived(t, src_graph, t_src, num, denom, c, min, max, line)
}

pub(crate) fn register(s: &mut Session) -> LibResult<()> {
    s.register_op("gval", op_gval)?;
    s.register_op("begin_graph", op_begin_graph)?;
    s.register_op("end_graph", op_end_graph)?;
    s.register_op("graph_const", op_graph_const)?;

    s.register_op("graph_ramp", op_graph_ramp)?;
    s.register_op("graph_ramp_log", op_graph_ramp_log)?;

    s.register_op("graph_derive", op_graph_derive)?;
    Ok(())
}
