//! Classifier registration operations.
//!
//! Each pops a value and three sets (articulation set on top, then layer,
//! then section) and appends one classifier to the renderer pipeline.

use crate::error::LibResult;
use crate::session::Session;
use crate::set::SetId;

fn pop_sets(s: &mut Session, line: i64) -> LibResult<(SetId, SetId, SetId)> {
    let art = s.interp.pop_set(line)?;
    let layer = s.interp.pop_set(line)?;
    let sect = s.interp.pop_set(line)?;
    Ok((sect, layer, art))
}

fn op_note_art(s: &mut Session, line: i64) -> LibResult<()> {
    let v = s.interp.pop_art(line)?;
    let (sect, layer, art) = pop_sets(s, line)?;
    s.renderer.classify_art(sect, layer, art, v, line)
}

fn op_note_ruler(s: &mut Session, line: i64) -> LibResult<()> {
    let v = s.interp.pop_ruler(line)?;
    let (sect, layer, art) = pop_sets(s, line)?;
    s.renderer.classify_ruler(sect, layer, art, v, line)
}

fn op_note_graph(s: &mut Session, line: i64) -> LibResult<()> {
    let v = s.interp.pop_graph(line)?;
    let (sect, layer, art) = pop_sets(s, line)?;
    s.renderer.classify_graph(sect, layer, art, v, line)
}

fn op_note_channel(s: &mut Session, line: i64) -> LibResult<()> {
    let v = s.interp.pop_int(line)?;
    let (sect, layer, art) = pop_sets(s, line)?;
    s.renderer.classify_channel(sect, layer, art, v, line)
}

fn op_note_release(s: &mut Session, line: i64) -> LibResult<()> {
    let v = s.interp.pop_int(line)?;
    let (sect, layer, art) = pop_sets(s, line)?;
    s.renderer.classify_release(sect, layer, art, v, line)
}

fn op_aftertouch_enable(s: &mut Session, line: i64) -> LibResult<()> {
    let (sect, layer, art) = pop_sets(s, line)?;
    s.renderer.classify_aftertouch(sect, layer, art, true, line)
}

fn op_aftertouch_disable(s: &mut Session, line: i64) -> LibResult<()> {
    let (sect, layer, art) = pop_sets(s, line)?;
    s.renderer.classify_aftertouch(sect, layer, art, false, line)
}

pub(crate) fn register(s: &mut Session) -> LibResult<()> {
    s.register_op("note_art", op_note_art)?;
    s.register_op("note_ruler", op_note_ruler)?;
    s.register_op("note_graph", op_note_graph)?;
    s.register_op("note_channel", op_note_channel)?;
    s.register_op("note_release", op_note_release)?;
    s.register_op("aftertouch_enable", op_aftertouch_enable)?;
    s.register_op("aftertouch_disable", op_aftertouch_disable)?;
    Ok(())
}
