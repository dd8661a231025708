//! The operation catalogue.
//!
//! Operations are thin adapters: each pops its arguments off the
//! interpreter stack, calls into a core store and pushes any result. They
//! are registered by name at session startup and invoked by the script
//! driver.

use crate::error::LibResult;
use crate::session::Session;

mod base;
mod construct;
mod control;
mod graph;
mod pointer;
mod render;
mod set;
mod string;

pub(crate) fn register_all(session: &mut Session) -> LibResult<()> {
    base::register(session)?;
    pointer::register(session)?;
    construct::register(session)?;
    string::register(session)?;
    set::register(session)?;
    graph::register(session)?;
    render::register(session)?;
    control::register(session)?;
    Ok(())
}
